use apollo_compiler::Node;
use apollo_compiler::ast;

use super::DelegationOptions;
use crate::error::DelegationError;
use crate::schema;
use crate::schema::OperationKind;
use crate::subschema::SubschemaRequest;

/// Builds the request for a delegation, before any transform.
///
/// The operation holds a single root field, named as in the stitched schema and not aliased.
/// Its selections come from the options, or from the field nodes being resolved along with
/// their arguments. The operation keeps the name, variables and fragments of the incoming one;
/// whatever the subschema does not need is filtered out later.
pub fn create_request(options: &DelegationOptions<'_>) -> Result<SubschemaRequest, DelegationError> {
    let info = options.info;
    let field_name = options.field_name();
    let kind = operation_kind(options)?;

    let (selection_set, arguments) = match &options.selection_set {
        Some(selection_set) => (selection_set.clone(), Vec::new()),
        None => {
            let field_nodes = options.field_nodes.as_ref().unwrap_or(&info.field_nodes);
            let selection_set = field_nodes
                .iter()
                .flat_map(|node| node.selection_set.iter().cloned())
                .collect::<Vec<_>>();
            let mut arguments = field_nodes
                .first()
                .map(|node| node.arguments.clone())
                .unwrap_or_default();
            let definition = schema::field_definition(
                info.schema().schema(),
                &info.parent_type,
                &info.field_name,
            );
            if let Some(definition) = definition.filter(|_| info.field_name == *field_name) {
                for argument in &definition.arguments {
                    let Some(default_value) = &argument.default_value else {
                        continue;
                    };
                    if arguments.iter().all(|provided| provided.name != argument.name) {
                        arguments.push(Node::new(ast::Argument {
                            name: argument.name.clone(),
                            value: default_value.clone(),
                        }));
                    }
                }
            }
            (selection_set, arguments)
        }
    };

    let root_field = ast::Field {
        alias: None,
        name: field_name.clone(),
        arguments,
        directives: ast::DirectiveList::default(),
        selection_set,
    };
    let operation = ast::OperationDefinition {
        operation_type: kind.into(),
        name: info.operation.name.clone(),
        variables: info.operation.variables.clone(),
        directives: ast::DirectiveList::default(),
        selection_set: vec![ast::Selection::Field(Node::new(root_field))],
    };
    let mut document = ast::Document::new();
    document
        .definitions
        .push(ast::Definition::OperationDefinition(Node::new(operation)));
    document.definitions.extend(
        info.fragments
            .values()
            .cloned()
            .map(ast::Definition::FragmentDefinition),
    );

    Ok(SubschemaRequest {
        document,
        variables: (*info.variable_values).clone(),
        operation_name: info.operation.name.clone(),
        operation_kind: kind,
        context: info.context.clone(),
    })
}

/// The explicit operation kind, else the caller's if the subschema has the field there, else
/// the first kind whose root type has the field.
fn operation_kind(options: &DelegationOptions<'_>) -> Result<OperationKind, DelegationError> {
    if let Some(kind) = options.operation {
        return Ok(kind);
    }
    let entry = options.info.schema().stitching_info().subschema(options.subschema);
    let transformed = entry.transformed_schema();
    let field_name = options.field_name();
    let has_field = |kind: OperationKind| {
        schema::root_type_name(transformed, kind)
            .is_some_and(|root| schema::field_definition(transformed, root, field_name).is_some())
    };
    let caller_kind = options.info.operation_kind();
    if has_field(caller_kind) {
        return Ok(caller_kind);
    }
    OperationKind::ALL
        .into_iter()
        .find(|kind| has_field(*kind))
        .ok_or_else(|| DelegationError::UnknownRootField {
            subschema: entry.subschema().name().to_string(),
            field_name: field_name.to_string(),
        })
}
