use std::collections::HashSet;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::ast;

use super::DelegationContext;
use super::Transform;
use crate::error::DelegationError;
use crate::schema;
use crate::subschema::SubschemaRequest;

/// Passes the explicit arguments of a delegation to the root field as variables.
///
/// Variables are named `_v{n}_{argument}` and typed after the argument in the subschema.
pub(crate) struct AddArgumentsAsVariables;

impl Transform for AddArgumentsAsVariables {
    fn transform_request(
        &self,
        mut request: SubschemaRequest,
        context: &DelegationContext,
    ) -> Result<SubschemaRequest, DelegationError> {
        let Some(args) = context.args() else {
            return Ok(request);
        };
        let target = context.target_schema();
        let Some(root) = schema::root_type_name(target, request.operation_kind).cloned() else {
            return Ok(request);
        };
        let Some(operation) = request.operation_mut() else {
            return Ok(request);
        };

        let mut taken = operation
            .variables
            .iter()
            .map(|variable| variable.name.to_string())
            .collect::<HashSet<_>>();
        let mut counter = 0;
        let mut definitions = Vec::new();
        let mut bound = Vec::new();
        for selection in &mut operation.selection_set {
            let ast::Selection::Field(field) = selection else {
                continue;
            };
            let Some(definition) = schema::field_definition(target, &root, &field.name) else {
                continue;
            };
            let field = field.make_mut();
            for argument in &definition.arguments {
                let Some(value) = args.get(argument.name.as_str()) else {
                    continue;
                };
                let variable = loop {
                    let candidate = format!("_v{counter}_{}", argument.name);
                    counter += 1;
                    if taken.insert(candidate.clone()) {
                        break Name::new(&candidate)
                            .map_err(|error| DelegationError::InvalidRequest(error.to_string()))?;
                    }
                };
                definitions.push(Node::new(ast::VariableDefinition {
                    name: variable.clone(),
                    ty: argument.ty.clone(),
                    default_value: None,
                    directives: ast::DirectiveList::default(),
                }));
                bound.push((variable.clone(), value.clone()));
                let value = Node::new(ast::Value::Variable(variable));
                match field
                    .arguments
                    .iter_mut()
                    .find(|provided| provided.name == argument.name)
                {
                    Some(provided) => provided.make_mut().value = value,
                    None => field.arguments.push(Node::new(ast::Argument {
                        name: argument.name.clone(),
                        value,
                    })),
                }
            }
        }
        operation.variables.extend(definitions);
        for (variable, value) in bound {
            request.variables.insert(variable.as_str(), value);
        }
        Ok(request)
    }
}
