use std::collections::HashSet;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use apollo_compiler::ast;
use indexmap::IndexMap;

use super::DelegationContext;
use super::Transform;
use crate::error::DelegationError;
use crate::schema;
use crate::subschema::SubschemaRequest;

/// Removes from a request whatever the subschema does not know.
///
/// Unknown fields, arguments and fragments go, along with selection sets left empty, fragments no
/// longer spread and variables no longer used.
pub(crate) struct FilterToSchema;

impl Transform for FilterToSchema {
    fn transform_request(
        &self,
        mut request: SubschemaRequest,
        context: &DelegationContext,
    ) -> Result<SubschemaRequest, DelegationError> {
        let used_variables = filter_document(context.target_schema(), &mut request.document);
        let unused = request
            .variables
            .keys()
            .filter(|name| !used_variables.contains(name.as_str()))
            .cloned()
            .collect::<Vec<_>>();
        for name in unused {
            request.variables.remove(name.as_str());
        }
        Ok(request)
    }
}

/// Filters `document` in place and returns the names of the variables it still uses.
pub(crate) fn filter_document(schema: &Schema, document: &mut ast::Document) -> HashSet<Name> {
    let originals = document
        .definitions
        .iter()
        .filter_map(|definition| match definition {
            ast::Definition::FragmentDefinition(fragment)
                if schema::is_composite(schema, &fragment.type_condition) =>
            {
                Some((fragment.name.clone(), fragment.clone()))
            }
            _ => None,
        })
        .collect::<IndexMap<_, _>>();

    // Dropping an empty fragment may empty the fragments spreading it.
    let mut fragments = originals.clone();
    loop {
        let filtered = originals
            .iter()
            .filter(|(name, _)| fragments.contains_key(*name))
            .map(|(name, fragment)| {
                let selections = filter_selections(
                    schema,
                    &fragments,
                    &fragment.type_condition,
                    &fragment.selection_set,
                );
                let mut fragment = fragment.clone();
                fragment.make_mut().selection_set = selections;
                (name.clone(), fragment)
            })
            .filter(|(_, fragment)| !fragment.selection_set.is_empty())
            .collect::<IndexMap<_, _>>();
        let stable = filtered.len() == fragments.len();
        fragments = filtered;
        if stable {
            break;
        }
    }

    let mut used_fragments = HashSet::new();
    let mut used_variables = HashSet::new();
    let mut definitions = Vec::with_capacity(document.definitions.len());
    for definition in std::mem::take(&mut document.definitions) {
        match definition {
            ast::Definition::OperationDefinition(mut operation) => {
                let selections = match schema::root_type_name(schema, operation.operation_type.into())
                {
                    Some(root) => {
                        filter_selections(schema, &fragments, root, &operation.selection_set)
                    }
                    None => Vec::new(),
                };
                collect_spreads(&selections, &fragments, &mut used_fragments);
                let operation_mut = operation.make_mut();
                operation_mut.selection_set = selections;
                definitions.push(ast::Definition::OperationDefinition(operation));
            }
            ast::Definition::FragmentDefinition(_) => {}
            other => definitions.push(other),
        }
    }
    for (name, fragment) in &fragments {
        if used_fragments.contains(name) {
            definitions.push(ast::Definition::FragmentDefinition(fragment.clone()));
        }
    }

    for definition in &definitions {
        match definition {
            ast::Definition::OperationDefinition(operation) => {
                variables_in_directives(&operation.directives, &mut used_variables);
                variables_in_selections(&operation.selection_set, &mut used_variables);
            }
            ast::Definition::FragmentDefinition(fragment) => {
                variables_in_directives(&fragment.directives, &mut used_variables);
                variables_in_selections(&fragment.selection_set, &mut used_variables);
            }
            _ => {}
        }
    }
    for definition in &mut definitions {
        if let ast::Definition::OperationDefinition(operation) = definition {
            if operation
                .variables
                .iter()
                .any(|variable| !used_variables.contains(&variable.name))
            {
                operation
                    .make_mut()
                    .variables
                    .retain(|variable| used_variables.contains(&variable.name));
            }
        }
    }
    document.definitions = definitions;
    used_variables
}

fn filter_selections(
    schema: &Schema,
    fragments: &IndexMap<Name, Node<ast::FragmentDefinition>>,
    parent: &Name,
    selections: &[ast::Selection],
) -> Vec<ast::Selection> {
    let mut filtered = Vec::with_capacity(selections.len());
    for selection in selections {
        match selection {
            ast::Selection::Field(field) => {
                if field.name.as_str() == "__typename" {
                    filtered.push(selection.clone());
                    continue;
                }
                let Some(definition) = schema::field_definition(schema, parent, &field.name) else {
                    continue;
                };
                let field_type = definition.ty.inner_named_type();
                let selection_set = if schema::is_composite(schema, field_type) {
                    let selection_set =
                        filter_selections(schema, fragments, field_type, &field.selection_set);
                    if selection_set.is_empty() {
                        continue;
                    }
                    selection_set
                } else {
                    Vec::new()
                };
                let mut field = field.clone();
                let field_mut = field.make_mut();
                field_mut.arguments.retain(|argument| {
                    definition
                        .arguments
                        .iter()
                        .any(|defined| defined.name == argument.name)
                });
                field_mut.selection_set = selection_set;
                filtered.push(ast::Selection::Field(field));
            }
            ast::Selection::InlineFragment(inline) => {
                let condition = inline.type_condition.as_ref().unwrap_or(parent);
                if !schema::is_composite(schema, condition)
                    || !schema::is_possible_type(schema, parent, condition)
                {
                    continue;
                }
                let selection_set =
                    filter_selections(schema, fragments, condition, &inline.selection_set);
                if selection_set.is_empty() {
                    continue;
                }
                let mut inline = inline.clone();
                inline.make_mut().selection_set = selection_set;
                filtered.push(ast::Selection::InlineFragment(inline));
            }
            ast::Selection::FragmentSpread(spread) => {
                let Some(fragment) = fragments.get(&spread.fragment_name) else {
                    continue;
                };
                if schema::is_possible_type(schema, parent, &fragment.type_condition) {
                    filtered.push(selection.clone());
                }
            }
        }
    }
    filtered
}

fn collect_spreads(
    selections: &[ast::Selection],
    fragments: &IndexMap<Name, Node<ast::FragmentDefinition>>,
    used: &mut HashSet<Name>,
) {
    for selection in selections {
        match selection {
            ast::Selection::Field(field) => collect_spreads(&field.selection_set, fragments, used),
            ast::Selection::InlineFragment(inline) => {
                collect_spreads(&inline.selection_set, fragments, used)
            }
            ast::Selection::FragmentSpread(spread) => {
                if used.insert(spread.fragment_name.clone())
                    && let Some(fragment) = fragments.get(&spread.fragment_name)
                {
                    collect_spreads(&fragment.selection_set, fragments, used);
                }
            }
        }
    }
}

fn variables_in_selections(selections: &[ast::Selection], used: &mut HashSet<Name>) {
    for selection in selections {
        match selection {
            ast::Selection::Field(field) => {
                for argument in &field.arguments {
                    variables_in_value(&argument.value, used);
                }
                variables_in_directives(&field.directives, used);
                variables_in_selections(&field.selection_set, used);
            }
            ast::Selection::InlineFragment(inline) => {
                variables_in_directives(&inline.directives, used);
                variables_in_selections(&inline.selection_set, used);
            }
            ast::Selection::FragmentSpread(spread) => {
                variables_in_directives(&spread.directives, used);
            }
        }
    }
}

fn variables_in_directives(directives: &ast::DirectiveList, used: &mut HashSet<Name>) {
    for directive in directives.iter() {
        for argument in &directive.arguments {
            variables_in_value(&argument.value, used);
        }
    }
}

fn variables_in_value(value: &ast::Value, used: &mut HashSet<Name>) {
    match value {
        ast::Value::Variable(name) => {
            used.insert(name.clone());
        }
        ast::Value::List(items) => {
            for item in items {
                variables_in_value(item, used);
            }
        }
        ast::Value::Object(fields) => {
            for (_, field) in fields {
                variables_in_value(field, used);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;
    use crate::transforms::tests::delegation_context;
    use crate::transforms::tests::reprint;
    use crate::transforms::tests::request;

    fn filter(query: &str) -> SubschemaRequest {
        FilterToSchema
            .transform_request(request(query), &delegation_context(None))
            .unwrap()
    }

    #[test]
    fn known_documents_are_left_alone() {
        let query = "query($upc: String!) { productByUpc(upc: $upc) { __typename upc price } }";
        assert_eq!(filter(query).document.to_string(), reprint(query));
    }

    #[test]
    fn unknown_fields_and_arguments_are_removed() {
        let filtered = filter(
            r#"{ productByUpc(upc: "1", region: "eu") { upc name price reviews { body } } }"#,
        );
        assert_eq!(
            filtered.document.to_string(),
            reprint(r#"{ productByUpc(upc: "1") { upc price } }"#)
        );
    }

    #[test]
    fn emptied_fragments_and_their_variables_are_removed() {
        let mut request = request(
            r#"
            query($upc: String!, $withName: Boolean!) {
              productByUpc(upc: $upc) { upc ...Names ...Prices }
            }
            fragment Names on Product { name @include(if: $withName) }
            fragment Prices on Product { price }
            fragment Unused on Product { weight }
            "#,
        );
        request.variables.insert("upc", json!("1"));
        request.variables.insert("withName", json!(true));
        let filtered = FilterToSchema
            .transform_request(request, &delegation_context(None))
            .unwrap();
        assert_eq!(
            filtered.document.to_string(),
            reprint(
                r#"
                query($upc: String!) { productByUpc(upc: $upc) { upc ...Prices } }
                fragment Prices on Product { price }
                "#
            )
        );
        assert_eq!(filtered.variables.len(), 1);
        assert_eq!(filtered.variables.get("upc"), Some(&json!("1")));
    }

    #[test]
    fn fragments_on_unknown_types_are_removed() {
        let filtered = filter(
            r#"{ productByUpc(upc: "1") { upc ... on Review { body } ... on Product { price } } }"#,
        );
        assert_eq!(
            filtered.document.to_string(),
            reprint(r#"{ productByUpc(upc: "1") { upc ... on Product { price } } }"#)
        );
    }
}
