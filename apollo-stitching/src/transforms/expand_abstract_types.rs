use std::collections::HashSet;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::ast;
use indexmap::IndexMap;

use super::DelegationContext;
use super::Transform;
use super::typename_selection;
use super::visit::Scope;
use super::visit::TypedWalk;
use crate::error::DelegationError;
use crate::schema;
use crate::subschema::SubschemaRequest;

/// Rewrites fragments on abstract types the subschema only knows as objects.
///
/// A fragment on such a type is duplicated for each of its possible types the subschema knows.
/// Selections on those object types also request `__typename`, so the stitched schema can tell
/// the concrete type back.
pub(crate) struct ExpandAbstractTypes;

impl Transform for ExpandAbstractTypes {
    fn transform_request(
        &self,
        mut request: SubschemaRequest,
        context: &DelegationContext,
    ) -> Result<SubschemaRequest, DelegationError> {
        let entry = context.entry();
        if entry.possible_types.is_empty() {
            return Ok(request);
        }
        let target = entry.transformed_schema();

        let existing = request
            .document
            .definitions
            .iter()
            .filter_map(|definition| match definition {
                ast::Definition::FragmentDefinition(fragment) => Some(fragment.name.clone()),
                _ => None,
            })
            .collect::<HashSet<_>>();
        let mut counter = 0;
        let mut replacements: IndexMap<Name, Vec<(Name, Name)>> = IndexMap::new();
        let mut generated = Vec::new();
        for definition in &request.document.definitions {
            let ast::Definition::FragmentDefinition(fragment) = definition else {
                continue;
            };
            let Some(possible_types) = entry.possible_types.get(&fragment.type_condition) else {
                continue;
            };
            for possible_type in possible_types {
                let name = loop {
                    let candidate = format!("_{possible_type}_Fragment{counter}");
                    counter += 1;
                    if !existing.contains(candidate.as_str()) {
                        break Name::new(&candidate)
                            .map_err(|error| DelegationError::InvalidRequest(error.to_string()))?;
                    }
                };
                generated.push(ast::Definition::FragmentDefinition(Node::new(
                    ast::FragmentDefinition {
                        name: name.clone(),
                        type_condition: possible_type.clone(),
                        directives: fragment.directives.clone(),
                        selection_set: fragment.selection_set.clone(),
                    },
                )));
                replacements
                    .entry(fragment.name.clone())
                    .or_default()
                    .push((name, possible_type.clone()));
            }
        }
        request.document.definitions.extend(generated);

        let applies = |parent: &Name, possible_type: &Name| {
            target.types.contains_key(possible_type)
                && schema::is_possible_type(target, parent, possible_type)
        };
        TypedWalk::new(target).rewrite_document(
            &mut request.document,
            &mut |_: &TypedWalk<'_>, scope: Scope<'_>, mut selections: Vec<ast::Selection>| {
                let Some(parent) = scope.parent else {
                    return selections;
                };
                let mut added = Vec::new();
                for selection in &selections {
                    match selection {
                        ast::Selection::InlineFragment(inline) => {
                            let Some(possible_types) = inline
                                .type_condition
                                .as_ref()
                                .and_then(|condition| entry.possible_types.get(condition))
                            else {
                                continue;
                            };
                            for possible_type in possible_types {
                                if applies(parent, possible_type) {
                                    added.push(ast::Selection::InlineFragment(Node::new(
                                        ast::InlineFragment {
                                            type_condition: Some(possible_type.clone()),
                                            directives: inline.directives.clone(),
                                            selection_set: inline.selection_set.clone(),
                                        },
                                    )));
                                }
                            }
                        }
                        ast::Selection::FragmentSpread(spread) => {
                            let Some(replacements) = replacements.get(&spread.fragment_name) else {
                                continue;
                            };
                            for (name, possible_type) in replacements {
                                if applies(parent, possible_type) {
                                    added.push(ast::Selection::FragmentSpread(Node::new(
                                        ast::FragmentSpread {
                                            fragment_name: name.clone(),
                                            directives: spread.directives.clone(),
                                        },
                                    )));
                                }
                            }
                        }
                        ast::Selection::Field(_) => {}
                    }
                }
                if entry.reverse_possible_types.contains_key(parent) {
                    added.push(typename_selection());
                }
                selections.extend(added);
                selections
            },
        );
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use apollo_compiler::name;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::stitch::StitchingConfig;
    use crate::stitch::stitch_schemas;
    use crate::subschema::SubschemaId;
    use crate::transforms::FilterToSchema;
    use crate::transforms::tests::products;
    use crate::transforms::tests::reprint;
    use crate::transforms::tests::request;
    use crate::transforms::tests::subschema;

    fn products_context() -> DelegationContext {
        let schema = stitch_schemas(
            StitchingConfig::new()
                .with_subschema(subschema(
                    "search",
                    r#"
                    type Query { search: [Result] }
                    union Result = Product | User
                    type Product { upc: String! }
                    type User { id: ID! }
                    "#,
                ))
                .with_subschema(products()),
        )
        .unwrap();
        DelegationContext {
            schema,
            subschema: SubschemaId(1),
            field_name: name!("topProducts"),
            return_type: ast::Type::Named(name!("Product")).list(),
            args: None,
        }
    }

    #[test]
    fn fragments_on_unknown_abstract_types_are_duplicated_per_object() {
        let context = products_context();
        let request = ExpandAbstractTypes
            .transform_request(
                request("{ topProducts { ... on Result { ... on Product { upc } } } }"),
                &context,
            )
            .unwrap();
        assert_eq!(
            request.document.to_string(),
            reprint(
                "{ topProducts { \
                   ... on Result { ... on Product { upc __typename } } \
                   ... on Product { ... on Product { upc __typename } } \
                   __typename \
                 } }"
            )
        );

        let request = FilterToSchema.transform_request(request, &context).unwrap();
        assert_eq!(
            request.document.to_string(),
            reprint(
                "{ topProducts { \
                   ... on Product { ... on Product { upc __typename } } \
                   __typename \
                 } }"
            )
        );
    }

    #[test]
    fn subschemas_knowing_every_abstract_type_are_untouched() {
        let mut context = products_context();
        context.subschema = SubschemaId(0);
        context.field_name = name!("search");
        let query = "{ search { ... on Product { upc } } }";
        let request = ExpandAbstractTypes
            .transform_request(request(query), &context)
            .unwrap();
        assert_eq!(request.document.to_string(), reprint(query));
    }
}
