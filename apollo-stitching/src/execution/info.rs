use std::fmt;
use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use apollo_compiler::ast;
use indexmap::IndexMap;
use indexmap::IndexSet;

use super::StitchedSchema;
use super::values::should_include;
use crate::context::Context;
use crate::context::OperationId;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::schema;
use crate::schema::OperationKind;

pub(crate) type Fragments = IndexMap<Name, Node<ast::FragmentDefinition>>;

/// Field nodes grouped by response key.
pub(crate) type GroupedFields = IndexMap<Name, Vec<Node<ast::Field>>>;

/// What a resolver knows about the field it is resolving.
#[derive(Clone)]
pub struct ResolveInfo {
    /// The name of the field in the stitched schema.
    pub field_name: Name,
    /// The alias of the field, or its name.
    pub response_key: Name,
    /// Every node requesting this field at this path.
    pub field_nodes: Vec<Node<ast::Field>>,
    /// The declared type of the field in the stitched schema.
    pub return_type: ast::Type,
    /// The object type the field is resolved on.
    pub parent_type: Name,
    /// The response path of the field.
    pub path: Path,
    pub operation: Node<ast::OperationDefinition>,
    pub fragments: Arc<Fragments>,
    /// Coerced variable values of the operation.
    pub variable_values: Arc<Object>,
    pub context: Context,
    pub(crate) operation_id: OperationId,
    pub(crate) schema: StitchedSchema,
}

impl ResolveInfo {
    pub fn schema(&self) -> &StitchedSchema {
        &self.schema
    }

    pub fn operation_kind(&self) -> OperationKind {
        self.operation.operation_type.into()
    }
}

impl fmt::Debug for ResolveInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveInfo")
            .field("field_name", &self.field_name)
            .field("response_key", &self.response_key)
            .field("return_type", &self.return_type)
            .field("parent_type", &self.parent_type)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Groups the fields of `selections` that apply to `object_type`, by response key.
///
/// Follows fragment spreads and inline fragments whose type condition `object_type` satisfies,
/// and drops selections excluded by `@skip` or `@include`.
pub(crate) fn collect_fields(
    schema: &Schema,
    fragments: &Fragments,
    variables: &Object,
    object_type: &Name,
    selections: &[ast::Selection],
) -> GroupedFields {
    let mut grouped = GroupedFields::new();
    let mut visited = IndexSet::new();
    collect_fields_into(
        schema,
        fragments,
        variables,
        object_type,
        selections,
        &mut grouped,
        &mut visited,
    );
    grouped
}

fn collect_fields_into(
    schema: &Schema,
    fragments: &Fragments,
    variables: &Object,
    object_type: &Name,
    selections: &[ast::Selection],
    grouped: &mut GroupedFields,
    visited: &mut IndexSet<Name>,
) {
    for selection in selections {
        match selection {
            ast::Selection::Field(field) => {
                if !should_include(&field.directives, variables) {
                    continue;
                }
                let key = field.alias.as_ref().unwrap_or(&field.name);
                grouped.entry(key.clone()).or_default().push(field.clone());
            }
            ast::Selection::InlineFragment(inline) => {
                if !should_include(&inline.directives, variables) {
                    continue;
                }
                let applies = inline
                    .type_condition
                    .as_ref()
                    .is_none_or(|condition| schema::is_possible_type(schema, object_type, condition));
                if applies {
                    collect_fields_into(
                        schema,
                        fragments,
                        variables,
                        object_type,
                        &inline.selection_set,
                        grouped,
                        visited,
                    );
                }
            }
            ast::Selection::FragmentSpread(spread) => {
                if !should_include(&spread.directives, variables)
                    || !visited.insert(spread.fragment_name.clone())
                {
                    continue;
                }
                let Some(fragment) = fragments.get(&spread.fragment_name) else {
                    continue;
                };
                if schema::is_possible_type(schema, object_type, &fragment.type_condition) {
                    collect_fields_into(
                        schema,
                        fragments,
                        variables,
                        object_type,
                        &fragment.selection_set,
                        grouped,
                        visited,
                    );
                }
            }
        }
    }
}

/// The subfields requested by every node of the field being resolved, for `type_name`.
pub(crate) fn collect_subfields(info: &ResolveInfo, type_name: &Name) -> GroupedFields {
    let schema = info.schema().schema();
    let mut grouped = GroupedFields::new();
    for node in &info.field_nodes {
        let fields = collect_fields(
            schema,
            &info.fragments,
            &info.variable_values,
            type_name,
            &node.selection_set,
        );
        for (key, nodes) in fields {
            grouped.entry(key).or_default().extend(nodes);
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use apollo_compiler::name;
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;

    const SDL: &str = r#"
        type Query { search: [Result] }
        interface Node { id: ID! }
        type Product implements Node { id: ID! upc: String! name: String }
        type User implements Node { id: ID! username: String }
        union Result = Product | User
    "#;

    fn document(source: &str) -> (Vec<ast::Selection>, Fragments) {
        let document = ast::Document::parse(source, "query.graphql").unwrap();
        let mut selections = Vec::new();
        let mut fragments = Fragments::new();
        for definition in &document.definitions {
            match definition {
                ast::Definition::OperationDefinition(operation) => {
                    let ast::Selection::Field(search) = &operation.selection_set[0] else {
                        panic!("expected a field");
                    };
                    selections = search.selection_set.clone();
                }
                ast::Definition::FragmentDefinition(fragment) => {
                    fragments.insert(fragment.name.clone(), fragment.clone());
                }
                _ => {}
            }
        }
        (selections, fragments)
    }

    fn keys(grouped: &GroupedFields) -> Vec<&str> {
        grouped.keys().map(Name::as_str).collect()
    }

    #[test]
    fn fragments_apply_by_runtime_type() {
        let schema = Schema::parse(SDL, "schema.graphql").unwrap();
        let (selections, fragments) = document(
            r#"
            query($withName: Boolean!) {
              search {
                __typename
                ... on Node { id }
                ... on Product { upc name @include(if: $withName) }
                ...UserFields
              }
            }
            fragment UserFields on User { username id }
            "#,
        );
        let mut variables = Object::new();
        variables.insert("withName", json!(false));

        let product = collect_fields(&schema, &fragments, &variables, &name!("Product"), &selections);
        assert_eq!(keys(&product), ["__typename", "id", "upc"]);

        let user = collect_fields(&schema, &fragments, &variables, &name!("User"), &selections);
        assert_eq!(keys(&user), ["__typename", "id", "username"]);
        assert_eq!(user["id"].len(), 2);
    }

    #[test]
    fn aliases_are_response_keys() {
        let schema = Schema::parse(SDL, "schema.graphql").unwrap();
        let (selections, fragments) = document("{ search { ... on Product { code: upc upc } } }");
        let product =
            collect_fields(&schema, &fragments, &Object::new(), &name!("Product"), &selections);
        assert_eq!(keys(&product), ["code", "upc"]);
        assert_eq!(product["code"][0].name, name!("upc"));
    }
}
