use std::collections::HashMap;
use std::fmt;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use apollo_compiler::ast;
use apollo_compiler::schema::ExtendedType;
use parking_lot::RwLock;

use super::DelegationContext;
use super::Transform;
use super::visit::for_each_selection_set;
use crate::error::DelegationError;
use crate::error::StitchingError;
use crate::graphql;
use crate::json_ext::Value;
use crate::schema;
use crate::schema::mapper::Mapped;
use crate::schema::mapper::SchemaMapper;
use crate::schema::mapper::TypeKind;
use crate::schema::mapper::map_schema;
use crate::subschema::SubschemaRequest;

type Renamer = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Renames the types of a subschema.
///
/// Root types and built-in scalars keep their names; custom scalars are renamed only with
/// [`RenameTypes::with_rename_scalars`]. Requests name types back the way the subschema knows
/// them, and `__typename` values in results are renamed forward.
pub struct RenameTypes {
    renamer: Renamer,
    rename_scalars: bool,
    /// Subschema name to stitched name.
    renamed: RwLock<HashMap<Name, Name>>,
    /// Stitched name to subschema name.
    reverse: RwLock<HashMap<Name, Name>>,
}

impl RenameTypes {
    /// `renamer` returns the new name of a type, or `None` to keep it.
    pub fn new(renamer: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            renamer: Box::new(renamer),
            rename_scalars: false,
            renamed: Default::default(),
            reverse: Default::default(),
        }
    }

    /// Prefixes every type name.
    pub fn prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self::new(move |name| Some(format!("{prefix}{name}")))
    }

    pub fn with_rename_scalars(mut self, rename_scalars: bool) -> Self {
        self.rename_scalars = rename_scalars;
        self
    }

    fn renames(&self, schema: &Schema) -> Result<HashMap<Name, Name>, StitchingError> {
        let mut renames = HashMap::new();
        for (name, ty) in &schema.types {
            if ty.is_built_in()
                || schema::is_introspection_name(name)
                || schema::root_kind(schema, name).is_some()
                || (matches!(ty, ExtendedType::Scalar(_)) && !self.rename_scalars)
            {
                continue;
            }
            let Some(new_name) = (self.renamer)(name) else {
                continue;
            };
            if new_name == name.as_str() {
                continue;
            }
            let new_name =
                Name::new(&new_name).map_err(|_| StitchingError::InvalidName(new_name.clone()))?;
            renames.insert(name.clone(), new_name);
        }
        Ok(renames)
    }

    fn original(&self, name: &Name) -> Name {
        self.reverse.read().get(name).unwrap_or(name).clone()
    }
}

impl fmt::Debug for RenameTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenameTypes")
            .field("rename_scalars", &self.rename_scalars)
            .field("renamed", &*self.renamed.read())
            .finish()
    }
}

impl Transform for RenameTypes {
    fn transform_schema(&self, schema: Schema) -> Result<Schema, StitchingError> {
        let renames = self.renames(&schema)?;
        let mapped = {
            let mapper = SchemaMapper::new()
                .on_type(TypeKind::Type, |ty| match renames.get(ty.name()) {
                    Some(new_name) => {
                        Mapped::Replaced(schema::renamed_type(ty, new_name.clone()))
                    }
                    None => Mapped::Unchanged,
                })
                .on_type(TypeKind::RootObject, |_| Mapped::Unchanged);
            map_schema(&schema, &mapper)?
        };

        let mut reverse = self.reverse.write();
        for (old_name, new_name) in &renames {
            reverse.insert(new_name.clone(), old_name.clone());
        }
        self.renamed.write().extend(renames);
        Ok(mapped)
    }

    fn transform_request(
        &self,
        mut request: SubschemaRequest,
        _context: &DelegationContext,
    ) -> Result<SubschemaRequest, DelegationError> {
        if self.reverse.read().is_empty() {
            return Ok(request);
        }
        for definition in &mut request.document.definitions {
            match definition {
                ast::Definition::OperationDefinition(operation) => {
                    let operation = operation.make_mut();
                    for variable in &mut operation.variables {
                        let ty = schema::map_named_type(&variable.ty, &|name: &Name| {
                            Some(self.original(name))
                        });
                        if let Some(ty) = ty
                            && ty != *variable.ty
                        {
                            variable.make_mut().ty = Node::new(ty);
                        }
                    }
                }
                ast::Definition::FragmentDefinition(fragment) => {
                    let original = self.original(&fragment.type_condition);
                    if original != fragment.type_condition {
                        fragment.make_mut().type_condition = original;
                    }
                }
                _ => {}
            }
        }
        for_each_selection_set(&mut request.document, &mut |selections: &mut Vec<ast::Selection>| {
            for selection in selections.iter_mut() {
                let ast::Selection::InlineFragment(inline) = selection else {
                    continue;
                };
                let Some(condition) = &inline.type_condition else {
                    continue;
                };
                let original = self.original(condition);
                if original != *condition {
                    inline.make_mut().type_condition = Some(original);
                }
            }
        });
        Ok(request)
    }

    fn transform_result(
        &self,
        mut response: graphql::Response,
        _context: &DelegationContext,
    ) -> graphql::Response {
        let renamed = self.renamed.read();
        if renamed.is_empty() {
            return response;
        }
        if let Some(data) = &mut response.data {
            rename_typenames(data, &renamed);
        }
        response
    }
}

fn rename_typenames(value: &mut Value, renamed: &HashMap<Name, Name>) {
    match value {
        Value::Object(object) => {
            for (key, value) in object.iter_mut() {
                if key.as_str() == "__typename" {
                    if let Some(new_name) = value.as_str().and_then(|name| renamed.get(name)) {
                        *value = Value::String(new_name.as_str().into());
                    }
                } else {
                    rename_typenames(value, renamed);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                rename_typenames(item, renamed);
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

    fn schema() -> Schema {
        Schema::parse_and_validate(
            r#"
            scalar Cursor
            type Query { node(id: ID!): Node nodes(after: Cursor, filter: Filter): [Node] }
            interface Node { id: ID! }
            type Property implements Node { id: ID! name: String }
            input Filter { name: String }
            "#,
            "properties.graphql",
        )
        .unwrap()
        .into_inner()
    }

    #[test]
    fn types_are_renamed_except_roots_and_scalars() {
        let transform = RenameTypes::prefix("Properties_");
        let renamed = transform.transform_schema(schema()).unwrap();
        let names = renamed
            .types
            .iter()
            .filter(|(_, ty)| !ty.is_built_in())
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            [
                "Cursor",
                "Query",
                "Properties_Node",
                "Properties_Property",
                "Properties_Filter"
            ]
        );
        let query = renamed.get_object("Query").unwrap();
        assert_eq!(
            query.fields["nodes"].arguments[1].ty.to_string(),
            "Properties_Filter"
        );
        assert!(renamed.validate().is_ok());
    }

    #[test]
    fn scalars_are_renamed_on_request() {
        let transform = RenameTypes::prefix("P_").with_rename_scalars(true);
        let renamed = transform.transform_schema(schema()).unwrap();
        assert!(renamed.types.contains_key("P_Cursor"));
        assert!(renamed.types.contains_key("ID"));
    }

    #[test]
    fn requests_and_results_are_renamed_both_ways() {
        let transform = RenameTypes::prefix("Properties_");
        transform.transform_schema(schema()).unwrap();
        let context = delegation_context(None);

        let request = transform
            .transform_request(
                request(
                    r#"
                    query($filter: Properties_Filter) {
                      nodes(filter: $filter) { ... on Properties_Property { name } ...Ids }
                    }
                    fragment Ids on Properties_Node { id }
                    "#,
                ),
                &context,
            )
            .unwrap();
        assert_eq!(
            request.document.to_string(),
            reprint(
                r#"
                query($filter: Filter) { nodes(filter: $filter) { ... on Property { name } ...Ids } }
                fragment Ids on Node { id }
                "#
            )
        );

        let response = transform.transform_result(
            graphql::Response::builder()
                .data(json!({"nodes": [{"__typename": "Property", "id": "1"}, null]}))
                .build(),
            &context,
        );
        assert_eq!(
            response.data,
            Some(json!({"nodes": [{"__typename": "Properties_Property", "id": "1"}, null]}))
        );
    }
}
