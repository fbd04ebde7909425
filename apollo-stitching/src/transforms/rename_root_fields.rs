use std::collections::HashMap;
use std::fmt;

use apollo_compiler::Name;
use apollo_compiler::Schema;
use apollo_compiler::ast;
use parking_lot::RwLock;

use super::DelegationContext;
use super::Transform;
use crate::error::DelegationError;
use crate::error::StitchingError;
use crate::schema;
use crate::schema::OperationKind;
use crate::schema::mapper::FieldKind;
use crate::schema::mapper::Mapped;
use crate::schema::mapper::SchemaMapper;
use crate::schema::mapper::map_schema;
use crate::subschema::SubschemaRequest;

type Renamer = Box<dyn Fn(OperationKind, &str) -> String + Send + Sync>;

/// Renames the root fields of a subschema.
///
/// Requests call the field by its original name, aliased to the new one.
pub struct RenameRootFields {
    renamer: Renamer,
    /// New name to original name, per operation kind.
    reverse: RwLock<HashMap<(OperationKind, Name), Name>>,
}

impl RenameRootFields {
    pub fn new(renamer: impl Fn(OperationKind, &str) -> String + Send + Sync + 'static) -> Self {
        Self {
            renamer: Box::new(renamer),
            reverse: Default::default(),
        }
    }

    fn renames(
        &self,
        schema: &Schema,
    ) -> Result<HashMap<(OperationKind, Name), Name>, StitchingError> {
        let mut renames = HashMap::new();
        for kind in OperationKind::ALL {
            let Some(root) = schema::root_type_name(schema, kind) else {
                continue;
            };
            let Some(object) = schema.get_object(root) else {
                continue;
            };
            for field_name in object.fields.keys() {
                let new_name = (self.renamer)(kind, field_name);
                if new_name == field_name.as_str() {
                    continue;
                }
                let new_name = Name::new(&new_name)
                    .map_err(|_| StitchingError::InvalidName(new_name.clone()))?;
                renames.insert((kind, field_name.clone()), new_name);
            }
        }
        Ok(renames)
    }
}

impl fmt::Debug for RenameRootFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenameRootFields")
            .field("reverse", &*self.reverse.read())
            .finish()
    }
}

impl Transform for RenameRootFields {
    fn transform_schema(&self, schema: Schema) -> Result<Schema, StitchingError> {
        let renames = self.renames(&schema)?;
        let mapped = {
            let mapper = SchemaMapper::new().on_field(FieldKind::RootField, |context, field| {
                let Some(kind) = context.root else {
                    return Mapped::Unchanged;
                };
                match renames.get(&(kind, field.name.clone())) {
                    Some(new_name) => {
                        let mut field = field.clone();
                        field.make_mut().name = new_name.clone();
                        Mapped::Replaced(field)
                    }
                    None => Mapped::Unchanged,
                }
            });
            map_schema(&schema, &mapper)?
        };
        let mut reverse = self.reverse.write();
        for ((kind, original), new_name) in renames {
            reverse.insert((kind, new_name), original);
        }
        Ok(mapped)
    }

    fn transform_request(
        &self,
        mut request: SubschemaRequest,
        _context: &DelegationContext,
    ) -> Result<SubschemaRequest, DelegationError> {
        let kind = request.operation_kind;
        let reverse = self.reverse.read();
        if !reverse.is_empty()
            && let Some(operation) = request.operation_mut()
        {
            rename_back(&mut operation.selection_set, kind, &reverse);
        }
        Ok(request)
    }
}

fn rename_back(
    selections: &mut [ast::Selection],
    kind: OperationKind,
    reverse: &HashMap<(OperationKind, Name), Name>,
) {
    for selection in selections {
        match selection {
            ast::Selection::Field(field) => {
                let Some(original) = reverse.get(&(kind, field.name.clone())) else {
                    continue;
                };
                let field = field.make_mut();
                if field.alias.is_none() {
                    field.alias = Some(field.name.clone());
                }
                field.name = original.clone();
            }
            ast::Selection::InlineFragment(inline) => {
                rename_back(&mut inline.make_mut().selection_set, kind, reverse);
            }
            ast::Selection::FragmentSpread(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::transforms::tests::delegation_context;
    use crate::transforms::tests::reprint;
    use crate::transforms::tests::request;

    fn transform() -> RenameRootFields {
        RenameRootFields::new(|kind, name| match kind {
            OperationKind::Query => format!("properties_{name}"),
            _ => name.to_string(),
        })
    }

    fn schema() -> Schema {
        Schema::parse_and_validate(
            r#"
            type Query { property(id: ID!): Property }
            type Mutation { bookProperty(id: ID!): Property }
            type Property { id: ID! }
            "#,
            "properties.graphql",
        )
        .unwrap()
        .into_inner()
    }

    #[test]
    fn root_fields_are_renamed_per_operation_kind() {
        let renamed = transform().transform_schema(schema()).unwrap();
        let query = renamed.get_object("Query").unwrap();
        assert_eq!(
            query.fields.keys().map(Name::as_str).collect::<Vec<_>>(),
            ["properties_property"]
        );
        let mutation = renamed.get_object("Mutation").unwrap();
        assert!(mutation.fields.contains_key("bookProperty"));
    }

    #[test]
    fn requests_call_the_original_field() {
        let transform = transform();
        transform.transform_schema(schema()).unwrap();
        let request = transform
            .transform_request(
                request(r#"{ properties_property(id: "1") { id } }"#),
                &delegation_context(None),
            )
            .unwrap();
        assert_eq!(
            request.document.to_string(),
            reprint(r#"{ properties_property: property(id: "1") { id } }"#)
        );
    }
}
