use apollo_compiler::Schema;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::FieldDefinition;

use super::Transform;
use crate::error::StitchingError;
use crate::schema::OperationKind;
use crate::schema::mapper::FieldKind;
use crate::schema::mapper::Mapped;
use crate::schema::mapper::SchemaMapper;
use crate::schema::mapper::TypeKind;
use crate::schema::mapper::map_schema;
use crate::schema::mapper::prune_schema;

/// Hides the types of a subschema for which the filter returns `false`.
///
/// Root types are always kept. Fields and members referring to hidden types go with them; types
/// left empty are pruned.
pub struct FilterTypes {
    filter: Box<dyn Fn(&ExtendedType) -> bool + Send + Sync>,
}

impl FilterTypes {
    pub fn new(filter: impl Fn(&ExtendedType) -> bool + Send + Sync + 'static) -> Self {
        Self {
            filter: Box::new(filter),
        }
    }
}

impl Transform for FilterTypes {
    fn transform_schema(&self, schema: Schema) -> Result<Schema, StitchingError> {
        let mapper = SchemaMapper::new()
            .on_type(TypeKind::Type, |ty| {
                if (self.filter)(ty) {
                    Mapped::Unchanged
                } else {
                    Mapped::Removed
                }
            })
            .on_type(TypeKind::RootObject, |_| Mapped::Unchanged);
        prune_schema(map_schema(&schema, &mapper)?)
    }
}

/// Hides the root fields of a subschema for which the filter returns `false`.
///
/// Types only reachable through hidden fields stay in the schema unless they end up empty.
pub struct FilterRootFields {
    filter: Box<dyn Fn(OperationKind, &str, &FieldDefinition) -> bool + Send + Sync>,
}

impl FilterRootFields {
    pub fn new(
        filter: impl Fn(OperationKind, &str, &FieldDefinition) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            filter: Box::new(filter),
        }
    }
}

impl Transform for FilterRootFields {
    fn transform_schema(&self, schema: Schema) -> Result<Schema, StitchingError> {
        let mapper = SchemaMapper::new().on_field(FieldKind::RootField, |context, field| {
            match context.root {
                Some(kind) if !(self.filter)(kind, &field.name, field) => Mapped::Removed,
                _ => Mapped::Unchanged,
            }
        });
        prune_schema(map_schema(&schema, &mapper)?)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn schema() -> Schema {
        Schema::parse_and_validate(
            r#"
            type Query { property(id: ID!): Property internal: Audit }
            type Mutation { purge: Boolean }
            type Property { id: ID! audit: Audit }
            type Audit { log: [String] }
            "#,
            "properties.graphql",
        )
        .unwrap()
        .into_inner()
    }

    #[test]
    fn hidden_types_take_their_references_along() {
        let filtered = FilterTypes::new(|ty| ty.name().as_str() != "Audit")
            .transform_schema(schema())
            .unwrap();
        assert!(!filtered.types.contains_key("Audit"));
        let query = filtered.get_object("Query").unwrap();
        assert!(!query.fields.contains_key("internal"));
        let property = filtered.get_object("Property").unwrap();
        assert!(!property.fields.contains_key("audit"));
        assert!(filtered.validate().is_ok());
    }

    #[test]
    fn root_fields_are_filtered_by_operation_kind() {
        let filtered = FilterRootFields::new(|kind, name, _| {
            kind == OperationKind::Query && name != "internal"
        })
        .transform_schema(schema())
        .unwrap();
        let query = filtered.get_object("Query").unwrap();
        assert_eq!(
            query.fields.keys().map(|name| name.as_str()).collect::<Vec<_>>(),
            ["property"]
        );
        assert!(filtered.get_object("Mutation").is_none());
        assert!(filtered.schema_definition.mutation.is_none());
        assert!(filtered.validate().is_ok());
    }
}
