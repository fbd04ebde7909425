//! Type-map rewriting and healing, plus small lookups over `apollo_compiler` schemas.

use std::fmt::Display;

use apollo_compiler::Name;
use apollo_compiler::Schema;
use apollo_compiler::ast;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::FieldDefinition;
use indexmap::IndexSet;
use serde::Deserialize;
use serde::Serialize;

pub mod heal;
pub mod mapper;

/// GraphQL operation type.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    #[default]
    Query,
    Mutation,
    Subscription,
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.default_type_name())
    }
}

impl OperationKind {
    pub const ALL: [OperationKind; 3] = [
        OperationKind::Query,
        OperationKind::Mutation,
        OperationKind::Subscription,
    ];

    pub const fn default_type_name(&self) -> &'static str {
        match self {
            OperationKind::Query => "Query",
            OperationKind::Mutation => "Mutation",
            OperationKind::Subscription => "Subscription",
        }
    }
}

impl From<OperationKind> for ast::OperationType {
    fn from(value: OperationKind) -> Self {
        match value {
            OperationKind::Query => ast::OperationType::Query,
            OperationKind::Mutation => ast::OperationType::Mutation,
            OperationKind::Subscription => ast::OperationType::Subscription,
        }
    }
}

impl From<ast::OperationType> for OperationKind {
    fn from(value: ast::OperationType) -> Self {
        match value {
            ast::OperationType::Query => OperationKind::Query,
            ast::OperationType::Mutation => OperationKind::Mutation,
            ast::OperationType::Subscription => OperationKind::Subscription,
        }
    }
}

/// The root type name of `kind` in `schema`, if the schema has that root.
pub(crate) fn root_type_name(schema: &Schema, kind: OperationKind) -> Option<&Name> {
    let definition = &schema.schema_definition;
    match kind {
        OperationKind::Query => definition.query.as_ref(),
        OperationKind::Mutation => definition.mutation.as_ref(),
        OperationKind::Subscription => definition.subscription.as_ref(),
    }
    .map(|component| &component.name)
}

/// Which root operation `type_name` is in `schema`, if any.
pub(crate) fn root_kind(schema: &Schema, type_name: &str) -> Option<OperationKind> {
    OperationKind::ALL
        .into_iter()
        .find(|kind| root_type_name(schema, *kind).is_some_and(|name| name.as_str() == type_name))
}

/// The definition of `type_name.field_name`, for object and interface types.
pub(crate) fn field_definition<'schema>(
    schema: &'schema Schema,
    type_name: &str,
    field_name: &str,
) -> Option<&'schema FieldDefinition> {
    match schema.types.get(type_name)? {
        ExtendedType::Object(object) => object.fields.get(field_name).map(|f| &*f.node),
        ExtendedType::Interface(interface) => interface.fields.get(field_name).map(|f| &*f.node),
        ExtendedType::Scalar(_)
        | ExtendedType::Union(_)
        | ExtendedType::Enum(_)
        | ExtendedType::InputObject(_) => None,
    }
}

pub(crate) fn is_abstract(schema: &Schema, type_name: &str) -> bool {
    matches!(
        schema.types.get(type_name),
        Some(ExtendedType::Interface(_) | ExtendedType::Union(_))
    )
}

pub(crate) fn is_composite(schema: &Schema, type_name: &str) -> bool {
    matches!(
        schema.types.get(type_name),
        Some(ExtendedType::Object(_) | ExtendedType::Interface(_) | ExtendedType::Union(_))
    )
}

/// Object types a value of `type_name` may have at runtime, in type-map order.
pub(crate) fn possible_types(schema: &Schema, type_name: &str) -> IndexSet<Name> {
    match schema.types.get(type_name) {
        Some(ExtendedType::Object(object)) => IndexSet::from([object.name.clone()]),
        Some(ExtendedType::Union(union_)) => union_
            .members
            .iter()
            .filter(|member| {
                matches!(
                    schema.types.get(&member.name),
                    Some(ExtendedType::Object(_))
                )
            })
            .map(|member| member.name.clone())
            .collect(),
        Some(ExtendedType::Interface(_)) => schema
            .types
            .values()
            .filter_map(|ty| match ty {
                ExtendedType::Object(object)
                    if object
                        .implements_interfaces
                        .iter()
                        .any(|interface| interface.name.as_str() == type_name) =>
                {
                    Some(object.name.clone())
                }
                _ => None,
            })
            .collect(),
        Some(ExtendedType::Scalar(_) | ExtendedType::Enum(_) | ExtendedType::InputObject(_))
        | None => IndexSet::new(),
    }
}

/// Whether a fragment on `condition` may apply inside a selection on `parent`.
pub(crate) fn is_possible_type(schema: &Schema, parent: &str, condition: &str) -> bool {
    if parent == condition {
        return true;
    }
    let parent_types = possible_types(schema, parent);
    possible_types(schema, condition)
        .iter()
        .any(|ty| parent_types.contains(ty))
}

pub(crate) fn kind_name(ty: &ExtendedType) -> &'static str {
    match ty {
        ExtendedType::Scalar(_) => "scalar",
        ExtendedType::Object(_) => "object",
        ExtendedType::Interface(_) => "interface",
        ExtendedType::Union(_) => "union",
        ExtendedType::Enum(_) => "enum",
        ExtendedType::InputObject(_) => "input object",
    }
}

pub(crate) fn is_introspection_name(name: &str) -> bool {
    name.starts_with("__")
}

/// `ty` under another name. References to it are left for healing.
pub(crate) fn renamed_type(ty: &ExtendedType, name: Name) -> ExtendedType {
    match ty.clone() {
        ExtendedType::Scalar(mut scalar) => {
            scalar.make_mut().name = name;
            ExtendedType::Scalar(scalar)
        }
        ExtendedType::Object(mut object) => {
            object.make_mut().name = name;
            ExtendedType::Object(object)
        }
        ExtendedType::Interface(mut interface) => {
            interface.make_mut().name = name;
            ExtendedType::Interface(interface)
        }
        ExtendedType::Union(mut union_) => {
            union_.make_mut().name = name;
            ExtendedType::Union(union_)
        }
        ExtendedType::Enum(mut enum_) => {
            enum_.make_mut().name = name;
            ExtendedType::Enum(enum_)
        }
        ExtendedType::InputObject(mut input) => {
            input.make_mut().name = name;
            ExtendedType::InputObject(input)
        }
    }
}

/// Rebuilds `ty` with its innermost named type renamed, or `None` if `rename` drops it.
pub(crate) fn map_named_type(
    ty: &ast::Type,
    rename: &impl Fn(&Name) -> Option<Name>,
) -> Option<ast::Type> {
    Some(match ty {
        ast::Type::Named(name) => ast::Type::Named(rename(name)?),
        ast::Type::NonNullNamed(name) => ast::Type::NonNullNamed(rename(name)?),
        ast::Type::List(inner) => ast::Type::List(Box::new(map_named_type(inner, rename)?)),
        ast::Type::NonNullList(inner) => {
            ast::Type::NonNullList(Box::new(map_named_type(inner, rename)?))
        }
    })
}
