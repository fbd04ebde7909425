//! Generic schema rewriting.
//!
//! A [`SchemaMapper`] is a table of functions keyed by the kind of schema element they apply to.
//! [`map_schema`] calls the most specific function registered for each element, then heals the
//! result so every reference follows renamed types and removed ones disappear.

use std::collections::HashMap;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use apollo_compiler::ast::DirectiveDefinition;
use apollo_compiler::ast::InputValueDefinition;
use apollo_compiler::collections::IndexMap;
use apollo_compiler::schema::Component;
use apollo_compiler::schema::EnumValueDefinition;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::FieldDefinition;

use super::OperationKind;
use super::heal::DirectiveMap;
use super::heal::Renames;
use super::heal::TypeMap;
use super::heal::heal_schema;
use super::is_introspection_name;
use super::root_kind;
use crate::error::StitchingError;

/// What a mapping function did with the element it was given.
#[derive(Debug, Clone, PartialEq)]
pub enum Mapped<T> {
    /// Keep the element as it is.
    Unchanged,
    /// Drop the element.
    Removed,
    /// Use this element instead. It may carry a new name.
    Replaced(T),
}

/// Kinds of named types a type function may be registered for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Every named type, unless a more specific function is registered.
    Type,
    Scalar,
    Object,
    /// Query, mutation and subscription types.
    RootObject,
    Interface,
    Union,
    Enum,
    InputObject,
}

/// Kinds of output fields a field function may be registered for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Every output field, unless a more specific function is registered.
    Field,
    ObjectField,
    /// Fields of the query, mutation and subscription types.
    RootField,
    InterfaceField,
}

/// Where a mapped output field lives.
#[derive(Debug, Clone, Copy)]
pub struct FieldContext<'a> {
    pub type_name: &'a Name,
    pub root: Option<OperationKind>,
}

pub type TypeFn<'a> = Box<dyn Fn(&ExtendedType) -> Mapped<ExtendedType> + 'a>;
pub type FieldFn<'a> = Box<
    dyn Fn(&FieldContext<'_>, &Component<FieldDefinition>) -> Mapped<Component<FieldDefinition>>
        + 'a,
>;
pub type ArgumentFn<'a> =
    Box<dyn Fn(&Name, &Name, &Node<InputValueDefinition>) -> Mapped<Node<InputValueDefinition>> + 'a>;
pub type InputFieldFn<'a> = Box<
    dyn Fn(&Name, &Component<InputValueDefinition>) -> Mapped<Component<InputValueDefinition>>
        + 'a,
>;
pub type EnumValueFn<'a> = Box<
    dyn Fn(&Name, &Component<EnumValueDefinition>) -> Mapped<Component<EnumValueDefinition>> + 'a,
>;
pub type DirectiveFn<'a> =
    Box<dyn Fn(&Node<DirectiveDefinition>) -> Mapped<Node<DirectiveDefinition>> + 'a>;

/// A table of mapping functions, keyed by the kind of element they rewrite.
#[derive(Default)]
pub struct SchemaMapper<'a> {
    types: HashMap<TypeKind, TypeFn<'a>>,
    fields: HashMap<FieldKind, FieldFn<'a>>,
    argument: Option<ArgumentFn<'a>>,
    input_field: Option<InputFieldFn<'a>>,
    enum_value: Option<EnumValueFn<'a>>,
    directive: Option<DirectiveFn<'a>>,
}

impl<'a> SchemaMapper<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_type(
        mut self,
        kind: TypeKind,
        f: impl Fn(&ExtendedType) -> Mapped<ExtendedType> + 'a,
    ) -> Self {
        self.types.insert(kind, Box::new(f));
        self
    }

    pub fn on_field(
        mut self,
        kind: FieldKind,
        f: impl Fn(&FieldContext<'_>, &Component<FieldDefinition>) -> Mapped<Component<FieldDefinition>>
        + 'a,
    ) -> Self {
        self.fields.insert(kind, Box::new(f));
        self
    }

    /// Registers a function for field arguments.
    ///
    /// It receives the type name and the field name as declared, before any field function
    /// renamed the field.
    pub fn on_argument(
        mut self,
        f: impl Fn(&Name, &Name, &Node<InputValueDefinition>) -> Mapped<Node<InputValueDefinition>>
        + 'a,
    ) -> Self {
        self.argument = Some(Box::new(f));
        self
    }

    pub fn on_input_field(
        mut self,
        f: impl Fn(&Name, &Component<InputValueDefinition>) -> Mapped<Component<InputValueDefinition>>
        + 'a,
    ) -> Self {
        self.input_field = Some(Box::new(f));
        self
    }

    pub fn on_enum_value(
        mut self,
        f: impl Fn(&Name, &Component<EnumValueDefinition>) -> Mapped<Component<EnumValueDefinition>>
        + 'a,
    ) -> Self {
        self.enum_value = Some(Box::new(f));
        self
    }

    pub fn on_directive(
        mut self,
        f: impl Fn(&Node<DirectiveDefinition>) -> Mapped<Node<DirectiveDefinition>> + 'a,
    ) -> Self {
        self.directive = Some(Box::new(f));
        self
    }

    fn type_fn(&self, ty: &ExtendedType, is_root: bool) -> Option<&TypeFn<'a>> {
        let specifiers: &[TypeKind] = match ty {
            ExtendedType::Object(_) if is_root => {
                &[TypeKind::RootObject, TypeKind::Object, TypeKind::Type]
            }
            ExtendedType::Object(_) => &[TypeKind::Object, TypeKind::Type],
            ExtendedType::Scalar(_) => &[TypeKind::Scalar, TypeKind::Type],
            ExtendedType::Interface(_) => &[TypeKind::Interface, TypeKind::Type],
            ExtendedType::Union(_) => &[TypeKind::Union, TypeKind::Type],
            ExtendedType::Enum(_) => &[TypeKind::Enum, TypeKind::Type],
            ExtendedType::InputObject(_) => &[TypeKind::InputObject, TypeKind::Type],
        };
        specifiers.iter().find_map(|kind| self.types.get(kind))
    }

    fn field_fn(&self, specifiers: &[FieldKind]) -> Option<&FieldFn<'a>> {
        specifiers.iter().find_map(|kind| self.fields.get(kind))
    }
}

/// Rewrites `schema` with `mapper`, then heals it.
///
/// Renamed types are followed by every reference; references to removed types are dropped.
/// Types left empty are kept: see [`prune_schema`].
pub fn map_schema(schema: &Schema, mapper: &SchemaMapper<'_>) -> Result<Schema, StitchingError> {
    let mut renames = Renames::default();
    let mut types = TypeMap::with_capacity_and_hasher(schema.types.len(), Default::default());
    for (name, ty) in &schema.types {
        if ty.is_built_in() || is_introspection_name(name) {
            types.insert(name.clone(), ty.clone());
            continue;
        }
        let root = root_kind(schema, name);
        let mapped = match mapper.type_fn(ty, root.is_some()) {
            Some(f) => f(ty),
            None => Mapped::Unchanged,
        };
        let ty = match mapped {
            Mapped::Unchanged => ty.clone(),
            Mapped::Removed => continue,
            Mapped::Replaced(ty) => ty,
        };
        if ty.name() != name {
            renames.insert(name.clone(), ty.name().clone());
        }
        // Keyed by the original name: healing detects two types claiming one name.
        types.insert(name.clone(), map_members(ty, root, mapper));
    }

    let directives: DirectiveMap = schema
        .directive_definitions
        .iter()
        .filter_map(|(name, directive)| {
            let mapped = match &mapper.directive {
                Some(f) => f(directive),
                None => Mapped::Unchanged,
            };
            match mapped {
                Mapped::Unchanged => Some((name.clone(), directive.clone())),
                Mapped::Removed => None,
                Mapped::Replaced(directive) => Some((directive.name.clone(), directive)),
            }
        })
        .collect();

    let mut mapped = schema.clone();
    mapped.types = types;
    mapped.directive_definitions = directives;
    heal_schema(mapped, &renames, true)
}

/// Removes empty types to a fixpoint, healing after each round.
pub fn prune_schema(schema: Schema) -> Result<Schema, StitchingError> {
    heal_schema(schema, &Renames::default(), false)
}

fn map_members(
    ty: ExtendedType,
    root: Option<OperationKind>,
    mapper: &SchemaMapper<'_>,
) -> ExtendedType {
    match ty {
        ExtendedType::Object(mut object) => {
            let specifiers: &[FieldKind] = if root.is_some() {
                &[FieldKind::RootField, FieldKind::ObjectField, FieldKind::Field]
            } else {
                &[FieldKind::ObjectField, FieldKind::Field]
            };
            let object_mut = object.make_mut();
            let context = FieldContext {
                type_name: &object_mut.name,
                root,
            };
            let fields = map_fields(&object_mut.fields, &context, specifiers, mapper);
            object_mut.fields = fields;
            ExtendedType::Object(object)
        }
        ExtendedType::Interface(mut interface) => {
            let interface_mut = interface.make_mut();
            let context = FieldContext {
                type_name: &interface_mut.name,
                root: None,
            };
            let fields = map_fields(
                &interface_mut.fields,
                &context,
                &[FieldKind::InterfaceField, FieldKind::Field],
                mapper,
            );
            interface_mut.fields = fields;
            ExtendedType::Interface(interface)
        }
        ExtendedType::InputObject(mut input) => {
            if let Some(f) = &mapper.input_field {
                let input_mut = input.make_mut();
                let fields = map_entries(
                    &input_mut.fields,
                    |field| f(&input_mut.name, field),
                    |field| field.name.clone(),
                );
                input_mut.fields = fields;
            }
            ExtendedType::InputObject(input)
        }
        ExtendedType::Enum(mut enum_) => {
            if let Some(f) = &mapper.enum_value {
                let enum_mut = enum_.make_mut();
                let values = map_entries(
                    &enum_mut.values,
                    |value| f(&enum_mut.name, value),
                    |value| value.value.clone(),
                );
                enum_mut.values = values;
            }
            ExtendedType::Enum(enum_)
        }
        ty @ (ExtendedType::Scalar(_) | ExtendedType::Union(_)) => ty,
    }
}

fn map_fields(
    fields: &IndexMap<Name, Component<FieldDefinition>>,
    context: &FieldContext<'_>,
    specifiers: &[FieldKind],
    mapper: &SchemaMapper<'_>,
) -> IndexMap<Name, Component<FieldDefinition>> {
    let field_fn = mapper.field_fn(specifiers);
    map_entries(
        fields,
        |field| {
            let mapped = match field_fn {
                Some(f) => f(context, field),
                None => Mapped::Unchanged,
            };
            let Some(f) = &mapper.argument else {
                return mapped;
            };
            // Arguments are mapped under the field name the subschema declares.
            let declared_name = &field.name;
            let mut field = match mapped {
                Mapped::Removed => return Mapped::Removed,
                Mapped::Unchanged => field.clone(),
                Mapped::Replaced(field) => field,
            };
            let arguments = field
                .arguments
                .iter()
                .filter_map(|argument| match f(context.type_name, declared_name, argument) {
                    Mapped::Unchanged => Some(argument.clone()),
                    Mapped::Removed => None,
                    Mapped::Replaced(argument) => Some(argument),
                })
                .collect();
            field.make_mut().arguments = arguments;
            Mapped::Replaced(field)
        },
        |field| field.name.clone(),
    )
}

/// Applies `f` to each entry of `entries`; replaced entries are re-keyed with `key`.
fn map_entries<T: Clone>(
    entries: &IndexMap<Name, T>,
    f: impl Fn(&T) -> Mapped<T>,
    key: impl Fn(&T) -> Name,
) -> IndexMap<Name, T> {
    entries
        .iter()
        .filter_map(|(name, entry)| match f(entry) {
            Mapped::Unchanged => Some((name.clone(), entry.clone())),
            Mapped::Removed => None,
            Mapped::Replaced(entry) => Some((key(&entry), entry)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use apollo_compiler::name;
    use pretty_assertions::assert_eq;

    use super::*;

    const SDL: &str = r#"
        directive @cacheControl(maxAge: Int) on FIELD_DEFINITION
        type Query { property(id: ID!): Property search(term: String, limit: Int): [Result] }
        type Mutation { bookProperty(id: ID!): Property }
        type Property { id: ID! name: String location: Location }
        type Location { name: String }
        enum Status { OPEN CLOSED }
        union Result = Property | Location
    "#;

    fn schema() -> Schema {
        Schema::parse_and_validate(SDL, "properties.graphql")
            .unwrap()
            .into_inner()
    }

    fn rename(prefix: &str, ty: &ExtendedType) -> Mapped<ExtendedType> {
        let new_name = Name::new(&format!("{prefix}{}", ty.name())).unwrap();
        match ty.clone() {
            ExtendedType::Object(mut object) => {
                object.make_mut().name = new_name;
                Mapped::Replaced(ExtendedType::Object(object))
            }
            ExtendedType::Union(mut union_) => {
                union_.make_mut().name = new_name;
                Mapped::Replaced(ExtendedType::Union(union_))
            }
            _ => Mapped::Unchanged,
        }
    }

    #[test]
    fn renaming_types_heals_every_reference() {
        let mapper = SchemaMapper::new()
            .on_type(TypeKind::Type, |ty| rename("Properties_", ty))
            .on_type(TypeKind::RootObject, |_| Mapped::Unchanged);
        let mapped = map_schema(&schema(), &mapper).unwrap();

        for (name, ty) in &mapped.types {
            assert_eq!(name, ty.name());
        }
        assert!(mapped.types.contains_key("Properties_Property"));
        assert!(mapped.types.contains_key("Properties_Result"));
        assert!(!mapped.types.contains_key("Property"));
        let query = mapped.get_object("Query").unwrap();
        assert_eq!(query.fields["search"].ty.to_string(), "[Properties_Result]");
        let property = mapped.get_object("Properties_Property").unwrap();
        assert_eq!(
            property.fields["location"].ty.to_string(),
            "Properties_Location"
        );
        assert!(mapped.validate().is_ok());
    }

    #[test]
    fn root_fields_and_arguments() {
        let mapper = SchemaMapper::new()
            .on_field(FieldKind::RootField, |context, field| {
                if context.root == Some(OperationKind::Mutation) {
                    return Mapped::Removed;
                }
                let mut field = field.clone();
                field.make_mut().name = Name::new(&format!("properties_{}", field.name)).unwrap();
                Mapped::Replaced(field)
            })
            .on_argument(|_, field_name, argument| {
                if field_name.as_str() == "search" && argument.name.as_str() == "limit" {
                    Mapped::Removed
                } else {
                    Mapped::Unchanged
                }
            });
        let mapped = prune_schema(map_schema(&schema(), &mapper).unwrap()).unwrap();

        let query = mapped.get_object("Query").unwrap();
        assert_eq!(
            query.fields.keys().map(Name::as_str).collect::<Vec<_>>(),
            ["properties_property", "properties_search"]
        );
        assert_eq!(
            query.fields["properties_search"]
                .arguments
                .iter()
                .map(|argument| argument.name.as_str())
                .collect::<Vec<_>>(),
            ["term"]
        );
        assert!(mapped.schema_definition.mutation.is_none());
        assert!(!mapped.types.contains_key("Mutation"));
    }

    #[test]
    fn removing_a_type_drops_references() {
        let mapper = SchemaMapper::new().on_type(TypeKind::Object, |ty| {
            if ty.name().as_str() == "Location" {
                Mapped::Removed
            } else {
                Mapped::Unchanged
            }
        });
        let mapped = map_schema(&schema(), &mapper).unwrap();
        let property = mapped.get_object("Property").unwrap();
        assert_eq!(
            property.fields.keys().map(Name::as_str).collect::<Vec<_>>(),
            ["id", "name"]
        );
        let ExtendedType::Union(result) = &mapped.types["Result"] else {
            panic!("expected a union");
        };
        assert_eq!(result.members.len(), 1);
    }

    #[test]
    fn enum_values_and_directives() {
        let mapper = SchemaMapper::new()
            .on_enum_value(|_, value| {
                if value.value.as_str() == "CLOSED" {
                    Mapped::Removed
                } else {
                    Mapped::Unchanged
                }
            })
            .on_directive(|directive| {
                if directive.name.as_str() == "cacheControl" {
                    Mapped::Removed
                } else {
                    Mapped::Unchanged
                }
            });
        let mapped = map_schema(&schema(), &mapper).unwrap();
        let ExtendedType::Enum(status) = &mapped.types["Status"] else {
            panic!("expected an enum");
        };
        assert_eq!(
            status.values.keys().map(Name::as_str).collect::<Vec<_>>(),
            ["OPEN"]
        );
        assert!(schema().directive_definitions.contains_key("cacheControl"));
        assert!(!mapped.directive_definitions.contains_key("cacheControl"));
        assert!(mapped.directive_definitions.contains_key("deprecated"));
    }

    #[test]
    fn colliding_renames_fail() {
        let mapper = SchemaMapper::new().on_type(TypeKind::Object, |ty| {
            if ty.name().as_str() == "Location" {
                let ExtendedType::Object(mut object) = ty.clone() else {
                    return Mapped::Unchanged;
                };
                object.make_mut().name = name!("Property");
                Mapped::Replaced(ExtendedType::Object(object))
            } else {
                Mapped::Unchanged
            }
        });
        assert_eq!(
            map_schema(&schema(), &mapper).unwrap_err(),
            StitchingError::DuplicateTypeName(name!("Property"))
        );
    }
}
