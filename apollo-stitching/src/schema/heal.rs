//! Healing re-links every type reference of a type map after types were renamed or removed.
//!
//! Healing is two passes: the first collects the canonical `name -> type` binding of every
//! surviving type, the second rewires every reference (fields, arguments, interfaces, union
//! members, input fields, directive arguments) to its canonical name and drops the references
//! whose name no longer exists. Pruning then removes types left empty and heals again, until
//! nothing changes.

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use apollo_compiler::ast::DirectiveDefinition;
use apollo_compiler::ast::InputValueDefinition;
use apollo_compiler::collections::IndexMap;
use apollo_compiler::collections::IndexSet;
use apollo_compiler::schema::Component;
use apollo_compiler::schema::ComponentName;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::FieldDefinition;

use super::is_introspection_name;
use super::map_named_type;
use crate::error::StitchingError;

pub type TypeMap = IndexMap<Name, ExtendedType>;
pub type DirectiveMap = IndexMap<Name, Node<DirectiveDefinition>>;
/// Old type name to new type name.
pub type Renames = IndexMap<Name, Name>;

/// Heals `types` and `directives`, returning the healed maps.
///
/// `renames` maps names still referenced by fields and members to the names their types now
/// carry. With `skip_pruning` unset, empty types are pruned to a fixpoint.
pub fn heal_types(
    types: TypeMap,
    directives: DirectiveMap,
    renames: &Renames,
    skip_pruning: bool,
) -> Result<(TypeMap, DirectiveMap), StitchingError> {
    let types = collect_canonical(types)?;
    let (mut types, mut directives) = rewire(types, directives, renames);
    if !skip_pruning {
        loop {
            let prunable = prunable_types(&types);
            if prunable.is_empty() {
                break;
            }
            tracing::trace!(types = ?prunable, "pruning empty types");
            let remaining = types
                .into_iter()
                .filter(|(name, _)| !prunable.contains(name))
                .collect();
            (types, directives) = rewire(remaining, directives, &Renames::default());
        }
    }
    Ok((types, directives))
}

/// Heals the whole schema, including its root operation types.
pub fn heal_schema(
    mut schema: Schema,
    renames: &Renames,
    skip_pruning: bool,
) -> Result<Schema, StitchingError> {
    let (types, directives) = heal_types(
        std::mem::take(&mut schema.types),
        std::mem::take(&mut schema.directive_definitions),
        renames,
        skip_pruning,
    )?;
    schema.types = types;
    schema.directive_definitions = directives;
    let definition = schema.schema_definition.make_mut();
    for root in [
        &mut definition.query,
        &mut definition.mutation,
        &mut definition.subscription,
    ] {
        *root = root.take().and_then(|component| {
            let name = renames.get(&component.name).unwrap_or(&component.name);
            let exists = matches!(schema.types.get(name), Some(ExtendedType::Object(_)));
            exists.then(|| ComponentName {
                origin: component.origin.clone(),
                name: name.clone(),
            })
        });
    }
    Ok(schema)
}

fn collect_canonical(types: TypeMap) -> Result<TypeMap, StitchingError> {
    let mut canonical = TypeMap::with_capacity_and_hasher(types.len(), Default::default());
    for ty in types.into_values() {
        let name = ty.name().clone();
        if canonical.insert(name.clone(), ty).is_some() {
            return Err(StitchingError::DuplicateTypeName(name));
        }
    }
    Ok(canonical)
}

fn rewire(types: TypeMap, directives: DirectiveMap, renames: &Renames) -> (TypeMap, DirectiveMap) {
    let known: IndexSet<Name> = types.keys().cloned().collect();
    let resolve = |name: &Name| -> Option<Name> {
        let name = renames.get(name).unwrap_or(name);
        known.contains(name).then(|| name.clone())
    };
    let types = types
        .into_iter()
        .map(|(name, ty)| {
            if ty.is_built_in() || is_introspection_name(&name) {
                (name, ty)
            } else {
                (name, rewire_type(ty, &resolve))
            }
        })
        .collect();
    let directives = directives
        .into_iter()
        .map(|(name, mut directive)| {
            let arguments = rewire_arguments(&directive.arguments, &resolve);
            if arguments != directive.arguments {
                directive.make_mut().arguments = arguments;
            }
            (name, directive)
        })
        .collect();
    (types, directives)
}

fn rewire_type(ty: ExtendedType, resolve: &impl Fn(&Name) -> Option<Name>) -> ExtendedType {
    match ty {
        ExtendedType::Object(mut object) => {
            let object_mut = object.make_mut();
            object_mut.implements_interfaces =
                rewire_members(&object_mut.implements_interfaces, resolve);
            object_mut.fields = rewire_fields(std::mem::take(&mut object_mut.fields), resolve);
            ExtendedType::Object(object)
        }
        ExtendedType::Interface(mut interface) => {
            let interface_mut = interface.make_mut();
            interface_mut.implements_interfaces =
                rewire_members(&interface_mut.implements_interfaces, resolve);
            interface_mut.fields =
                rewire_fields(std::mem::take(&mut interface_mut.fields), resolve);
            ExtendedType::Interface(interface)
        }
        ExtendedType::Union(mut union_) => {
            let union_mut = union_.make_mut();
            union_mut.members = rewire_members(&union_mut.members, resolve);
            ExtendedType::Union(union_)
        }
        ExtendedType::InputObject(mut input) => {
            let input_mut = input.make_mut();
            input_mut.fields = std::mem::take(&mut input_mut.fields)
                .into_iter()
                .filter_map(|(name, mut field)| {
                    let ty = map_named_type(&field.ty, resolve)?;
                    if *field.ty != ty {
                        field.make_mut().ty = Node::new(ty);
                    }
                    Some((name, field))
                })
                .collect();
            ExtendedType::InputObject(input)
        }
        ty @ (ExtendedType::Scalar(_) | ExtendedType::Enum(_)) => ty,
    }
}

fn rewire_members(
    members: &IndexSet<ComponentName>,
    resolve: &impl Fn(&Name) -> Option<Name>,
) -> IndexSet<ComponentName> {
    members
        .iter()
        .filter_map(|member| {
            Some(ComponentName {
                origin: member.origin.clone(),
                name: resolve(&member.name)?,
            })
        })
        .collect()
}

fn rewire_fields(
    fields: IndexMap<Name, Component<FieldDefinition>>,
    resolve: &impl Fn(&Name) -> Option<Name>,
) -> IndexMap<Name, Component<FieldDefinition>> {
    fields
        .into_iter()
        .filter_map(|(name, mut field)| {
            let ty = map_named_type(&field.ty, resolve)?;
            let arguments = rewire_arguments(&field.arguments, resolve);
            if field.ty != ty || field.arguments != arguments {
                let field_mut = field.make_mut();
                field_mut.ty = ty;
                field_mut.arguments = arguments;
            }
            Some((name, field))
        })
        .collect()
}

fn rewire_arguments(
    arguments: &[Node<InputValueDefinition>],
    resolve: &impl Fn(&Name) -> Option<Name>,
) -> Vec<Node<InputValueDefinition>> {
    arguments
        .iter()
        .filter_map(|argument| {
            let ty = map_named_type(&argument.ty, resolve)?;
            let mut argument = argument.clone();
            if *argument.ty != ty {
                argument.make_mut().ty = Node::new(ty);
            }
            Some(argument)
        })
        .collect()
}

fn prunable_types(types: &TypeMap) -> IndexSet<Name> {
    types
        .iter()
        .filter(|(name, ty)| !ty.is_built_in() && !is_introspection_name(name))
        .filter(|(name, ty)| match ty {
            ExtendedType::Object(object) => object.fields.is_empty(),
            ExtendedType::InputObject(input) => input.fields.is_empty(),
            ExtendedType::Union(union_) => union_.members.is_empty(),
            ExtendedType::Interface(interface) => {
                interface.fields.is_empty() || !has_implementers(types, name)
            }
            ExtendedType::Scalar(_) | ExtendedType::Enum(_) => false,
        })
        .map(|(name, _)| name.clone())
        .collect()
}

fn has_implementers(types: &TypeMap, interface: &Name) -> bool {
    types.values().any(|ty| match ty {
        ExtendedType::Object(object) => object.implements_interfaces.contains(interface),
        ExtendedType::Interface(other) => other.implements_interfaces.contains(interface),
        ExtendedType::Scalar(_)
        | ExtendedType::Union(_)
        | ExtendedType::Enum(_)
        | ExtendedType::InputObject(_) => false,
    })
}
