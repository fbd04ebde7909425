//! Type candidates: every definition of a type name found across subschemas and extra type
//! definitions, and how they combine into one definition.

use apollo_compiler::Name;
use apollo_compiler::schema::ExtendedType;
use itertools::Itertools;

use crate::error::StitchingError;
use crate::schema::kind_name;
use crate::subschema::SubschemaId;

/// One definition of a type, and where it comes from.
#[derive(Debug, Clone)]
pub struct TypeCandidate {
    pub ty: ExtendedType,
    /// The subschema defining the type, or `None` for extra type definitions.
    pub subschema: Option<SubschemaId>,
}

/// Picks one candidate of a type that is not merged.
pub type TypeConflictFn = dyn Fn(&TypeCandidate, &TypeCandidate) -> TypeCandidate + Send + Sync;

/// Combines candidates field by field.
///
/// Fields, enum values, union members and implemented interfaces are unioned; on a clash the
/// later candidate wins. The first description found is kept.
pub(crate) fn merge_candidates(
    name: &Name,
    candidates: &[TypeCandidate],
) -> Result<ExtendedType, StitchingError> {
    let Some((first, rest)) = candidates.split_first() else {
        return Err(StitchingError::InvalidSchema(format!(
            "no definition of type \"{name}\""
        )));
    };
    let mismatched = rest
        .iter()
        .any(|candidate| kind_name(&candidate.ty) != kind_name(&first.ty));
    if mismatched {
        return Err(StitchingError::ConflictingTypeKinds {
            type_name: name.clone(),
            kinds: candidates
                .iter()
                .map(|candidate| kind_name(&candidate.ty))
                .join(", "),
        });
    }

    let mut merged = first.ty.clone();
    for candidate in rest {
        match (&mut merged, &candidate.ty) {
            (ExtendedType::Object(merged), ExtendedType::Object(other)) => {
                let merged = merged.make_mut();
                if merged.description.is_none() {
                    merged.description = other.description.clone();
                }
                merged
                    .implements_interfaces
                    .extend(other.implements_interfaces.iter().cloned());
                for (field_name, field) in &other.fields {
                    merged.fields.insert(field_name.clone(), field.clone());
                }
            }
            (ExtendedType::Interface(merged), ExtendedType::Interface(other)) => {
                let merged = merged.make_mut();
                if merged.description.is_none() {
                    merged.description = other.description.clone();
                }
                merged
                    .implements_interfaces
                    .extend(other.implements_interfaces.iter().cloned());
                for (field_name, field) in &other.fields {
                    merged.fields.insert(field_name.clone(), field.clone());
                }
            }
            (ExtendedType::Union(merged), ExtendedType::Union(other)) => {
                let merged = merged.make_mut();
                if merged.description.is_none() {
                    merged.description = other.description.clone();
                }
                merged.members.extend(other.members.iter().cloned());
            }
            (ExtendedType::Enum(merged), ExtendedType::Enum(other)) => {
                let merged = merged.make_mut();
                if merged.description.is_none() {
                    merged.description = other.description.clone();
                }
                for (value, definition) in &other.values {
                    merged.values.insert(value.clone(), definition.clone());
                }
            }
            (ExtendedType::InputObject(merged), ExtendedType::InputObject(other)) => {
                let merged = merged.make_mut();
                if merged.description.is_none() {
                    merged.description = other.description.clone();
                }
                for (field_name, field) in &other.fields {
                    merged.fields.insert(field_name.clone(), field.clone());
                }
            }
            (ExtendedType::Scalar(merged), ExtendedType::Scalar(other)) => {
                if merged.description.is_none() {
                    merged.make_mut().description = other.description.clone();
                }
            }
            _ => {}
        }
    }
    Ok(merged)
}

/// Picks one candidate, by default the last one.
pub(crate) fn choose_candidate(
    candidates: &[TypeCandidate],
    on_conflict: Option<&TypeConflictFn>,
) -> Option<TypeCandidate> {
    match on_conflict {
        Some(on_conflict) => candidates
            .iter()
            .cloned()
            .reduce(|left, right| on_conflict(&left, &right)),
        None => candidates.last().cloned(),
    }
}
