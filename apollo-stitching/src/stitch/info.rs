//! Metadata computed at stitching time and consulted on every request.

use std::fmt;
use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Schema;
use apollo_compiler::ast;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::validation::Valid;
use indexmap::IndexMap;
use indexmap::IndexSet;

use crate::error::StitchingError;
use crate::error::diagnostics_to_string;
use crate::schema;
use crate::schema::OperationKind;
use crate::subschema::MergedTypeResolver;
use crate::subschema::Subschema;
use crate::subschema::SubschemaId;

/// A subschema as registered in a stitched schema.
pub struct SubschemaEntry {
    pub(crate) id: SubschemaId,
    pub(crate) subschema: Subschema,
    /// The subschema after its schema transforms, in stitched-schema naming.
    pub(crate) transformed: Valid<Schema>,
    /// Abstract types of the stitched schema which are not abstract in the transformed
    /// subschema, with their possible types the subschema knows.
    pub(crate) possible_types: IndexMap<Name, IndexSet<Name>>,
    /// The inverse of `possible_types`.
    pub(crate) reverse_possible_types: IndexMap<Name, IndexSet<Name>>,
}

impl SubschemaEntry {
    pub fn id(&self) -> SubschemaId {
        self.id
    }

    pub fn subschema(&self) -> &Subschema {
        &self.subschema
    }

    pub fn transformed_schema(&self) -> &Valid<Schema> {
        &self.transformed
    }
}

impl fmt::Debug for SubschemaEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubschemaEntry")
            .field("id", &self.id)
            .field("name", &self.subschema.name())
            .field("possible_types", &self.possible_types)
            .finish_non_exhaustive()
    }
}

/// How one type declared by several subschemas is assembled at runtime.
pub struct MergedTypeInfo {
    pub type_name: Name,
    /// Every subschema declaring the type.
    pub subschemas: IndexSet<SubschemaId>,
    /// Subschemas able to resolve an object of the type from a partial one.
    pub target_subschemas: IndexSet<SubschemaId>,
    /// Fields only one target provides.
    pub unique_fields: IndexMap<Name, SubschemaId>,
    /// Fields several targets provide.
    pub non_unique_fields: IndexMap<Name, IndexSet<SubschemaId>>,
    /// Whether objects from the first subschema carry the fields the second one requires.
    pub contains_selection_set: IndexMap<SubschemaId, IndexMap<SubschemaId, bool>>,
    /// `__typename` and the fields every target requires, requested whenever the type is.
    pub selection_set: Vec<ast::Selection>,
    pub(crate) selection_sets: IndexMap<SubschemaId, Vec<ast::Selection>>,
    pub(crate) resolvers: IndexMap<SubschemaId, Arc<dyn MergedTypeResolver>>,
}

impl MergedTypeInfo {
    /// Targets other than `source`.
    pub fn targets_for(&self, source: SubschemaId) -> IndexSet<SubschemaId> {
        self.target_subschemas
            .iter()
            .copied()
            .filter(|target| *target != source)
            .collect()
    }

    /// Whether objects obtained from `sources` carry what `target` requires.
    pub fn is_proxiable(&self, target: SubschemaId, sources: &IndexSet<SubschemaId>) -> bool {
        if !self.selection_sets.contains_key(&target) {
            return true;
        }
        sources.iter().any(|source| {
            self.contains_selection_set
                .get(source)
                .and_then(|targets| targets.get(&target))
                .copied()
                .unwrap_or_default()
        })
    }
}

impl fmt::Debug for MergedTypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergedTypeInfo")
            .field("type_name", &self.type_name)
            .field("subschemas", &self.subschemas)
            .field("target_subschemas", &self.target_subschemas)
            .field("unique_fields", &self.unique_fields)
            .field("non_unique_fields", &self.non_unique_fields)
            .field("contains_selection_set", &self.contains_selection_set)
            .finish_non_exhaustive()
    }
}

/// Everything the stitched schema knows about its subschemas.
#[derive(Debug)]
pub struct StitchingInfo {
    pub(crate) subschemas: Vec<SubschemaEntry>,
    pub merged_types: IndexMap<Name, MergedTypeInfo>,
    /// Fields of the parent object each configured resolver reads.
    pub(crate) selection_sets_by_field: IndexMap<Name, IndexMap<Name, Vec<ast::Selection>>>,
    pub(crate) root_field_owners: IndexMap<OperationKind, IndexMap<Name, SubschemaId>>,
}

impl StitchingInfo {
    /// # Panics
    ///
    /// If `id` was not issued by this stitched schema.
    pub fn subschema(&self, id: SubschemaId) -> &SubschemaEntry {
        &self.subschemas[id.index()]
    }

    pub fn subschemas(&self) -> impl Iterator<Item = &SubschemaEntry> {
        self.subschemas.iter()
    }

    /// The subschema a root field is proxied to.
    pub fn root_field_owner(&self, kind: OperationKind, field_name: &str) -> Option<SubschemaId> {
        self.root_field_owners.get(&kind)?.get(field_name).copied()
    }

    pub(crate) fn field_selection_set(
        &self,
        type_name: &str,
        field_name: &str,
    ) -> Option<&[ast::Selection]> {
        self.selection_sets_by_field
            .get(type_name)?
            .get(field_name)
            .map(Vec::as_slice)
    }

    pub(crate) fn type_selection_set(&self, type_name: &str) -> Option<&[ast::Selection]> {
        self.merged_types
            .get(type_name)
            .map(|merged| merged.selection_set.as_slice())
    }
}

/// Parses a selection set such as `"{ upc }"`; the braces may be omitted.
pub(crate) fn parse_selection_set(source: &str) -> Result<Vec<ast::Selection>, StitchingError> {
    let trimmed = source.trim();
    let query = if trimmed.starts_with('{') {
        trimmed.to_string()
    } else {
        format!("{{ {trimmed} }}")
    };
    let invalid = |reason: String| StitchingError::InvalidSelectionSet {
        selection_set: source.to_string(),
        reason,
    };
    let document = ast::Document::parse(query, "selection_set.graphql")
        .map_err(|invalid_document| invalid(diagnostics_to_string(&invalid_document.errors)))?;
    let mut operations = document
        .definitions
        .iter()
        .filter_map(|definition| match definition {
            ast::Definition::OperationDefinition(operation) => Some(operation),
            _ => None,
        });
    match (operations.next(), operations.next()) {
        (Some(operation), None) if document.definitions.len() == 1 => {
            Ok(operation.selection_set.clone())
        }
        _ => Err(invalid("expected a single selection set".to_string())),
    }
}

/// Whether `schema` can provide every field of `selections` on `type_name`.
pub(crate) fn contains_selection_set(
    schema: &Schema,
    type_name: &str,
    selections: &[ast::Selection],
) -> bool {
    selections.iter().all(|selection| match selection {
        ast::Selection::Field(field) => {
            if field.name.as_str() == "__typename" {
                return true;
            }
            match schema::field_definition(schema, type_name, &field.name) {
                None => false,
                Some(definition) => {
                    field.selection_set.is_empty()
                        || contains_selection_set(
                            schema,
                            definition.ty.inner_named_type(),
                            &field.selection_set,
                        )
                }
            }
        }
        ast::Selection::InlineFragment(inline) => {
            let condition = inline
                .type_condition
                .as_ref()
                .map_or(type_name, |condition| condition.as_str());
            contains_selection_set(schema, condition, &inline.selection_set)
        }
        ast::Selection::FragmentSpread(_) => true,
    })
}

/// Appends the selections of `extra` missing from `selections`.
pub(crate) fn add_selections(selections: &mut Vec<ast::Selection>, extra: &[ast::Selection]) {
    for selection in extra {
        if !selections.contains(selection) {
            selections.push(selection.clone());
        }
    }
}

/// Computes merged-type metadata for `type_name`, declared by `declaring` subschemas.
pub(crate) fn build_merged_type(
    type_name: &Name,
    declaring: &IndexSet<SubschemaId>,
    subschemas: &[SubschemaEntry],
) -> Result<MergedTypeInfo, StitchingError> {
    let mut merged = MergedTypeInfo {
        type_name: type_name.clone(),
        subschemas: declaring.clone(),
        target_subschemas: IndexSet::new(),
        unique_fields: IndexMap::new(),
        non_unique_fields: IndexMap::new(),
        contains_selection_set: IndexMap::new(),
        selection_set: vec![crate::transforms::typename_selection()],
        selection_sets: IndexMap::new(),
        resolvers: IndexMap::new(),
    };

    let mut providers: IndexMap<Name, IndexSet<SubschemaId>> = IndexMap::new();
    for id in declaring {
        let entry = &subschemas[id.index()];
        let Some(config) = entry.subschema.merged_type(type_name) else {
            continue;
        };
        let field_name = config
            .field_name
            .as_deref()
            .map(|field_name| {
                Name::new(field_name).map_err(|_| StitchingError::InvalidName(field_name.to_string()))
            })
            .transpose()?;
        let Some(resolver) = config.resolver(field_name) else {
            continue;
        };
        let selection_set = config
            .selection_set
            .as_deref()
            .map(parse_selection_set)
            .transpose()?;

        merged.target_subschemas.insert(*id);
        merged.resolvers.insert(*id, resolver);
        let key_fields = selection_set
            .iter()
            .flatten()
            .filter_map(|selection| match selection {
                ast::Selection::Field(field) if field.selection_set.is_empty() => {
                    Some(field.name.clone())
                }
                _ => None,
            })
            .collect::<IndexSet<_>>();
        if let Some(ExtendedType::Object(object)) = entry.transformed.types.get(type_name) {
            for (field_name, field) in &object.fields {
                let is_leaf = !schema::is_composite(&entry.transformed, field.ty.inner_named_type());
                if is_leaf && key_fields.contains(field_name) {
                    continue;
                }
                providers.entry(field_name.clone()).or_default().insert(*id);
            }
        }
        if let Some(selection_set) = selection_set {
            add_selections(&mut merged.selection_set, &selection_set);
            merged.selection_sets.insert(*id, selection_set);
        }
    }

    for (field_name, ids) in providers {
        match ids.first() {
            Some(id) if ids.len() == 1 => {
                merged.unique_fields.insert(field_name, *id);
            }
            _ => {
                merged.non_unique_fields.insert(field_name, ids);
            }
        }
    }

    for source in declaring {
        let provided = &subschemas[source.index()].transformed;
        let contains = merged
            .selection_sets
            .iter()
            .map(|(target, selection_set)| {
                (
                    *target,
                    contains_selection_set(provided, type_name, selection_set),
                )
            })
            .collect();
        merged.contains_selection_set.insert(*source, contains);
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use apollo_compiler::name;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn selection_sets_parse_with_or_without_braces() {
        let braced = parse_selection_set("{ upc dimensions { weight } }").unwrap();
        let bare = parse_selection_set("upc dimensions { weight }").unwrap();
        assert_eq!(braced, bare);
        assert_eq!(braced.len(), 2);
    }

    #[test]
    fn invalid_selection_sets_are_reported() {
        let error = parse_selection_set("{ upc").unwrap_err();
        assert!(matches!(
            error,
            StitchingError::InvalidSelectionSet { ref selection_set, .. } if selection_set == "{ upc"
        ));
    }

    #[test]
    fn contains_selection_set_checks_nested_fields() {
        let schema = Schema::parse(
            r#"
            type Query { a: Int }
            type Product { upc: String dimensions: Dimensions }
            type Dimensions { weight: Float }
            "#,
            "inventory.graphql",
        )
        .unwrap();
        let product = name!("Product");
        let present = parse_selection_set("{ __typename upc dimensions { weight } }").unwrap();
        let missing = parse_selection_set("{ upc dimensions { height } }").unwrap();
        assert!(contains_selection_set(&schema, &product, &present));
        assert!(!contains_selection_set(&schema, &product, &missing));
    }

    #[test]
    fn add_selections_skips_duplicates() {
        let mut selections = parse_selection_set("{ __typename upc }").unwrap();
        add_selections(
            &mut selections,
            &parse_selection_set("{ upc name }").unwrap(),
        );
        assert_eq!(
            selections,
            parse_selection_set("{ __typename upc name }").unwrap()
        );
    }
}
