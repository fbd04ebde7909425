//! Assembly of a stitched schema from subschemas.
//!
//! Each subschema is transformed into stitched-schema naming. All definitions of a type name
//! become candidates; root types are always merged field by field, other types are merged when
//! selected and otherwise resolved to one candidate. The result is healed and validated, and
//! the metadata needed at request time is computed alongside.

mod candidates;
mod info;

use std::collections::HashSet;
use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Schema;
use apollo_compiler::schema::ComponentName;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::validation::Valid;
use indexmap::IndexMap;
use indexmap::IndexSet;

pub use self::candidates::TypeCandidate;
pub use self::candidates::TypeConflictFn;
pub(crate) use self::info::add_selections;
pub(crate) use self::info::parse_selection_set;
pub use self::info::MergedTypeInfo;
pub use self::info::StitchingInfo;
pub use self::info::SubschemaEntry;
use self::candidates::choose_candidate;
use self::candidates::merge_candidates;
use self::info::build_merged_type;
use crate::error::StitchingError;
use crate::error::diagnostics_to_string;
use crate::execution::FieldResolver;
use crate::execution::FieldResolverConfig;
use crate::execution::SchemaLevelResolver;
use crate::execution::StitchedSchema;
use crate::schema;
use crate::schema::OperationKind;
use crate::schema::heal::Renames;
use crate::schema::heal::heal_schema;
use crate::subschema::Subschema;
use crate::subschema::SubschemaId;

/// Which types declared by several subschemas are merged field by field.
///
/// Types with a merge configuration in some subschema are always merged, as are root types.
#[derive(Clone, Default)]
pub enum MergeTypes {
    #[default]
    None,
    All,
    Only(Vec<String>),
    Predicate(Arc<dyn Fn(&str, &[TypeCandidate]) -> bool + Send + Sync>),
}

impl MergeTypes {
    fn selects(&self, type_name: &str, candidates: &[TypeCandidate]) -> bool {
        match self {
            MergeTypes::None => false,
            MergeTypes::All => true,
            MergeTypes::Only(names) => names.iter().any(|name| name == type_name),
            MergeTypes::Predicate(predicate) => predicate(type_name, candidates),
        }
    }
}

/// Everything [`stitch_schemas`] assembles.
#[derive(Default)]
pub struct StitchingConfig {
    subschemas: Vec<Subschema>,
    type_defs: Vec<String>,
    resolvers: IndexMap<String, IndexMap<String, FieldResolverConfig>>,
    merge_types: MergeTypes,
    on_type_conflict: Option<Arc<TypeConflictFn>>,
    schema_level_resolver: Option<Arc<dyn SchemaLevelResolver>>,
}

impl StitchingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subschema(mut self, subschema: Subschema) -> Self {
        self.subschemas.push(subschema);
        self
    }

    /// Extra SDL, such as extensions adding fields to types of the subschemas.
    pub fn with_type_defs(mut self, type_defs: impl Into<String>) -> Self {
        self.type_defs.push(type_defs.into());
        self
    }

    pub fn with_resolver(
        self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        resolver: impl FieldResolver + 'static,
    ) -> Self {
        self.with_resolver_config(type_name, field_name, FieldResolverConfig::new(resolver))
    }

    pub fn with_resolver_config(
        mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        config: FieldResolverConfig,
    ) -> Self {
        self.resolvers
            .entry(type_name.into())
            .or_default()
            .insert(field_name.into(), config);
        self
    }

    pub fn with_merge_types(mut self, merge_types: MergeTypes) -> Self {
        self.merge_types = merge_types;
        self
    }

    /// Chooses between two candidates of a type that is not merged. Defaults to the later one.
    pub fn with_type_conflict(
        mut self,
        on_conflict: impl Fn(&TypeCandidate, &TypeCandidate) -> TypeCandidate + Send + Sync + 'static,
    ) -> Self {
        self.on_type_conflict = Some(Arc::new(on_conflict));
        self
    }

    pub fn with_schema_level_resolver(
        mut self,
        resolver: impl SchemaLevelResolver + 'static,
    ) -> Self {
        self.schema_level_resolver = Some(Arc::new(resolver));
        self
    }
}

/// Builds a stitched schema.
#[tracing::instrument(skip_all, level = "debug")]
pub fn stitch_schemas(config: StitchingConfig) -> Result<StitchedSchema, StitchingError> {
    let StitchingConfig {
        subschemas,
        type_defs,
        resolvers,
        merge_types,
        on_type_conflict,
        schema_level_resolver,
    } = config;

    let mut names = HashSet::new();
    for subschema in &subschemas {
        if !names.insert(subschema.name()) {
            return Err(StitchingError::DuplicateSubschemaName(
                subschema.name().to_string(),
            ));
        }
    }

    let transformed = subschemas
        .iter()
        .map(transform_schema)
        .collect::<Result<Vec<_>, _>>()?;
    let extra = type_defs
        .iter()
        .map(|sdl| {
            Schema::builder()
                .adopt_orphan_extensions()
                .parse(sdl, "type_defs.graphql")
                .build()
                .map_err(|invalid| {
                    StitchingError::InvalidTypeDefs(diagnostics_to_string(&invalid.errors))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let sources = transformed
        .iter()
        .enumerate()
        .map(|(index, schema)| (Some(SubschemaId(index)), &**schema))
        .chain(extra.iter().map(|schema| (None, schema)));
    let mut candidates: IndexMap<Name, Vec<TypeCandidate>> = IndexMap::new();
    let mut root_names = IndexSet::new();
    let mut stitched = Schema::new();
    for (subschema, source) in sources {
        for (name, ty) in &source.types {
            if ty.is_built_in() || schema::is_introspection_name(name) {
                continue;
            }
            let (name, ty) = match schema::root_kind(source, name) {
                Some(kind) => {
                    let canonical = Name::new(kind.default_type_name())
                        .map_err(|_| StitchingError::InvalidName(kind.to_string()))?;
                    root_names.insert(canonical.clone());
                    let ty = renamed_root(ty, &canonical);
                    (canonical, ty)
                }
                None => (name.clone(), ty.clone()),
            };
            candidates
                .entry(name)
                .or_default()
                .push(TypeCandidate { ty, subschema });
        }
        for (name, directive) in &source.directive_definitions {
            stitched
                .directive_definitions
                .entry(name.clone())
                .or_insert_with(|| directive.clone());
        }
    }

    let mut merged_names = IndexSet::new();
    for (name, candidates) in &candidates {
        let (from_subschemas, from_type_defs): (Vec<_>, Vec<_>) = candidates
            .iter()
            .cloned()
            .partition(|candidate| candidate.subschema.is_some());
        let configured = from_subschemas.iter().any(|candidate| {
            candidate
                .subschema
                .is_some_and(|id| subschemas[id.index()].merged_type(name).is_some())
        });
        let structural =
            root_names.contains(name) || configured || merge_types.selects(name, candidates);

        let mut layers = Vec::with_capacity(from_type_defs.len() + 1);
        if structural && !from_subschemas.is_empty() {
            merged_names.insert(name.clone());
            layers.push(TypeCandidate {
                ty: merge_candidates(name, &from_subschemas)?,
                subschema: None,
            });
        } else if let Some(chosen) = choose_candidate(&from_subschemas, on_type_conflict.as_deref())
        {
            layers.push(chosen);
        }
        // Extra type definitions extend whatever the subschemas provide.
        layers.extend(from_type_defs);
        let ty = match layers.as_slice() {
            [] => continue,
            [single] => single.ty.clone(),
            layers => merge_candidates(name, layers)?,
        };
        stitched.types.insert(name.clone(), ty);
    }
    let definition = stitched.schema_definition.make_mut();
    for kind in OperationKind::ALL {
        let root = root_names
            .iter()
            .find(|name| name.as_str() == kind.default_type_name())
            .map(|name| ComponentName::from(name.clone()));
        match kind {
            OperationKind::Query => definition.query = root,
            OperationKind::Mutation => definition.mutation = root,
            OperationKind::Subscription => definition.subscription = root,
        }
    }
    let stitched = heal_schema(stitched, &Renames::default(), true)?
        .validate()
        .map_err(|invalid| StitchingError::InvalidSchema(diagnostics_to_string(&invalid.errors)))?;

    let resolvers = check_resolvers(&stitched, resolvers)?;
    let mut selection_sets_by_field: IndexMap<Name, IndexMap<Name, _>> = IndexMap::new();
    let mut field_resolvers: IndexMap<Name, IndexMap<Name, Arc<dyn FieldResolver>>> =
        IndexMap::new();
    for ((type_name, field_name), config) in resolvers {
        if let Some(selection_set) = &config.selection_set {
            selection_sets_by_field
                .entry(type_name.clone())
                .or_default()
                .insert(field_name.clone(), parse_selection_set(selection_set)?);
        }
        if let Some(resolver) = config.resolver {
            field_resolvers
                .entry(type_name)
                .or_default()
                .insert(field_name, resolver);
        }
    }

    let mut root_field_owners: IndexMap<OperationKind, IndexMap<Name, SubschemaId>> =
        IndexMap::new();
    for (index, schema) in transformed.iter().enumerate() {
        for kind in OperationKind::ALL {
            let Some(ExtendedType::Object(root)) =
                schema::root_type_name(schema, kind).and_then(|name| schema.types.get(name))
            else {
                continue;
            };
            let owners = root_field_owners.entry(kind).or_default();
            for field_name in root.fields.keys() {
                owners.insert(field_name.clone(), SubschemaId(index));
            }
        }
    }

    let entries = subschemas
        .into_iter()
        .zip(transformed)
        .enumerate()
        .map(|(index, (subschema, transformed))| {
            for type_name in subschema.merge.keys() {
                if !transformed.types.contains_key(type_name) {
                    return Err(StitchingError::UnknownMergedType {
                        subschema: subschema.name().to_string(),
                        type_name: type_name.to_string(),
                    });
                }
            }
            let (possible_types, reverse_possible_types) = possible_types(&stitched, &transformed);
            Ok(SubschemaEntry {
                id: SubschemaId(index),
                subschema,
                transformed,
                possible_types,
                reverse_possible_types,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut merged_types = IndexMap::new();
    for name in &merged_names {
        if root_names.contains(name)
            || !matches!(stitched.types.get(name), Some(ExtendedType::Object(_)))
        {
            continue;
        }
        let declaring = candidates
            .get(name)
            .into_iter()
            .flatten()
            .filter_map(|candidate| candidate.subschema)
            .collect::<IndexSet<_>>();
        if declaring.len() < 2 {
            continue;
        }
        let merged = build_merged_type(name, &declaring, &entries)?;
        tracing::debug!(
            type_name = %name,
            targets = ?merged.target_subschemas,
            "merged type"
        );
        merged_types.insert(name.clone(), merged);
    }

    let stitching_info = StitchingInfo {
        subschemas: entries,
        merged_types,
        selection_sets_by_field,
        root_field_owners,
    };
    Ok(StitchedSchema::new(
        stitched,
        stitching_info,
        field_resolvers,
        schema_level_resolver,
    ))
}

/// Applies the schema transforms of `subschema` in order.
fn transform_schema(subschema: &Subschema) -> Result<Valid<Schema>, StitchingError> {
    if subschema.transforms.is_empty() {
        return Ok(subschema.schema().clone());
    }
    let mut schema = subschema.schema().clone().into_inner();
    for transform in &subschema.transforms {
        schema = transform.transform_schema(schema)?;
    }
    schema
        .validate()
        .map_err(|invalid| StitchingError::InvalidSchema(diagnostics_to_string(&invalid.errors)))
}

fn renamed_root(ty: &ExtendedType, canonical: &Name) -> ExtendedType {
    match ty {
        ExtendedType::Object(object) if object.name != *canonical => {
            let mut object = object.clone();
            object.make_mut().name = canonical.clone();
            ExtendedType::Object(object)
        }
        ty => ty.clone(),
    }
}

type ResolverConfigs = IndexMap<(Name, Name), FieldResolverConfig>;

/// Every configured resolver must target a field of the stitched schema.
fn check_resolvers(
    stitched: &Schema,
    resolvers: IndexMap<String, IndexMap<String, FieldResolverConfig>>,
) -> Result<ResolverConfigs, StitchingError> {
    let mut checked = ResolverConfigs::new();
    for (type_name, fields) in resolvers {
        for (field_name, config) in fields {
            let Some(definition) = schema::field_definition(stitched, &type_name, &field_name)
            else {
                return Err(StitchingError::UnknownResolverField {
                    type_name,
                    field_name,
                });
            };
            let Some(ty) = stitched.types.get(type_name.as_str()) else {
                continue;
            };
            checked.insert((ty.name().clone(), definition.name.clone()), config);
        }
    }
    Ok(checked)
}

type PossibleTypes = IndexMap<Name, IndexSet<Name>>;

/// Abstract types of `stitched` that `subschema` only knows as objects, with the objects it
/// knows for each; and the inverse map.
fn possible_types(stitched: &Schema, subschema: &Schema) -> (PossibleTypes, PossibleTypes) {
    let mut possible = PossibleTypes::new();
    let mut reverse = PossibleTypes::new();
    for name in stitched.types.keys() {
        if !schema::is_abstract(stitched, name) || schema::is_abstract(subschema, name) {
            continue;
        }
        let types = schema::possible_types(stitched, name)
            .into_iter()
            .filter(|ty| subschema.types.contains_key(ty))
            .collect::<IndexSet<_>>();
        for ty in &types {
            reverse.entry(ty.clone()).or_default().insert(name.clone());
        }
        possible.insert(name.clone(), types);
    }
    (possible, reverse)
}
