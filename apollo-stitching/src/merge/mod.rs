//! Merge-delegation: fetching the fields of an object which other subschemas provide.
//!
//! Each round plans which subschema fetches which missing field, calls every planned subschema
//! concurrently, then merges what came back into the objects. Fields no subschema could take in
//! a round are retried in the next one, with the subschemas just queried counted as sources.

mod resolvers;

use std::fmt;

use apollo_compiler::Node;
use apollo_compiler::ast;
use futures::future::join_all;
use indexmap::IndexMap;
use indexmap::IndexSet;
use itertools::Itertools;

pub(crate) use self::resolvers::BatchedEntryPointResolver;
pub(crate) use self::resolvers::EntryPointResolver;
use crate::error::DelegationError;
use crate::execution::ResolveInfo;
use crate::graphql;
use crate::json_ext::Path;
use crate::json_ext::PathElement;
use crate::json_ext::Value;
use crate::result::Resolved;
use crate::result::TaggedResult;
use crate::stitch::MergedTypeInfo;
use crate::subschema::MergedTypeRequest;
use crate::subschema::SubschemaId;
use crate::utils::logging::snapshot;

/// Which subschema fetches which fields in one round of merge-delegation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DelegationPlan {
    /// Fields to fetch, grouped by the subschema fetching them.
    pub delegation_map: IndexMap<SubschemaId, Vec<Node<ast::Field>>>,
    /// Targets whose required selection set the sources provide.
    pub proxiable_subschemas: IndexSet<SubschemaId>,
    pub non_proxiable_subschemas: IndexSet<SubschemaId>,
    /// Fields no proxiable target provides.
    pub unproxiable_fields: Vec<Node<ast::Field>>,
}

impl fmt::Display for DelegationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |fields: &[Node<ast::Field>]| {
            fields
                .iter()
                .map(|field| field.name.as_str())
                .join(" ")
        };
        for (subschema, fields) in &self.delegation_map {
            writeln!(f, "#{} <- {{ {} }}", subschema.index(), names(fields))?;
        }
        if !self.unproxiable_fields.is_empty() {
            writeln!(f, "unproxiable: {{ {} }}", names(&self.unproxiable_fields))?;
        }
        Ok(())
    }
}

/// Assigns each of `fields` to a target able to fetch it from objects produced by `sources`.
///
/// A field several targets provide goes to a target already chosen in this plan when possible,
/// so each target is called at most once per round.
pub fn build_delegation_plan(
    merged_type: &MergedTypeInfo,
    fields: &[Node<ast::Field>],
    sources: &IndexSet<SubschemaId>,
    targets: &IndexSet<SubschemaId>,
) -> DelegationPlan {
    let (proxiable_subschemas, non_proxiable_subschemas): (IndexSet<_>, IndexSet<_>) = targets
        .iter()
        .copied()
        .partition(|target| merged_type.is_proxiable(*target, sources));

    let mut plan = DelegationPlan {
        proxiable_subschemas,
        non_proxiable_subschemas,
        ..Default::default()
    };
    for field in fields {
        let owner = if let Some(owner) = merged_type.unique_fields.get(&field.name) {
            plan.proxiable_subschemas.contains(owner).then_some(*owner)
        } else if let Some(owners) = merged_type.non_unique_fields.get(&field.name) {
            owners
                .iter()
                .find(|owner| plan.delegation_map.contains_key(*owner))
                .or_else(|| {
                    owners
                        .iter()
                        .find(|owner| plan.proxiable_subschemas.contains(*owner))
                })
                .copied()
        } else {
            None
        };
        match owner {
            Some(owner) => plan
                .delegation_map
                .entry(owner)
                .or_default()
                .push(field.clone()),
            None => plan.unproxiable_fields.push(field.clone()),
        }
    }
    plan
}

/// Completes `objects` of a merged type with `fields` from `targets`.
///
/// `objects` were produced by `sources`. The objects come back in order, each carrying the
/// fields that could be fetched along with the errors met fetching them.
#[tracing::instrument(skip_all, level = "trace", fields(type_name = %merged_type.type_name))]
pub(crate) async fn merge_fields(
    merged_type: &MergedTypeInfo,
    mut objects: Vec<TaggedResult>,
    mut fields: Vec<Node<ast::Field>>,
    mut sources: IndexSet<SubschemaId>,
    mut targets: IndexSet<SubschemaId>,
    info: &ResolveInfo,
) -> Vec<TaggedResult> {
    while !fields.is_empty() && !targets.is_empty() {
        let plan = build_delegation_plan(merged_type, &fields, &sources, &targets);
        snapshot!("DelegationPlan", plan.to_string(), "built delegation plan");
        tracing::debug!(
            type_name = %merged_type.type_name,
            delegations = plan.delegation_map.len(),
            unproxiable = plan.unproxiable_fields.len(),
            "planned merge-delegation round"
        );
        if plan.delegation_map.is_empty() {
            tracing::debug!(
                type_name = %merged_type.type_name,
                fields = ?plan.unproxiable_fields.iter().map(|field| field.name.as_str()).collect::<Vec<_>>(),
                "dropping fields no subschema can provide"
            );
            break;
        }

        let originals = objects
            .iter()
            .map(|object| object.data.clone())
            .collect::<Vec<_>>();
        let rounds = plan.delegation_map.iter().map(|(target, fields)| {
            let originals = &originals;
            async move {
                let Some(resolver) = merged_type.resolvers.get(target) else {
                    return (*target, fields, None);
                };
                let selection_set = fields
                    .iter()
                    .cloned()
                    .map(ast::Selection::Field)
                    .collect::<Vec<_>>();
                let results = resolver
                    .resolve(MergedTypeRequest {
                        originals,
                        subschema: *target,
                        type_name: &merged_type.type_name,
                        selection_set: &selection_set,
                        info,
                    })
                    .await;
                (*target, fields, Some(results))
            }
        });
        for (target, fields, results) in join_all(rounds).await {
            let Some(results) = results else {
                continue;
            };
            if results.len() != objects.len() {
                let error = wrong_result_count(merged_type, target, objects.len(), results.len(), info);
                for object in &mut objects {
                    add_field_errors(object, fields, &error);
                }
                continue;
            }
            apply_results(merged_type, &mut objects, target, fields, results);
        }

        for target in plan.delegation_map.keys() {
            sources.insert(*target);
            targets.shift_remove(target);
        }
        fields = plan.unproxiable_fields;
    }
    objects
}

fn wrong_result_count(
    merged_type: &MergedTypeInfo,
    target: SubschemaId,
    expected: usize,
    received: usize,
    info: &ResolveInfo,
) -> graphql::Error {
    let subschema = info.schema().stitching_info().subschema(target).subschema();
    tracing::warn!(
        subschema = subschema.name(),
        type_name = %merged_type.type_name,
        expected,
        received,
        "merged type resolver returned the wrong number of results"
    );
    DelegationError::MalformedResponse {
        subschema: subschema.name().to_string(),
        reason: format!(
            "expected {expected} results for type \"{}\", got {received}",
            merged_type.type_name
        ),
    }
    .to_graphql_error(None)
}

/// Merges one result per object; `results` and `objects` have the same length.
fn apply_results(
    merged_type: &MergedTypeInfo,
    objects: &mut [TaggedResult],
    target: SubschemaId,
    fields: &[Node<ast::Field>],
    results: Vec<Resolved>,
) {
    for (object, result) in objects.iter_mut().zip(results) {
        match result {
            Resolved::Object(tagged) => object.merge(tagged),
            Resolved::Value(value @ Value::Object(_)) => {
                object.merge(TaggedResult::new(value, Vec::new(), target));
            }
            Resolved::Error(error) => add_field_errors(object, fields, &error),
            Resolved::Null | Resolved::Value(Value::Null) => {}
            Resolved::List(_) | Resolved::Value(_) => {
                tracing::warn!(
                    type_name = %merged_type.type_name,
                    "merged type resolver returned a value which is not an object"
                );
            }
        }
    }
}

/// Attaches `error` to each of `fields` of `object`.
fn add_field_errors(object: &mut TaggedResult, fields: &[Node<ast::Field>], error: &graphql::Error) {
    for field in fields {
        let response_key = field.alias.as_ref().unwrap_or(&field.name);
        object
            .errors
            .push(error.relocated(Path(vec![PathElement::Key(response_key.to_string())])));
    }
}
