//! Reconciliation of subschema results against the stitched schema.
//!
//! Every value a subschema returns is walked along its declared type. Objects are tagged with the
//! subschema that produced them and with the errors of their subtree, then completed from other
//! subschemas when their type is merged. Errors travel with the value they belong to: at each
//! level the first path segment, which names the current field or index, is stripped.

use apollo_compiler::Name;
use apollo_compiler::ast;
use apollo_compiler::schema::ExtendedType;
use futures::FutureExt;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use indexmap::IndexSet;

use crate::error::CombinedError;
use crate::execution::ResolveInfo;
use crate::execution::collect_subfields;
use crate::graphql;
use crate::json_ext::Object;
use crate::json_ext::PathElement;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::merge::merge_fields;
use crate::schema;
use crate::subschema::SubschemaId;

/// An object produced by subschemas, with the metadata needed to resolve its fields.
#[derive(Clone, Debug, PartialEq)]
pub struct TaggedResult {
    /// The object, keyed by response key.
    pub data: Value,
    /// Errors of the subtree; paths start at the response key of a field of this object.
    pub errors: Vec<graphql::Error>,
    /// The subschema which produced the object.
    pub subschema: SubschemaId,
    /// Response keys merged in from other subschemas, with the subschema which produced each.
    pub field_subschemas: IndexMap<String, SubschemaId>,
}

impl TaggedResult {
    pub fn new(data: Value, errors: Vec<graphql::Error>, subschema: SubschemaId) -> Self {
        Self {
            data,
            errors,
            subschema,
            field_subschemas: IndexMap::new(),
        }
    }

    /// The value at `response_key`.
    pub fn get(&self, response_key: &str) -> Option<&Value> {
        self.data.as_object()?.get(response_key)
    }

    /// The subschema which produced the value at `response_key`.
    pub fn subschema_of(&self, response_key: &str) -> SubschemaId {
        self.field_subschemas
            .get(response_key)
            .copied()
            .unwrap_or(self.subschema)
    }

    /// Errors of the field at `response_key`, and errors without a path.
    pub fn errors_of(&self, response_key: &str) -> Vec<graphql::Error> {
        self.errors
            .iter()
            .filter(|error| match &error.path {
                None => true,
                Some(path) => path.first().and_then(PathElement::as_key) == Some(response_key),
            })
            .cloned()
            .collect()
    }

    /// Deep-merges `other` into `self`; keys of `other` are attributed to its subschema.
    pub(crate) fn merge(&mut self, other: TaggedResult) {
        if let Some(object) = other.data.as_object() {
            for key in object.keys() {
                let subschema = other.subschema_of(key.as_str());
                self.field_subschemas
                    .insert(key.as_str().to_string(), subschema);
            }
        }
        self.data.deep_merge(other.data);
        self.errors.extend(other.errors);
    }
}

/// A resolved field value, before completion against the stitched schema.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolved {
    Null,
    /// A plain value, such as one returned by a caller's resolver.
    Value(Value),
    /// An object produced by subschemas.
    Object(TaggedResult),
    List(Vec<Resolved>),
    /// A field error, located at the field when completed.
    Error(graphql::Error),
}

impl Resolved {
    pub fn is_null(&self) -> bool {
        matches!(self, Resolved::Null | Resolved::Value(Value::Null))
    }

    /// The `__typename` of an object value.
    pub(crate) fn typename(&self) -> Option<&str> {
        match self {
            Resolved::Object(tagged) => tagged.data.typename(),
            Resolved::Value(value) => value.typename(),
            Resolved::Null | Resolved::List(_) | Resolved::Error(_) => None,
        }
    }
}

impl From<Value> for Resolved {
    fn from(value: Value) -> Self {
        Resolved::Value(value)
    }
}

/// Reconciles `data` of type `ty`, produced by `subschema`.
///
/// The paths of `errors` start with the response key `data` was found at. With
/// `skip_type_merging` unset, objects of merged types are completed from other subschemas.
pub fn handle_result<'a>(
    ty: &'a ast::Type,
    data: Value,
    errors: Vec<graphql::Error>,
    subschema: SubschemaId,
    info: &'a ResolveInfo,
    skip_type_merging: bool,
) -> BoxFuture<'a, Resolved> {
    async move {
        if data.is_null() {
            return handle_null(errors, subschema);
        }
        match ty {
            ast::Type::Named(name) | ast::Type::NonNullNamed(name) => {
                match info.schema().schema().types.get(name) {
                    Some(
                        ExtendedType::Object(_)
                        | ExtendedType::Interface(_)
                        | ExtendedType::Union(_),
                    ) => {
                        handle_object(name, data, errors, subschema, info, skip_type_merging)
                            .await
                    }
                    Some(ExtendedType::Enum(enum_)) => {
                        let known = data
                            .as_str()
                            .is_some_and(|value| enum_.values.contains_key(value));
                        if known {
                            Resolved::Value(data)
                        } else {
                            Resolved::Error(
                                graphql::Error::builder()
                                    .message(format!("Enum \"{name}\" cannot represent value: {data}"))
                                    .build(),
                            )
                        }
                    }
                    Some(ExtendedType::Scalar(_) | ExtendedType::InputObject(_)) | None => {
                        Resolved::Value(data)
                    }
                }
            }
            ast::Type::List(item) | ast::Type::NonNullList(item) => {
                handle_list(item, data, errors, subschema, info, skip_type_merging).await
            }
        }
    }
    .boxed()
}

/// Tags an object with its subtree errors and completes it from other subschemas.
pub async fn handle_object(
    type_name: &Name,
    data: Value,
    errors: Vec<graphql::Error>,
    subschema: SubschemaId,
    info: &ResolveInfo,
    skip_type_merging: bool,
) -> Resolved {
    let tagged = tag_object(data, errors, subschema);
    if skip_type_merging {
        return Resolved::Object(tagged);
    }
    merge_objects(type_name, vec![(0, tagged)], subschema, info)
        .await
        .pop()
        .map(|(_, tagged)| Resolved::Object(tagged))
        .unwrap_or(Resolved::Null)
}

/// Reconciles each member of a list.
///
/// Members which are objects of a merged type are completed together, so a subschema
/// resolving them in batches is called once for the whole list.
pub async fn handle_list(
    item_type: &ast::Type,
    data: Value,
    errors: Vec<graphql::Error>,
    subschema: SubschemaId,
    info: &ResolveInfo,
    skip_type_merging: bool,
) -> Resolved {
    let Value::Array(items) = data else {
        return Resolved::Error(
            graphql::Error::builder()
                .message(format!("Expected a list, got {data}"))
                .build(),
        );
    };
    let named_items = matches!(
        item_type,
        ast::Type::Named(_) | ast::Type::NonNullNamed(_)
    );
    let mut errors_by_index = errors_by_path_segment(errors);
    let mut resolved = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let errors = errors_by_index
            .swap_remove(&PathElement::Index(index))
            .unwrap_or_default();
        let skip = skip_type_merging || named_items;
        resolved.push(handle_result(item_type, item, errors, subschema, info, skip).await);
    }
    if skip_type_merging || !named_items {
        return Resolved::List(resolved);
    }

    let objects = resolved
        .iter_mut()
        .enumerate()
        .filter_map(|(index, item)| match std::mem::replace(item, Resolved::Null) {
            Resolved::Object(tagged) => Some((index, tagged)),
            other => {
                *item = other;
                None
            }
        })
        .collect::<Vec<_>>();
    if !objects.is_empty() {
        let type_name = item_type.inner_named_type();
        for (index, tagged) in merge_objects(type_name, objects, subschema, info).await {
            resolved[index] = Resolved::Object(tagged);
        }
    }
    Resolved::List(resolved)
}

/// Converts the errors of a `null` value into the value the stitched schema sees.
///
/// Errors located at the value itself collapse into one error. Errors further down become
/// placeholders, so each surfaces once the placeholder is completed. A list placeholder holds
/// one member per failing index, in index order; the indices themselves are not trusted.
pub fn handle_null(errors: Vec<graphql::Error>, subschema: SubschemaId) -> Resolved {
    if errors.is_empty() {
        return Resolved::Null;
    }
    let at_value = errors
        .iter()
        .any(|error| error.path.as_ref().is_none_or(|path| path.len() < 2));
    if at_value {
        return Resolved::Error(match <[graphql::Error; 1]>::try_from(errors) {
            Ok([error]) => graphql::Error {
                path: None,
                ..error
            },
            Err(errors) => CombinedError::new(errors).to_graphql_error(None),
        });
    }

    let has_keys = errors.iter().any(|error| {
        error
            .path
            .as_ref()
            .and_then(|path| path.get(1))
            .is_some_and(|segment| segment.as_key().is_some())
    });
    if has_keys {
        let mut data = Object::new();
        let errors = errors
            .into_iter()
            .map(|error| {
                if let Some(PathElement::Key(key)) =
                    error.path.as_ref().and_then(|path| path.get(1))
                {
                    data.insert(key.as_str(), Value::Null);
                }
                error.sliced()
            })
            .collect();
        return Resolved::Object(TaggedResult::new(Value::Object(data), errors, subschema));
    }

    let mut by_index = errors_by_path_segment(errors)
        .into_iter()
        .filter_map(|(segment, errors)| Some((segment.as_index()?, errors)))
        .collect::<Vec<_>>();
    by_index.sort_by_key(|(index, _)| *index);
    Resolved::List(
        by_index
            .into_iter()
            .map(|(_, errors)| handle_null(errors, subschema))
            .collect(),
    )
}

/// Groups errors by their second path segment, rehoming each below the first.
fn errors_by_path_segment(
    errors: Vec<graphql::Error>,
) -> IndexMap<PathElement, Vec<graphql::Error>> {
    let mut grouped: IndexMap<PathElement, Vec<graphql::Error>> = IndexMap::new();
    for error in errors {
        let Some(path) = &error.path else {
            continue;
        };
        let Some(segment) = path.get(1).cloned() else {
            continue;
        };
        let relocated = error.relocated(path.slice());
        grouped.entry(segment).or_default().push(relocated);
    }
    grouped
}

fn tag_object(data: Value, errors: Vec<graphql::Error>, subschema: SubschemaId) -> TaggedResult {
    TaggedResult::new(
        data,
        errors.iter().map(graphql::Error::sliced).collect(),
        subschema,
    )
}

/// Completes tagged objects from the subschemas they were not produced by.
///
/// Objects are grouped by concrete type; each group is merged in one pass.
async fn merge_objects(
    declared_type: &Name,
    objects: Vec<(usize, TaggedResult)>,
    subschema: SubschemaId,
    info: &ResolveInfo,
) -> Vec<(usize, TaggedResult)> {
    let stitched = info.schema();
    let mut groups: IndexMap<Name, Vec<(usize, TaggedResult)>> = IndexMap::new();
    for (index, tagged) in objects {
        let type_name = concrete_type_name(stitched.schema(), declared_type, &tagged.data);
        groups.entry(type_name).or_default().push((index, tagged));
    }

    let mut merged = Vec::new();
    for (type_name, group) in groups {
        let Some(merged_type) = stitched.stitching_info().merged_types.get(&type_name) else {
            merged.extend(group);
            continue;
        };
        let targets = merged_type.targets_for(subschema);
        if targets.is_empty() {
            merged.extend(group);
            continue;
        }
        let field_nodes = fields_not_in_subschema(info, &type_name, subschema);
        let (indices, tagged): (Vec<usize>, Vec<TaggedResult>) = group.into_iter().unzip();
        let tagged = merge_fields(
            merged_type,
            tagged,
            field_nodes,
            IndexSet::from([subschema]),
            targets,
            info,
        )
        .await;
        merged.extend(indices.into_iter().zip(tagged));
    }
    merged
}

fn concrete_type_name(schema: &apollo_compiler::Schema, declared: &Name, data: &Value) -> Name {
    if matches!(schema.types.get(declared), Some(ExtendedType::Object(_))) {
        return declared.clone();
    }
    data.typename()
        .and_then(|typename| schema.types.get(typename))
        .map(|ty| ty.name().clone())
        .unwrap_or_else(|| declared.clone())
}

/// The requested fields of `type_name` that `subschema` does not provide.
///
/// Fields whose resolvers declare a required selection set bring the fields of that selection
/// set along.
fn fields_not_in_subschema(
    info: &ResolveInfo,
    type_name: &Name,
    subschema: SubschemaId,
) -> Vec<apollo_compiler::Node<ast::Field>> {
    let stitching_info = info.schema().stitching_info();
    let provided = stitching_info.subschema(subschema).transformed_schema();
    let is_missing = |field: &ast::Field| {
        field.name.as_str() != "__typename"
            && schema::field_definition(provided, type_name, &field.name).is_none()
    };

    let mut missing = Vec::new();
    for fields in collect_subfields(info, type_name).into_values() {
        for field in fields {
            if let Some(required) = stitching_info.field_selection_set(type_name, &field.name) {
                missing.extend(required.iter().filter_map(|selection| match selection {
                    ast::Selection::Field(required) if is_missing(&**required) => {
                        Some(required.clone())
                    }
                    _ => None,
                }));
            }
            if is_missing(&*field) {
                missing.push(field);
            }
        }
    }
    missing
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;
    use crate::json_ext::Path;

    fn error(message: &str, path: &str) -> graphql::Error {
        graphql::Error::builder()
            .message(message)
            .path(Path::from(path))
            .build()
    }

    const PRODUCTS: SubschemaId = SubschemaId(0);

    #[test]
    fn null_without_errors_stays_null() {
        assert_eq!(handle_null(vec![], PRODUCTS), Resolved::Null);
    }

    #[test]
    fn errors_at_the_null_collapse_into_one() {
        let resolved = handle_null(
            vec![
                error("price unavailable", "productByUpc"),
                error("inventory down", "productByUpc"),
            ],
            PRODUCTS,
        );
        let Resolved::Error(error) = resolved else {
            panic!("expected an error, got {resolved:?}");
        };
        assert_eq!(error.message, "price unavailable\ninventory down");
        assert_eq!(error.path, None);
    }

    #[test]
    fn single_error_at_the_null_is_unlocated() {
        let resolved = handle_null(vec![error("not found", "productByUpc")], PRODUCTS);
        assert_eq!(
            resolved,
            Resolved::Error(graphql::Error::builder().message("not found").build())
        );
    }

    #[test]
    fn errors_below_the_null_become_an_object_placeholder() {
        let resolved = handle_null(
            vec![
                error("no price", "product/price"),
                error("no weight", "product/dimensions/weight"),
            ],
            PRODUCTS,
        );
        let Resolved::Object(placeholder) = resolved else {
            panic!("expected a placeholder, got {resolved:?}");
        };
        assert_eq!(placeholder.data, json!({"price": null, "dimensions": null}));
        assert_eq!(placeholder.errors_of("price"), vec![error("no price", "price")]);
        assert_eq!(
            placeholder.errors_of("dimensions"),
            vec![error("no weight", "dimensions/weight")]
        );
    }

    #[test]
    fn errors_below_a_null_list_become_a_list_placeholder() {
        let resolved = handle_null(
            vec![
                error("first", "reviews/0"),
                error("third", "reviews/2/body"),
            ],
            PRODUCTS,
        );
        let Resolved::List(items) = resolved else {
            panic!("expected a list, got {resolved:?}");
        };
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0],
            Resolved::Error(graphql::Error::builder().message("first").build())
        );
        assert!(matches!(&items[1], Resolved::Object(tagged) if tagged.data == json!({"body": null})));
    }

    #[test]
    fn list_placeholders_do_not_trust_error_indices() {
        let error_at = |index: usize| {
            graphql::Error::builder()
                .message(format!("at {index}"))
                .path(Path(vec![
                    PathElement::Key("reviews".to_string()),
                    PathElement::Index(index),
                ]))
                .build()
        };
        let resolved = handle_null(
            vec![error_at(usize::MAX), error_at(10_000_000_000), error_at(3)],
            PRODUCTS,
        );
        let Resolved::List(items) = resolved else {
            panic!("expected a list, got {resolved:?}");
        };
        assert_eq!(
            items,
            vec![
                Resolved::Error(graphql::Error::builder().message("at 3").build()),
                Resolved::Error(graphql::Error::builder().message("at 10000000000").build()),
                Resolved::Error(
                    graphql::Error::builder()
                        .message(format!("at {}", usize::MAX))
                        .build()
                ),
            ]
        );
    }

    #[test]
    fn errors_are_sliced_per_list_member() {
        let grouped = errors_by_path_segment(vec![
            error("a", "topProducts/1/price"),
            error("b", "topProducts/0"),
            error("c", "topProducts"),
        ]);
        assert_eq!(
            grouped,
            IndexMap::from([
                (PathElement::Index(1), vec![error("a", "1/price")]),
                (PathElement::Index(0), vec![error("b", "0")]),
            ])
        );
        // Once the member itself is tagged, its errors start at its own fields.
        assert_eq!(
            tag_object(json!({}), grouped[&PathElement::Index(1)].clone(), PRODUCTS).errors,
            vec![error("a", "price")]
        );
    }

    #[test]
    fn merging_tagged_results_tracks_field_subschemas() {
        let mut product = TaggedResult::new(json!({"upc": "1", "name": "Table"}), vec![], PRODUCTS);
        let mut inventory = TaggedResult::new(
            json!({"upc": "1", "price": 899}),
            vec![error("stale", "price")],
            SubschemaId(1),
        );
        inventory.field_subschemas.insert("upc".to_string(), PRODUCTS);
        product.merge(inventory);

        assert_eq!(product.data, json!({"upc": "1", "name": "Table", "price": 899}));
        assert_eq!(product.subschema_of("name"), PRODUCTS);
        assert_eq!(product.subschema_of("price"), SubschemaId(1));
        assert_eq!(product.subschema_of("upc"), PRODUCTS);
        assert_eq!(product.errors_of("price"), vec![error("stale", "price")]);
        assert!(product.errors_of("name").is_empty());
    }
}
