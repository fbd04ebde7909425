//! Completion of resolved values against the stitched schema.
//!
//! Completion follows the usual GraphQL rules: a `null` in a non-null position nulls the nearest
//! nullable ancestor, and each field error is reported once at the path it was raised at.

use apollo_compiler::Name;
use apollo_compiler::ast;
use apollo_compiler::schema::ExtendedType;
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::future::join_all;

use super::ExecutionContext;
use super::GroupedFields;
use super::ResolveInfo;
use super::collect_fields;
use crate::graphql;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::PathElement;
use crate::json_ext::Value;
use crate::result::Resolved;
use crate::result::TaggedResult;
use crate::schema;

/// A `null` reached a non-null position; the nearest nullable ancestor becomes `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InvalidValue;

pub(crate) type Completed<T = Value> = (Result<T, InvalidValue>, Vec<graphql::Error>);

/// Resolves and completes every field of `grouped` on `object_type`.
pub(crate) fn execute_fields<'a>(
    ctx: &'a ExecutionContext,
    object_type: Name,
    parent: Resolved,
    grouped: GroupedFields,
    path: Path,
    serially: bool,
) -> BoxFuture<'a, Completed<Object>> {
    async move {
        let (object_type, parent, path) = (&object_type, &parent, &path);
        let completed = if serially {
            let mut completed = Vec::with_capacity(grouped.len());
            for (key, nodes) in grouped {
                let value = execute_field(ctx, object_type, parent, key.clone(), nodes, path).await;
                completed.push((key, value));
            }
            completed
        } else {
            join_all(grouped.into_iter().map(|(key, nodes)| async move {
                let value = execute_field(ctx, object_type, parent, key.clone(), nodes, path).await;
                (key, value)
            }))
            .await
        };

        let mut object = Object::new();
        let mut errors = Vec::new();
        let mut invalid = false;
        for (key, (value, field_errors)) in completed {
            errors.extend(field_errors);
            match value {
                Ok(value) => {
                    object.insert(key.as_str(), value);
                }
                Err(InvalidValue) => invalid = true,
            }
        }
        if invalid {
            (Err(InvalidValue), errors)
        } else {
            (Ok(object), errors)
        }
    }
    .boxed()
}

async fn execute_field(
    ctx: &ExecutionContext,
    object_type: &Name,
    parent: &Resolved,
    response_key: Name,
    nodes: Vec<apollo_compiler::Node<ast::Field>>,
    path: &Path,
) -> Completed {
    let path = path.join(response_key.as_str());
    let Some(first) = nodes.first().cloned() else {
        return (Ok(Value::Null), Vec::new());
    };
    if first.name.as_str() == "__typename" {
        return (Ok(object_type.as_str().into()), Vec::new());
    }
    let Some(definition) = schema::field_definition(ctx.schema.schema(), object_type, &first.name)
    else {
        if schema::is_introspection_name(&first.name) {
            let error = graphql::Error::builder()
                .message(format!(
                    "Introspection field \"{}\" is not supported by the stitched schema",
                    first.name
                ))
                .path(path)
                .extension_code("INTROSPECTION_DISABLED")
                .build();
            return (Ok(Value::Null), vec![error]);
        }
        return (Ok(Value::Null), Vec::new());
    };

    let info = ctx.resolve_info(object_type, response_key, nodes, definition, path.clone());
    let args = super::values::coerce_argument_values(definition, &first, &ctx.variables);
    let resolved = ctx
        .resolve_field(parent, args, &info)
        .await
        .unwrap_or_else(Resolved::Error);
    complete_value(ctx, &info.return_type, resolved, &info, path).await
}

/// Completes `resolved` as a value of type `ty` at `path`.
pub(crate) fn complete_value<'a>(
    ctx: &'a ExecutionContext,
    ty: &'a ast::Type,
    resolved: Resolved,
    info: &'a ResolveInfo,
    path: Path,
) -> BoxFuture<'a, Completed> {
    async move {
        let nullable = match ty {
            ast::Type::NonNullNamed(name) => ast::Type::Named(name.clone()),
            ast::Type::NonNullList(item) => ast::Type::List(item.clone()),
            ast::Type::Named(_) | ast::Type::List(_) => {
                return complete_nullable(ctx, ty, resolved, info, path).await;
            }
        };
        let (value, mut errors) = complete_nullable(ctx, &nullable, resolved, info, path.clone()).await;
        match value {
            Ok(Value::Null) => {
                if errors.is_empty() {
                    errors.push(non_null_error(info, &nullable, path));
                }
                (Err(InvalidValue), errors)
            }
            value => (value, errors),
        }
    }
    .boxed()
}

async fn complete_nullable(
    ctx: &ExecutionContext,
    ty: &ast::Type,
    resolved: Resolved,
    info: &ResolveInfo,
    path: Path,
) -> Completed {
    match resolved {
        Resolved::Error(error) => return (Ok(Value::Null), vec![error.relocated(path)]),
        resolved if resolved.is_null() => return (Ok(Value::Null), Vec::new()),
        _ => {}
    }

    let (value, errors) = match ty {
        ast::Type::List(item) | ast::Type::NonNullList(item) => {
            complete_list(ctx, item, resolved, info, path).await
        }
        ast::Type::Named(name) | ast::Type::NonNullNamed(name) => {
            complete_named(ctx, name, resolved, info, path).await
        }
    };
    (Ok(value.unwrap_or(Value::Null)), errors)
}

async fn complete_list(
    ctx: &ExecutionContext,
    item_type: &ast::Type,
    resolved: Resolved,
    info: &ResolveInfo,
    path: Path,
) -> Completed {
    let items = match resolved {
        Resolved::List(items) => items,
        Resolved::Value(Value::Array(values)) => values.into_iter().map(Resolved::Value).collect(),
        _ => {
            let error = graphql::Error::builder()
                .message(format!(
                    "Expected Iterable, but did not find one for field \"{}.{}\".",
                    info.parent_type, info.field_name
                ))
                .path(path)
                .build();
            return (Ok(Value::Null), vec![error]);
        }
    };
    let completed = join_all(
        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| complete_value(ctx, item_type, item, info, path.join(index))),
    )
    .await;

    let mut values = Vec::with_capacity(completed.len());
    let mut errors = Vec::new();
    let mut invalid = false;
    for (value, item_errors) in completed {
        errors.extend(item_errors);
        match value {
            Ok(value) => values.push(value),
            Err(InvalidValue) => invalid = true,
        }
    }
    if invalid {
        (Err(InvalidValue), errors)
    } else {
        (Ok(Value::Array(values)), errors)
    }
}

async fn complete_named(
    ctx: &ExecutionContext,
    type_name: &Name,
    resolved: Resolved,
    info: &ResolveInfo,
    path: Path,
) -> Completed {
    let schema = ctx.schema.schema();
    let ty = schema.types.get(type_name);
    if !matches!(
        ty,
        Some(ExtendedType::Object(_) | ExtendedType::Interface(_) | ExtendedType::Union(_))
    ) {
        return match resolved {
            Resolved::Object(TaggedResult { data: value, .. }) => (
                Ok(Value::Null),
                vec![unexpected_value(type_name, &value.to_string(), path)],
            ),
            Resolved::Value(value) => match leaf_error(ty, type_name, &value) {
                None => (Ok(value), Vec::new()),
                Some(message) => {
                    let error = graphql::Error::builder()
                        .message(message)
                        .path(path)
                        .build();
                    (Ok(Value::Null), vec![error])
                }
            },
            Resolved::List(_) => (
                Ok(Value::Null),
                vec![unexpected_value(type_name, "a list", path)],
            ),
            Resolved::Null | Resolved::Error(_) => (Ok(Value::Null), Vec::new()),
        };
    }

    let runtime_type = match ty {
        Some(ExtendedType::Object(_)) => Some(type_name.clone()),
        _ => resolved
            .typename()
            .and_then(|typename| {
                schema::possible_types(schema, type_name)
                    .into_iter()
                    .find(|possible| possible.as_str() == typename)
            }),
    };
    let Some(runtime_type) = runtime_type else {
        let error = graphql::Error::builder()
            .message(format!(
                "Abstract type \"{type_name}\" must resolve to an Object type at runtime for field \"{}.{}\".",
                info.parent_type, info.field_name
            ))
            .path(path)
            .build();
        return (Ok(Value::Null), vec![error]);
    };

    match &resolved {
        Resolved::Object(_) | Resolved::Value(Value::Object(_)) => {}
        Resolved::Value(value) => {
            return (
                Ok(Value::Null),
                vec![unexpected_value(type_name, &value.to_string(), path)],
            );
        }
        Resolved::List(_) => {
            return (
                Ok(Value::Null),
                vec![unexpected_value(type_name, "a list", path)],
            );
        }
        Resolved::Null | Resolved::Error(_) => return (Ok(Value::Null), Vec::new()),
    }

    let mut grouped = GroupedFields::new();
    for node in &info.field_nodes {
        let fields = collect_fields(
            schema,
            &ctx.fragments,
            &ctx.variables,
            &runtime_type,
            &node.selection_set,
        );
        for (key, nodes) in fields {
            grouped.entry(key).or_default().extend(nodes);
        }
    }
    let (object, errors) = execute_fields(ctx, runtime_type, resolved, grouped, path, false).await;
    (object.map(Value::Object), errors)
}

/// Why `value` cannot be a value of the leaf type `type_name`, if it cannot.
///
/// Enums take one of their values. Built-in scalars take their own JSON kind only, and `Int`
/// must fit in 32 bits. Custom scalars take any value, objects and lists included.
fn leaf_error(ty: Option<&ExtendedType>, type_name: &Name, value: &Value) -> Option<String> {
    let expected = match ty {
        Some(ExtendedType::Enum(enum_)) => value
            .as_str()
            .is_some_and(|value| enum_.values.contains_key(value)),
        Some(ExtendedType::Scalar(_)) => match type_name.as_str() {
            "Int" => match value.as_i64() {
                Some(int) if i32::try_from(int).is_err() => {
                    return Some(format!(
                        "Int cannot represent non 32-bit signed integer value: {value}"
                    ));
                }
                Some(_) => true,
                None => false,
            },
            "Float" => value.is_number(),
            "String" => value.is_string(),
            "Boolean" => value.is_boolean(),
            "ID" => value.is_string() || value.is_i64(),
            _ => true,
        },
        Some(ExtendedType::Object(_) | ExtendedType::Interface(_) | ExtendedType::Union(_)) => true,
        Some(ExtendedType::InputObject(_)) | None => !(value.is_object() || value.is_array()),
    };
    (!expected).then(|| format!("Expected a value of type \"{type_name}\" but received: {value}"))
}

fn unexpected_value(type_name: &Name, received: &str, path: Path) -> graphql::Error {
    graphql::Error::builder()
        .message(format!(
            "Expected a value of type \"{type_name}\" but received: {received}"
        ))
        .path(path)
        .build()
}

fn non_null_error(info: &ResolveInfo, nullable: &ast::Type, path: Path) -> graphql::Error {
    let message = match path.last() {
        Some(PathElement::Index(index)) => format!(
            "Cannot return null for non-nullable array element of type {nullable} at index {index}"
        ),
        Some(PathElement::Key(_)) | None => format!(
            "Cannot return null for non-nullable field {}.{}",
            info.parent_type, info.field_name
        ),
    };
    graphql::Error::builder()
        .message(message)
        .path(path)
        .extension_code("NULL_IN_NON_NULL_POSITION")
        .build()
}
