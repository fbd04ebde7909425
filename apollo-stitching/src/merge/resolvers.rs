//! Default merged-type resolvers, querying an entry point of the target subschema.

use apollo_compiler::Name;
use apollo_compiler::ast;
use async_trait::async_trait;
use futures::future::join_all;

use crate::delegate::DelegationOptions;
use crate::delegate::delegate_to_schema;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::result::Resolved;
use crate::schema;
use crate::schema::OperationKind;
use crate::subschema::ArgsFn;
use crate::subschema::ArgsFromKeysFn;
use crate::subschema::KeyFn;
use crate::subschema::MergedTypeRequest;
use crate::subschema::MergedTypeResolver;

/// Queries `field_name` once per object.
///
/// Without `args`, each argument of the entry point takes the value of the object's field with
/// the same name, when the object has one.
pub(crate) struct EntryPointResolver {
    pub(crate) field_name: Name,
    pub(crate) args: Option<ArgsFn>,
}

#[async_trait]
impl MergedTypeResolver for EntryPointResolver {
    async fn resolve(&self, request: MergedTypeRequest<'_>) -> Vec<Resolved> {
        let return_type = ast::Type::Named(request.type_name.clone());
        let calls = request.originals.iter().map(|original| {
            let args = match &self.args {
                Some(args) => args(original),
                None => matching_args(&request, &self.field_name, original),
            };
            let options = DelegationOptions::new(request.subschema, request.info)
                .with_operation(OperationKind::Query)
                .with_field_name(self.field_name.clone())
                .with_args(args)
                .with_selection_set(request.selection_set.to_vec())
                .with_return_type(return_type.clone())
                .with_skip_type_merging(true);
            async move {
                delegate_to_schema(options)
                    .await
                    .unwrap_or_else(|error| Resolved::Error(error.to_graphql_error(None)))
            }
        });
        join_all(calls).await
    }
}

/// Queries `field_name` once for all objects, with the keys of every object.
///
/// The entry point returns a list holding one object per key, in order. Without
/// `args_from_keys`, the keys are passed as `ids`.
pub(crate) struct BatchedEntryPointResolver {
    pub(crate) field_name: Name,
    pub(crate) key: KeyFn,
    pub(crate) args_from_keys: Option<ArgsFromKeysFn>,
}

#[async_trait]
impl MergedTypeResolver for BatchedEntryPointResolver {
    async fn resolve(&self, request: MergedTypeRequest<'_>) -> Vec<Resolved> {
        let count = request.originals.len();
        let keys = request
            .originals
            .iter()
            .map(|original| (self.key)(original))
            .collect::<Vec<_>>();
        let args = match &self.args_from_keys {
            Some(args_from_keys) => args_from_keys(keys),
            None => {
                let mut args = Object::new();
                args.insert("ids", Value::Array(keys));
                args
            }
        };
        let options = DelegationOptions::new(request.subschema, request.info)
            .with_operation(OperationKind::Query)
            .with_field_name(self.field_name.clone())
            .with_args(args)
            .with_selection_set(request.selection_set.to_vec())
            .with_return_type(ast::Type::Named(request.type_name.clone()).list())
            .with_skip_type_merging(true);
        match delegate_to_schema(options).await {
            Ok(Resolved::List(items)) => items,
            Ok(Resolved::Error(error)) => vec![Resolved::Error(error); count],
            Ok(Resolved::Null | Resolved::Value(Value::Null)) => vec![Resolved::Null; count],
            Ok(other) => {
                tracing::warn!(
                    field_name = %self.field_name,
                    "batched entry point did not return a list: {other:?}"
                );
                vec![Resolved::Null; count]
            }
            Err(error) => vec![Resolved::Error(error.to_graphql_error(None)); count],
        }
    }
}

/// Arguments of the entry point found as fields of `original`.
fn matching_args(request: &MergedTypeRequest<'_>, field_name: &Name, original: &Value) -> Object {
    let stitching_info = request.info.schema().stitching_info();
    let transformed = stitching_info
        .subschema(request.subschema)
        .transformed_schema();
    let mut args = Object::new();
    let Some(root) = schema::root_type_name(transformed, OperationKind::Query) else {
        return args;
    };
    let Some(definition) = schema::field_definition(transformed, root, field_name) else {
        return args;
    };
    let Some(object) = original.as_object() else {
        return args;
    };
    for argument in &definition.arguments {
        if let Some(value) = object.get(argument.name.as_str()) {
            args.insert(argument.name.as_str(), value.clone());
        }
    }
    args
}
