//! Resolvers of the stitched schema.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use super::ResolveInfo;
use crate::graphql;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::result::Resolved;
use crate::result::handle_result;

/// Resolves one field of the stitched schema.
///
/// Set on a field with [`StitchingConfig::with_resolver`](crate::stitch::StitchingConfig::with_resolver);
/// it then replaces both proxying to a subschema and reading the field off its parent.
#[async_trait]
pub trait FieldResolver: Send + Sync {
    async fn resolve(
        &self,
        parent: &Resolved,
        args: &Object,
        info: &ResolveInfo,
    ) -> Result<Resolved, graphql::Error>;
}

/// A [`FieldResolver`] made from an async closure.
pub struct ResolverFn<F>(F);

#[async_trait]
impl<F, Fut> FieldResolver for ResolverFn<F>
where
    F: Fn(Resolved, Object, ResolveInfo) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Resolved, graphql::Error>> + Send,
{
    async fn resolve(
        &self,
        parent: &Resolved,
        args: &Object,
        info: &ResolveInfo,
    ) -> Result<Resolved, graphql::Error> {
        (self.0)(parent.clone(), args.clone(), info.clone()).await
    }
}

/// Wraps an async closure into a [`FieldResolver`].
pub fn resolver_fn<F, Fut>(f: F) -> ResolverFn<F>
where
    F: Fn(Resolved, Object, ResolveInfo) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Resolved, graphql::Error>> + Send,
{
    ResolverFn(f)
}

/// Configuration of one field of the stitched schema.
#[derive(Clone, Default)]
pub struct FieldResolverConfig {
    pub(crate) resolver: Option<Arc<dyn FieldResolver>>,
    pub(crate) selection_set: Option<String>,
}

impl FieldResolverConfig {
    pub fn new(resolver: impl FieldResolver + 'static) -> Self {
        Self {
            resolver: Some(Arc::new(resolver)),
            selection_set: None,
        }
    }

    /// Fields of the parent object the resolver reads, such as `"{ upc }"`.
    ///
    /// They are requested from subschemas whenever the field is.
    pub fn with_selection_set(mut self, selection_set: impl Into<String>) -> Self {
        self.selection_set = Some(selection_set.into());
        self
    }
}

impl fmt::Debug for FieldResolverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldResolverConfig")
            .field("resolver", &self.resolver.is_some())
            .field("selection_set", &self.selection_set)
            .finish()
    }
}

/// Produces the parent value of every root field of an operation.
///
/// Runs at most once per executed operation, however many root fields are requested.
#[async_trait]
pub trait SchemaLevelResolver: Send + Sync {
    async fn resolve(&self, root: Value, info: &ResolveInfo) -> Result<Value, graphql::Error>;
}

/// Reads a field off its parent.
///
/// Parents produced by subschemas are reconciled: the value is handled against the field type
/// together with the errors located at the field, and merged from other subschemas if needed.
pub async fn default_merged_resolver(
    parent: &Resolved,
    info: &ResolveInfo,
) -> Result<Resolved, graphql::Error> {
    match parent {
        Resolved::Object(tagged) => {
            let key = info.response_key.as_str();
            let data = tagged.get(key).cloned().unwrap_or(Value::Null);
            let errors = tagged.errors_of(key);
            let subschema = tagged.subschema_of(key);
            Ok(handle_result(&info.return_type, data, errors, subschema, info, false).await)
        }
        Resolved::Value(Value::Object(object)) => Ok(object
            .get(info.field_name.as_str())
            .cloned()
            .map_or(Resolved::Null, Resolved::Value)),
        Resolved::Null | Resolved::Value(_) | Resolved::List(_) | Resolved::Error(_) => {
            Ok(Resolved::Null)
        }
    }
}
