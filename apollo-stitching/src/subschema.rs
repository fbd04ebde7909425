//! Subschemas: the GraphQL backends a stitched schema is assembled from.
//!
//! A [`Subschema`] couples a backend's schema with the means to reach it: an [`Executor`] for
//! queries and mutations, a [`Subscriber`] for subscriptions. Both are seams; transports live
//! outside of this crate. [`LocalExecutor`] executes in-process against a local schema.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Schema;
use apollo_compiler::ast;
use apollo_compiler::resolvers::Execution;
use apollo_compiler::resolvers::ObjectValue;
use apollo_compiler::response::JsonValue;
use apollo_compiler::validation::Valid;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use tower::BoxError;
use tower::Service;
use tower::ServiceExt;
use tower::util::ServiceFn;

use crate::context::Context;
use crate::execution::ResolveInfo;
use crate::graphql;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::merge::BatchedEntryPointResolver;
use crate::merge::EntryPointResolver;
use crate::result::Resolved;
use crate::schema::OperationKind;
use crate::transforms::Transform;

/// Position of a subschema in the stitched schema, in configuration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubschemaId(pub(crate) usize);

impl SubschemaId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A request sent to one subschema.
///
/// Holds a single operation with exactly one root field, plus the fragments it uses.
#[derive(Clone, Debug)]
pub struct SubschemaRequest {
    pub document: ast::Document,
    pub variables: Object,
    pub operation_name: Option<Name>,
    pub operation_kind: OperationKind,
    pub context: Context,
}

impl SubschemaRequest {
    /// The request as sent over a GraphQL transport.
    pub fn to_graphql_request(&self) -> graphql::Request {
        graphql::Request::builder()
            .query(self.document.to_string())
            .and_operation_name(self.operation_name.as_ref().map(|name| name.to_string()))
            .variables(self.variables.clone())
            .build()
    }

    /// The operation of the request.
    pub fn operation(&self) -> Option<&ast::OperationDefinition> {
        self.document
            .definitions
            .iter()
            .find_map(|definition| match definition {
                ast::Definition::OperationDefinition(operation) => Some(&**operation),
                _ => None,
            })
    }

    pub(crate) fn operation_mut(&mut self) -> Option<&mut ast::OperationDefinition> {
        self.document
            .definitions
            .iter_mut()
            .find_map(|definition| match definition {
                ast::Definition::OperationDefinition(operation) => Some(operation.make_mut()),
                _ => None,
            })
    }
}

/// Executes queries and mutations against a subschema.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, request: SubschemaRequest) -> Result<graphql::Response, BoxError>;
}

/// Opens subscriptions against a subschema.
///
/// Dropping the returned stream must release the subscription on the backend.
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn subscribe(
        &self,
        request: SubschemaRequest,
    ) -> Result<graphql::ResponseStream, BoxError>;
}

/// Adapts a [`tower::Service`] into an [`Executor`].
#[derive(Clone)]
pub struct ServiceExecutor<S>(pub S);

#[async_trait]
impl<S> Executor for ServiceExecutor<S>
where
    S: Service<SubschemaRequest, Response = graphql::Response, Error = BoxError>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send,
{
    async fn execute(&self, request: SubschemaRequest) -> Result<graphql::Response, BoxError> {
        self.0.clone().oneshot(request).await
    }
}

/// Builds an [`Executor`] from an async function.
pub fn executor_fn<F, Fut>(f: F) -> ServiceExecutor<ServiceFn<F>>
where
    F: FnMut(SubschemaRequest) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<graphql::Response, BoxError>> + Send,
{
    ServiceExecutor(tower::service_fn(f))
}

/// A [`Subscriber`] calling an async function.
#[derive(Clone)]
pub struct SubscriberFn<F>(F);

#[async_trait]
impl<F, Fut> Subscriber for SubscriberFn<F>
where
    F: Fn(SubschemaRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<graphql::ResponseStream, BoxError>> + Send,
{
    async fn subscribe(
        &self,
        request: SubschemaRequest,
    ) -> Result<graphql::ResponseStream, BoxError> {
        (self.0)(request).await
    }
}

/// Builds a [`Subscriber`] from an async function.
pub fn subscriber_fn<F, Fut>(f: F) -> SubscriberFn<F>
where
    F: Fn(SubschemaRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<graphql::ResponseStream, BoxError>> + Send,
{
    SubscriberFn(f)
}

/// Executes requests in-process against a local schema.
///
/// `root` resolves the root fields; see [`apollo_compiler::resolvers`].
pub struct LocalExecutor<R> {
    schema: Arc<Valid<Schema>>,
    root: Arc<R>,
}

impl<R> LocalExecutor<R>
where
    R: ObjectValue + Send + Sync + 'static,
{
    pub fn new(schema: Arc<Valid<Schema>>, root: R) -> Self {
        Self {
            schema,
            root: Arc::new(root),
        }
    }
}

#[async_trait]
impl<R> Executor for LocalExecutor<R>
where
    R: ObjectValue + Send + Sync + 'static,
{
    async fn execute(&self, request: SubschemaRequest) -> Result<graphql::Response, BoxError> {
        let document = match request.document.to_executable_validate(&self.schema) {
            Ok(document) => document,
            Err(invalid) => {
                return Ok(graphql::Response::builder()
                    .errors(
                        invalid
                            .errors
                            .iter()
                            .map(|diagnostic| diagnostic.to_json().into())
                            .collect(),
                    )
                    .build());
            }
        };
        let operation = match document
            .operations
            .get(request.operation_name.as_ref().map(Name::as_str))
        {
            Ok(operation) => operation,
            Err(error) => {
                return Ok(graphql::Response::builder()
                    .errors(vec![error.to_graphql_error(&document.sources).into()])
                    .build());
            }
        };
        let result = Execution::new(&self.schema, &document)
            .operation(operation)
            .raw_variable_values(&request.variables)
            .execute_sync(&*self.root);
        Ok(match result {
            Ok(response) => graphql::Response::builder()
                .data(JsonValue::from(response.data))
                .errors(response.errors.into_iter().map(Into::into).collect())
                .build(),
            Err(request_error) => graphql::Response::builder()
                .errors(vec![request_error.to_graphql_error(&document.sources).into()])
                .build(),
        })
    }
}

pub type ArgsFn = Arc<dyn Fn(&Value) -> Object + Send + Sync>;
pub type KeyFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;
pub type ArgsFromKeysFn = Arc<dyn Fn(Vec<Value>) -> Object + Send + Sync>;

/// Everything a [`MergedTypeResolver`] needs to fetch more fields of some objects.
pub struct MergedTypeRequest<'a> {
    /// The objects as resolved so far, all of the same type.
    pub originals: &'a [Value],
    /// The subschema to fetch from.
    pub subschema: SubschemaId,
    /// The merged type, as named in the stitched schema.
    pub type_name: &'a Name,
    /// The fields to fetch.
    pub selection_set: &'a [ast::Selection],
    /// The field whose value holds the objects.
    pub info: &'a ResolveInfo,
}

/// Fetches the fields of merged-type objects that one subschema owns.
#[async_trait]
pub trait MergedTypeResolver: Send + Sync {
    /// Returns exactly one result per original, in order.
    async fn resolve(&self, request: MergedTypeRequest<'_>) -> Vec<Resolved>;
}

/// How a subschema resolves objects of a type other subschemas also provide.
///
/// The default resolver queries the entry point `field_name` once per object with
/// `args(object)`. When `key` is set, the entry point is queried once for a whole list with
/// `args_from_keys(keys)` and must return one object per key, in order.
#[derive(Clone, Default)]
pub struct MergedTypeConfig {
    pub(crate) selection_set: Option<String>,
    pub(crate) field_name: Option<String>,
    pub(crate) args: Option<ArgsFn>,
    pub(crate) key: Option<KeyFn>,
    pub(crate) args_from_keys: Option<ArgsFromKeysFn>,
    pub(crate) resolve: Option<Arc<dyn MergedTypeResolver>>,
}

impl MergedTypeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fields this subschema needs on an object to resolve it, such as `{ upc }`.
    pub fn with_selection_set(mut self, selection_set: impl Into<String>) -> Self {
        self.selection_set = Some(selection_set.into());
        self
    }

    /// The root query field resolving objects of the type.
    pub fn with_field_name(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = Some(field_name.into());
        self
    }

    pub fn with_args(mut self, args: impl Fn(&Value) -> Object + Send + Sync + 'static) -> Self {
        self.args = Some(Arc::new(args));
        self
    }

    pub fn with_key(mut self, key: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        self.key = Some(Arc::new(key));
        self
    }

    pub fn with_args_from_keys(
        mut self,
        args_from_keys: impl Fn(Vec<Value>) -> Object + Send + Sync + 'static,
    ) -> Self {
        self.args_from_keys = Some(Arc::new(args_from_keys));
        self
    }

    /// Replaces the default entry point resolver.
    pub fn with_resolver(mut self, resolver: impl MergedTypeResolver + 'static) -> Self {
        self.resolve = Some(Arc::new(resolver));
        self
    }

    /// The resolver to use for this type, if the configuration allows resolving it at all.
    pub(crate) fn resolver(&self, field_name: Option<Name>) -> Option<Arc<dyn MergedTypeResolver>> {
        if let Some(resolve) = &self.resolve {
            return Some(resolve.clone());
        }
        let field_name = field_name?;
        Some(match &self.key {
            Some(key) => Arc::new(BatchedEntryPointResolver {
                field_name,
                key: key.clone(),
                args_from_keys: self.args_from_keys.clone(),
            }),
            None => Arc::new(EntryPointResolver {
                field_name,
                args: self.args.clone(),
            }),
        })
    }
}

impl fmt::Debug for MergedTypeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergedTypeConfig")
            .field("selection_set", &self.selection_set)
            .field("field_name", &self.field_name)
            .field("batched", &self.key.is_some())
            .field("custom_resolver", &self.resolve.is_some())
            .finish()
    }
}

/// One backend of a stitched schema.
#[derive(Clone)]
pub struct Subschema {
    pub(crate) name: String,
    pub(crate) schema: Arc<Valid<Schema>>,
    pub(crate) executor: Option<Arc<dyn Executor>>,
    pub(crate) subscriber: Option<Arc<dyn Subscriber>>,
    pub(crate) transforms: Vec<Arc<dyn Transform>>,
    pub(crate) merge: IndexMap<Name, MergedTypeConfig>,
}

impl Subschema {
    /// `name` identifies the subschema in logs and errors and must be unique.
    pub fn new(name: impl Into<String>, schema: Valid<Schema>) -> Self {
        Self {
            name: name.into(),
            schema: Arc::new(schema),
            executor: None,
            subscriber: None,
            transforms: Vec::new(),
            merge: IndexMap::new(),
        }
    }

    pub fn with_executor(mut self, executor: impl Executor + 'static) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    /// Executes requests in-process, resolving root fields with `root`.
    pub fn with_local_executor<R>(self, root: R) -> Self
    where
        R: ObjectValue + Send + Sync + 'static,
    {
        let executor = LocalExecutor::new(self.schema.clone(), root);
        self.with_executor(executor)
    }

    pub fn with_subscriber(mut self, subscriber: impl Subscriber + 'static) -> Self {
        self.subscriber = Some(Arc::new(subscriber));
        self
    }

    /// Appends a transform; schema transforms apply in the order they are added.
    pub fn with_transform(mut self, transform: impl Transform + 'static) -> Self {
        self.transforms.push(Arc::new(transform));
        self
    }

    /// Declares how this subschema resolves `type_name`, named as after its transforms.
    pub fn with_merged_type(mut self, type_name: Name, config: MergedTypeConfig) -> Self {
        self.merge.insert(type_name, config);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The schema of the backend, before transforms.
    pub fn schema(&self) -> &Valid<Schema> {
        &self.schema
    }

    pub fn merged_type(&self, type_name: &str) -> Option<&MergedTypeConfig> {
        self.merge.get(type_name)
    }
}

impl fmt::Debug for Subschema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subschema")
            .field("name", &self.name)
            .field("has_executor", &self.executor.is_some())
            .field("has_subscriber", &self.subscriber.is_some())
            .field("transforms", &self.transforms.len())
            .field("merge", &self.merge)
            .finish()
    }
}
