//! Execution of operations against a stitched schema.
//!
//! Root fields owned by a subschema are proxied to it; every other field is read off its parent
//! by [`default_merged_resolver`] unless a [`FieldResolver`] is configured for it. Values coming
//! back from subschemas are reconciled by [`crate::result`] before being completed here.

mod complete;
mod info;
mod resolver;
mod values;

use std::fmt;
use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use apollo_compiler::ast;
use apollo_compiler::schema::FieldDefinition;
use apollo_compiler::validation::DiagnosticList;
use apollo_compiler::validation::Valid;
use futures::StreamExt;
use futures::stream;
use indexmap::IndexMap;

pub(crate) use self::complete::complete_value;
pub(crate) use self::complete::execute_fields;
pub(crate) use self::info::GroupedFields;
pub(crate) use self::info::collect_fields;
pub(crate) use self::info::collect_subfields;
pub use self::info::ResolveInfo;
pub use self::resolver::FieldResolver;
pub use self::resolver::FieldResolverConfig;
pub use self::resolver::ResolverFn;
pub use self::resolver::SchemaLevelResolver;
pub use self::resolver::default_merged_resolver;
pub use self::resolver::resolver_fn;
use self::info::Fragments;
use crate::context::Context;
use crate::context::OperationId;
use crate::delegate::DelegationOptions;
use crate::delegate::delegate_subscription;
use crate::delegate::delegate_to_schema;
use crate::graphql;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::result::Resolved;
use crate::schema;
use crate::schema::OperationKind;
use crate::stitch::StitchingInfo;
use crate::subschema::SubschemaId;

/// A schema assembled from subschemas, ready to execute operations.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct StitchedSchema {
    inner: Arc<StitchedSchemaInner>,
}

struct StitchedSchemaInner {
    schema: Valid<Schema>,
    stitching_info: StitchingInfo,
    resolvers: IndexMap<Name, IndexMap<Name, Arc<dyn FieldResolver>>>,
    schema_level_resolver: Option<Arc<dyn SchemaLevelResolver>>,
}

impl StitchedSchema {
    pub(crate) fn new(
        schema: Valid<Schema>,
        stitching_info: StitchingInfo,
        resolvers: IndexMap<Name, IndexMap<Name, Arc<dyn FieldResolver>>>,
        schema_level_resolver: Option<Arc<dyn SchemaLevelResolver>>,
    ) -> Self {
        Self {
            inner: Arc::new(StitchedSchemaInner {
                schema,
                stitching_info,
                resolvers,
                schema_level_resolver,
            }),
        }
    }

    /// The stitched schema as seen by clients.
    pub fn schema(&self) -> &Valid<Schema> {
        &self.inner.schema
    }

    pub fn stitching_info(&self) -> &StitchingInfo {
        &self.inner.stitching_info
    }

    /// The id of the subschema named `name`.
    pub fn subschema_id(&self, name: &str) -> Option<SubschemaId> {
        self.inner
            .stitching_info
            .subschemas()
            .find(|entry| entry.subschema().name() == name)
            .map(|entry| entry.id())
    }

    /// Executes a query or mutation.
    ///
    /// Request errors are reported without `data`. Field errors are reported next to the data,
    /// with `null` in place of the fields they nulled.
    pub async fn execute(&self, request: graphql::Request, context: Context) -> graphql::Response {
        let ctx = match self.prepare(&request, context) {
            Ok(ctx) => ctx,
            Err(errors) => return graphql::Response::builder().errors(errors).build(),
        };
        if ctx.kind == OperationKind::Subscription {
            return request_error("Subscription operations are executed with `subscribe`");
        }
        let response = ctx.execute_root().await;
        ctx.context.forget_operation(ctx.operation_id);
        response
    }

    /// Executes a subscription, one response per event of the owning subschema.
    ///
    /// Dropping the stream drops the subschema subscription.
    pub async fn subscribe(
        &self,
        request: graphql::Request,
        context: Context,
    ) -> graphql::ResponseStream {
        let ctx = match self.prepare(&request, context) {
            Ok(ctx) => ctx,
            Err(errors) => {
                return stream::once(async { graphql::Response::builder().errors(errors).build() })
                    .boxed();
            }
        };
        match ctx.subscribe_root().await {
            Ok(responses) => responses,
            Err(response) => stream::once(async { response }).boxed(),
        }
    }

    fn prepare(
        &self,
        request: &graphql::Request,
        context: Context,
    ) -> Result<ExecutionContext, Vec<graphql::Error>> {
        let query = request.query.as_deref().unwrap_or_default();
        let document = ast::Document::parse(query, "request.graphql")
            .map_err(|invalid| diagnostics(&invalid.errors))?;
        let executable = document
            .to_executable_validate(self.schema())
            .map_err(|invalid| diagnostics(&invalid.errors))?;

        let mut operations = Vec::new();
        let mut fragments = Fragments::new();
        for definition in &document.definitions {
            match definition {
                ast::Definition::OperationDefinition(operation) => {
                    operations.push(operation.clone());
                }
                ast::Definition::FragmentDefinition(fragment) => {
                    fragments.insert(fragment.name.clone(), fragment.clone());
                }
                _ => {}
            }
        }
        let operation = match request.operation_name.as_deref() {
            Some(name) => operations
                .into_iter()
                .find(|operation| operation.name.as_ref().is_some_and(|n| n.as_str() == name))
                .ok_or_else(|| vec![error(format!("Unknown operation named \"{name}\"."))])?,
            None if operations.len() == 1 => operations.remove(0),
            None => {
                return Err(vec![error(
                    "Must provide operation name if query contains multiple operations.",
                )]);
            }
        };
        let variables = values::coerce_variable_values(
            self.schema(),
            &executable,
            request.operation_name.as_deref(),
            &request.variables,
        )?;

        Ok(ExecutionContext {
            schema: self.clone(),
            kind: operation.operation_type.into(),
            operation,
            fragments: Arc::new(fragments),
            variables: Arc::new(variables),
            context,
            operation_id: OperationId::next(),
        })
    }
}

impl fmt::Debug for StitchedSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StitchedSchema")
            .field(
                "subschemas",
                &self
                    .stitching_info()
                    .subschemas()
                    .map(|entry| entry.subschema().name())
                    .collect::<Vec<_>>(),
            )
            .field("merged_types", &self.stitching_info().merged_types.keys())
            .finish_non_exhaustive()
    }
}

/// One execution of an operation.
pub(crate) struct ExecutionContext {
    pub(crate) schema: StitchedSchema,
    pub(crate) kind: OperationKind,
    pub(crate) operation: Node<ast::OperationDefinition>,
    pub(crate) fragments: Arc<Fragments>,
    pub(crate) variables: Arc<Object>,
    pub(crate) context: Context,
    pub(crate) operation_id: OperationId,
}

impl ExecutionContext {
    fn root_fields(&self) -> Result<(Name, GroupedFields), graphql::Response> {
        let Some(root) = schema::root_type_name(self.schema.schema(), self.kind) else {
            return Err(request_error(format!(
                "Schema is not configured to execute {} operation.",
                self.kind
            )));
        };
        let grouped = collect_fields(
            self.schema.schema(),
            &self.fragments,
            &self.variables,
            root,
            &self.operation.selection_set,
        );
        Ok((root.clone(), grouped))
    }

    #[tracing::instrument(skip_all, level = "debug", name = "stitched_execute", fields(kind = %self.kind))]
    async fn execute_root(&self) -> graphql::Response {
        let (root, grouped) = match self.root_fields() {
            Ok(root_fields) => root_fields,
            Err(response) => return response,
        };
        let serially = self.kind == OperationKind::Mutation;
        let parent = Resolved::Value(Value::Object(Object::new()));
        let (data, errors) =
            execute_fields(self, root, parent, grouped, Path::empty(), serially).await;
        graphql::Response::builder()
            .data(data.map_or(Value::Null, Value::Object))
            .errors(errors)
            .build()
    }

    async fn subscribe_root(self) -> Result<graphql::ResponseStream, graphql::Response> {
        if self.kind != OperationKind::Subscription {
            return Err(request_error(
                "Only subscription operations are executed with `subscribe`",
            ));
        }
        let (root, grouped) = self.root_fields()?;
        let Some((response_key, nodes)) = grouped.into_iter().next() else {
            return Err(request_error("Subscription selects no field"));
        };
        let Some(field_name) = nodes.first().map(|node| node.name.clone()) else {
            return Err(request_error("Subscription selects no field"));
        };
        let Some(definition) = schema::field_definition(self.schema.schema(), &root, &field_name)
        else {
            return Err(request_error(format!(
                "Unknown subscription field \"{field_name}\""
            )));
        };
        let path = Path::empty().join(response_key.as_str());
        let info = self.resolve_info(&root, response_key.clone(), nodes, definition, path.clone());
        let Some(owner) = self
            .schema
            .stitching_info()
            .root_field_owner(OperationKind::Subscription, &field_name)
        else {
            return Err(request_error(format!(
                "Subscription field \"{field_name}\" is not provided by any subschema"
            )));
        };

        let events = delegate_subscription(DelegationOptions::new(owner, &info))
            .await
            .map_err(|error| {
                graphql::Response::builder()
                    .error(error.to_graphql_error(Some(path)))
                    .build()
            })?;
        let ctx = Arc::new(self);
        Ok(events
            .then(move |resolved| {
                let ctx = ctx.clone();
                let info = info.clone();
                let response_key = response_key.clone();
                async move {
                    let (value, errors) =
                        complete_value(&ctx, &info.return_type, resolved, &info, info.path.clone())
                            .await;
                    let data = match value {
                        Ok(value) => {
                            let mut data = Object::new();
                            data.insert(response_key.as_str(), value);
                            Value::Object(data)
                        }
                        Err(_) => Value::Null,
                    };
                    graphql::Response::builder().data(data).errors(errors).build()
                }
            })
            .boxed())
    }

    pub(crate) fn resolve_info(
        &self,
        parent_type: &Name,
        response_key: Name,
        field_nodes: Vec<Node<ast::Field>>,
        definition: &FieldDefinition,
        path: Path,
    ) -> ResolveInfo {
        ResolveInfo {
            field_name: definition.name.clone(),
            response_key,
            field_nodes,
            return_type: definition.ty.clone(),
            parent_type: parent_type.clone(),
            path,
            operation: self.operation.clone(),
            fragments: self.fragments.clone(),
            variable_values: self.variables.clone(),
            context: self.context.clone(),
            operation_id: self.operation_id,
            schema: self.schema.clone(),
        }
    }

    /// Resolves one field: a configured resolver first, then the owning subschema for root
    /// fields, then the parent value.
    pub(crate) async fn resolve_field(
        &self,
        parent: &Resolved,
        args: Object,
        info: &ResolveInfo,
    ) -> Result<Resolved, graphql::Error> {
        let inner = &self.schema.inner;
        let root_kind = schema::root_kind(&inner.schema, &info.parent_type);

        let root_parent;
        let parent = match (root_kind, &inner.schema_level_resolver) {
            (Some(_), Some(resolver)) => {
                let key = Arc::as_ptr(resolver) as *const () as usize;
                let value = self
                    .context
                    .run_once(self.operation_id, key, || {
                        resolver.resolve(Value::Object(Object::new()), info)
                    })
                    .await?;
                root_parent = Resolved::Value(value);
                &root_parent
            }
            _ => parent,
        };

        let configured = inner
            .resolvers
            .get(&info.parent_type)
            .and_then(|fields| fields.get(&info.field_name));
        if let Some(resolver) = configured {
            return resolver.resolve(parent, &args, info).await;
        }

        if let Some(owner) =
            root_kind.and_then(|kind| inner.stitching_info.root_field_owner(kind, &info.field_name))
        {
            return delegate_to_schema(DelegationOptions::new(owner, info))
                .await
                .map_err(|error| error.to_graphql_error(None));
        }

        default_merged_resolver(parent, info).await
    }
}

fn error(message: impl Into<String>) -> graphql::Error {
    graphql::Error::builder()
        .message(message)
        .extension_code("GRAPHQL_VALIDATION_FAILED")
        .build()
}

fn request_error(message: impl Into<String>) -> graphql::Response {
    graphql::Response::builder().error(error(message)).build()
}

fn diagnostics(errors: &DiagnosticList) -> Vec<graphql::Error> {
    errors
        .iter()
        .map(|diagnostic| {
            let mut error: graphql::Error = diagnostic.to_json().into();
            error
                .extensions
                .entry("code")
                .or_insert_with(|| "GRAPHQL_VALIDATION_FAILED".into());
            error
        })
        .collect()
}
