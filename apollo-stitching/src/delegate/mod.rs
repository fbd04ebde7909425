//! Delegation of a field to a subschema.
//!
//! [`delegate_to_schema`] turns the field being resolved into a request holding a single root
//! field, runs it through the transform pipeline, sends it to the subschema and reconciles the
//! response against the stitched schema. [`delegate_subscription`] does the same for each event
//! of a subscription.

mod request;

use std::fmt;
use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::ast;
use futures::StreamExt;
use futures::stream::BoxStream;

pub use self::request::create_request;
use crate::error::CombinedError;
use crate::error::DelegationError;
use crate::execution::ResolveInfo;
use crate::graphql;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::result::Resolved;
use crate::result::handle_result;
use crate::schema::OperationKind;
use crate::subschema::SubschemaId;
use crate::subschema::SubschemaRequest;
use crate::transforms::AddArgumentsAsVariables;
use crate::transforms::AddSelectionSets;
use crate::transforms::AddTypenameToAbstract;
use crate::transforms::DelegationContext;
use crate::transforms::ExpandAbstractTypes;
use crate::transforms::FilterToSchema;
use crate::transforms::Transform;

/// What to delegate, and where.
///
/// Everything not set is taken from the field being resolved.
pub struct DelegationOptions<'a> {
    pub(crate) subschema: SubschemaId,
    pub(crate) info: &'a ResolveInfo,
    pub(crate) operation: Option<OperationKind>,
    pub(crate) field_name: Option<Name>,
    pub(crate) args: Option<Object>,
    pub(crate) selection_set: Option<Vec<ast::Selection>>,
    pub(crate) field_nodes: Option<Vec<Node<ast::Field>>>,
    pub(crate) return_type: Option<ast::Type>,
    pub(crate) transforms: Vec<Arc<dyn Transform>>,
    pub(crate) skip_validation: bool,
    pub(crate) skip_type_merging: bool,
}

impl<'a> DelegationOptions<'a> {
    pub fn new(subschema: SubschemaId, info: &'a ResolveInfo) -> Self {
        Self {
            subschema,
            info,
            operation: None,
            field_name: None,
            args: None,
            selection_set: None,
            field_nodes: None,
            return_type: None,
            transforms: Vec::new(),
            skip_validation: false,
            skip_type_merging: false,
        }
    }

    pub fn with_operation(mut self, operation: OperationKind) -> Self {
        self.operation = Some(operation);
        self
    }

    /// The root field to call, as named in the stitched schema.
    pub fn with_field_name(mut self, field_name: Name) -> Self {
        self.field_name = Some(field_name);
        self
    }

    /// Arguments of the root field, passed as variables.
    pub fn with_args(mut self, args: Object) -> Self {
        self.args = Some(args);
        self
    }

    /// Selections of the root field. No argument is copied from the field being resolved.
    pub fn with_selection_set(mut self, selection_set: Vec<ast::Selection>) -> Self {
        self.selection_set = Some(selection_set);
        self
    }

    pub fn with_field_nodes(mut self, field_nodes: Vec<Node<ast::Field>>) -> Self {
        self.field_nodes = Some(field_nodes);
        self
    }

    /// The type the result is reconciled against.
    pub fn with_return_type(mut self, return_type: ast::Type) -> Self {
        self.return_type = Some(return_type);
        self
    }

    /// Adds a transform. Requests go through the transforms added last first, then through
    /// the transforms of the subschema.
    pub fn with_transform(mut self, transform: impl Transform + 'static) -> Self {
        self.transforms.push(Arc::new(transform));
        self
    }

    pub fn with_skip_validation(mut self, skip_validation: bool) -> Self {
        self.skip_validation = skip_validation;
        self
    }

    /// Leaves objects of merged types as the subschema returned them.
    pub fn with_skip_type_merging(mut self, skip_type_merging: bool) -> Self {
        self.skip_type_merging = skip_type_merging;
        self
    }

    pub(crate) fn field_name(&self) -> &Name {
        self.field_name.as_ref().unwrap_or(&self.info.field_name)
    }

    fn return_type(&self) -> &ast::Type {
        self.return_type.as_ref().unwrap_or(&self.info.return_type)
    }
}

impl fmt::Debug for DelegationOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegationOptions")
            .field("subschema", &self.subschema)
            .field("operation", &self.operation)
            .field("field_name", &self.field_name())
            .field("return_type", &self.return_type())
            .field("transforms", &self.transforms.len())
            .field("skip_validation", &self.skip_validation)
            .field("skip_type_merging", &self.skip_type_merging)
            .finish_non_exhaustive()
    }
}

/// A request ready to be sent, with what is needed to read its response.
struct Delegation {
    request: SubschemaRequest,
    context: DelegationContext,
    pipeline: Arc<Vec<Arc<dyn Transform>>>,
}

impl Delegation {
    fn prepare(options: DelegationOptions<'_>) -> Result<Self, DelegationError> {
        let request = create_request(&options)?;
        let DelegationOptions {
            subschema,
            info,
            args,
            transforms,
            skip_validation,
            ..
        } = options;
        let context = DelegationContext {
            schema: info.schema().clone(),
            subschema,
            field_name: options.field_name.unwrap_or_else(|| info.field_name.clone()),
            return_type: options
                .return_type
                .unwrap_or_else(|| info.return_type.clone()),
            args,
        };

        let entry = context.entry();
        let pipeline = pipeline(transforms, &entry.subschema().transforms);

        let mut request = request;
        for transform in &pipeline {
            request = transform.transform_request(request, &context)?;
        }
        tracing::trace!(
            subschema = entry.subschema().name(),
            document = %request.document,
            "delegated request"
        );

        if !skip_validation
            && let Err(invalid) = request
                .document
                .to_executable_validate(context.target_schema())
        {
            return Err(DelegationError::Validation(CombinedError::from_diagnostics(
                &invalid.errors,
            )));
        }

        Ok(Self {
            request,
            context,
            pipeline: Arc::new(pipeline),
        })
    }
}

/// The transforms a delegated request runs through, in request order.
///
/// Delegation and subschema transforms both wrap the schema they are given, so each list runs
/// last one first.
fn pipeline(
    transforms: Vec<Arc<dyn Transform>>,
    subschema_transforms: &[Arc<dyn Transform>],
) -> Vec<Arc<dyn Transform>> {
    let mut pipeline: Vec<Arc<dyn Transform>> =
        vec![Arc::new(AddSelectionSets), Arc::new(ExpandAbstractTypes)];
    pipeline.extend(transforms.into_iter().rev());
    pipeline.extend(subschema_transforms.iter().rev().cloned());
    pipeline.push(Arc::new(AddArgumentsAsVariables));
    pipeline.push(Arc::new(FilterToSchema));
    pipeline.push(Arc::new(AddTypenameToAbstract));
    pipeline
}

/// Runs the result hooks of `pipeline` over `response`, last transform first, then reconciles
/// the value of the delegated field.
async fn resolve_response(
    mut response: graphql::Response,
    context: &DelegationContext,
    pipeline: &[Arc<dyn Transform>],
    info: &ResolveInfo,
    skip_type_merging: bool,
) -> Resolved {
    for transform in pipeline.iter().rev() {
        response = transform.transform_result(response, context);
    }
    let data = response
        .data
        .as_mut()
        .and_then(Value::as_object_mut)
        .and_then(|data| data.remove(context.field_name.as_str()))
        .unwrap_or(Value::Null);
    handle_result(
        &context.return_type,
        data,
        response.errors,
        context.subschema,
        info,
        skip_type_merging,
    )
    .await
}

/// Delegates a query or mutation field to a subschema.
///
/// Errors returned abort the delegation; errors met by the subschema are carried in the
/// [`Resolved`] value, each one at its place.
#[tracing::instrument(skip_all, level = "trace", fields(subschema = options.subschema.index(), field_name = %options.field_name()))]
pub async fn delegate_to_schema(
    options: DelegationOptions<'_>,
) -> Result<Resolved, DelegationError> {
    let info = options.info;
    let skip_type_merging = options.skip_type_merging;
    let Delegation {
        request,
        context,
        pipeline,
    } = Delegation::prepare(options)?;

    let subschema = context.subschema();
    let Some(executor) = &subschema.executor else {
        tracing::warn!(subschema = subschema.name(), "subschema has no executor");
        return Err(DelegationError::MissingExecutor {
            subschema: subschema.name().to_string(),
        });
    };
    let response = executor.execute(request).await.map_err(|error| {
        DelegationError::SubschemaRequestFailed {
            subschema: subschema.name().to_string(),
            reason: error.to_string(),
        }
    })?;
    Ok(resolve_response(response, &context, &pipeline, info, skip_type_merging).await)
}

/// Delegates a subscription field to a subschema.
///
/// Each event of the subschema is reconciled like a query result. Dropping the returned stream
/// drops the subscription to the subschema.
#[tracing::instrument(skip_all, level = "trace", fields(subschema = options.subschema.index(), field_name = %options.field_name()))]
pub async fn delegate_subscription(
    options: DelegationOptions<'_>,
) -> Result<BoxStream<'static, Resolved>, DelegationError> {
    let info = options.info.clone();
    let skip_type_merging = options.skip_type_merging;
    let options = options.with_operation(OperationKind::Subscription);
    let Delegation {
        request,
        context,
        pipeline,
    } = Delegation::prepare(options)?;

    let subschema = context.subschema();
    let Some(subscriber) = &subschema.subscriber else {
        tracing::warn!(subschema = subschema.name(), "subschema has no subscriber");
        return Err(DelegationError::MissingSubscriber {
            subschema: subschema.name().to_string(),
        });
    };
    let events = subscriber.subscribe(request).await.map_err(|error| {
        DelegationError::SubschemaRequestFailed {
            subschema: subschema.name().to_string(),
            reason: error.to_string(),
        }
    })?;

    Ok(events
        .then(move |response| {
            let context = context.clone();
            let pipeline = pipeline.clone();
            let info = info.clone();
            async move {
                resolve_response(response, &context, &pipeline, &info, skip_type_merging).await
            }
        })
        .boxed())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::transforms::tests::delegation_context;
    use crate::transforms::tests::request;

    struct Recording {
        label: &'static str,
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Transform for Recording {
        fn transform_request(
            &self,
            request: SubschemaRequest,
            _context: &DelegationContext,
        ) -> Result<SubschemaRequest, DelegationError> {
            self.seen.lock().unwrap().push(self.label);
            Ok(request)
        }
    }

    #[test]
    fn transform_lists_run_last_one_first() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recording = |label| -> Arc<dyn Transform> {
            Arc::new(Recording {
                label,
                seen: seen.clone(),
            })
        };
        let pipeline = pipeline(
            vec![recording("delegation 1"), recording("delegation 2")],
            &[recording("subschema 1"), recording("subschema 2")],
        );

        let context = delegation_context(None);
        let mut request = request(r#"{ productByUpc(upc: "1") { price } }"#);
        for transform in &pipeline {
            request = transform.transform_request(request, &context).unwrap();
        }

        assert_eq!(
            *seen.lock().unwrap(),
            ["delegation 2", "delegation 1", "subschema 2", "subschema 1"]
        );
    }
}
