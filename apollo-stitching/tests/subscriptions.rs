use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use apollo_stitching::StitchingConfig;
use apollo_stitching::Subschema;
use apollo_stitching::graphql;
use apollo_stitching::stitch_schemas;
use apollo_stitching::subschema::SubschemaRequest;
use apollo_stitching::subschema::subscriber_fn;
use futures::StreamExt;
use futures::stream;
use pretty_assertions::assert_eq;
use serde_json_bytes::json;
use tower::BoxError;

use crate::common::context;
use crate::common::parse;
use crate::common::request;

const EVENTS: &str = r#"
    type Query {
        latest: Int
    }

    type Subscription {
        count: Int
    }
"#;

fn event(count: i64) -> graphql::Response {
    graphql::Response::builder()
        .data(json!({ "count": count }))
        .build()
}

/// Sets its flag when dropped.
struct Teardown(Arc<AtomicBool>);

impl Drop for Teardown {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn events_are_delivered_in_order() {
    let events = Subschema::new("events", parse(EVENTS, "events.graphql")).with_subscriber(
        subscriber_fn(|_request: SubschemaRequest| async {
            Ok::<_, BoxError>(stream::iter(vec![event(1), event(2)]).boxed())
        }),
    );
    let schema = stitch_schemas(StitchingConfig::new().with_subschema(events)).unwrap();

    let responses = schema
        .subscribe(request("subscription { count }"), context())
        .await
        .collect::<Vec<_>>()
        .await;

    assert_eq!(
        responses
            .into_iter()
            .map(|response| response.data)
            .collect::<Vec<_>>(),
        vec![Some(json!({"count": 1})), Some(json!({"count": 2}))]
    );
}

#[tokio::test]
async fn dropping_the_stream_releases_the_subschema_subscription() {
    let released = Arc::new(AtomicBool::new(false));
    let teardown = released.clone();
    let events = Subschema::new("events", parse(EVENTS, "events.graphql")).with_subscriber(
        subscriber_fn(move |_request: SubschemaRequest| {
            let teardown = Teardown(teardown.clone());
            async move {
                let events = stream::iter(vec![event(1)])
                    .chain(stream::pending())
                    .map(move |response| {
                        let _teardown = &teardown;
                        response
                    });
                Ok::<_, BoxError>(events.boxed())
            }
        }),
    );
    let schema = stitch_schemas(StitchingConfig::new().with_subschema(events)).unwrap();

    let mut responses = schema
        .subscribe(request("subscription { count }"), context())
        .await;
    let first = responses.next().await.unwrap();
    assert_eq!(first.data, Some(json!({"count": 1})));
    assert!(!released.load(Ordering::SeqCst));

    drop(responses);
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test]
async fn subscriptions_without_a_subscriber_fail() {
    let events = Subschema::new("events", parse(EVENTS, "events.graphql"));
    let schema = stitch_schemas(StitchingConfig::new().with_subschema(events)).unwrap();

    let responses = schema
        .subscribe(request("subscription { count }"), context())
        .await
        .collect::<Vec<_>>()
        .await;

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].data, None);
    assert_eq!(
        responses[0].errors[0].extension_code().as_deref(),
        Some("SUBSCHEMA_MISSING_SUBSCRIBER")
    );
}
