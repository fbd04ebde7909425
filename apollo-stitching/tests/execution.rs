use apollo_stitching::StitchingConfig;
use apollo_stitching::graphql;
use apollo_stitching::json_ext::Path;
use apollo_stitching::stitch_schemas;
use pretty_assertions::assert_eq;
use serde_json_bytes::json;

use crate::common::PRODUCTS;
use crate::common::Received;
use crate::common::context;
use crate::common::mocked;
use crate::common::products;
use crate::common::request;

const STATS: &str = r#"
    type Query {
        count: Int
        flag: Boolean
        ratio: Float
        id: ID
        label: String
        status: Status
        big: Int
        custom: JSON
    }

    enum Status {
        OPEN
        CLOSED
    }

    scalar JSON
"#;

#[tokio::test]
async fn leaf_values_are_checked_against_their_types() {
    let stats = mocked(
        "stats",
        STATS,
        &Received::default(),
        json!({
            "count": "not a number",
            "flag": {"nested": 1},
            "ratio": 2,
            "id": 7,
            "label": true,
            "status": "UNKNOWN",
            "big": 3_000_000_000_i64,
            "custom": {"any": ["thing"]}
        }),
    );
    let schema = stitch_schemas(StitchingConfig::new().with_subschema(stats)).unwrap();

    let response = schema
        .execute(
            request("{ count flag ratio id label status big custom }"),
            context(),
        )
        .await;

    assert_eq!(
        response.data,
        Some(json!({
            "count": null,
            "flag": null,
            "ratio": 2,
            "id": 7,
            "label": null,
            "status": null,
            "big": null,
            "custom": {"any": ["thing"]}
        }))
    );
    assert_eq!(
        response
            .errors
            .iter()
            .map(|error| error.path.clone())
            .collect::<Vec<_>>(),
        ["count", "flag", "label", "status", "big"]
            .map(|field| Some(Path::from(field)))
            .to_vec()
    );
    assert!(
        response
            .errors
            .iter()
            .any(|error| error.message.contains("non 32-bit signed integer"))
    );
}

#[tokio::test]
async fn wrongly_typed_variables_are_rejected_before_delegation() {
    let received = Received::default();
    let schema = stitch_schemas(StitchingConfig::new().with_subschema(products(&received)))
        .unwrap();

    let mut variables = serde_json_bytes::Map::new();
    variables.insert("first", json!("five"));
    let response = schema
        .execute(
            graphql::Request::builder()
                .query("query($first: Int) { topProducts(first: $first) { upc } }")
                .variables(variables)
                .build(),
            context(),
        )
        .await;

    assert_eq!(response.data, None);
    assert_eq!(response.errors.len(), 1);
    assert_eq!(
        response.errors[0].extension_code().as_deref(),
        Some("BAD_USER_INPUT")
    );
    assert!(received.documents().is_empty());
}

#[tokio::test]
async fn required_variables_are_enforced() {
    let received = Received::default();
    let subschema = mocked("products", PRODUCTS, &received, json!({"topProducts": []}));
    let schema = stitch_schemas(StitchingConfig::new().with_subschema(subschema)).unwrap();

    let response = schema
        .execute(
            request("query($first: Int!) { topProducts(first: $first) { upc } }"),
            context(),
        )
        .await;

    assert_eq!(response.data, None);
    assert_eq!(response.errors.len(), 1);
    assert!(received.documents().is_empty());
}
