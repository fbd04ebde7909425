use apollo_compiler::name;
use apollo_stitching::MergedTypeConfig;
use apollo_stitching::StitchingConfig;
use apollo_stitching::Subschema;
use apollo_stitching::graphql;
use apollo_stitching::json_ext::Path;
use apollo_stitching::stitch_schemas;
use apollo_stitching::subschema::SubschemaRequest;
use apollo_stitching::subschema::executor_fn;
use pretty_assertions::assert_eq;
use serde_json_bytes::json;
use tower::BoxError;

use crate::common::INVENTORY;
use crate::common::Received;
use crate::common::context;
use crate::common::inventory;
use crate::common::parse;
use crate::common::products;
use crate::common::request;

#[tokio::test]
async fn merged_fields_are_fetched_in_one_batch() {
    let from_products = Received::default();
    let from_inventory = Received::default();
    let schema = stitch_schemas(
        StitchingConfig::new()
            .with_subschema(products(&from_products))
            .with_subschema(inventory(&from_inventory)),
    )
    .unwrap();

    let response = schema
        .execute(request("{ topProducts { upc name price } }"), context())
        .await;

    assert_eq!(response.errors, vec![]);
    assert_eq!(
        response.data,
        Some(json!({
            "topProducts": [
                {"upc": "1", "name": "Table", "price": 899},
                {"upc": "2", "name": "Couch", "price": 1299}
            ]
        }))
    );
    assert_eq!(from_products.documents().len(), 1);
    assert!(!from_products.documents()[0].contains("price"));
    let documents = from_inventory.documents();
    assert_eq!(documents.len(), 1);
    assert!(documents[0].contains("productsByUpc"));
    assert!(documents[0].contains("price"));
}

#[tokio::test]
async fn fields_of_a_single_subschema_are_not_merged() {
    let from_products = Received::default();
    let from_inventory = Received::default();
    let schema = stitch_schemas(
        StitchingConfig::new()
            .with_subschema(products(&from_products))
            .with_subschema(inventory(&from_inventory)),
    )
    .unwrap();

    let response = schema
        .execute(request("{ topProducts { name } }"), context())
        .await;

    assert_eq!(
        response.data,
        Some(json!({"topProducts": [{"name": "Table"}, {"name": "Couch"}]}))
    );
    assert!(from_inventory.documents().is_empty());
}

#[tokio::test]
async fn errors_of_a_merged_field_surface_at_the_field() {
    let from_products = Received::default();
    let failing = executor_fn(|_request: SubschemaRequest| async {
        Ok::<_, BoxError>(
            graphql::Response::builder()
                .data(json!({"productByUpc": null}))
                .error(
                    graphql::Error::builder()
                        .message("a")
                        .path(Path::from("productByUpc"))
                        .build(),
                )
                .error(
                    graphql::Error::builder()
                        .message("b")
                        .path(Path::from("productByUpc"))
                        .build(),
                )
                .build(),
        )
    });
    let inventory = Subschema::new("inventory", parse(INVENTORY, "inventory.graphql"))
        .with_executor(failing)
        .with_merged_type(
            name!("Product"),
            MergedTypeConfig::new()
                .with_selection_set("{ upc }")
                .with_field_name("productByUpc"),
        );
    let schema = stitch_schemas(
        StitchingConfig::new()
            .with_subschema(products(&from_products))
            .with_subschema(inventory),
    )
    .unwrap();

    let response = schema
        .execute(request("{ topProducts { upc price } }"), context())
        .await;

    assert_eq!(
        response.data,
        Some(json!({
            "topProducts": [
                {"upc": "1", "price": null},
                {"upc": "2", "price": null}
            ]
        }))
    );
    assert_eq!(response.errors.len(), 2);
    assert_eq!(response.errors[0].message, "a\nb");
    assert_eq!(
        response.errors[0].path,
        Some(Path::from("topProducts/0/price"))
    );
    assert_eq!(
        response.errors[1].path,
        Some(Path::from("topProducts/1/price"))
    );
}

#[tokio::test]
async fn unknown_fields_are_rejected_before_delegation() {
    let from_products = Received::default();
    let schema = stitch_schemas(StitchingConfig::new().with_subschema(products(&from_products)))
        .unwrap();

    let response = schema
        .execute(request("{ topProducts { weight } }"), context())
        .await;

    assert_eq!(response.data, None);
    assert!(
        response
            .errors
            .iter()
            .any(|error| error.message.contains("weight"))
    );
    assert!(response.errors.iter().all(|error| {
        error.extension_code().as_deref() == Some("GRAPHQL_VALIDATION_FAILED")
    }));
    assert!(from_products.documents().is_empty());
}
