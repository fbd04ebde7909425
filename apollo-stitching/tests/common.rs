use std::sync::Arc;

use apollo_compiler::Schema;
use apollo_compiler::name;
use apollo_compiler::validation::Valid;
use apollo_stitching::Context;
use apollo_stitching::MergedTypeConfig;
use apollo_stitching::Subschema;
use apollo_stitching::graphql;
use apollo_stitching::json_ext::Value;
use apollo_stitching::subschema::SubschemaRequest;
use apollo_stitching::subschema::executor_fn;
use parking_lot::Mutex;
use serde_json_bytes::json;
use tower::BoxError;

pub(crate) const PRODUCTS: &str = r#"
    type Query {
        topProducts(first: Int = 5): [Product]
    }

    type Product {
        upc: String!
        name: String
    }
"#;

pub(crate) const INVENTORY: &str = r#"
    type Query {
        productsByUpc(ids: [String!]!): [Product]
        productByUpc(upc: String!): Product
    }

    type Product {
        upc: String!
        price: Int
    }
"#;

/// Documents received by a mocked subschema, printed.
#[derive(Clone, Default)]
pub(crate) struct Received(Arc<Mutex<Vec<String>>>);

impl Received {
    pub(crate) fn record(&self, request: &SubschemaRequest) {
        self.0.lock().push(request.document.to_string());
    }

    pub(crate) fn documents(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

pub(crate) fn parse(sdl: &str, path: &str) -> Valid<Schema> {
    Schema::parse_and_validate(sdl, path).unwrap()
}

/// A subschema answering every request with `data`.
pub(crate) fn mocked(name: &str, sdl: &str, received: &Received, data: Value) -> Subschema {
    let received = received.clone();
    Subschema::new(name, parse(sdl, &format!("{name}.graphql"))).with_executor(executor_fn(
        move |request: SubschemaRequest| {
            let received = received.clone();
            let data = data.clone();
            async move {
                received.record(&request);
                Ok::<_, BoxError>(graphql::Response::builder().data(data).build())
            }
        },
    ))
}

pub(crate) fn products(received: &Received) -> Subschema {
    mocked(
        "products",
        PRODUCTS,
        received,
        json!({
            "topProducts": [
                {"upc": "1", "name": "Table"},
                {"upc": "2", "name": "Couch"}
            ]
        }),
    )
}

fn price(upc: &Value) -> Value {
    match upc.as_str() {
        Some("1") => json!(899),
        Some("2") => json!(1299),
        _ => Value::Null,
    }
}

/// Inventory resolving products in batches, through `productsByUpc`.
pub(crate) fn inventory(received: &Received) -> Subschema {
    let received = received.clone();
    Subschema::new("inventory", parse(INVENTORY, "inventory.graphql"))
        .with_executor(executor_fn(move |request: SubschemaRequest| {
            let received = received.clone();
            async move {
                received.record(&request);
                let upcs = request
                    .variables
                    .iter()
                    .find_map(|(_, value)| value.as_array().cloned())
                    .unwrap_or_default();
                let products = upcs
                    .iter()
                    .map(|upc| json!({"upc": upc.clone(), "price": price(upc)}))
                    .collect::<Vec<_>>();
                Ok::<_, BoxError>(
                    graphql::Response::builder()
                        .data(json!({ "productsByUpc": products }))
                        .build(),
                )
            }
        }))
        .with_merged_type(
            name!("Product"),
            MergedTypeConfig::new()
                .with_selection_set("{ upc }")
                .with_field_name("productsByUpc")
                .with_key(|product| {
                    product
                        .as_object()
                        .and_then(|product| product.get("upc"))
                        .cloned()
                        .unwrap_or(Value::Null)
                }),
        )
}

pub(crate) fn request(query: &str) -> graphql::Request {
    graphql::Request::builder().query(query).build()
}

pub(crate) fn context() -> Context {
    Context::new()
}
