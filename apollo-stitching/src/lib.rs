//! Schema stitching: one GraphQL schema assembled from many GraphQL backends.
//!
//! Each backend is described by a [`Subschema`]: its schema, how to send it requests, the
//! [transforms](transforms) rewriting how the stitched schema sees it, and the merged types it
//! can resolve by key. [`stitch_schemas`] merges subschemas into a [`StitchedSchema`], which
//! executes operations by delegating root fields to their owners and completing objects spread
//! across subschemas with further delegations.
//!
//! ```ignore
//! let schema = stitch_schemas(
//!     StitchingConfig::new()
//!         .with_subschema(Subschema::new("products", products).with_executor(products_executor))
//!         .with_subschema(
//!             Subschema::new("inventory", inventory)
//!                 .with_executor(inventory_executor)
//!                 .with_merged_type(
//!                     name!("Product"),
//!                     MergedTypeConfig::new()
//!                         .with_selection_set("{ upc }")
//!                         .with_field_name("productByUpc"),
//!                 ),
//!         ),
//! )?;
//! let response = schema.execute(request, Context::new()).await;
//! ```

#![warn(
    rustdoc::broken_intra_doc_links,
    unreachable_pub,
    unreachable_patterns,
    unused,
    unused_qualifications,
    dead_code,
    while_true,
    unconditional_panic,
    clippy::all
)]

pub mod context;
pub mod delegate;
pub mod error;
pub mod execution;
pub mod graphql;
pub mod json_ext;
pub mod merge;
pub mod result;
pub mod schema;
pub mod stitch;
pub mod subschema;
pub mod transforms;
pub(crate) mod utils;

pub use crate::context::Context;
pub use crate::delegate::DelegationOptions;
pub use crate::delegate::delegate_subscription;
pub use crate::delegate::delegate_to_schema;
pub use crate::error::DelegationError;
pub use crate::error::StitchingError;
pub use crate::execution::ResolveInfo;
pub use crate::execution::StitchedSchema;
pub use crate::result::Resolved;
pub use crate::schema::OperationKind;
pub use crate::stitch::MergeTypes;
pub use crate::stitch::StitchingConfig;
pub use crate::stitch::stitch_schemas;
pub use crate::subschema::MergedTypeConfig;
pub use crate::subschema::Subschema;
pub use crate::subschema::SubschemaId;
pub use crate::transforms::Transform;
