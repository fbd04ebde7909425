//! Stitching errors.
use std::fmt;

use apollo_compiler::Name;
use apollo_compiler::validation::DiagnosticList;
use displaydoc::Display;
use itertools::Itertools;
use serde_json_bytes::Value;
use thiserror::Error;

use crate::graphql;
use crate::graphql::ErrorExtension;
use crate::json_ext::Path;

/// Errors raised while building a stitched schema.
///
/// These are fatal: no stitched schema is produced.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StitchingError {
    /// type "{type_name}" is defined with conflicting kinds across subschemas: {kinds}
    ConflictingTypeKinds {
        /// The type being merged.
        type_name: Name,
        /// The kinds found, in candidate order.
        kinds: String,
    },

    /// type name "{0}" is defined more than once after healing
    DuplicateTypeName(Name),

    /// subschema name "{0}" is used more than once
    DuplicateSubschemaName(String),

    /// invalid selection set `{selection_set}`: {reason}
    InvalidSelectionSet {
        /// The selection set as written in the configuration.
        selection_set: String,
        /// What was wrong with it.
        reason: String,
    },

    /// invalid type definitions: {0}
    InvalidTypeDefs(String),

    /// the stitched schema is invalid: {0}
    InvalidSchema(String),

    /// resolver defined for unknown field "{type_name}.{field_name}"
    UnknownResolverField {
        /// The parent type of the resolver.
        type_name: String,
        /// The field of the resolver.
        field_name: String,
    },

    /// merge configuration for type "{type_name}" in subschema "{subschema}" refers to an unknown type
    UnknownMergedType {
        /// The subschema declaring the merge configuration.
        subschema: String,
        /// The configured type name.
        type_name: String,
    },

    /// "{0}" is not a valid GraphQL name
    InvalidName(String),
}

pub(crate) fn diagnostics_to_string(errors: &DiagnosticList) -> String {
    errors
        .iter()
        .map(|diagnostic| diagnostic.error.to_string())
        .join("\n")
}

/// Errors raised by a single delegation to a subschema.
///
/// These abort the delegation and surface as a field error at the delegating field.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DelegationError {
    /// subschema '{subschema}' has no executor
    MissingExecutor {
        /// The subschema which was targeted.
        subschema: String,
    },

    /// subschema '{subschema}' has no subscriber
    MissingSubscriber {
        /// The subschema which was targeted.
        subschema: String,
    },

    /// field '{field_name}' is not a root field of subschema '{subschema}'
    UnknownRootField {
        /// The subschema which was targeted.
        subschema: String,
        /// The target root field.
        field_name: String,
    },

    /// {0}
    Validation(CombinedError),

    /// request to subschema '{subschema}' failed: {reason}
    SubschemaRequestFailed {
        /// The subschema which failed.
        subschema: String,
        /// The failure reason.
        reason: String,
    },

    /// subschema '{subschema}' response was malformed: {reason}
    MalformedResponse {
        /// The subschema which sent the malformed response.
        subschema: String,
        /// What was wrong with the response.
        reason: String,
    },

    /// invalid delegation request: {0}
    InvalidRequest(String),
}

impl DelegationError {
    /// Convert the delegation error to a GraphQL error.
    pub fn to_graphql_error(&self, path: Option<Path>) -> graphql::Error {
        if let DelegationError::Validation(combined) = self {
            let mut error = combined.to_graphql_error(path);
            error
                .extensions
                .insert("code", self.extension_code().into());
            return error;
        }
        let mut error = graphql::Error::builder()
            .message(self.to_string())
            .and_path(path)
            .extension_code(self.extension_code())
            .build();
        match self {
            DelegationError::MissingExecutor { subschema }
            | DelegationError::MissingSubscriber { subschema }
            | DelegationError::UnknownRootField { subschema, .. }
            | DelegationError::SubschemaRequestFailed { subschema, .. }
            | DelegationError::MalformedResponse { subschema, .. } => {
                error
                    .extensions
                    .insert("service", subschema.clone().into());
            }
            DelegationError::Validation(_) | DelegationError::InvalidRequest(_) => {}
        }
        error
    }
}

impl ErrorExtension for DelegationError {
    fn extension_code(&self) -> String {
        match self {
            DelegationError::MissingExecutor { .. } => "SUBSCHEMA_MISSING_EXECUTOR",
            DelegationError::MissingSubscriber { .. } => "SUBSCHEMA_MISSING_SUBSCRIBER",
            DelegationError::UnknownRootField { .. } => "SUBSCHEMA_UNKNOWN_ROOT_FIELD",
            DelegationError::Validation(_) => "SUBSCHEMA_VALIDATION_FAILED",
            DelegationError::SubschemaRequestFailed { .. } => "SUBSCHEMA_REQUEST_FAILED",
            DelegationError::MalformedResponse { .. } => "SUBSCHEMA_MALFORMED_RESPONSE",
            DelegationError::InvalidRequest(_) => "SUBSCHEMA_INVALID_REQUEST",
        }
        .to_string()
    }
}

/// Several errors reported as one.
///
/// Used when a whole subtree collapses to `null`, and for validation of a
/// delegated document.
#[derive(Error, Debug, Clone, PartialEq, Eq, Default)]
pub struct CombinedError {
    /// The leaf errors, in the order they were reported.
    pub errors: Vec<graphql::Error>,
}

impl CombinedError {
    pub fn new(errors: Vec<graphql::Error>) -> Self {
        Self { errors }
    }

    pub(crate) fn from_diagnostics(errors: &DiagnosticList) -> Self {
        Self::new(
            errors
                .iter()
                .map(|diagnostic| {
                    graphql::Error::builder()
                        .message(diagnostic.error.to_string())
                        .build()
                })
                .collect(),
        )
    }

    /// Convert into one GraphQL error located at `path`.
    ///
    /// A single leaf error is relocated as-is. Several leaves become one error whose message
    /// joins theirs; the leaves are kept under `extensions.errors`.
    pub fn to_graphql_error(&self, path: Option<Path>) -> graphql::Error {
        match self.errors.as_slice() {
            [single] => graphql::Error {
                path,
                ..single.clone()
            },
            errors => {
                let leaves = errors
                    .iter()
                    .filter_map(|error| serde_json_bytes::to_value(error).ok())
                    .collect::<Vec<Value>>();
                graphql::Error::builder()
                    .message(self.to_string())
                    .and_path(path)
                    .extension("errors", Value::Array(leaves))
                    .build()
            }
        }
    }
}

impl fmt::Display for CombinedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.errors.iter().map(|e| &e.message).join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn combined_error_joins_messages() {
        let combined = CombinedError::new(vec![
            graphql::Error::builder().message("first").build(),
            graphql::Error::builder().message("second").build(),
        ]);
        let error = combined.to_graphql_error(Some(Path::from("topProducts/0/price")));
        assert_snapshot!(error.message, @r"
        first
        second
        ");
        assert_eq!(error.path, Some(Path::from("topProducts/0/price")));
        assert_eq!(
            error.extensions.get("errors").and_then(|e| e.as_array()).map(Vec::len),
            Some(2)
        );
    }

    #[test]
    fn combined_error_with_single_leaf_is_relocated() {
        let combined = CombinedError::new(vec![
            graphql::Error::builder()
                .message("not found")
                .path(Path::from("productByUpc"))
                .extension_code("NOT_FOUND")
                .build(),
        ]);
        let error = combined.to_graphql_error(Some(Path::from("topProducts/1/price")));
        assert_eq!(error.message, "not found");
        assert_eq!(error.path, Some(Path::from("topProducts/1/price")));
        assert_eq!(error.extension_code().as_deref(), Some("NOT_FOUND"));
    }

    #[test]
    fn delegation_error_carries_code_and_service() {
        let error = DelegationError::SubschemaRequestFailed {
            subschema: "inventory".to_string(),
            reason: "connection refused".to_string(),
        }
        .to_graphql_error(Some(Path::from("topProducts")));
        assert_snapshot!(
            error.message,
            @"request to subschema 'inventory' failed: connection refused"
        );
        assert_eq!(
            error.extension_code().as_deref(),
            Some("SUBSCHEMA_REQUEST_FAILED")
        );
        assert_eq!(
            error.extensions.get("service").and_then(|s| s.as_str()),
            Some("inventory")
        );
    }
}
