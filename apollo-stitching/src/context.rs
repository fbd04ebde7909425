//! Provide a [`Context`] for a stitched request.
//!
//! A context is created for each request entering the stitched schema. It is
//! shared by every resolver and every delegation made on behalf of that request,
//! and is handed to subschema executors with each delegated request.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use dashmap::mapref::multiple::RefMulti;
use serde_json_bytes::Value;
use tokio::sync::OnceCell;

use crate::graphql;

/// Identity of one execution of an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OperationId(u64);

impl OperationId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

type MemoKey = (OperationId, usize);
type Memo = OnceCell<Result<Value, graphql::Error>>;

/// Holds [`Context`] entries and the per-operation memo of root-level resolvers.
#[derive(Clone, Debug, Default)]
pub struct Context {
    entries: Arc<DashMap<String, Value>>,
    memo: Arc<DashMap<MemoKey, Arc<Memo>>>,
}

impl Context {
    /// Create a new, empty context.
    pub fn new() -> Self {
        Default::default()
    }

    /// Get a value from the context.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|value| value.clone())
    }

    /// Insert a value into the context, returning the previous value if any.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    /// Returns true if the context contains a value for the specified key.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterate over the entries.
    pub fn iter(&self) -> impl Iterator<Item = RefMulti<'_, String, Value>> + '_ {
        self.entries.iter()
    }

    /// Runs `init` at most once for the pair `(operation, resolver)`.
    ///
    /// Concurrent callers for the same pair wait for the first one and share its outcome.
    pub(crate) async fn run_once<F, Fut>(
        &self,
        operation: OperationId,
        resolver: usize,
        init: F,
    ) -> Result<Value, graphql::Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, graphql::Error>>,
    {
        let cell = self
            .memo
            .entry((operation, resolver))
            .or_default()
            .value()
            .clone();
        cell.get_or_init(init).await.clone()
    }

    /// Drops the memoized resolver outcomes of `operation`.
    pub(crate) fn forget_operation(&self, operation: OperationId) {
        self.memo.retain(|(id, _), _| *id != operation);
    }
}
