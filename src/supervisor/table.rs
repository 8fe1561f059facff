//! Per-service handles and restart tokens, built together at configure time.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::container::ContainerHandle;
use crate::plugins::RuntimeLookup;
use crate::policies::BackoffPolicy;

/// Immutable after configure; iterated by run and stop.
///
/// Every key of `handles` has exactly one entry in `cancel_tokens`.
pub(crate) struct ServiceTable {
    pub(crate) handles: BTreeMap<String, Arc<ContainerHandle>>,
    pub(crate) cancel_tokens: BTreeMap<String, CancellationToken>,
    pub(crate) backoff: BackoffPolicy,
}

impl ServiceTable {
    pub(crate) fn new(backoff: BackoffPolicy) -> Self {
        Self {
            handles: BTreeMap::new(),
            cancel_tokens: BTreeMap::new(),
            backoff,
        }
    }

    /// Adds a service; returns `false` if the id is taken.
    pub(crate) fn insert(&mut self, handle: ContainerHandle) -> bool {
        let id = handle.id().to_string();
        if self.handles.contains_key(&id) {
            return false;
        }
        self.cancel_tokens.insert(id.clone(), CancellationToken::new());
        self.handles.insert(id, Arc::new(handle));
        true
    }

    /// Pairs every handle with its token.
    pub(crate) fn entries(&self) -> impl Iterator<Item = (&Arc<ContainerHandle>, &CancellationToken)> {
        self.handles
            .iter()
            .filter_map(|(id, h)| self.cancel_tokens.get(id).map(|t| (h, t)))
    }
}

impl RuntimeLookup for ServiceTable {
    fn ids(&self) -> Vec<String> {
        self.handles.keys().cloned().collect()
    }

    fn handle(&self, id: &str) -> Option<Arc<ContainerHandle>> {
        self.handles.get(id).cloned()
    }
}
