//! Propagates a temporary → permanent id mapping into cache and queue.

use tasklane_proto::task::TaskId;

use crate::cache::LocalCache;
use crate::queue::MutationQueue;

/// Ephemeral mapping produced by one successful create replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityMapping {
    /// Client-minted id.
    pub temporary: TaskId,
    /// Server-assigned id.
    pub permanent: TaskId,
}

/// What a reconciliation changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Whether the cache held an entry under the temporary id.
    pub cache_rewritten: bool,
    /// Number of queue entries whose reference was rewritten.
    pub queue_rewritten: usize,
}

impl ReconcileOutcome {
    /// Whether nothing referenced the temporary id any more.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        !self.cache_rewritten && self.queue_rewritten == 0
    }
}

/// Rewrites every reference to `mapping.temporary` into `mapping.permanent`.
///
/// The cache entry keeps its position and all other attributes. A missing
/// cache entry (the task was deleted locally meanwhile) is not an error.
/// Calling this twice with the same mapping changes nothing the second time.
pub fn reconcile(
    cache: &mut LocalCache,
    queue: &mut MutationQueue,
    mapping: &IdentityMapping,
) -> ReconcileOutcome {
    let cache_rewritten = cache.rename(&mapping.temporary, &mapping.permanent);
    let queue_rewritten = queue.rewrite_task_id(&mapping.temporary, &mapping.permanent);
    if !cache_rewritten {
        tracing::debug!(
            temporary = %mapping.temporary,
            "no cached task under temporary id, skipping cache rewrite"
        );
    }
    ReconcileOutcome {
        cache_rewritten,
        queue_rewritten,
    }
}
