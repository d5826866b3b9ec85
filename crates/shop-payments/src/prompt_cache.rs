//! Awaiting-payment prompts: which chat message to delete once a purchase is
//! paid.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Keyed store of prompt message ids by purchase id.
///
/// Calls are synchronous so no lock can be held across an await.
pub trait PromptCache: Send + Sync {
    fn remember(&self, purchase_id: i64, message_id: i64);

    /// Remove and return the prompt for `purchase_id`, if still live.
    fn take(&self, purchase_id: i64) -> Option<i64>;
}

/// In-process cache with a fixed TTL per entry.
pub struct MemoryPromptCache {
    ttl: Duration,
    entries: Mutex<HashMap<i64, (i64, Instant)>>,
}

impl MemoryPromptCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<i64, (i64, Instant)>> {
        // A poisoned map only holds message ids; keep serving it.
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl PromptCache for MemoryPromptCache {
    fn remember(&self, purchase_id: i64, message_id: i64) {
        let now = Instant::now();
        let mut entries = self.lock();
        entries.retain(|_, (_, at)| now.duration_since(*at) < self.ttl);
        entries.insert(purchase_id, (message_id, now));
    }

    fn take(&self, purchase_id: i64) -> Option<i64> {
        let (message_id, at) = self.lock().remove(&purchase_id)?;
        (at.elapsed() < self.ttl).then_some(message_id)
    }
}
