use std::{
    collections::HashMap,
    sync::Mutex,
};

use tracing::debug;

use crate::logging::category_engine;

/// OS-level thread identifier.
pub type ThreadId = u64;

#[derive(Default)]
pub(crate) struct IgnoreRegistry {
    counts: Mutex<HashMap<ThreadId, usize>>,
}

impl IgnoreRegistry {
    pub(crate) fn ignore(&self, thread_id: ThreadId) {
        let mut counts = self.counts.lock().expect("ignore registry lock poisoned");
        *counts.entry(thread_id).or_insert(0) += 1;
    }

    pub(crate) fn unignore(&self, thread_id: ThreadId) {
        let mut counts = self.counts.lock().expect("ignore registry lock poisoned");
        match counts.get_mut(&thread_id) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                counts.remove(&thread_id);
            }
            None => debug!(
                "{} unignore for thread {thread_id} that was not ignored",
                category_engine()
            ),
        }
    }

    pub(crate) fn is_ignoring(&self, thread_id: ThreadId) -> bool {
        self.counts
            .lock()
            .expect("ignore registry lock poisoned")
            .contains_key(&thread_id)
    }
}
