//! Per-user generation permits
//!
//! At most one completion may be in flight per user. A second request while
//! the slot is taken is turned away rather than queued.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Registry of users with a completion in flight
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    users: Arc<Mutex<HashSet<String>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the user's slot, or `None` if a generation is already running
    pub fn try_acquire(&self, user_id: &str) -> Option<GenerationPermit> {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        if users.insert(user_id.to_string()) {
            Some(GenerationPermit {
                users: Arc::clone(&self.users),
                user_id: user_id.to_string(),
            })
        } else {
            None
        }
    }
}

/// Held for the duration of one generation; releases the slot on drop
#[derive(Debug)]
pub struct GenerationPermit {
    users: Arc<Mutex<HashSet<String>>>,
    user_id: String,
}

impl Drop for GenerationPermit {
    fn drop(&mut self) {
        self.users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.user_id);
    }
}
