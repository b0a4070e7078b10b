//! View relevance tickets.
//!
//! Every navigation takes a new [`ViewTicket`] from the [`ViewTracker`],
//! which makes all earlier tickets stale. Work started for a stale view may
//! still finish (and still populate the cache), but its result is handed
//! back as [`Delivery::Superseded`] instead of the data.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct ViewTracker {
    generation: Arc<AtomicU64>,
}

impl ViewTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new view. All previously issued tickets become stale.
    pub fn navigate(&self) -> ViewTicket {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        ViewTicket {
            generation,
            current: self.generation.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ViewTicket {
    generation: u64,
    current: Arc<AtomicU64>,
}

impl ViewTicket {
    /// A ticket with its own tracker, for one-shot requests that no later
    /// navigation can supersede.
    pub fn detached() -> Self {
        ViewTracker::new().navigate()
    }

    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }

    /// Hand `value` over only if this view is still the active one.
    pub fn deliver<T>(&self, value: T) -> Delivery<T> {
        if self.is_current() {
            Delivery::Fresh(value)
        } else {
            Delivery::Superseded
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Delivery<T> {
    Fresh(T),
    Superseded,
}

impl<T> Delivery<T> {
    pub fn into_fresh(self) -> Option<T> {
        match self {
            Delivery::Fresh(value) => Some(value),
            Delivery::Superseded => None,
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, Delivery::Superseded)
    }
}
