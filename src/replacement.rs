//! Victim selection for the page fault handler.
//!
//! A policy tracks every resident page in the system and hands one back when
//! a fault needs a frame. Pages are registered when the loader makes them
//! resident and again when a fault installs them.

use std::collections::VecDeque;
use std::fmt;

use serde::Deserialize;

use crate::page_table::{PageRef, SpaceId};

pub trait EvictionPolicy {
    /// Register a page that became resident while loading an image
    fn on_load(&mut self, page: PageRef);

    /// Register a page that became resident by servicing a fault
    fn on_install(&mut self, page: PageRef);

    /// Note that a resident page was referenced
    fn on_access(&mut self, _page: PageRef) {}

    /// Choose a victim and stop tracking it
    fn select_victim(&mut self) -> Option<PageRef>;

    /// Drop every page belonging to a destroyed address space
    fn forget_space(&mut self, space: SpaceId);

    /// Tracked pages, next victim first
    fn tracked(&self) -> Vec<PageRef>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn kind(&self) -> PolicyKind;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    #[default]
    Fifo,
    Lru,
}

impl PolicyKind {
    pub fn build(self) -> Box<dyn EvictionPolicy> {
        match self {
            PolicyKind::Fifo => Box::new(FifoPolicy::new()),
            PolicyKind::Lru => Box::new(LruPolicy::new()),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyKind::Fifo => write!(f, "fifo"),
            PolicyKind::Lru => write!(f, "lru"),
        }
    }
}

/// Evicts pages in the order they became resident, whatever the access pattern
#[derive(Debug, Default)]
pub struct FifoPolicy {
    queue: VecDeque<PageRef>,
}

impl FifoPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EvictionPolicy for FifoPolicy {
    fn on_load(&mut self, page: PageRef) {
        self.queue.push_back(page);
    }

    fn on_install(&mut self, page: PageRef) {
        self.queue.push_back(page);
    }

    fn select_victim(&mut self) -> Option<PageRef> {
        self.queue.pop_front()
    }

    fn forget_space(&mut self, space: SpaceId) {
        self.queue.retain(|page| page.space != space);
    }

    fn tracked(&self) -> Vec<PageRef> {
        self.queue.iter().copied().collect()
    }

    fn len(&self) -> usize {
        self.queue.len()
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::Fifo
    }
}

/// Evicts the page referenced longest ago.
///
/// The list is kept in recency order: every reference moves the page to the
/// back, so the front is always the least recently used.
#[derive(Debug, Default)]
pub struct LruPolicy {
    recency: VecDeque<PageRef>,
}

impl LruPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    fn detach(&mut self, page: PageRef) -> bool {
        match self.recency.iter().position(|&p| p == page) {
            Some(index) => {
                self.recency.remove(index);
                true
            }
            None => false,
        }
    }
}

impl EvictionPolicy for LruPolicy {
    fn on_load(&mut self, page: PageRef) {
        self.recency.push_back(page);
    }

    fn on_install(&mut self, page: PageRef) {
        self.detach(page);
        self.recency.push_back(page);
    }

    fn on_access(&mut self, page: PageRef) {
        // Only resident pages are tracked; ignore anything else.
        if self.detach(page) {
            self.recency.push_back(page);
        }
    }

    fn select_victim(&mut self) -> Option<PageRef> {
        self.recency.pop_front()
    }

    fn forget_space(&mut self, space: SpaceId) {
        self.recency.retain(|page| page.space != space);
    }

    fn tracked(&self) -> Vec<PageRef> {
        self.recency.iter().copied().collect()
    }

    fn len(&self) -> usize {
        self.recency.len()
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::Lru
    }
}
