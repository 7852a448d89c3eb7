//! Delegation-chain identity
//!
//! Every construction is built on a chain node. Instances keep the id of
//! their node rather than a pointer, so "same prototype" questions become id
//! comparisons. A node has no payload beyond its id: the arena only hands out
//! ids, and whatever describes a node lives on the instances built from it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainId(u64);

impl ChainId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How the node for a construction is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstructionStyle {
    /// One node per type, shared by all of its instances
    Classic,
    /// A fresh node per construction
    Composed,
}

impl ConstructionStyle {
    pub fn from_old_style(use_old_style: bool) -> Self {
        if use_old_style {
            Self::Classic
        } else {
            Self::Composed
        }
    }
}

/// Source of chain ids for one registry
#[derive(Debug, Default)]
pub struct ChainArena {
    next_id: AtomicU64,
}

impl ChainArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&self) -> ChainId {
        ChainId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Number of ids handed out so far
    pub fn issued(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    fn starting_at(first: u64) -> Self {
        Self {
            next_id: AtomicU64::new(first),
        }
    }
}
