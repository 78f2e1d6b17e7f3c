//! # types
//!
//! why: give the identifiers raft passes around a name and a home
//! relations: used by every other module in raft-core and by raft-storage for persisted records
//! what: MemberId/Term/LogIndex aliases, TermInfo, EntryMeta, SnapshotMeta, PeerInfo

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a cluster member
pub type MemberId = u64;

/// Election epoch
pub type Term = u64;

/// Position in the replicated log (1-indexed, 0 means "no entry")
pub type LogIndex = u64;

/// The durable election state of a member: current term and the vote cast in it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermInfo {
    pub term: Term,
    pub voted_for: Option<MemberId>,
}

impl TermInfo {
    pub fn new(term: Term, voted_for: Option<MemberId>) -> Self {
        Self { term, voted_for }
    }

    /// A term with no vote cast yet
    pub fn voteless(term: Term) -> Self {
        Self { term, voted_for: None }
    }
}

impl fmt::Display for TermInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.voted_for {
            Some(id) => write!(f, "term {} (voted for {})", self.term, id),
            None => write!(f, "term {} (no vote)", self.term),
        }
    }
}

/// Position of an entry in the global log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryMeta {
    pub index: LogIndex,
    pub term: Term,
}

impl EntryMeta {
    pub fn new(index: LogIndex, term: Term) -> Self {
        Self { index, term }
    }
}

impl fmt::Display for EntryMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.index, self.term)
    }
}

/// Boundary covered by a snapshot: everything up to and including this entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub last_included_index: LogIndex,
    pub last_included_term: Term,
}

impl SnapshotMeta {
    pub fn new(last_included_index: LogIndex, last_included_term: Term) -> Self {
        Self {
            last_included_index,
            last_included_term,
        }
    }

    pub fn last_included(&self) -> EntryMeta {
        EntryMeta::new(self.last_included_index, self.last_included_term)
    }
}

/// A configured member of the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: MemberId,
    /// non-voting members replicate but never vote or count toward commit
    pub voting: bool,
}

impl PeerInfo {
    pub fn voting(id: MemberId) -> Self {
        Self { id, voting: true }
    }

    pub fn non_voting(id: MemberId) -> Self {
        Self { id, voting: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_term_info_is_voteless_zero() {
        let info = TermInfo::default();
        assert_eq!(info.term, 0);
        assert_eq!(info.voted_for, None);
    }

    #[test]
    fn entry_meta_orders_by_index_first() {
        assert!(EntryMeta::new(1, 9) < EntryMeta::new(2, 1));
        assert_eq!(EntryMeta::new(3, 2).to_string(), "3@2");
    }
}
