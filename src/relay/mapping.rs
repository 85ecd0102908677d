use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Routing table from a source channel (string id) to the channels its
/// messages are copied into.
///
/// Sources never map to an empty list: removing the last destination drops
/// the source key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelayMapping(BTreeMap<String, Vec<u64>>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyPresent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveTarget {
    /// Every relay of every source.
    All,
    /// Every destination of one source.
    Source(String),
    /// A single source → destination link.
    Pair(String, u64),
}

impl RelayMapping {
    pub fn destinations(&self, source_id: &str) -> &[u64] {
        self.0.get(source_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of source channels.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Total number of source → destination links.
    pub fn link_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn add(&mut self, source_id: &str, dest_id: u64) -> AddOutcome {
        let dests = self.0.entry(source_id.to_string()).or_default();
        if dests.contains(&dest_id) {
            return AddOutcome::AlreadyPresent;
        }
        dests.push(dest_id);
        AddOutcome::Added
    }

    pub fn remove(&mut self, target: &RemoveTarget) -> RemoveOutcome {
        match target {
            RemoveTarget::All => {
                self.0.clear();
                RemoveOutcome::Removed
            }
            RemoveTarget::Source(source_id) => match self.0.remove(source_id) {
                Some(_) => RemoveOutcome::Removed,
                None => RemoveOutcome::NotFound,
            },
            RemoveTarget::Pair(source_id, dest_id) => {
                let Some(dests) = self.0.get_mut(source_id) else {
                    return RemoveOutcome::NotFound;
                };
                let Some(position) = dests.iter().position(|id| id == dest_id) else {
                    return RemoveOutcome::NotFound;
                };
                dests.remove(position);
                if dests.is_empty() {
                    self.0.remove(source_id);
                }
                RemoveOutcome::Removed
            }
        }
    }

    /// Brings a hand-edited table into canonical form. Source keys become
    /// plain decimal channel ids, merging entries that name the same channel;
    /// keys that are not channel ids are dropped. Repeated destinations and
    /// empty lists are removed. Returns true if anything changed.
    pub fn normalize(&mut self) -> bool {
        let mut changed = false;
        for (key, dests) in std::mem::take(&mut self.0) {
            let Some(source_id) = canonical_source_id(&key) else {
                warn!("dropping relay source {:?}: not a channel id", key);
                changed = true;
                continue;
            };
            changed |= source_id != key;

            let merged = self.0.entry(source_id).or_default();
            for dest_id in dests {
                if merged.contains(&dest_id) {
                    changed = true;
                } else {
                    merged.push(dest_id);
                }
            }
        }

        let sources = self.0.len();
        self.0.retain(|_, dests| !dests.is_empty());
        changed || sources != self.0.len()
    }
}

fn canonical_source_id(key: &str) -> Option<String> {
    key.trim()
        .parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .map(|id| id.to_string())
}

impl FromIterator<(String, Vec<u64>)> for RelayMapping {
    fn from_iter<I: IntoIterator<Item = (String, Vec<u64>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
