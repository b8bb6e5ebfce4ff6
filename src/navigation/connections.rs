use std::collections::{BTreeMap, BTreeSet};

use bevy::prelude::*;

use super::types::SetId;
use crate::chunk::PortalRef;

/// Cross-chunk links between waypoint sets.
///
/// Forward connections, backlinks and edge labels are all owned here rather
/// than by either endpoint, and every mutation updates both directions at
/// once: `a` connects to `b` exactly when `b` backlinks `a`.
#[derive(Debug, Default, Clone)]
pub struct ConnectionRegistry {
    connections: BTreeMap<SetId, BTreeMap<SetId, PortalRef>>,
    backlinks: BTreeMap<SetId, BTreeSet<SetId>>,
    edge_labels: BTreeMap<SetId, BTreeMap<usize, SetId>>,
}

/// A connection/backlink pair that disagrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymmetryViolation {
    pub from: SetId,
    pub to: SetId,
}

impl ConnectionRegistry {
    /// Link `edge` (absolute edge index in `from`) to `to` through `portal`.
    ///
    /// The first link between two sets records the portal and the backlink;
    /// later edges only add labels.
    pub fn connect(&mut self, from: SetId, to: SetId, portal: PortalRef, edge: usize) {
        let conns = self.connections.entry(from).or_default();
        if !conns.contains_key(&to) {
            conns.insert(to, portal);
            self.backlinks.entry(to).or_default().insert(from);
        }
        self.edge_labels.entry(from).or_default().insert(edge, to);
    }

    /// Drop the link from `from` to `to` together with its labels and backlink.
    pub fn disconnect(&mut self, from: SetId, to: SetId) {
        if let Some(labels) = self.edge_labels.get_mut(&from) {
            labels.retain(|_, target| *target != to);
            if labels.is_empty() {
                self.edge_labels.remove(&from);
            }
        }
        if let Some(back) = self.backlinks.get_mut(&to) {
            back.remove(&from);
            if back.is_empty() {
                self.backlinks.remove(&to);
            }
        }
        if let Some(conns) = self.connections.get_mut(&from) {
            conns.remove(&to);
            if conns.is_empty() {
                self.connections.remove(&from);
            }
        }
    }

    /// Remove every trace of `set`: first the links others hold to it, then
    /// its own labels, backlinks in its neighbours, and connections.
    pub fn remove_set(&mut self, set: SetId) {
        let others: Vec<SetId> = self.backlinks(set).collect();
        for other in others {
            self.disconnect(other, set);
        }

        self.edge_labels.remove(&set);
        if let Some(conns) = self.connections.remove(&set) {
            for to in conns.keys() {
                if let Some(back) = self.backlinks.get_mut(to) {
                    back.remove(&set);
                    if back.is_empty() {
                        self.backlinks.remove(to);
                    }
                }
            }
        }
        self.backlinks.remove(&set);
    }

    /// Raw forward connections of `set`, in id order.
    pub fn connections(&self, set: SetId) -> impl Iterator<Item = (SetId, PortalRef)> + '_ {
        self.connections
            .get(&set)
            .into_iter()
            .flat_map(|c| c.iter().map(|(to, portal)| (*to, *portal)))
    }

    /// Forward connections whose backlink is present.
    ///
    /// A missing backlink is a bookkeeping bug: it asserts in debug builds and
    /// the connection is treated as absent otherwise.
    pub fn live_connections(&self, set: SetId) -> Vec<(SetId, PortalRef)> {
        self.connections(set)
            .filter(|(to, _)| {
                let ok = self.backlinks.get(to).is_some_and(|b| b.contains(&set));
                if !ok {
                    error!("[NAVIGATOR] Connection {} -> {} has no backlink, ignoring it", set, to);
                    debug_assert!(ok, "connection {} -> {} has no backlink", set, to);
                }
                ok
            })
            .collect()
    }

    pub fn backlinks(&self, set: SetId) -> impl Iterator<Item = SetId> + '_ {
        self.backlinks.get(&set).into_iter().flat_map(|b| b.iter().copied())
    }

    pub fn edge_label(&self, set: SetId, edge: usize) -> Option<SetId> {
        self.edge_labels.get(&set)?.get(&edge).copied()
    }

    pub fn edge_labels(&self, set: SetId) -> impl Iterator<Item = (usize, SetId)> + '_ {
        self.edge_labels
            .get(&set)
            .into_iter()
            .flat_map(|l| l.iter().map(|(e, s)| (*e, *s)))
    }

    pub fn is_connected(&self, from: SetId, to: SetId) -> bool {
        self.connections.get(&from).is_some_and(|c| c.contains_key(&to))
    }

    pub fn portal(&self, from: SetId, to: SetId) -> Option<PortalRef> {
        self.connections.get(&from)?.get(&to).copied()
    }

    /// True if any connection, backlink or label mentions `set`.
    pub fn references(&self, set: SetId) -> bool {
        self.connections.contains_key(&set)
            || self.backlinks.contains_key(&set)
            || self.edge_labels.contains_key(&set)
            || self.connections.values().any(|c| c.contains_key(&set))
            || self.backlinks.values().any(|b| b.contains(&set))
            || self.edge_labels.values().any(|l| l.values().any(|s| *s == set))
    }

    /// Check `connections` and `backlinks` agree in both directions, and that
    /// every label points at a connected set.
    pub fn check_symmetry(&self) -> Result<(), SymmetryViolation> {
        for (from, conns) in &self.connections {
            for to in conns.keys() {
                if !self.backlinks.get(to).is_some_and(|b| b.contains(from)) {
                    return Err(SymmetryViolation { from: *from, to: *to });
                }
            }
        }
        for (to, back) in &self.backlinks {
            for from in back {
                if !self.is_connected(*from, *to) {
                    return Err(SymmetryViolation { from: *from, to: *to });
                }
            }
        }
        for (from, labels) in &self.edge_labels {
            for to in labels.values() {
                if !self.is_connected(*from, *to) {
                    return Err(SymmetryViolation { from: *from, to: *to });
                }
            }
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.connections.clear();
        self.backlinks.clear();
        self.edge_labels.clear();
    }
}
