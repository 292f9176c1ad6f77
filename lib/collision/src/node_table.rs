// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Gridflow Project Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Known-peer table.
//!
//! Holds a round-robin queue of live peers plus the per-peer inbound and
//! outbound [`MessageInfo`] records, maintained from discovery events.
//! Stale ids may linger between a peer's departure and the event
//! delivering it; consumers re-check liveness and prune opportunistically
//! during iteration.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::cluster::{ClusterContext, ClusterNode};
use crate::message::MessageInfo;

#[derive(Default)]
pub struct NodeTable {
    /// Fair round-robin cursor: poll from the head, re-offer live nodes
    /// to the tail.
    queue: Mutex<VecDeque<Arc<dyn ClusterNode>>>,

    /// Outbound records: requests this node sent, keyed by peer id.
    snd: DashMap<Uuid, Arc<MessageInfo>>,

    /// Inbound records: requests received from peers, keyed by peer id.
    rcv: DashMap<Uuid, Arc<MessageInfo>>,
}

impl NodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the table from the current remote-nodes snapshot, filtering
    /// out peers that leave concurrently with startup.
    pub fn seed(&self, cluster: &dyn ClusterContext) {
        let remotes = cluster.remote_nodes();

        for node in &remotes {
            let id = node.id();

            if cluster.node(id).is_some() {
                self.snd.entry(id).or_default();
                self.rcv.entry(id).or_default();

                // The peer may have left between the snapshot and the
                // inserts above.
                if cluster.node(id).is_none() {
                    self.snd.remove(&id);
                    self.rcv.remove(&id);
                }
            }
        }

        let mut queue = self.queue.lock();

        queue.extend(remotes);
        queue.retain(|n| cluster.node(n.id()).is_some());
    }

    pub fn on_joined(&self, node: Arc<dyn ClusterNode>) {
        let id = node.id();

        self.queue.lock().push_back(node);

        self.snd.entry(id).or_default();
        self.rcv.entry(id).or_default();
    }

    pub fn on_removed(&self, id: Uuid) {
        self.queue.lock().retain(|n| n.id() != id);

        self.snd.remove(&id);
        self.rcv.remove(&id);
    }

    /// Take the next round-robin peer.
    pub fn poll(&self) -> Option<Arc<dyn ClusterNode>> {
        self.queue.lock().pop_front()
    }

    /// Return a visited peer to the tail of the rotation.
    pub fn offer(&self, node: Arc<dyn ClusterNode>) {
        self.queue.lock().push_back(node);
    }

    pub fn snd(&self, id: Uuid) -> Option<Arc<MessageInfo>> {
        self.snd.get(&id).map(|e| e.clone())
    }

    pub fn rcv(&self, id: Uuid) -> Option<Arc<MessageInfo>> {
        self.rcv.get(&id).map(|e| e.clone())
    }

    /// Snapshot of the inbound records for iteration.
    pub fn rcv_entries(&self) -> Vec<(Uuid, Arc<MessageInfo>)> {
        self.rcv
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect()
    }

    /// Drop the inbound record of a peer found dead during iteration.
    pub fn prune_rcv(&self, id: Uuid) {
        self.rcv.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCluster, MockNode};

    #[test]
    fn join_and_remove_maintain_both_maps() {
        let table = NodeTable::new();
        let node = MockNode::shared();
        let id = node.id();

        table.on_joined(node);

        assert!(table.snd(id).is_some());
        assert!(table.rcv(id).is_some());
        assert!(table.poll().is_some());

        table.on_joined(MockNode::shared());
        table.on_removed(id);

        assert!(table.snd(id).is_none());
        assert!(table.rcv(id).is_none());
        assert_eq!(table.rcv_entries().len(), 1);
    }

    #[test]
    fn poll_offer_rotates_fairly() {
        let table = NodeTable::new();
        let a = MockNode::shared();
        let b = MockNode::shared();

        table.on_joined(a.clone());
        table.on_joined(b.clone());

        let first = table.poll().unwrap();
        assert_eq!(first.id(), a.id());
        table.offer(first);

        let second = table.poll().unwrap();
        assert_eq!(second.id(), b.id());
        table.offer(second);

        assert_eq!(table.poll().unwrap().id(), a.id());
    }

    #[test]
    fn seed_registers_current_remote_nodes() {
        let cluster = MockCluster::new();
        let a = cluster.add_node(MockNode::shared());
        let b = cluster.add_node(MockNode::shared());

        let table = NodeTable::new();
        table.seed(&*cluster);

        assert!(table.snd(a).is_some());
        assert!(table.rcv(a).is_some());
        assert!(table.snd(b).is_some());
        assert_eq!(table.rcv_entries().len(), 2);
        assert_eq!(table.poll().unwrap().id(), a);
    }
}
