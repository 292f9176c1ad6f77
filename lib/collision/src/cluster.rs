// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Gridflow Project Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Contracts consumed from the cluster runtime: node handles, liveness,
//! metrics, discovery events, and the outbound message surface.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use uuid::Uuid;

use crate::message::StealRequest;

/// Point-in-time job metrics a node publishes to its peers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeMetrics {
    pub current_waiting_jobs: i64,
}

/// A peer node as seen through discovery.
pub trait ClusterNode: Send + Sync {
    fn id(&self) -> Uuid;

    /// A single published attribute, if present.
    fn attribute(&self, name: &str) -> Option<Value>;

    /// Snapshot of all published attributes.
    fn attributes(&self) -> HashMap<String, Value>;

    fn metrics(&self) -> NodeMetrics;
}

/// Minimal cluster surface the controller needs: liveness lookup, a
/// remote-nodes snapshot, and topic-addressed sends.
pub trait ClusterContext: Send + Sync {
    /// The live node with this id, or `None` once it left the topology.
    fn node(&self, id: Uuid) -> Option<Arc<dyn ClusterNode>>;

    /// Snapshot of all live remote nodes.
    fn remote_nodes(&self) -> Vec<Arc<dyn ClusterNode>>;

    /// Send a steal request to a peer on the given topic.
    fn send(&self, node: &dyn ClusterNode, req: StealRequest, topic: &str) -> Result<()>;
}

/// Membership changes delivered by the discovery layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryEvent {
    Joined(Uuid),
    Left(Uuid),
    Failed(Uuid),
}
