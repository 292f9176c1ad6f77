// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Gridflow Project Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! In-memory cluster for tests.
//!
//! Implements the consumed contracts ([`ClusterContext`],
//! [`ClusterNode`], [`CollisionContext`], [`CollisionJobContext`])
//! without any transport or discovery backend. Sends are recorded for
//! inspection and can be forced to fail.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use uuid::Uuid;

use crate::cluster::{ClusterContext, ClusterNode, NodeMetrics};
use crate::context::{CollisionContext, CollisionJobContext, JobContext};
use crate::message::StealRequest;
use crate::STEALING_PRIORITY_ATTR;

/// A peer node with settable attributes and metrics.
pub struct MockNode {
    id: Uuid,
    attrs: RwLock<HashMap<String, Value>>,
    metrics: Mutex<NodeMetrics>,
}

impl MockNode {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            attrs: RwLock::new(HashMap::new()),
            metrics: Mutex::new(NodeMetrics::default()),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn set_attribute(&self, name: impl Into<String>, value: Value) {
        self.attrs.write().insert(name.into(), value);
    }

    pub fn set_waiting_jobs(&self, current_waiting_jobs: i64) {
        self.metrics.lock().current_waiting_jobs = current_waiting_jobs;
    }
}

impl Default for MockNode {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterNode for MockNode {
    fn id(&self) -> Uuid {
        self.id
    }

    fn attribute(&self, name: &str) -> Option<Value> {
        self.attrs.read().get(name).cloned()
    }

    fn attributes(&self) -> HashMap<String, Value> {
        self.attrs.read().clone()
    }

    fn metrics(&self) -> NodeMetrics {
        *self.metrics.lock()
    }
}

/// An in-memory cluster recording outbound steal requests.
pub struct MockCluster {
    nodes: RwLock<HashMap<Uuid, Arc<MockNode>>>,
    order: Mutex<Vec<Uuid>>,
    sent: Mutex<Vec<(Uuid, StealRequest)>>,
    fail_sends: AtomicBool,
}

impl MockCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            nodes: RwLock::new(HashMap::new()),
            order: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
        })
    }

    /// Register a node and return its id.
    pub fn add_node(&self, node: Arc<MockNode>) -> Uuid {
        let id = node.id();

        self.nodes.write().insert(id, node);
        self.order.lock().push(id);

        id
    }

    pub fn remove_node(&self, id: Uuid) {
        self.nodes.write().remove(&id);
        self.order.lock().retain(|n| *n != id);
    }

    /// Steal requests sent so far, in order.
    pub fn sent_requests(&self) -> Vec<(Uuid, StealRequest)> {
        self.sent.lock().clone()
    }

    /// When set, every `send` fails with a transport error.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }
}

impl ClusterContext for MockCluster {
    fn node(&self, id: Uuid) -> Option<Arc<dyn ClusterNode>> {
        self.nodes
            .read()
            .get(&id)
            .map(|n| n.clone() as Arc<dyn ClusterNode>)
    }

    fn remote_nodes(&self) -> Vec<Arc<dyn ClusterNode>> {
        let nodes = self.nodes.read();

        self.order
            .lock()
            .iter()
            .filter_map(|id| nodes.get(id).map(|n| n.clone() as Arc<dyn ClusterNode>))
            .collect()
    }

    fn send(&self, node: &dyn ClusterNode, req: StealRequest, _topic: &str) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            bail!("transport failure sending to {}", node.id());
        }

        self.sent.lock().push((node.id(), req));

        Ok(())
    }
}

/// A waiting or active job handle with recorded activate/cancel calls.
pub struct MockJob {
    ctx: JobContext,
    topology: Vec<Uuid>,
    stealing_disabled: bool,
    cancellable: bool,
    activated: AtomicBool,
    cancelled: AtomicBool,
}

impl MockJob {
    pub fn new() -> Self {
        Self {
            ctx: JobContext::new(),
            topology: Vec::new(),
            stealing_disabled: false,
            cancellable: true,
            activated: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn with_priority(self, priority: i64) -> Self {
        self.ctx
            .lock()
            .insert(STEALING_PRIORITY_ATTR.to_owned(), Value::from(priority));
        self
    }

    pub fn with_attribute(self, name: impl Into<String>, value: Value) -> Self {
        self.ctx.lock().insert(name.into(), value);
        self
    }

    pub fn with_topology(mut self, topology: Vec<Uuid>) -> Self {
        self.topology = topology;
        self
    }

    pub fn no_stealing(mut self) -> Self {
        self.stealing_disabled = true;
        self
    }

    /// Make `cancel` report failure, as when another thread got there
    /// first.
    pub fn uncancellable(mut self) -> Self {
        self.cancellable = false;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn was_activated(&self) -> bool {
        self.activated.load(Ordering::SeqCst)
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.ctx.lock().get(name).cloned()
    }
}

impl Default for MockJob {
    fn default() -> Self {
        Self::new()
    }
}

impl CollisionJobContext for MockJob {
    fn job_context(&self) -> &JobContext {
        &self.ctx
    }

    fn topology(&self) -> Vec<Uuid> {
        self.topology.clone()
    }

    fn stealing_disabled(&self) -> bool {
        self.stealing_disabled
    }

    fn activate(&self) -> bool {
        !self.activated.swap(true, Ordering::SeqCst)
    }

    fn cancel(&self) -> bool {
        if !self.cancellable {
            return false;
        }

        !self.cancelled.swap(true, Ordering::SeqCst)
    }
}

/// One collision pass worth of job snapshots.
#[derive(Default)]
pub struct MockCollisionContext {
    pub waiting: Vec<Arc<dyn CollisionJobContext>>,
    pub active: Vec<Arc<dyn CollisionJobContext>>,
    pub held: Vec<Arc<dyn CollisionJobContext>>,
}

impl MockCollisionContext {
    pub fn new(
        waiting: Vec<Arc<dyn CollisionJobContext>>,
        active: Vec<Arc<dyn CollisionJobContext>>,
    ) -> Self {
        Self {
            waiting,
            active,
            held: Vec::new(),
        }
    }
}

impl CollisionContext for MockCollisionContext {
    fn active_jobs(&self) -> Vec<Arc<dyn CollisionJobContext>> {
        self.active.clone()
    }

    fn waiting_jobs(&self) -> Vec<Arc<dyn CollisionJobContext>> {
        self.waiting.clone()
    }

    fn held_jobs(&self) -> Vec<Arc<dyn CollisionJobContext>> {
        self.held.clone()
    }
}
