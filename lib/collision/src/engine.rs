// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Gridflow Project Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The collision engine.
//!
//! Each [`JobStealingCollision::on_collision`] pass first fills the
//! activation budget and surrenders excess waiting jobs to peers that
//! asked for work (`check_busy`); only a pass that surrendered nothing
//! goes on to request jobs from overloaded peers (`check_idle`).
//!
//! Discovery and message callbacks run concurrently with collision
//! passes. The global pending-steal counter uses optimistic decrements
//! with compensating increments, so it may transiently read negative;
//! per-peer records and per-job attribute maps are each serialized by
//! their own lock, acquired in the global order `MessageInfo` →
//! `JobContext`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error};
use uuid::Uuid;
use validator::Validate;

use crate::cluster::{ClusterContext, ClusterNode, DiscoveryEvent};
use crate::config::{JobStealingConfig, DFLT_JOB_PRIORITY};
use crate::context::{CollisionContext, CollisionExternalListener, CollisionJobContext};
use crate::message::StealRequest;
use crate::node_table::NodeTable;
use crate::{
    ACTIVE_JOBS_THRESHOLD_NODE_ATTR, JOB_STEALING_TOPIC, MAX_STEALING_ATTEMPT_ATTR,
    MSG_EXPIRE_TIME_ATTR, STEALING_ATTEMPT_COUNT_ATTR, STEALING_PRIORITY_ATTR, THIEF_NODE_ATTR,
    WAIT_JOBS_THRESHOLD_NODE_ATTR,
};

pub struct JobStealingCollision {
    cfg: JobStealingConfig,
    cluster: Arc<dyn ClusterContext>,
    nodes: NodeTable,

    /// Total pending inbound steal capacity across peers. Transiently
    /// negative during optimistic decrement/rollback.
    steal_reqs: AtomicI64,

    /// Jobs surrendered to peers over the controller's lifetime.
    total_stolen: AtomicU64,

    running_num: AtomicUsize,
    waiting_num: AtomicUsize,
    held_num: AtomicUsize,

    ext_lsnr: Mutex<Option<Arc<dyn CollisionExternalListener>>>,
}

impl JobStealingCollision {
    /// Validate the configuration and seed the peer table from the
    /// current topology.
    pub fn new(cfg: JobStealingConfig, cluster: Arc<dyn ClusterContext>) -> Result<Self> {
        cfg.validate()
            .context("invalid job-stealing collision configuration")?;

        debug!(
            active_jobs_threshold = cfg.active_jobs_threshold,
            wait_jobs_threshold = cfg.wait_jobs_threshold,
            msg_expire_time_ms = cfg.msg_expire_time_ms,
            max_stealing_attempts = cfg.max_stealing_attempts,
            stealing_enabled = cfg.stealing_enabled,
            "starting job-stealing collision controller"
        );

        let engine = Self {
            cfg,
            cluster,
            nodes: NodeTable::new(),
            steal_reqs: AtomicI64::new(0),
            total_stolen: AtomicU64::new(0),
            running_num: AtomicUsize::new(0),
            waiting_num: AtomicUsize::new(0),
            held_num: AtomicUsize::new(0),
            ext_lsnr: Mutex::new(None),
        };

        engine.nodes.seed(engine.cluster.as_ref());

        Ok(engine)
    }

    /// Install the runtime callback notified when a steal request arrives.
    pub fn set_external_listener(&self, lsnr: Option<Arc<dyn CollisionExternalListener>>) {
        *self.ext_lsnr.lock() = lsnr;
    }

    /// One collision pass over the current job populations.
    pub fn on_collision(&self, ctx: &dyn CollisionContext) {
        let active = ctx.active_jobs();
        let waiting = ctx.waiting_jobs();

        self.held_num.store(ctx.held_jobs().len(), Ordering::Relaxed);

        let rejected = self.check_busy(&waiting, &active);

        self.total_stolen.fetch_add(rejected as u64, Ordering::SeqCst);

        // A pass that surrendered jobs does not also beg for more.
        if rejected > 0 {
            debug!(rejected, "surrendered waiting jobs to peers");

            return;
        }

        if self.cfg.stealing_enabled {
            self.check_idle(&waiting, &active);
        }
    }

    /// Handle an inbound steal request from `node_id`.
    ///
    /// The message's `delta` replaces whatever capacity the peer
    /// previously announced. Requests racing ahead of the peer's join
    /// event are ignored.
    pub fn on_message(&self, node_id: Uuid, req: StealRequest) {
        let Some(info) = self.nodes.rcv(node_id) else {
            debug!(node = %node_id, "ignoring steal request: discovery event not yet received");

            return;
        };

        let steal_reqs = {
            let mut state = info.lock();

            // Replace the previously announced capacity before resetting
            // the record; the global counter must never double-count a
            // peer.
            let diff = (req.delta - state.jobs_to_steal()) as i64;
            let total = self.steal_reqs.fetch_add(diff, Ordering::SeqCst) + diff;

            state.reset(req.delta);

            total
        };

        debug!(node = %node_id, delta = req.delta, steal_reqs, "received steal request");

        let lsnr = self.ext_lsnr.lock().clone();

        if let Some(lsnr) = lsnr {
            lsnr.on_external_collision();
        }
    }

    /// Maintain the peer table from a discovery event.
    pub fn on_discovery_event(&self, evt: DiscoveryEvent) {
        match evt {
            DiscoveryEvent::Joined(id) => {
                if let Some(node) = self.cluster.node(id) {
                    self.nodes.on_joined(node);
                }
            }
            DiscoveryEvent::Left(id) | DiscoveryEvent::Failed(id) => self.nodes.on_removed(id),
        }
    }

    /// Attributes this node publishes for peer discovery.
    pub fn node_attributes(&self) -> HashMap<String, Value> {
        HashMap::from([
            (
                WAIT_JOBS_THRESHOLD_NODE_ATTR.to_owned(),
                Value::from(self.cfg.wait_jobs_threshold as u64),
            ),
            (
                ACTIVE_JOBS_THRESHOLD_NODE_ATTR.to_owned(),
                Value::from(self.cfg.active_jobs_threshold as u64),
            ),
            (
                MAX_STEALING_ATTEMPT_ATTR.to_owned(),
                Value::from(self.cfg.max_stealing_attempts),
            ),
            (
                MSG_EXPIRE_TIME_ATTR.to_owned(),
                Value::from(self.cfg.msg_expire_time_ms),
            ),
        ])
    }

    /// Attribute names that must agree across peers.
    pub fn consistent_attribute_names(&self) -> Vec<&'static str> {
        vec![MAX_STEALING_ATTEMPT_ATTR, MSG_EXPIRE_TIME_ATTR]
    }

    pub fn config(&self) -> &JobStealingConfig {
        &self.cfg
    }

    pub fn current_running_jobs(&self) -> usize {
        self.running_num.load(Ordering::Relaxed)
    }

    pub fn current_held_jobs(&self) -> usize {
        self.held_num.load(Ordering::Relaxed)
    }

    pub fn current_wait_jobs(&self) -> usize {
        self.waiting_num.load(Ordering::Relaxed)
    }

    pub fn current_active_jobs(&self) -> usize {
        self.current_running_jobs() + self.current_held_jobs()
    }

    pub fn total_stolen_jobs(&self) -> u64 {
        self.total_stolen.load(Ordering::SeqCst)
    }

    pub fn current_jobs_to_steal(&self) -> i64 {
        self.steal_reqs.load(Ordering::SeqCst)
    }

    /// Fill the activation budget; once it is exhausted and peers have
    /// asked for work, surrender the lowest-value waiting jobs. Returns
    /// the number of jobs surrendered.
    fn check_busy(
        &self,
        waiting: &[Arc<dyn CollisionJobContext>],
        active: &[Arc<dyn CollisionJobContext>],
    ) -> usize {
        self.waiting_num.store(waiting.len(), Ordering::Relaxed);
        self.running_num.store(active.len(), Ordering::Relaxed);

        let wait_pri = sort_by_priority(waiting);

        let active_threshold = self.cfg.active_jobs_threshold;
        let wait_threshold = self.cfg.wait_jobs_threshold;
        let expire = self.cfg.msg_expire_time();

        let mut activated = 0usize;
        let mut rejected = 0usize;

        for w in &wait_pri {
            if active.len() + activated < active_threshold {
                activated += 1;

                // Activation under the job-context guard so a concurrent
                // rejection cannot interleave; activate itself is a no-op
                // if another thread beat us to it.
                let _attrs = w.job_context().lock();

                w.activate();
            } else if self.steal_reqs.load(Ordering::SeqCst) > 0 {
                if w.stealing_disabled() {
                    continue;
                }

                let attempt = w
                    .job_context()
                    .lock()
                    .get(STEALING_ATTEMPT_COUNT_ATTR)
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0);

                if attempt >= self.cfg.max_stealing_attempts as i64 {
                    debug!(attempt, "waiting job exceeded stealing attempts, trying other jobs");

                    continue;
                }

                let jobs_to_reject = wait_pri.len() as i64
                    - activated as i64
                    - rejected as i64
                    - wait_threshold as i64;

                debug!(jobs_to_reject, "jobs eligible for surrender");

                if jobs_to_reject <= 0 {
                    break;
                }

                let pri = job_priority(&w.job_context().lock());

                for (node_id, info) in self.nodes.rcv_entries() {
                    if self.steal_reqs.load(Ordering::SeqCst) <= 0 {
                        break;
                    }

                    // Peer left the topology; prune its record.
                    if self.cluster.node(node_id).is_none() {
                        self.nodes.prune_rcv(node_id);

                        continue;
                    }

                    let mut info_state = info.lock();

                    let jobs_asked = info_state.jobs_to_steal();

                    if jobs_asked == 0 {
                        continue;
                    }

                    if info_state.expired(expire) {
                        // Reclaim the capacity the expired request
                        // announced.
                        self.steal_reqs
                            .fetch_sub(jobs_asked as i64, Ordering::SeqCst);

                        info_state.reset(0);

                        continue;
                    }

                    if !w.topology().contains(&node_id) {
                        debug!(thief = %node_id, "thief node is outside the task topology");

                        continue;
                    }

                    if self.steal_reqs.load(Ordering::SeqCst) <= 0 {
                        break;
                    }

                    {
                        let mut attrs = w.job_context().lock();

                        // Only a job not yet claimed by another thief.
                        if !attrs.contains_key(THIEF_NODE_ATTR) {
                            attrs.insert(
                                THIEF_NODE_ATTR.to_owned(),
                                Value::String(node_id.to_string()),
                            );
                            attrs.insert(
                                STEALING_ATTEMPT_COUNT_ATTR.to_owned(),
                                Value::from(attempt + 1),
                            );
                            attrs.insert(STEALING_PRIORITY_ATTR.to_owned(), Value::from(pri + 1));

                            let remaining = self.steal_reqs.fetch_sub(1, Ordering::SeqCst) - 1;

                            if remaining >= 0 && w.cancel() {
                                rejected += 1;

                                info_state.reset(jobs_asked - 1);

                                debug!(thief = %node_id, "surrendered waiting job to steal request");
                            } else {
                                // Optimistic decrement lost the race;
                                // compensate and restore the attributes.
                                debug!(remaining, "failed to surrender waiting job");

                                attrs.remove(THIEF_NODE_ATTR);
                                attrs.insert(
                                    STEALING_ATTEMPT_COUNT_ATTR.to_owned(),
                                    Value::from(attempt),
                                );
                                attrs.insert(STEALING_PRIORITY_ATTR.to_owned(), Value::from(pri));

                                self.steal_reqs.fetch_add(1, Ordering::SeqCst);
                            }
                        }
                    }

                    // One assignment attempt per waiting job.
                    break;
                }
            } else {
                // No activation room and no steal demand.
                break;
            }
        }

        rejected
    }

    /// When the local queues run short, ask overloaded peers for work.
    fn check_idle(
        &self,
        waiting: &[Arc<dyn CollisionJobContext>],
        active: &[Arc<dyn CollisionJobContext>],
    ) {
        let max = self
            .cfg
            .wait_jobs_threshold
            .saturating_add(self.cfg.active_jobs_threshold)
            .min(i32::MAX as usize);

        let jobs_to_steal = max as i64 - (waiting.len() + active.len()) as i64;

        debug!(jobs_to_steal, "total number of jobs to be stolen");

        if jobs_to_steal <= 0 {
            return;
        }

        let mut jobs_left = jobs_to_steal;

        let node_cnt = self.cluster.remote_nodes().len();
        let mut visited = 0;

        // Round-robin over at most one full rotation of the peer queue.
        while jobs_left > 0 && visited < node_cnt {
            visited += 1;

            let Some(next) = self.nodes.poll() else {
                break;
            };

            self.visit_peer(&next, &mut jobs_left);

            // Live nodes go back to the tail of the rotation.
            if self.cluster.node(next.id()).is_some() {
                self.nodes.offer(next);
            }
        }
    }

    /// Consider one peer as a steal target, adjusting `jobs_left` for the
    /// request sent (or the outstanding one still in flight).
    fn visit_peer(&self, next: &Arc<dyn ClusterNode>, jobs_left: &mut i64) {
        let id = next.id();

        if self.cluster.node(id).is_none() {
            return;
        }

        if !self.cfg.stealing_attributes.is_empty() {
            let attrs = next.attributes();

            let matched = self
                .cfg
                .stealing_attributes
                .iter()
                .all(|(k, v)| attrs.get(k) == Some(v));

            if !matched {
                debug!(node = %id, "skipping peer without required stealing attributes");

                return;
            }
        }

        let Some(snd) = self.nodes.snd(id) else {
            debug!(node = %id, "no outbound record for peer");

            return;
        };

        let Some(wait_threshold) = next
            .attribute(WAIT_JOBS_THRESHOLD_NODE_ATTR)
            .and_then(|v| v.as_i64())
        else {
            error!(
                node = %id,
                "peer does not run the job-stealing collision controller and cannot be stolen from"
            );

            return;
        };

        let mut delta = next.metrics().current_waiting_jobs - wait_threshold;

        debug!(node = %id, delta, "steal capacity at peer");

        if delta <= 0 {
            return;
        }

        {
            let mut snd_state = snd.lock();

            if !snd_state.expired(self.cfg.msg_expire_time()) && snd_state.jobs_to_steal() > 0 {
                // An outstanding request still counts toward the budget.
                *jobs_left -= snd_state.jobs_to_steal() as i64;

                return;
            }

            if delta > *jobs_left {
                delta = *jobs_left;
            }

            *jobs_left -= delta;

            snd_state.reset(delta as i32);
        }

        if let Err(e) = self.cluster.send(
            next.as_ref(),
            StealRequest {
                delta: delta as i32,
            },
            JOB_STEALING_TOPIC,
        ) {
            error!(node = %id, error = %e, "failed to send steal request");

            // Roll back so the next pass can retry.
            snd.lock().reset(0);

            *jobs_left += delta;
        }
    }
}

/// Job priority, defaulting when the attribute is absent or carries a
/// non-integer value.
fn job_priority(attrs: &HashMap<String, Value>) -> i64 {
    match attrs.get(STEALING_PRIORITY_ATTR) {
        None => DFLT_JOB_PRIORITY,
        Some(v) => v.as_i64().unwrap_or_else(|| {
            error!(
                attr = STEALING_PRIORITY_ATTR,
                value = %v,
                "job priority attribute is not an integer, using default"
            );

            DFLT_JOB_PRIORITY
        }),
    }
}

/// Sort waiting jobs by priority, highest first; ties keep input order.
fn sort_by_priority(
    waiting: &[Arc<dyn CollisionJobContext>],
) -> Vec<Arc<dyn CollisionJobContext>> {
    let mut jobs: Vec<(i64, Arc<dyn CollisionJobContext>)> = waiting
        .iter()
        .map(|w| (job_priority(&w.job_context().lock()), w.clone()))
        .collect();

    // Stable sort: equal priorities preserve snapshot order.
    jobs.sort_by_key(|(priority, _)| std::cmp::Reverse(*priority));

    jobs.into_iter().map(|(_, w)| w).collect()
}
