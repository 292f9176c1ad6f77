// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Gridflow Project Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Job-stealing collision controller.
//!
//! Whenever the local job population changes, the compute runtime hands
//! the current waiting/active/held snapshots to
//! [`JobStealingCollision::on_collision`]. The engine activates waiting
//! jobs up to the configured budget, surrenders low-priority waiting jobs
//! to peers that have asked for work, and — when the local queues run
//! short — asks overloaded peers for jobs of its own with a
//! [`StealRequest`] on the collision topic.
//!
//! Stealing is best-effort: there is no global consistency across nodes
//! and no durability of in-flight steal state. Peer coordination is a
//! single idempotent-in-effect message whose `delta` replaces the
//! sender's previously advertised demand.

pub mod cluster;
pub mod config;
pub mod context;
pub mod engine;
pub mod message;
pub mod mock;
pub mod node_table;

pub use cluster::{ClusterContext, ClusterNode, DiscoveryEvent, NodeMetrics};
pub use config::{JobStealingConfig, JobStealingConfigBuilder};
pub use context::{CollisionContext, CollisionExternalListener, CollisionJobContext, JobContext};
pub use engine::JobStealingCollision;
pub use message::{MessageInfo, StealRequest};

/// Communication topic for steal requests.
pub const JOB_STEALING_TOPIC: &str = "gridgain.collision.job.stealing.topic";

/// Job-context attribute holding the id of the node that will execute a
/// surrendered job; consumed by the failover layer.
pub const THIEF_NODE_ATTR: &str = "gridgain.collision.thief.node";

/// Job-context attribute counting how many times a job has been stolen.
pub const STEALING_ATTEMPT_COUNT_ATTR: &str = "gridgain.stealing.attempt.count";

/// Job-context attribute carrying the job's stealing priority.
pub const STEALING_PRIORITY_ATTR: &str = "gridgain.stealing.priority";

/// Node attribute publishing the waiting-jobs threshold.
pub const WAIT_JOBS_THRESHOLD_NODE_ATTR: &str = "gridgain.collision.wait.jobs.threshold";

/// Node attribute publishing the active-jobs threshold.
pub const ACTIVE_JOBS_THRESHOLD_NODE_ATTR: &str = "gridgain.collision.active.jobs.threshold";

/// Node attribute publishing the maximum stealing attempts; must agree
/// across peers.
pub const MAX_STEALING_ATTEMPT_ATTR: &str = "gridgain.stealing.max.attempts";

/// Node attribute publishing the steal message expiry; must agree across
/// peers.
pub const MSG_EXPIRE_TIME_ATTR: &str = "gridgain.stealing.msg.expire.time";
