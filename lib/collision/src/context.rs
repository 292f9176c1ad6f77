// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Gridflow Project Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Contracts consumed from the job execution engine.
//!
//! The engine never owns jobs; it sees them through
//! [`CollisionJobContext`] handles inside a per-pass [`CollisionContext`]
//! snapshot, and talks back only via `activate`/`cancel` and the job's
//! mutable attribute map.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use serde_json::Value;
use uuid::Uuid;

/// Mutable attribute map attached to a job, shared with the failover
/// layer. All mutation happens under the map's own lock; the guard stands
/// in for the owning runtime's per-job monitor.
#[derive(Debug, Default)]
pub struct JobContext {
    attrs: Mutex<HashMap<String, Value>>,
}

impl JobContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attributes(attrs: HashMap<String, Value>) -> Self {
        Self {
            attrs: Mutex::new(attrs),
        }
    }

    /// Lock the attribute map. Sequences of related reads and writes must
    /// happen under a single guard.
    pub fn lock(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.attrs.lock()
    }
}

/// Handle over one waiting or active job for the duration of a collision
/// pass.
pub trait CollisionJobContext: Send + Sync {
    /// The job's mutable attribute map.
    fn job_context(&self) -> &JobContext;

    /// Node ids permitted to execute this job's task.
    fn topology(&self) -> Vec<Uuid>;

    /// True when the job's definition opted out of stealing.
    fn stealing_disabled(&self) -> bool;

    /// Activate a waiting job. No-op if another thread already activated
    /// or cancelled it.
    fn activate(&self) -> bool;

    /// Cancel a waiting job so it can be rescheduled on the thief node.
    /// Returns whether the cancellation took effect.
    fn cancel(&self) -> bool;
}

/// Snapshot of the local job populations for one decision pass.
pub trait CollisionContext {
    fn active_jobs(&self) -> Vec<Arc<dyn CollisionJobContext>>;
    fn waiting_jobs(&self) -> Vec<Arc<dyn CollisionJobContext>>;
    fn held_jobs(&self) -> Vec<Arc<dyn CollisionJobContext>>;
}

/// Callback into the runtime asking it to run another collision pass.
pub trait CollisionExternalListener: Send + Sync {
    fn on_external_collision(&self);
}
