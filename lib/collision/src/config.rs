// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Gridflow Project Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Controller configuration.

use std::collections::HashMap;

use derive_builder::Builder;
use serde_json::Value;
use validator::Validate;

/// Default number of jobs allowed to execute in parallel; slightly below a
/// typical execution pool size to leave threads for system processing.
pub const DFLT_ACTIVE_JOBS_THRESHOLD: usize = 95;

/// Default waiting queue depth above which jobs become eligible for
/// surrender.
pub const DFLT_WAIT_JOBS_THRESHOLD: usize = 0;

/// Default steal message expiry in milliseconds. Once elapsed with no
/// response, the request is considered lost and may be re-issued,
/// potentially to another node.
pub const DFLT_MSG_EXPIRE_TIME_MS: u64 = 1000;

/// Default upper bound on a job's stealing-hop count.
pub const DFLT_MAX_STEALING_ATTEMPTS: u32 = 5;

/// Default job priority when the priority attribute is absent.
pub const DFLT_JOB_PRIORITY: i64 = 0;

#[derive(Debug, Clone, Builder, Validate)]
#[builder(pattern = "owned")]
pub struct JobStealingConfig {
    /// Activation budget: number of jobs allowed to execute concurrently.
    #[builder(default = "DFLT_ACTIVE_JOBS_THRESHOLD")]
    pub active_jobs_threshold: usize,

    /// Target waiting queue depth; waiting jobs beyond it may be
    /// surrendered to peers.
    #[builder(default = "DFLT_WAIT_JOBS_THRESHOLD")]
    pub wait_jobs_threshold: usize,

    /// Inbound steal requests older than this are dropped and their
    /// capacity reclaimed.
    #[builder(default = "DFLT_MSG_EXPIRE_TIME_MS")]
    #[validate(range(min = 1))]
    pub msg_expire_time_ms: u64,

    /// Upper bound on how many times a single job may hop between nodes.
    #[builder(default = "DFLT_MAX_STEALING_ATTEMPTS")]
    #[validate(range(min = 1))]
    pub max_stealing_attempts: u32,

    /// Gates outbound stealing; inbound surrender keeps working either
    /// way.
    #[builder(default = "true")]
    pub stealing_enabled: bool,

    /// When non-empty, jobs are stolen only from/to peers carrying every
    /// one of these attribute values.
    #[builder(default)]
    pub stealing_attributes: HashMap<String, Value>,
}

impl JobStealingConfig {
    pub fn builder() -> JobStealingConfigBuilder {
        JobStealingConfigBuilder::default()
    }

    pub fn msg_expire_time(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.msg_expire_time_ms)
    }
}

impl Default for JobStealingConfig {
    fn default() -> Self {
        Self::builder().build().expect("defaults are valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = JobStealingConfig::default();

        assert_eq!(cfg.active_jobs_threshold, 95);
        assert_eq!(cfg.wait_jobs_threshold, 0);
        assert_eq!(cfg.msg_expire_time_ms, 1000);
        assert_eq!(cfg.max_stealing_attempts, 5);
        assert!(cfg.stealing_enabled);
        assert!(cfg.stealing_attributes.is_empty());
    }

    #[test]
    fn rejects_zero_expiry_and_attempts() {
        let cfg = JobStealingConfig::builder()
            .msg_expire_time_ms(0)
            .build()
            .unwrap();
        assert!(cfg.validate().is_err());

        let cfg = JobStealingConfig::builder()
            .max_stealing_attempts(0)
            .build()
            .unwrap();
        assert!(cfg.validate().is_err());
    }
}
