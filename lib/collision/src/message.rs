// SPDX-FileCopyrightText: Copyright (c) 2025-2026 Gridflow Project Contributors. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The steal request wire message and the per-peer bookkeeping record.

use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

/// Steal request sent on the collision topic.
///
/// Despite the field name, `delta` is the sender's absolute current
/// demand: the receiver replaces whatever the sender previously
/// announced. There is no acknowledgement; a request simply ages out
/// after the configured expiry and becomes eligible for replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StealRequest {
    pub delta: i32,
}

/// Pending-steal count plus the timestamp of its last update.
///
/// One record exists per peer and direction (inbound requests received
/// from the peer, outbound requests sent to it). All access goes through
/// [`MessageInfo::lock`]; holding the guard is the record's mutex
/// discipline.
#[derive(Debug, Default)]
pub struct MessageInfo {
    state: Mutex<MessageInfoState>,
}

#[derive(Debug)]
pub struct MessageInfoState {
    jobs_to_steal: i32,
    ts: Instant,
}

impl Default for MessageInfoState {
    fn default() -> Self {
        Self {
            jobs_to_steal: 0,
            ts: Instant::now(),
        }
    }
}

impl MessageInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, MessageInfoState> {
        self.state.lock()
    }
}

impl MessageInfoState {
    pub fn jobs_to_steal(&self) -> i32 {
        self.jobs_to_steal
    }

    /// A record is expired when it still advertises demand but has not
    /// been refreshed within `expire`.
    pub fn expired(&self, expire: Duration) -> bool {
        self.jobs_to_steal > 0 && self.ts.elapsed() >= expire
    }

    /// Replace the advertised demand and refresh the timestamp.
    pub fn reset(&mut self, jobs_to_steal: i32) {
        self.jobs_to_steal = jobs_to_steal;
        self.ts = Instant::now();
    }
}
