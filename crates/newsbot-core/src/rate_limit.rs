//! Per-route rate-limit bookkeeping for the messaging platform.
//!
//! Records are written only from response metadata of earlier calls and are
//! read before issuing new ones. Expiry is computed from the clock on every
//! read, so a record becomes usable again once its reset time passes without
//! anyone clearing it.

use std::{collections::HashMap, fmt, sync::Mutex};

use chrono::{DateTime, Utc};

use crate::domain::ChannelId;

/// A rate-limited endpoint of the messaging platform.
///
/// Reads and writes of the same resource share one bucket, so a route names
/// the resource rather than the HTTP method.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Route {
    /// Channel list / create / reorder for the single destination workspace.
    GuildChannels,
    /// Message list / create in one channel.
    ChannelMessages(ChannelId),
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::GuildChannels => f.write_str("guild channels"),
            Route::ChannelMessages(id) => write!(f, "messages in channel {id}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitRecord {
    pub fn new(remaining: u32, reset_at: DateTime<Utc>) -> Self {
        Self {
            remaining,
            reset_at,
        }
    }

    /// Exhausted only while no calls remain and the reset time is still ahead.
    pub fn is_exhausted(&self, now: DateTime<Utc>) -> bool {
        self.remaining == 0 && now < self.reset_at
    }
}

/// Thread-safe route -> record map owned by a gateway implementation.
#[derive(Debug, Default)]
pub struct RateLimitTable {
    records: Mutex<HashMap<Route, RateLimitRecord>>,
}

impl RateLimitTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, route: Route, record: RateLimitRecord) {
        let mut map = self.records.lock().unwrap_or_else(|e| e.into_inner());
        map.insert(route, record);
    }

    pub fn get(&self, route: &Route) -> Option<RateLimitRecord> {
        let map = self.records.lock().unwrap_or_else(|e| e.into_inner());
        map.get(route).copied()
    }

    pub fn is_exhausted(&self, route: &Route, now: DateTime<Utc>) -> bool {
        self.get(route)
            .map(|r| r.is_exhausted(now))
            .unwrap_or(false)
    }
}
