//! Per-list outbound queues and the rate-limit aware drain pass.

use std::time::Duration;

use tracing::{debug, info};

use crate::{
    clock::{offset, Clock},
    domain::ListKey,
    ports::RemoteChannelGateway,
    rate_limit::Route,
    state::{ListRegistry, ListState},
    tasks::{Task, TaskQueue},
    Error, Result,
};

pub const DEFAULT_DRAIN_RETRY_DELAY: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    /// Lists that stopped on a rate limit, in pass order.
    pub deferred: Vec<ListKey>,
}

/// Delivers queued messages front to back.
///
/// While a pass has been deferred by a rate limit, only the scheduled retry
/// may drain; cycle-triggered drains are skipped so there is never more than
/// one active drainer.
#[derive(Debug)]
pub struct Dispatcher {
    retry_delay: Duration,
    outstanding: bool,
}

impl Dispatcher {
    pub fn new(retry_delay: Duration) -> Self {
        Self {
            retry_delay,
            outstanding: false,
        }
    }

    /// Whether a deferred pass is waiting on its retry task.
    pub fn is_outstanding(&self) -> bool {
        self.outstanding
    }

    pub fn enqueue(list: &mut ListState, message: String) {
        list.pending.push_back(message);
    }

    /// Cycle-triggered drain. Returns `None` without touching any queue when
    /// a deferred pass is outstanding.
    pub async fn drain(
        &mut self,
        lists: &mut ListRegistry,
        gateway: &dyn RemoteChannelGateway,
        clock: &dyn Clock,
        tasks: &mut TaskQueue,
    ) -> Result<Option<DrainReport>> {
        if self.outstanding {
            debug!("drain pass outstanding, leaving queues to the retry task");
            return Ok(None);
        }
        self.pass(lists, gateway, clock, tasks).await.map(Some)
    }

    /// Retry-triggered drain; always runs.
    pub async fn resume(
        &mut self,
        lists: &mut ListRegistry,
        gateway: &dyn RemoteChannelGateway,
        clock: &dyn Clock,
        tasks: &mut TaskQueue,
    ) -> Result<DrainReport> {
        self.pass(lists, gateway, clock, tasks).await
    }

    async fn pass(
        &mut self,
        lists: &mut ListRegistry,
        gateway: &dyn RemoteChannelGateway,
        clock: &dyn Clock,
        tasks: &mut TaskQueue,
    ) -> Result<DrainReport> {
        self.outstanding = true;
        let mut report = DrainReport::default();

        for (key, list) in lists.iter_mut() {
            let delivered = drain_list(list, gateway, clock).await?;
            report.delivered += delivered.sent;
            if delivered.deferred {
                report.deferred.push(key.clone());
            }
        }

        match report.deferred.first() {
            None => self.outstanding = false,
            Some(first) => {
                let at = offset(clock.now(), self.retry_delay);
                info!(
                    deferred = report.deferred.len(),
                    retry_at = %at,
                    "rate limited, deferring remaining messages"
                );
                tasks.schedule_at(at, Task::DrainRetry(first.clone()));
            }
        }

        Ok(report)
    }
}

struct ListDrain {
    sent: usize,
    deferred: bool,
}

async fn drain_list(
    list: &mut ListState,
    gateway: &dyn RemoteChannelGateway,
    clock: &dyn Clock,
) -> Result<ListDrain> {
    let mut out = ListDrain {
        sent: 0,
        deferred: false,
    };
    let Some(channel) = list.destination.clone() else {
        return Ok(out);
    };
    let route = Route::ChannelMessages(channel.clone());

    // Iterate a copy so the real queue only ever loses its delivered front.
    let snapshot: Vec<String> = list.pending.iter().cloned().collect();
    for message in snapshot {
        let limited = gateway
            .rate_limit(&route)
            .map(|r| r.is_exhausted(clock.now()))
            .unwrap_or(false);
        if limited {
            out.deferred = true;
            break;
        }

        match gateway.create_message(&channel, &message).await {
            Ok(_) => {
                debug_assert_eq!(list.pending.front(), Some(&message));
                list.pending.pop_front();
                out.sent += 1;
            }
            Err(Error::RateLimited(_)) => {
                out.deferred = true;
                break;
            }
            Err(e) => return Err(e),
        }
    }

    if out.sent > 0 {
        debug!(list = %list.name, sent = out.sent, left = list.pending.len(), "delivered");
    }
    Ok(out)
}
