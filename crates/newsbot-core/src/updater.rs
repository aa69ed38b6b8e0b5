//! The update loop: one cooperative, single-threaded task runner.
//!
//! A `FullCycle` task refreshes the lists, reconciles channels, fetches new
//! items per list, queues them and drains; it then re-arms itself for just
//! after the content platform's rate-limit window resets. `DrainRetry` tasks
//! resume a drain pass that stopped on a messaging rate limit. Tasks never
//! yield to each other; cancellation is only observed between tasks.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    clock::{offset, Clock},
    config::{category_name, Config},
    cursor::{resolve_cursor, Cursor},
    dispatch::Dispatcher,
    formatting::format_item,
    ports::{ContentSource, RemoteChannelGateway, TimelineQuery},
    reconcile::{Reconciler, RetryPolicy},
    state::ListRegistry,
    tasks::{Task, TaskQueue},
    Error, Result,
};

#[derive(Clone, Debug)]
pub struct UpdaterSettings {
    pub category_label: String,
    pub content_domain: String,
    pub backfill_count: u32,
    pub drain_retry_delay: Duration,
    pub channel_create_retry: RetryPolicy,
    pub reschedule_margin: Duration,
}

impl From<&Config> for UpdaterSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            category_label: cfg.category_label.clone(),
            content_domain: cfg.content_domain.clone(),
            backfill_count: cfg.backfill_count,
            drain_retry_delay: cfg.drain_retry_delay,
            channel_create_retry: cfg.channel_create_retry,
            reschedule_margin: cfg.reschedule_margin,
        }
    }
}

/// Outcome of one full cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CycleReport {
    pub queued: usize,
    pub delivered: usize,
    /// Lists skipped because their cursor could not be read.
    pub skipped: usize,
    pub next_cycle: DateTime<Utc>,
}

pub struct Updater {
    settings: UpdaterSettings,
    gateway: Arc<dyn RemoteChannelGateway>,
    source: Arc<dyn ContentSource>,
    clock: Arc<dyn Clock>,
    lists: ListRegistry,
    dispatcher: Dispatcher,
    reconciler: Option<Reconciler>,
    tasks: TaskQueue,
}

impl Updater {
    pub fn new(
        settings: UpdaterSettings,
        gateway: Arc<dyn RemoteChannelGateway>,
        source: Arc<dyn ContentSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let dispatcher = Dispatcher::new(settings.drain_retry_delay);
        Self {
            settings,
            gateway,
            source,
            clock,
            lists: ListRegistry::new(),
            dispatcher,
            reconciler: None,
            tasks: TaskQueue::new(),
        }
    }

    pub fn lists(&self) -> &ListRegistry {
        &self.lists
    }

    pub fn tasks(&self) -> &TaskQueue {
        &self.tasks
    }

    pub fn is_draining(&self) -> bool {
        self.dispatcher.is_outstanding()
    }

    pub fn category_name(&self) -> Option<&str> {
        self.reconciler.as_ref().map(|r| r.category_name())
    }

    /// First-time setup: name the category after the content account, load
    /// the lists, and schedule the first cycle for right now.
    pub async fn setup(&mut self) -> Result<()> {
        let account = self.source.verify_credentials().await?;
        let category = category_name(&self.settings.category_label, &account);
        info!(account = %account, category = %category, "content account verified");

        self.refresh_lists().await?;
        self.reconciler = Some(Reconciler::new(
            category,
            self.settings.channel_create_retry,
        ));
        self.tasks.schedule_at(self.clock.now(), Task::FullCycle);
        Ok(())
    }

    async fn refresh_lists(&mut self) -> Result<()> {
        let memberships = self.source.list_memberships().await?;
        for key in self.lists.observe(memberships) {
            info!(list = %key, "tracking new list");
        }
        Ok(())
    }

    /// Run tasks until `cancel` fires. A task that has started always runs to
    /// completion; any error other than a recovered rate limit ends the loop.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        loop {
            let Some(at) = self.tasks.next_at() else {
                return Err(Error::State("task queue is empty".to_string()));
            };

            let clock = self.clock.clone();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Interrupted");
                    return Ok(());
                }
                _ = clock.sleep_until(at) => {}
            }

            self.run_due().await?;
        }
    }

    /// Wait for the next task, then run it. Returns the task that ran.
    pub async fn step(&mut self) -> Result<Option<Task>> {
        let Some(at) = self.tasks.next_at() else {
            return Ok(None);
        };
        self.clock.sleep_until(at).await;
        let Some((_, task)) = self.tasks.pop_due(self.clock.now()) else {
            return Ok(None);
        };
        self.handle(task.clone()).await?;
        Ok(Some(task))
    }

    /// Run every task that is due now, in fire order.
    async fn run_due(&mut self) -> Result<usize> {
        let mut ran = 0usize;
        while let Some((_, task)) = self.tasks.pop_due(self.clock.now()) {
            self.handle(task).await?;
            ran += 1;
        }
        Ok(ran)
    }

    async fn handle(&mut self, task: Task) -> Result<()> {
        match task {
            Task::FullCycle => {
                self.run_cycle().await?;
            }
            Task::DrainRetry(list) => {
                debug!(list = %list, "resuming deferred drain");
                let report = self
                    .dispatcher
                    .resume(
                        &mut self.lists,
                        self.gateway.as_ref(),
                        self.clock.as_ref(),
                        &mut self.tasks,
                    )
                    .await?;
                info!(
                    delivered = report.delivered,
                    deferred = report.deferred.len(),
                    "deferred drain finished"
                );
            }
        }
        Ok(())
    }

    /// One full synchronization cycle.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        info!(at = %self.clock.now(), "Doing a status update");

        self.refresh_lists().await?;

        let reconciler = self
            .reconciler
            .as_ref()
            .ok_or_else(|| Error::State("update cycle before setup".to_string()))?;
        reconciler
            .reconcile(&mut self.lists, self.gateway.as_ref(), self.clock.as_ref())
            .await?;

        let mut queued = 0usize;
        let mut skipped = 0usize;
        for (key, list) in self.lists.iter_mut() {
            let cursor = resolve_cursor(list, self.gateway.as_ref(), self.clock.now()).await?;
            let query = match cursor {
                Cursor::Unresolved => {
                    debug!(list = %key, "skipping list this cycle");
                    skipped += 1;
                    continue;
                }
                Cursor::Initial => TimelineQuery {
                    list_id: list.source_id.clone(),
                    since_id: None,
                    count: Some(self.settings.backfill_count),
                },
                Cursor::After(id) => TimelineQuery {
                    list_id: list.source_id.clone(),
                    since_id: Some(id),
                    count: None,
                },
            };

            let mut items = self.source.list_timeline(query).await?;
            // Timelines come newest first; deliver oldest first.
            items.reverse();
            for item in &items {
                Dispatcher::enqueue(list, format_item(&self.settings.content_domain, item));
            }
            if !items.is_empty() {
                debug!(list = %key, new = items.len(), "queued items");
            }
            queued += items.len();
        }

        let delivered = self
            .dispatcher
            .drain(
                &mut self.lists,
                self.gateway.as_ref(),
                self.clock.as_ref(),
                &mut self.tasks,
            )
            .await?
            .map(|r| r.delivered)
            .unwrap_or(0);

        let reset = self.source.timeline_reset().await?;
        let now = self.clock.now();
        let mut next_cycle = offset(reset, self.settings.reschedule_margin);
        if next_cycle <= now {
            next_cycle = offset(now, self.settings.reschedule_margin);
        }
        self.tasks.schedule_at(next_cycle, Task::FullCycle);

        info!(
            at = %now,
            queued,
            delivered,
            pending = self.lists.pending_total(),
            next = %next_cycle,
            "Finished a status update"
        );

        Ok(CycleReport {
            queued,
            delivered,
            skipped,
            next_cycle,
        })
    }
}
