//! Keeps the destination channels in line with the observed lists.
//!
//! Remote state is ground truth on every pass: the category and its child
//! channels are re-read, missing ones are created, and the children are put
//! in name order. The only thing remembered between passes is each list's
//! bound channel id.

use std::time::Duration;

use tracing::{debug, info};

use crate::{
    clock::Clock,
    domain::{ChannelId, ListKey},
    ports::{ChannelKind, ChannelPosition, NewChannel, RemoteChannel, RemoteChannelGateway},
    rate_limit::Route,
    state::ListRegistry,
    Error, Result,
};

/// Blocking poll used before channel creation while the create route is
/// rate limited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(10),
            max_attempts: 360,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub category: Option<ChannelId>,
    pub category_created: bool,
    /// Lists bound to an existing channel this pass.
    pub bound: Vec<ListKey>,
    /// Lists that got a newly created channel this pass.
    pub created: Vec<ListKey>,
    pub repositioned: usize,
}

#[derive(Clone, Debug)]
pub struct Reconciler {
    category_name: String,
    create_retry: RetryPolicy,
}

impl Reconciler {
    pub fn new(category_name: impl Into<String>, create_retry: RetryPolicy) -> Self {
        Self {
            category_name: category_name.into(),
            create_retry,
        }
    }

    pub fn category_name(&self) -> &str {
        &self.category_name
    }

    /// Idempotent: with no remote change in between, a second call creates
    /// nothing and moves nothing.
    pub async fn reconcile(
        &self,
        lists: &mut ListRegistry,
        gateway: &dyn RemoteChannelGateway,
        clock: &dyn Clock,
    ) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let channels = gateway.list_channels().await?;

        let existing = channels
            .iter()
            .find(|c| c.kind == ChannelKind::Category && c.name == self.category_name)
            .cloned();
        let category = match existing {
            Some(c) => c,
            None => {
                let created = self
                    .create(
                        gateway,
                        clock,
                        NewChannel {
                            name: self.category_name.clone(),
                            kind: ChannelKind::Category,
                            parent_id: None,
                        },
                    )
                    .await?;
                info!(category = %self.category_name, id = %created.id, "created channel category");
                report.category_created = true;
                created
            }
        };
        report.category = Some(category.id.clone());

        let mut managed: Vec<RemoteChannel> = channels
            .into_iter()
            .filter(|c| c.parent_id.as_ref() == Some(&category.id))
            .collect();
        managed.sort_by_key(|c| c.position);

        for (key, list) in lists.iter_mut() {
            if list.destination.is_some() {
                continue;
            }

            if let Some(found) = managed.iter().find(|c| key.matches(&c.name)) {
                debug!(list = %list.name, channel = %found.id, "bound existing channel");
                list.destination = Some(found.id.clone());
                report.bound.push(key.clone());
                continue;
            }

            let created = self
                .create(
                    gateway,
                    clock,
                    NewChannel {
                        name: list.name.clone(),
                        kind: ChannelKind::Text,
                        parent_id: Some(category.id.clone()),
                    },
                )
                .await?;
            info!(list = %list.name, channel = %created.id, "created channel");
            list.destination = Some(created.id.clone());
            report.created.push(key.clone());
            managed.push(created);
        }

        let moves = sort_positions(&managed);
        if !moves.is_empty() {
            debug!(moves = moves.len(), "reordering channels");
            self.reposition(gateway, clock, &moves).await?;
        }
        report.repositioned = moves.len();

        Ok(report)
    }

    /// Create a channel, first waiting out any rate limit on the create route.
    ///
    /// This blocks the whole loop; it only happens on first run or when a new
    /// list appears.
    async fn create(
        &self,
        gateway: &dyn RemoteChannelGateway,
        clock: &dyn Clock,
        channel: NewChannel,
    ) -> Result<RemoteChannel> {
        let route = Route::GuildChannels;
        let mut waits = 0u32;
        loop {
            self.wait_for(gateway, clock, &route, &mut waits).await?;
            match gateway.create_channel(channel.clone()).await {
                Ok(created) => return Ok(created),
                Err(Error::RateLimited(_)) => self.back_off(clock, &route, &mut waits).await?,
                Err(e) => return Err(e),
            }
        }
    }

    /// Reorder shares the create route's bucket, which a create just above
    /// may have emptied.
    async fn reposition(
        &self,
        gateway: &dyn RemoteChannelGateway,
        clock: &dyn Clock,
        moves: &[ChannelPosition],
    ) -> Result<()> {
        let route = Route::GuildChannels;
        let mut waits = 0u32;
        loop {
            self.wait_for(gateway, clock, &route, &mut waits).await?;
            match gateway.reposition_channels(moves).await {
                Ok(()) => return Ok(()),
                Err(Error::RateLimited(_)) => self.back_off(clock, &route, &mut waits).await?,
                Err(e) => return Err(e),
            }
        }
    }

    /// Poll until `route` has quota again, within the retry policy.
    async fn wait_for(
        &self,
        gateway: &dyn RemoteChannelGateway,
        clock: &dyn Clock,
        route: &Route,
        waits: &mut u32,
    ) -> Result<()> {
        while gateway
            .rate_limit(route)
            .map(|r| r.is_exhausted(clock.now()))
            .unwrap_or(false)
        {
            self.back_off(clock, route, waits).await?;
        }
        Ok(())
    }

    async fn back_off(&self, clock: &dyn Clock, route: &Route, waits: &mut u32) -> Result<()> {
        if *waits >= self.create_retry.max_attempts {
            return Err(Error::RateLimited(route.clone()));
        }
        *waits += 1;
        debug!(route = %route, attempt = *waits, "rate limited, waiting");
        clock.sleep(self.create_retry.delay).await;
        Ok(())
    }
}

/// Position updates that put `current` (in remote position order) into
/// lexicographic name order.
///
/// Channels keep the position slots they already occupy; the sorted channels
/// are dealt into those slots and only the ones whose slot changes are
/// emitted. Duplicate or descending positions are spread out first so every
/// slot is distinct. No case folding: plain string order.
pub fn sort_positions(current: &[RemoteChannel]) -> Vec<ChannelPosition> {
    let mut slots = Vec::with_capacity(current.len());
    let mut prev: Option<i64> = None;
    for ch in current {
        let slot = match prev {
            Some(p) if ch.position <= p => p + 1,
            _ => ch.position,
        };
        slots.push(slot);
        prev = Some(slot);
    }

    let mut sorted: Vec<&RemoteChannel> = current.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    sorted
        .into_iter()
        .zip(current)
        .zip(slots)
        .filter(|((want, was), slot)| want.id != was.id || want.position != *slot)
        .map(|((want, _), slot)| ChannelPosition {
            id: want.id.clone(),
            position: slot,
        })
        .collect()
}
