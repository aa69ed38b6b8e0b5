//! In-memory fakes of the platform ports and a manually driven clock.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::{
    clock::Clock,
    domain::{channel_slug, ChannelId, ItemId, ListId},
    errors::Error,
    ports::{
        ChannelKind, ChannelPosition, ContentItem, ContentList, ContentSource, NewChannel,
        RemoteChannel, RemoteChannelGateway, RemoteMessage, TimelineQuery,
    },
    rate_limit::{RateLimitRecord, RateLimitTable, Route},
    Result,
};

pub fn epoch(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

/// Clock whose `sleep` advances virtual time instantly.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn at(secs: i64) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(epoch(secs)),
            sleeps: Mutex::new(Vec::new()),
        })
    }

    pub fn advance(&self, dur: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(dur).unwrap();
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, dur: Duration) {
        self.sleeps.lock().unwrap().push(dur);
        self.advance(dur);
    }
}

#[derive(Clone, Copy)]
struct Quota {
    remaining: u32,
    reset_at: DateTime<Utc>,
}

#[derive(Default)]
struct GatewayState {
    channels: Vec<RemoteChannel>,
    /// Oldest first.
    messages: HashMap<ChannelId, Vec<RemoteMessage>>,
    created: Vec<NewChannel>,
    repositions: Vec<Vec<ChannelPosition>>,
    sent: Vec<(ChannelId, String)>,
    reads: usize,
    message_quota: HashMap<ChannelId, Quota>,
    create_quota: Option<Quota>,
    fail_sends: bool,
    refuse_after: Option<usize>,
    next_id: u64,
}

/// In-memory messaging platform with header-driven rate limits.
pub struct FakeGateway {
    clock: Arc<ManualClock>,
    limits: RateLimitTable,
    state: Mutex<GatewayState>,
}

impl FakeGateway {
    pub fn new(clock: Arc<ManualClock>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            limits: RateLimitTable::new(),
            state: Mutex::new(GatewayState {
                next_id: 1,
                ..GatewayState::default()
            }),
        })
    }

    fn alloc_id(st: &mut GatewayState, prefix: &str) -> String {
        let id = st.next_id;
        st.next_id += 1;
        format!("{prefix}{id}")
    }

    /// Seed a channel as if it already existed remotely.
    pub fn add_channel(
        &self,
        name: &str,
        kind: ChannelKind,
        parent: Option<&ChannelId>,
    ) -> ChannelId {
        let mut st = self.state.lock().unwrap();
        let id = ChannelId(Self::alloc_id(&mut st, "c"));
        let position = st.channels.len() as i64;
        st.channels.push(RemoteChannel {
            id: id.clone(),
            name: name.to_string(),
            kind,
            parent_id: parent.cloned(),
            position,
        });
        id
    }

    /// Seed a message as if it had been posted earlier.
    pub fn add_message(&self, channel: &ChannelId, content: &str) {
        let mut st = self.state.lock().unwrap();
        let id = Self::alloc_id(&mut st, "m");
        st.messages
            .entry(channel.clone())
            .or_default()
            .push(RemoteMessage {
                id,
                content: content.to_string(),
            });
    }

    pub fn set_limit(&self, route: Route, remaining: u32, reset_at: DateTime<Utc>) {
        self.limits
            .record(route, RateLimitRecord::new(remaining, reset_at));
    }

    /// Allow `remaining` more sends to `channel` before the record reads exhausted.
    pub fn set_message_quota(&self, channel: &ChannelId, remaining: u32, reset_at: DateTime<Utc>) {
        let mut st = self.state.lock().unwrap();
        st.message_quota
            .insert(channel.clone(), Quota { remaining, reset_at });
    }

    pub fn set_create_quota(&self, remaining: u32, reset_at: DateTime<Utc>) {
        let mut st = self.state.lock().unwrap();
        st.create_quota = Some(Quota { remaining, reset_at });
    }

    /// Answer every send after the first `sends` with a rate-limit refusal
    /// that leaves no record behind.
    pub fn refuse_sends_after(&self, sends: usize) {
        self.state.lock().unwrap().refuse_after = Some(sends);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.state.lock().unwrap().fail_sends = fail;
    }

    pub fn channels(&self) -> Vec<RemoteChannel> {
        self.state.lock().unwrap().channels.clone()
    }

    pub fn channel_named(&self, name: &str) -> Option<RemoteChannel> {
        self.channels().into_iter().find(|c| c.name == name)
    }

    pub fn created(&self) -> Vec<NewChannel> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn repositions(&self) -> Vec<Vec<ChannelPosition>> {
        self.state.lock().unwrap().repositions.clone()
    }

    pub fn sent(&self) -> Vec<(ChannelId, String)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn reads(&self) -> usize {
        self.state.lock().unwrap().reads
    }

    /// Channel names under `parent`, in remote position order.
    pub fn ordered_names(&self, parent: &ChannelId) -> Vec<String> {
        let mut managed: Vec<RemoteChannel> = self
            .channels()
            .into_iter()
            .filter(|c| c.parent_id.as_ref() == Some(parent))
            .collect();
        managed.sort_by_key(|c| c.position);
        managed.into_iter().map(|c| c.name).collect()
    }

    fn check(&self, route: &Route) -> Result<()> {
        if self.limits.is_exhausted(route, self.clock.now()) {
            return Err(Error::RateLimited(route.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteChannelGateway for FakeGateway {
    async fn list_channels(&self) -> Result<Vec<RemoteChannel>> {
        Ok(self.channels())
    }

    async fn create_channel(&self, channel: NewChannel) -> Result<RemoteChannel> {
        self.check(&Route::GuildChannels)?;
        let mut st = self.state.lock().unwrap();
        let id = ChannelId(Self::alloc_id(&mut st, "c"));
        let position = st.channels.iter().map(|c| c.position).max().unwrap_or(-1) + 1;
        let created = RemoteChannel {
            id,
            name: if channel.kind == ChannelKind::Text {
                channel_slug(&channel.name)
            } else {
                channel.name.clone()
            },
            kind: channel.kind,
            parent_id: channel.parent_id.clone(),
            position,
        };
        st.channels.push(created.clone());
        st.created.push(channel);
        if let Some(q) = st.create_quota.as_mut() {
            q.remaining = q.remaining.saturating_sub(1);
            let rec = RateLimitRecord::new(q.remaining, q.reset_at);
            self.limits.record(Route::GuildChannels, rec);
        }
        Ok(created)
    }

    async fn reposition_channels(&self, positions: &[ChannelPosition]) -> Result<()> {
        if positions.is_empty() {
            return Ok(());
        }
        self.check(&Route::GuildChannels)?;
        let mut st = self.state.lock().unwrap();
        for p in positions {
            if let Some(ch) = st.channels.iter_mut().find(|c| c.id == p.id) {
                ch.position = p.position;
            }
        }
        st.repositions.push(positions.to_vec());
        Ok(())
    }

    async fn list_messages(
        &self,
        channel: &ChannelId,
        limit: Option<u32>,
    ) -> Result<Vec<RemoteMessage>> {
        self.check(&Route::ChannelMessages(channel.clone()))?;
        let mut st = self.state.lock().unwrap();
        st.reads += 1;
        let mut out: Vec<RemoteMessage> = st
            .messages
            .get(channel)
            .map(|m| m.iter().rev().cloned().collect())
            .unwrap_or_default();
        if let Some(limit) = limit {
            out.truncate(limit as usize);
        }
        Ok(out)
    }

    async fn create_message(&self, channel: &ChannelId, content: &str) -> Result<RemoteMessage> {
        let route = Route::ChannelMessages(channel.clone());
        self.check(&route)?;
        let mut st = self.state.lock().unwrap();
        if st.fail_sends {
            return Err(Error::Transport("500 Internal Server Error".to_string()));
        }
        if st.refuse_after.is_some_and(|n| st.sent.len() >= n) {
            return Err(Error::RateLimited(route));
        }
        let msg = RemoteMessage {
            id: Self::alloc_id(&mut st, "m"),
            content: content.to_string(),
        };
        st.messages
            .entry(channel.clone())
            .or_default()
            .push(msg.clone());
        st.sent.push((channel.clone(), content.to_string()));
        if let Some(q) = st.message_quota.get_mut(channel) {
            q.remaining = q.remaining.saturating_sub(1);
            self.limits
                .record(route, RateLimitRecord::new(q.remaining, q.reset_at));
        }
        Ok(msg)
    }

    fn rate_limit(&self, route: &Route) -> Option<RateLimitRecord> {
        self.limits.get(route)
    }
}

/// In-memory content platform.
pub struct FakeSource {
    handle: String,
    state: Mutex<SourceState>,
}

#[derive(Default)]
struct SourceState {
    lists: Vec<ContentList>,
    /// Chronological, oldest first.
    items: HashMap<ListId, Vec<ContentItem>>,
    queries: Vec<TimelineQuery>,
    reset_at: Option<DateTime<Utc>>,
}

impl FakeSource {
    pub fn new(handle: &str) -> Arc<Self> {
        Arc::new(Self {
            handle: handle.to_string(),
            state: Mutex::new(SourceState::default()),
        })
    }

    pub fn add_list(&self, name: &str, id: &str) {
        self.state.lock().unwrap().lists.push(ContentList {
            name: name.to_string(),
            id: ListId(id.to_string()),
        });
    }

    pub fn add_items(&self, list: &str, ids: &[u64]) {
        let mut st = self.state.lock().unwrap();
        let items = st.items.entry(ListId(list.to_string())).or_default();
        for id in ids {
            items.push(item(*id));
        }
    }

    pub fn set_reset(&self, at: DateTime<Utc>) {
        self.state.lock().unwrap().reset_at = Some(at);
    }

    pub fn queries(&self) -> Vec<TimelineQuery> {
        self.state.lock().unwrap().queries.clone()
    }
}

pub fn item(id: u64) -> ContentItem {
    ContentItem {
        id: ItemId(id),
        created_at: "Sat Jan 01 00:00:00 +0000 2022".to_string(),
        author_handle: "author".to_string(),
        is_repost: false,
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    async fn verify_credentials(&self) -> Result<String> {
        Ok(self.handle.clone())
    }

    async fn list_memberships(&self) -> Result<Vec<ContentList>> {
        Ok(self.state.lock().unwrap().lists.clone())
    }

    async fn list_timeline(&self, query: TimelineQuery) -> Result<Vec<ContentItem>> {
        let mut st = self.state.lock().unwrap();
        st.queries.push(query.clone());
        let mut out: Vec<ContentItem> = st
            .items
            .get(&query.list_id)
            .map(|items| {
                items
                    .iter()
                    .rev()
                    .filter(|i| query.since_id.map(|s| i.id > s).unwrap_or(true))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if let Some(count) = query.count {
            out.truncate(count as usize);
        }
        Ok(out)
    }

    async fn timeline_reset(&self) -> Result<DateTime<Utc>> {
        self.state
            .lock()
            .unwrap()
            .reset_at
            .ok_or_else(|| Error::External("no rate limit state".to_string()))
    }
}
