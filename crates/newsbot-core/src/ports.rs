//! Ports to the two remote platforms.
//!
//! The messaging platform (Discord) and the content platform (Twitter) live
//! behind these traits; adapter crates implement them over HTTP.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    domain::{ChannelId, ItemId, ListId},
    rate_limit::{RateLimitRecord, Route},
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelKind {
    Text,
    Category,
    Other(u8),
}

impl ChannelKind {
    /// Discord channel type code.
    pub fn code(self) -> u8 {
        match self {
            ChannelKind::Text => 0,
            ChannelKind::Category => 4,
            ChannelKind::Other(c) => c,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0 => ChannelKind::Text,
            4 => ChannelKind::Category,
            c => ChannelKind::Other(c),
        }
    }
}

/// A channel as it currently exists remotely.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteChannel {
    pub id: ChannelId,
    pub name: String,
    pub kind: ChannelKind,
    pub parent_id: Option<ChannelId>,
    pub position: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewChannel {
    pub name: String,
    pub kind: ChannelKind,
    pub parent_id: Option<ChannelId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelPosition {
    pub id: ChannelId,
    pub position: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteMessage {
    pub id: String,
    pub content: String,
}

/// Messaging platform port, bound to a single destination workspace.
///
/// Every call updates the gateway's rate-limit records from response
/// metadata. A call refused because of rate limiting fails with
/// `Error::RateLimited`.
#[async_trait]
pub trait RemoteChannelGateway: Send + Sync {
    async fn list_channels(&self) -> Result<Vec<RemoteChannel>>;

    async fn create_channel(&self, channel: NewChannel) -> Result<RemoteChannel>;

    /// Empty input is a no-op and issues no call.
    async fn reposition_channels(&self, positions: &[ChannelPosition]) -> Result<()>;

    /// Newest first.
    async fn list_messages(
        &self,
        channel: &ChannelId,
        limit: Option<u32>,
    ) -> Result<Vec<RemoteMessage>>;

    async fn create_message(&self, channel: &ChannelId, content: &str) -> Result<RemoteMessage>;

    fn rate_limit(&self, route: &Route) -> Option<RateLimitRecord>;
}

/// A curated list on the content platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentList {
    pub name: String,
    pub id: ListId,
}

/// One post in a list timeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentItem {
    pub id: ItemId,
    pub created_at: String,
    pub author_handle: String,
    pub is_repost: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimelineQuery {
    pub list_id: ListId,
    /// Only items strictly newer than this id.
    pub since_id: Option<ItemId>,
    pub count: Option<u32>,
}

/// Content platform port.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Handle of the authenticated account.
    async fn verify_credentials(&self) -> Result<String>;

    async fn list_memberships(&self) -> Result<Vec<ContentList>>;

    /// Newest first.
    async fn list_timeline(&self, query: TimelineQuery) -> Result<Vec<ContentItem>>;

    /// When the list-timeline rate-limit window resets.
    async fn timeline_reset(&self) -> Result<DateTime<Utc>>;
}
