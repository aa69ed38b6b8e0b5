//! Resume point per list: the newest item already delivered or queued.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::{
    domain::ItemId,
    formatting::parse_item_id,
    ports::RemoteChannelGateway,
    rate_limit::Route,
    state::ListState,
    Error, Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cursor {
    /// Nothing delivered yet (or the latest message carries no id): backfill.
    Initial,
    /// Fetch items strictly newer than this id.
    After(ItemId),
    /// The channel cannot be read right now; skip the list this cycle.
    Unresolved,
}

impl Cursor {
    fn from_text(text: &str) -> Self {
        parse_item_id(text).map(Cursor::After).unwrap_or(Cursor::Initial)
    }
}

/// Work out where fetching should resume for `list`.
///
/// Queued messages count as delivered: if anything is pending, the newest
/// pending message is the cursor and the channel is not read at all.
/// Otherwise the single latest message in the destination channel is read,
/// unless that channel's message route is rate limited.
pub async fn resolve_cursor(
    list: &ListState,
    gateway: &dyn RemoteChannelGateway,
    now: DateTime<Utc>,
) -> Result<Cursor> {
    if let Some(last) = list.pending.back() {
        return Ok(Cursor::from_text(last));
    }

    let Some(channel) = list.destination.as_ref() else {
        return Err(Error::State(format!(
            "list {} has no destination channel",
            list.name
        )));
    };

    let route = Route::ChannelMessages(channel.clone());
    if gateway
        .rate_limit(&route)
        .map(|r| r.is_exhausted(now))
        .unwrap_or(false)
    {
        debug!(list = %list.name, "message reads rate limited, cursor unresolved");
        return Ok(Cursor::Unresolved);
    }

    let messages = match gateway.list_messages(channel, Some(1)).await {
        Ok(m) => m,
        Err(Error::RateLimited(_)) => return Ok(Cursor::Unresolved),
        Err(e) => return Err(e),
    };

    Ok(messages
        .first()
        .map(|m| Cursor::from_text(&m.content))
        .unwrap_or(Cursor::Initial))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::Clock,
        domain::{ChannelId, ListId},
        formatting::{format_item, DEFAULT_CONTENT_DOMAIN},
        ports::ChannelKind,
        testing::{epoch, item, FakeGateway, ManualClock},
    };

    fn bound_list(channel: &ChannelId) -> ListState {
        let mut list = ListState::new("News", ListId("L1".into()));
        list.destination = Some(channel.clone());
        list
    }

    #[tokio::test]
    async fn pending_tail_wins_without_reading_remote() {
        let clock = ManualClock::at(1_000);
        let gw = FakeGateway::new(clock.clone());
        let ch = gw.add_channel("news", ChannelKind::Text, None);
        gw.add_message(&ch, &format_item(DEFAULT_CONTENT_DOMAIN, &item(50)));

        let mut list = bound_list(&ch);
        list.pending
            .push_back(format_item(DEFAULT_CONTENT_DOMAIN, &item(70)));
        list.pending
            .push_back(format_item(DEFAULT_CONTENT_DOMAIN, &item(80)));

        let cursor = resolve_cursor(&list, gw.as_ref(), clock.now()).await.unwrap();
        assert_eq!(cursor, Cursor::After(ItemId(80)));
        assert_eq!(gw.reads(), 0);
    }

    #[tokio::test]
    async fn reads_latest_remote_message() {
        let clock = ManualClock::at(1_000);
        let gw = FakeGateway::new(clock.clone());
        let ch = gw.add_channel("news", ChannelKind::Text, None);
        gw.add_message(&ch, &format_item(DEFAULT_CONTENT_DOMAIN, &item(10)));
        gw.add_message(&ch, &format_item(DEFAULT_CONTENT_DOMAIN, &item(11)));

        let cursor = resolve_cursor(&bound_list(&ch), gw.as_ref(), clock.now())
            .await
            .unwrap();
        assert_eq!(cursor, Cursor::After(ItemId(11)));
    }

    #[tokio::test]
    async fn empty_channel_means_backfill() {
        let clock = ManualClock::at(1_000);
        let gw = FakeGateway::new(clock.clone());
        let ch = gw.add_channel("news", ChannelKind::Text, None);

        let cursor = resolve_cursor(&bound_list(&ch), gw.as_ref(), clock.now())
            .await
            .unwrap();
        assert_eq!(cursor, Cursor::Initial);
    }

    #[tokio::test]
    async fn malformed_latest_message_means_backfill() {
        let clock = ManualClock::at(1_000);
        let gw = FakeGateway::new(clock.clone());
        let ch = gw.add_channel("news", ChannelKind::Text, None);
        gw.add_message(&ch, "someone typed here");

        let cursor = resolve_cursor(&bound_list(&ch), gw.as_ref(), clock.now())
            .await
            .unwrap();
        assert_eq!(cursor, Cursor::Initial);
    }

    #[tokio::test]
    async fn rate_limited_channel_is_unresolved_until_reset() {
        let clock = ManualClock::at(1_000);
        let gw = FakeGateway::new(clock.clone());
        let ch = gw.add_channel("news", ChannelKind::Text, None);
        gw.add_message(&ch, &format_item(DEFAULT_CONTENT_DOMAIN, &item(10)));
        gw.set_limit(Route::ChannelMessages(ch.clone()), 0, epoch(1_005));

        let list = bound_list(&ch);
        let cursor = resolve_cursor(&list, gw.as_ref(), clock.now()).await.unwrap();
        assert_eq!(cursor, Cursor::Unresolved);
        assert_eq!(gw.reads(), 0);

        clock.advance(std::time::Duration::from_secs(5));
        let cursor = resolve_cursor(&list, gw.as_ref(), clock.now()).await.unwrap();
        assert_eq!(cursor, Cursor::After(ItemId(10)));
    }
}
