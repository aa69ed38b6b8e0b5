use std::fmt;

/// Messaging platform workspace id (Discord guild snowflake).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GuildId(pub String);

/// Messaging platform channel id (Discord channel snowflake).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub String);

/// Content platform list id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ListId(pub String);

/// Content item id (tweet id). Ids grow over time, so the highest delivered
/// id is the resume point for a list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub u64);

/// Case-folded list name used to key list state.
///
/// The messaging platform lower-cases text channel names and turns
/// whitespace into `-`, so list names are compared in that form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListKey(String);

impl ListKey {
    pub fn new(name: &str) -> Self {
        Self(name.to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a remote channel name refers to this list.
    pub fn matches(&self, channel_name: &str) -> bool {
        channel_slug(channel_name) == channel_slug(&self.0)
    }
}

/// A name as the messaging platform stores it for a text channel.
pub fn channel_slug(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

impl fmt::Display for GuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ListKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
