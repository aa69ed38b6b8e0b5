//! Outbound message text and the item id embedded in it.
//!
//! The formatted text is the only place the delivered item id survives
//! between runs: the cursor tracker reads it back out of the latest message
//! in a channel. `format_item` and `parse_item_id` must stay in step.

use std::sync::OnceLock;

use regex::Regex;

use crate::{domain::ItemId, ports::ContentItem};

pub const DEFAULT_CONTENT_DOMAIN: &str = "twitter.com";

const REPOST_MARKER: &str = "<Retweet>";

/// Render one item as canonical message text.
///
/// ```text
/// URL: https://twitter.com/{author}/status/{id}
/// Date: {created_at}
/// <Retweet>            (reposts only)
/// ```
///
/// The platform unfurls the URL into a preview on its own.
pub fn format_item(content_domain: &str, item: &ContentItem) -> String {
    let repost = if item.is_repost {
        format!("\n{REPOST_MARKER}")
    } else {
        String::new()
    };
    format!(
        "URL: https://{content_domain}/{author}/status/{id}\nDate: {date}{repost}",
        author = item.author_handle,
        id = item.id,
        date = item.created_at,
    )
}

/// Extract the item id from message text produced by [`format_item`].
///
/// Takes the first run of digits that ends a line. The URL line is first and
/// ends with the id; the date line ends with a year, so the match must not
/// be anchored to the end of the whole text.
///
/// Returns `None` for text without a line-ending integer or one that does
/// not fit in a u64.
pub fn parse_item_id(message: &str) -> Option<ItemId> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?m)(\d+)\r?$").expect("valid regex"));

    let caps = re.captures(message)?;
    caps.get(1)?.as_str().parse::<u64>().ok().map(ItemId)
}
