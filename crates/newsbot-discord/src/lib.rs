//! Discord adapter (REST).
//!
//! Implements the `newsbot-core` RemoteChannelGateway over the Discord HTTP
//! API for a single guild, tracking per-route rate limits from the
//! `X-RateLimit-*` response headers.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Method, StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use newsbot_core::{
    domain::{ChannelId, GuildId},
    errors::Error,
    ports::{
        ChannelKind, ChannelPosition, NewChannel, RemoteChannel, RemoteChannelGateway,
        RemoteMessage,
    },
    rate_limit::{RateLimitRecord, RateLimitTable, Route},
    Result,
};

pub const BASE_URL: &str = "https://discord.com/api/v10";

const API_TIMEOUT: Duration = Duration::from_secs(15);

pub struct DiscordClient {
    http: reqwest::Client,
    base_url: String,
    guild: GuildId,
    limits: RateLimitTable,
}

#[derive(Debug, Deserialize)]
struct GuildDto {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ChannelDto {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    position: i64,
}

impl From<ChannelDto> for RemoteChannel {
    fn from(c: ChannelDto) -> Self {
        RemoteChannel {
            id: ChannelId(c.id),
            name: c.name,
            kind: ChannelKind::from_code(c.kind),
            parent_id: c.parent_id.map(ChannelId),
            position: c.position,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageDto {
    id: String,
    #[serde(default)]
    content: String,
}

impl From<MessageDto> for RemoteMessage {
    fn from(m: MessageDto) -> Self {
        RemoteMessage {
            id: m.id,
            content: m.content,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateChannelBody<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct PositionBody<'a> {
    id: &'a str,
    position: i64,
}

#[derive(Debug, Serialize)]
struct CreateMessageBody<'a> {
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct TooManyRequestsBody {
    retry_after: f64,
}

impl DiscordClient {
    /// Build a client bound to the first guild the bot belongs to.
    ///
    /// The relay serves exactly one guild.
    pub async fn connect(bot_token: &str) -> Result<Self> {
        Self::connect_at(BASE_URL, bot_token).await
    }

    async fn connect_at(base_url: &str, bot_token: &str) -> Result<Self> {
        let http = build_http(bot_token)?;
        let url = format!("{base_url}/users/@me/guilds");
        let resp = http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("discord request error: {e}")))?;
        let resp = check_status(resp, None, &RateLimitTable::new()).await?;
        let guilds: Vec<GuildDto> = resp
            .json()
            .await
            .map_err(|e| Error::Transport(format!("discord json error: {e}")))?;

        if guilds.len() > 1 {
            warn!(guilds = guilds.len(), "bot is in several guilds, using the first");
        }
        let guild = guilds
            .into_iter()
            .next()
            .ok_or_else(|| Error::State("bot is not a member of any guild".to_string()))?;
        debug!(guild = %guild.id, name = %guild.name, "using guild");

        Ok(Self {
            http,
            base_url: base_url.to_string(),
            guild: GuildId(guild.id),
            limits: RateLimitTable::new(),
        })
    }

    #[cfg(test)]
    fn with_guild(bot_token: &str, guild: GuildId) -> Result<Self> {
        Ok(Self {
            http: build_http(bot_token)?,
            base_url: BASE_URL.to_string(),
            guild,
            limits: RateLimitTable::new(),
        })
    }

    pub fn guild(&self) -> &GuildId {
        &self.guild
    }

    fn route_url(&self, route: &Route) -> String {
        match route {
            Route::GuildChannels => format!("{}/guilds/{}/channels", self.base_url, self.guild),
            Route::ChannelMessages(id) => format!("{}/channels/{id}/messages", self.base_url),
        }
    }

    async fn call(
        &self,
        method: Method,
        route: &Route,
        build: impl FnOnce(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let req = build(self.http.request(method, self.route_url(route)));
        let resp = req
            .send()
            .await
            .map_err(|e| Error::Transport(format!("discord request error: {e}")))?;
        check_status(resp, Some(route), &self.limits).await
    }

    async fn call_json<T: DeserializeOwned>(
        &self,
        method: Method,
        route: &Route,
        build: impl FnOnce(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
    ) -> Result<T> {
        self.call(method, route, build)
            .await?
            .json()
            .await
            .map_err(|e| Error::Transport(format!("discord json error: {e}")))
    }
}

fn build_http(bot_token: &str) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    let auth = HeaderValue::from_str(&format!("Bot {bot_token}"))
        .map_err(|e| Error::Config(format!("invalid discord bot token: {e}")))?;
    headers.insert(AUTHORIZATION, auth);

    reqwest::Client::builder()
        .timeout(API_TIMEOUT)
        .user_agent("DiscordBot (https://github.com/newsbot, 0.1)")
        .default_headers(headers)
        .build()
        .map_err(|e| Error::Transport(format!("discord client build error: {e}")))
}

/// Record rate-limit headers, then turn non-2xx responses into errors.
async fn check_status(
    resp: reqwest::Response,
    route: Option<&Route>,
    limits: &RateLimitTable,
) -> Result<reqwest::Response> {
    let status = resp.status();

    if let Some(route) = route {
        if let Some(rec) = parse_rate_limit(resp.headers()) {
            limits.record(route.clone(), rec);
        }
    }

    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(failure(status, route, &body, limits, Utc::now()))
}

/// A 429 on a known route becomes `Error::RateLimited`, backfilling the
/// route's record from `retry_after` when the headers carried none. Anything
/// else is a transport failure.
fn failure(
    status: StatusCode,
    route: Option<&Route>,
    body: &str,
    limits: &RateLimitTable,
    now: DateTime<Utc>,
) -> Error {
    if status == StatusCode::TOO_MANY_REQUESTS {
        if let Some(route) = route {
            if limits.get(route).is_none() {
                if let Some(rec) = parse_retry_after(body, now) {
                    limits.record(route.clone(), rec);
                }
            }
            warn!(route = %route, "discord rate limited");
            return Error::RateLimited(route.clone());
        }
    }

    Error::Transport(format!(
        "discord request failed: {status} {}",
        body.chars().take(200).collect::<String>()
    ))
}

/// `X-RateLimit-Remaining` + `X-RateLimit-Reset` (epoch seconds, fractional).
fn parse_rate_limit(headers: &HeaderMap) -> Option<RateLimitRecord> {
    let remaining = headers
        .get("x-ratelimit-remaining")?
        .to_str()
        .ok()?
        .trim()
        .parse::<u32>()
        .ok()?;
    let reset = headers
        .get("x-ratelimit-reset")?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()?;
    let reset_at = DateTime::<Utc>::from_timestamp_millis((reset * 1000.0).ceil() as i64)?;
    Some(RateLimitRecord::new(remaining, reset_at))
}

/// Fallback for 429 bodies that carry only `retry_after` (seconds).
fn parse_retry_after(body: &str, now: DateTime<Utc>) -> Option<RateLimitRecord> {
    let parsed: TooManyRequestsBody = serde_json::from_str(body).ok()?;
    let wait = chrono::Duration::milliseconds((parsed.retry_after * 1000.0).ceil() as i64);
    Some(RateLimitRecord::new(0, now + wait))
}

#[async_trait]
impl RemoteChannelGateway for DiscordClient {
    async fn list_channels(&self) -> Result<Vec<RemoteChannel>> {
        let channels: Vec<ChannelDto> = self
            .call_json(Method::GET, &Route::GuildChannels, |r| r)
            .await?;
        Ok(channels.into_iter().map(RemoteChannel::from).collect())
    }

    async fn create_channel(&self, channel: NewChannel) -> Result<RemoteChannel> {
        let body = CreateChannelBody {
            name: &channel.name,
            kind: channel.kind.code(),
            parent_id: channel.parent_id.as_ref().map(|p| p.0.as_str()),
        };
        let created: ChannelDto = self
            .call_json(Method::POST, &Route::GuildChannels, |r| r.json(&body))
            .await?;
        Ok(created.into())
    }

    async fn reposition_channels(&self, positions: &[ChannelPosition]) -> Result<()> {
        if positions.is_empty() {
            return Ok(());
        }
        let body: Vec<PositionBody<'_>> = positions
            .iter()
            .map(|p| PositionBody {
                id: &p.id.0,
                position: p.position,
            })
            .collect();
        self.call(Method::PATCH, &Route::GuildChannels, |r| r.json(&body))
            .await?;
        Ok(())
    }

    async fn list_messages(
        &self,
        channel: &ChannelId,
        limit: Option<u32>,
    ) -> Result<Vec<RemoteMessage>> {
        let route = Route::ChannelMessages(channel.clone());
        let messages: Vec<MessageDto> = self
            .call_json(Method::GET, &route, |r| match limit {
                Some(n) => r.query(&[("limit", n)]),
                None => r,
            })
            .await?;
        Ok(messages.into_iter().map(RemoteMessage::from).collect())
    }

    async fn create_message(&self, channel: &ChannelId, content: &str) -> Result<RemoteMessage> {
        let route = Route::ChannelMessages(channel.clone());
        let body = CreateMessageBody { content };
        let created: MessageDto = self
            .call_json(Method::POST, &route, |r| r.json(&body))
            .await?;
        Ok(created.into())
    }

    fn rate_limit(&self, route: &Route) -> Option<RateLimitRecord> {
        self.limits.get(route)
    }
}
