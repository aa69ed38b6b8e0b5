//! Twitter adapter (REST v1.1, OAuth 1.0a user context).
//!
//! Implements the `newsbot-core` ContentSource: account lookup, owned lists,
//! list timelines and the list-timeline rate-limit reset.

pub mod oauth;

use std::{sync::Mutex, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, AUTHORIZATION};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::debug;

use newsbot_core::{
    config::TwitterCredentials,
    domain::{ItemId, ListId},
    errors::Error,
    ports::{ContentItem, ContentList, ContentSource, TimelineQuery},
    Result,
};

pub const API_BASE: &str = "https://api.twitter.com/1.1";

const API_TIMEOUT: Duration = Duration::from_secs(30);
const STATUSES_RESOURCE: &str = "/lists/statuses";

pub struct TwitterClient {
    http: reqwest::Client,
    base_url: String,
    creds: TwitterCredentials,
    statuses_reset: Mutex<Option<DateTime<Utc>>>,
}

#[derive(Debug, Deserialize)]
struct UserDto {
    screen_name: String,
}

#[derive(Debug, Deserialize)]
struct ListDto {
    id_str: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct StatusDto {
    id: u64,
    created_at: String,
    user: UserDto,
    #[serde(default)]
    retweeted_status: Option<serde_json::Value>,
}

impl From<StatusDto> for ContentItem {
    fn from(s: StatusDto) -> Self {
        ContentItem {
            id: ItemId(s.id),
            created_at: s.created_at,
            author_handle: s.user.screen_name,
            is_repost: s.retweeted_status.is_some(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RateLimitStatusDto {
    resources: RateLimitResources,
}

#[derive(Debug, Deserialize)]
struct RateLimitResources {
    #[serde(default)]
    lists: std::collections::HashMap<String, RateLimitWindow>,
}

#[derive(Debug, Deserialize)]
struct RateLimitWindow {
    reset: i64,
}

impl TwitterClient {
    pub fn new(creds: TwitterCredentials) -> Result<Self> {
        Self::with_base_url(API_BASE, creds)
    }

    pub fn with_base_url(base_url: &str, creds: TwitterCredentials) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(API_TIMEOUT)
            .build()
            .map_err(|e| Error::Transport(format!("twitter client build error: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            creds,
            statuses_reset: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    /// Signed GET; the query string is built by hand so the signed and sent
    /// parameter encodings are identical.
    async fn get(&self, path: &str, params: &[(String, String)]) -> Result<reqwest::Response> {
        let url = self.url(path);
        let stamp = oauth::Stamp::fresh(Utc::now().timestamp());
        let auth = oauth::authorization(&self.creds, "GET", &url, params, &stamp)?;

        let full = if params.is_empty() {
            url
        } else {
            format!("{url}?{}", query_string(params))
        };

        let resp = self
            .http
            .get(&full)
            .header(AUTHORIZATION, auth)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("twitter request error: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Transport(format!(
                "twitter {path} failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }
        Ok(resp)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<T> {
        self.get(path, params)
            .await?
            .json()
            .await
            .map_err(|e| Error::Transport(format!("twitter json error: {e}")))
    }

    fn remember_reset(&self, headers: &HeaderMap) {
        if let Some(reset) = parse_reset(headers) {
            let mut guard = self.statuses_reset.lock().unwrap_or_else(|e| e.into_inner());
            *guard = Some(reset);
        }
    }

    fn cached_reset(&self) -> Option<DateTime<Utc>> {
        *self.statuses_reset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn query_string(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", oauth::encode(k), oauth::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn timeline_params(query: &TimelineQuery) -> Vec<(String, String)> {
    let mut params = vec![("list_id".to_string(), query.list_id.0.clone())];
    if let Some(since) = query.since_id {
        params.push(("since_id".into(), since.0.to_string()));
    }
    if let Some(count) = query.count {
        params.push(("count".into(), count.to_string()));
    }
    params.push(("include_entities".into(), "false".into()));
    params
}

/// `x-rate-limit-reset`, epoch seconds.
fn parse_reset(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    let secs = headers
        .get("x-rate-limit-reset")?
        .to_str()
        .ok()?
        .trim()
        .parse::<i64>()
        .ok()?;
    DateTime::<Utc>::from_timestamp(secs, 0)
}

#[async_trait]
impl ContentSource for TwitterClient {
    async fn verify_credentials(&self) -> Result<String> {
        let params = vec![("skip_status".to_string(), "true".to_string())];
        let user: UserDto = self
            .get_json("account/verify_credentials.json", &params)
            .await?;
        Ok(user.screen_name)
    }

    async fn list_memberships(&self) -> Result<Vec<ContentList>> {
        let lists: Vec<ListDto> = self.get_json("lists/list.json", &[]).await?;
        Ok(lists
            .into_iter()
            .map(|l| ContentList {
                name: l.name,
                id: ListId(l.id_str),
            })
            .collect())
    }

    async fn list_timeline(&self, query: TimelineQuery) -> Result<Vec<ContentItem>> {
        let params = timeline_params(&query);
        let resp = self.get("lists/statuses.json", &params).await?;
        self.remember_reset(resp.headers());

        let statuses: Vec<StatusDto> = resp
            .json()
            .await
            .map_err(|e| Error::Transport(format!("twitter json error: {e}")))?;
        debug!(list = %query.list_id, items = statuses.len(), "fetched list timeline");
        Ok(statuses.into_iter().map(ContentItem::from).collect())
    }

    async fn timeline_reset(&self) -> Result<DateTime<Utc>> {
        if let Some(reset) = self.cached_reset().filter(|r| *r > Utc::now()) {
            return Ok(reset);
        }
        let params = vec![("resources".to_string(), "lists".to_string())];
        let status: RateLimitStatusDto = self
            .get_json("application/rate_limit_status.json", &params)
            .await?;
        let window = status
            .resources
            .lists
            .get(STATUSES_RESOURCE)
            .ok_or_else(|| Error::External("rate limit status lacks /lists/statuses".into()))?;
        DateTime::<Utc>::from_timestamp(window.reset, 0)
            .ok_or_else(|| Error::External(format!("invalid reset timestamp {}", window.reset)))
    }
}
