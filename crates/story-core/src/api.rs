//! Client for the story proxy service.
//!
//! Listing a user's stories takes three calls: the public user page (for the
//! CSRF token and session cookie), the profile lookup (for the numeric user
//! id), and the story listing itself.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::story::StoryRecord;

static CSRF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<meta name="csrf-token" content="(.*?)">"#).unwrap());

const PROFILE_PATH: &str = "/mystorysaver-data/get-user-profile";
const STORIES_PATH: &str = "/mystorysaver-data/get-user-last-stories";

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("no csrf token found on {0}")]
    MissingToken(String),
    #[error("profile not found: {0}")]
    ProfileNotFound(String),
    #[error("profile {0} has no user id")]
    MissingUserId(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Anything that can list a user's current stories.
pub trait StorySource {
    fn list_stories(&self, username: &str) -> Result<Vec<StoryRecord>, BootstrapError>;
}

/// Per-user request context scraped from the user page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub username: String,
    pub referer: String,
    pub csrf_token: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    /// Passed back verbatim, string or number.
    pub user_id: Value,
    pub is_private: Value,
}

#[derive(Deserialize)]
struct ProfileResponse {
    #[serde(default)]
    found: bool,
    #[serde(default, rename = "accountInfo")]
    account_info: Option<AccountInfo>,
}

#[derive(Deserialize)]
struct AccountInfo {
    #[serde(default)]
    id: Value,
    #[serde(default, rename = "isPrivate")]
    is_private: Value,
}

#[derive(Deserialize)]
struct StoriesResponse {
    #[serde(default, rename = "lastStories")]
    last_stories: Option<Vec<Value>>,
}

pub struct StoryApi {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl StoryApi {
    pub fn new(config: &ClientConfig) -> reqwest::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.api_timeout)
            .user_agent(config.user_agent.as_str())
            .cookie_store(true)
            .build()?;
        Ok(Self::with_client(&config.base_url, client))
    }

    /// `client` must keep cookies: the token is only valid with its session cookie.
    pub fn with_client(base_url: &str, client: reqwest::blocking::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn open_session(&self, username: &str) -> Result<Session, BootstrapError> {
        let page_url = format!("{}/user/{}", self.base_url, username);
        let html = self.client.get(&page_url).send()?.error_for_status()?.text()?;
        let csrf_token =
            extract_csrf_token(&html).ok_or_else(|| BootstrapError::MissingToken(page_url.clone()))?;
        debug!(username, "session opened");
        Ok(Session {
            username: username.to_string(),
            referer: page_url,
            csrf_token,
        })
    }

    pub fn profile(&self, session: &Session) -> Result<Profile, BootstrapError> {
        let body = self.post(session, PROFILE_PATH, json!({ "userName": session.username }))?;
        parse_profile(&session.username, &body)
    }

    pub fn last_stories(
        &self,
        session: &Session,
        profile: &Profile,
    ) -> Result<Vec<StoryRecord>, BootstrapError> {
        let body = self.post(
            session,
            STORIES_PATH,
            json!({
                "userName": session.username,
                "isPrivate": profile.is_private,
                "instagramUserId": profile.user_id,
            }),
        )?;
        parse_stories(&body)
    }

    fn post(&self, session: &Session, path: &str, payload: Value) -> Result<String, BootstrapError> {
        let text = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("X-CSRF-TOKEN", &session.csrf_token)
            .header("X-Requested-With", "XMLHttpRequest")
            .header(reqwest::header::REFERER, &session.referer)
            .json(&payload)
            .send()?
            .error_for_status()?
            .text()?;
        Ok(text)
    }
}

impl StorySource for StoryApi {
    fn list_stories(&self, username: &str) -> Result<Vec<StoryRecord>, BootstrapError> {
        let session = self.open_session(username)?;
        let profile = self.profile(&session)?;
        let stories = self.last_stories(&session, &profile)?;
        info!(username, count = stories.len(), "listed stories");
        Ok(stories)
    }
}

pub fn extract_csrf_token(html: &str) -> Option<String> {
    CSRF_RE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn parse_profile(username: &str, body: &str) -> Result<Profile, BootstrapError> {
    let resp: ProfileResponse = serde_json::from_str(body)?;
    if !resp.found {
        return Err(BootstrapError::ProfileNotFound(username.to_string()));
    }
    let info = resp
        .account_info
        .ok_or_else(|| BootstrapError::MissingUserId(username.to_string()))?;
    if !truthy(&info.id) {
        return Err(BootstrapError::MissingUserId(username.to_string()));
    }
    Ok(Profile {
        user_id: info.id,
        is_private: info.is_private,
    })
}

/// Entries are converted one by one; a bad entry is flagged, not fatal.
pub fn parse_stories(body: &str) -> Result<Vec<StoryRecord>, BootstrapError> {
    let resp: StoriesResponse = serde_json::from_str(body)?;
    Ok(resp
        .last_stories
        .unwrap_or_default()
        .into_iter()
        .map(StoryRecord::from_value)
        .collect())
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
        _ => true,
    }
}
