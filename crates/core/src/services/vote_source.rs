//! External vote service client.
//!
//! Seeders vote anonymously in a separate polling service. Accord only
//! creates polls there and reads the cast votes back once a poll is due.

use std::{fmt, sync::Arc, time::Duration};

use accord_common::{AppError, AppResult, config::VoteApiConfig};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use url::Url;

/// Identity of a voter as reported by the vote service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VoterId {
    /// Numeric Telegram user id.
    Telegram(i64),
    /// Telegram nickname, lowercased and without `@`.
    Nickname(String),
}

impl VoterId {
    /// JSON form stored in a user's backer list.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Telegram(id) => Value::from(*id),
            Self::Nickname(nickname) => Value::from(nickname.as_str()),
        }
    }
}

impl fmt::Display for VoterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Telegram(id) => write!(f, "tg:{id}"),
            Self::Nickname(nickname) => write!(f, "@{nickname}"),
        }
    }
}

/// A voter's choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteChoice {
    Yes,
    No,
    /// Abstention or anything the tally does not recognize.
    Other,
}

impl VoteChoice {
    /// Parse the vote service's `option` field.
    #[must_use]
    pub fn parse(option: &str) -> Self {
        let option = option.trim();
        if option.eq_ignore_ascii_case("yes") {
            Self::Yes
        } else if option.eq_ignore_ascii_case("no") {
            Self::No
        } else {
            Self::Other
        }
    }
}

/// A single cast vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    pub voter: VoterId,
    /// Nickname reported next to a numeric id, used when the id is unknown.
    pub nickname: Option<String>,
    pub choice: VoteChoice,
}

/// Request to open a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatePollRequest {
    /// Poll title.
    pub name: String,
    pub description: String,
    /// Moment the poll closes (UTC, no offset on the wire).
    #[serde(serialize_with = "serialize_due_date")]
    pub due_date: NaiveDateTime,
}

/// Where a newly created poll lives.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PollRef {
    pub id: i64,
    pub chat_id: i64,
    #[serde(default)]
    pub poll_message_id: Option<i32>,
    #[serde(default)]
    pub discussion_message_id: Option<i32>,
}

/// Source of votes for a proposal's poll.
#[async_trait]
pub trait VoteSource: Send + Sync {
    /// Fetch every vote cast in a poll.
    async fn get_votes(&self, poll_id: i64) -> AppResult<Vec<Vote>>;

    /// Open a new poll.
    async fn create_poll(&self, request: CreatePollRequest) -> AppResult<PollRef>;
}

/// Vote as it appears on the wire.
#[derive(Debug, Deserialize)]
struct WireVote {
    #[serde(default)]
    user_id: Option<i64>,
    #[serde(default)]
    username: Option<String>,
    option: String,
}

impl WireVote {
    fn into_vote(self) -> Option<Vote> {
        let nickname = self
            .username
            .map(|name| name.trim().trim_start_matches('@').to_lowercase())
            .filter(|name| !name.is_empty());

        let (voter, nickname) = match (self.user_id, nickname) {
            (Some(id), nickname) if id != 0 => (VoterId::Telegram(id), nickname),
            (_, Some(name)) => (VoterId::Nickname(name), None),
            _ => return None,
        };

        Some(Vote {
            voter,
            nickname,
            choice: VoteChoice::parse(&self.option),
        })
    }
}

/// Vote service client over HTTP.
#[derive(Clone)]
pub struct HttpVoteSource {
    base_url: Url,
    http_client: Arc<reqwest::Client>,
}

impl HttpVoteSource {
    /// Create a client for the configured vote service.
    pub fn new(config: &VoteApiConfig) -> AppResult<Self> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| AppError::Config(format!("invalid vote_api.url: {e}")))?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            http_client: Arc::new(http_client),
        })
    }

    fn endpoint(&self, path: &str) -> AppResult<Url> {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        base.join(path)
            .map_err(|e| AppError::Internal(format!("invalid vote service path {path}: {e}")))
    }
}

#[async_trait]
impl VoteSource for HttpVoteSource {
    async fn get_votes(&self, poll_id: i64) -> AppResult<Vec<Vote>> {
        let url = self.endpoint("vote")?;

        let response = self
            .http_client
            .get(url)
            .query(&[("poll_id", poll_id)])
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Vote fetch failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::ExternalService(format!(
                "Vote service returned HTTP {} for poll {poll_id}",
                response.status()
            )));
        }

        let wire: Vec<WireVote> = response
            .json()
            .await
            .map_err(|e| AppError::ExternalService(format!("Malformed vote list: {e}")))?;

        let total = wire.len();
        let votes: Vec<Vote> = wire.into_iter().filter_map(WireVote::into_vote).collect();
        if votes.len() < total {
            tracing::warn!(
                poll_id,
                dropped = total - votes.len(),
                "Ignoring votes without a voter identity"
            );
        }

        Ok(votes)
    }

    async fn create_poll(&self, request: CreatePollRequest) -> AppResult<PollRef> {
        let url = self.endpoint("poll")?;

        let response = self
            .http_client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Poll creation failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::ExternalService(format!(
                "Vote service returned HTTP {} on poll creation",
                response.status()
            )));
        }

        let poll: PollRef = response
            .json()
            .await
            .map_err(|e| AppError::ExternalService(format!("Malformed poll reference: {e}")))?;

        tracing::info!(poll_id = poll.id, chat_id = poll.chat_id, "Poll created");
        Ok(poll)
    }
}

fn serialize_due_date<S: Serializer>(due: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&due.format("%Y-%m-%dT%H:%M:%S").to_string())
}
