//! In-memory collaborators for service tests.

#![allow(clippy::unwrap_used)]

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicI64, Ordering},
    },
};

use accord_common::{AppError, AppResult};
use accord_db::entities::{
    proposal::{self, NomineeRole, ProposalStatus},
    user::{self, UserRole},
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use super::{
    messenger::{Messenger, OutboundMessage},
    store::{ProposalStore, UserStore},
    vote_source::{CreatePollRequest, PollRef, Vote, VoteChoice, VoteSource, VoterId},
};

pub fn user(id: &str, nickname: &str, telegram_id: Option<i64>, role: UserRole) -> user::Model {
    user::Model {
        id: id.to_string(),
        name: format!("{nickname} name"),
        telegram_id,
        telegram_nickname: nickname.to_string(),
        discord_id: None,
        role,
        backers_id: json!([]),
        members_invite_link: None,
        seeders_invite_link: None,
        created_at: (Utc::now() - Duration::days(400)).into(),
        updated_at: None,
    }
}

pub fn proposal(
    id: &str,
    nominator_id: &str,
    nominee: &str,
    role: NomineeRole,
    poll_id: i64,
    created_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
) -> proposal::Model {
    proposal::Model {
        id: id.to_string(),
        nominator_id: nominator_id.to_string(),
        nominee_name: format!("{nominee} name"),
        nominee_telegram_nickname: nominee.to_string(),
        nominee_telegram_id: None,
        nominee_role: role,
        comment: "great contributor".to_string(),
        poll_id,
        poll_chat_id: -500,
        poll_message_id: Some(11),
        discussion_message_id: Some(12),
        status: ProposalStatus::Created,
        created_at: created_at.into(),
        finished_at: finished_at.into(),
        updated_at: None,
    }
}

pub fn yes(telegram_id: i64) -> Vote {
    Vote {
        voter: VoterId::Telegram(telegram_id),
        nickname: None,
        choice: VoteChoice::Yes,
    }
}

pub fn no(telegram_id: i64) -> Vote {
    Vote {
        voter: VoterId::Telegram(telegram_id),
        nickname: None,
        choice: VoteChoice::No,
    }
}

/// Yes vote carrying both a Telegram id and the voter's nickname.
pub fn yes_from(telegram_id: i64, nickname: &str) -> Vote {
    Vote {
        nickname: Some(nickname.to_string()),
        ..yes(telegram_id)
    }
}

#[derive(Default)]
pub struct InMemoryUserStore {
    pub users: Mutex<Vec<user::Model>>,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
}

impl InMemoryUserStore {
    pub fn with(users: Vec<user::Model>) -> Self {
        Self {
            users: Mutex::new(users),
            ..Self::default()
        }
    }

    pub fn get(&self, id: &str) -> Option<user::Model> {
        self.users.lock().unwrap().iter().find(|u| u.id == id).cloned()
    }

    pub fn by_handle(&self, handle: &str) -> Option<user::Model> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.telegram_nickname == handle)
            .cloned()
    }

    fn check_read(&self) -> AppResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::Database("user store offline".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> AppResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database("user store read-only".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_role(&self, role: UserRole) -> AppResult<Vec<user::Model>> {
        self.check_read()?;
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.role == role)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<user::Model>> {
        self.check_read()?;
        Ok(self.get(id))
    }

    async fn find_by_handle(&self, handle: &str) -> AppResult<Option<user::Model>> {
        self.check_read()?;
        Ok(self.by_handle(&handle.to_lowercase()))
    }

    async fn find_by_telegram_id(&self, telegram_id: i64) -> AppResult<Option<user::Model>> {
        self.check_read()?;
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.telegram_id == Some(telegram_id))
            .cloned())
    }

    async fn create(&self, user: user::Model) -> AppResult<user::Model> {
        self.check_write()?;
        let mut users = self.users.lock().unwrap();
        if users
            .iter()
            .any(|u| u.id == user.id || u.telegram_nickname == user.telegram_nickname)
        {
            return Err(AppError::Database("duplicate key".to_string()));
        }
        users.push(user.clone());
        Ok(user)
    }

    async fn update(&self, user: user::Model) -> AppResult<user::Model> {
        self.check_write()?;
        let mut users = self.users.lock().unwrap();
        let slot = users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or_else(|| AppError::UserNotFound(user.id.clone()))?;
        *slot = user.clone();
        Ok(user)
    }
}

#[derive(Default)]
pub struct InMemoryProposalStore {
    pub proposals: Mutex<Vec<proposal::Model>>,
    pub fail_reads: AtomicBool,
    pub fail_settle: Mutex<HashSet<String>>,
}

impl InMemoryProposalStore {
    pub fn with(proposals: Vec<proposal::Model>) -> Self {
        Self {
            proposals: Mutex::new(proposals),
            ..Self::default()
        }
    }

    pub fn status_of(&self, id: &str) -> ProposalStatus {
        self.proposals
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.status)
            .unwrap()
    }

    pub fn all(&self) -> Vec<proposal::Model> {
        self.proposals.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProposalStore for InMemoryProposalStore {
    async fn find_by_status(
        &self,
        statuses: &[ProposalStatus],
    ) -> AppResult<Vec<proposal::Model>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::Database("proposal store offline".to_string()));
        }
        let mut found: Vec<_> = self
            .proposals
            .lock()
            .unwrap()
            .iter()
            .filter(|p| statuses.contains(&p.status))
            .cloned()
            .collect();
        found.sort_by_key(|p| p.created_at);
        Ok(found)
    }

    async fn find_by_nominee_handle(&self, handle: &str) -> AppResult<Vec<proposal::Model>> {
        let mut found: Vec<_> = self
            .proposals
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.nominee_telegram_nickname == handle)
            .cloned()
            .collect();
        found.sort_by_key(|p| p.created_at);
        Ok(found)
    }

    async fn create(&self, proposal: proposal::Model) -> AppResult<proposal::Model> {
        self.proposals.lock().unwrap().push(proposal.clone());
        Ok(proposal)
    }

    async fn update(&self, proposal: proposal::Model) -> AppResult<proposal::Model> {
        let mut proposals = self.proposals.lock().unwrap();
        let slot = proposals
            .iter_mut()
            .find(|p| p.id == proposal.id)
            .ok_or_else(|| AppError::ProposalNotFound(proposal.id.clone()))?;
        *slot = proposal.clone();
        Ok(proposal)
    }

    async fn settle(&self, id: &str, status: ProposalStatus) -> AppResult<proposal::Model> {
        if self.fail_settle.lock().unwrap().contains(id) {
            return Err(AppError::Database("write failed".to_string()));
        }
        let mut proposals = self.proposals.lock().unwrap();
        let slot = proposals
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| AppError::ProposalNotFound(id.to_string()))?;
        if slot.status != ProposalStatus::Created {
            return Err(AppError::Conflict(format!("proposal {id} is already settled")));
        }
        slot.status = status;
        slot.updated_at = Some(Utc::now().into());
        Ok(slot.clone())
    }
}

#[derive(Default)]
pub struct FakeVoteSource {
    pub votes: Mutex<HashMap<i64, Vec<Vote>>>,
    pub failing: Mutex<HashSet<i64>>,
    pub hanging: Mutex<HashSet<i64>>,
    pub fetches: AtomicI64,
    pub created: Mutex<Vec<CreatePollRequest>>,
    pub fail_create: AtomicBool,
}

impl FakeVoteSource {
    pub fn with(poll_id: i64, votes: Vec<Vote>) -> Self {
        let source = Self::default();
        source.votes.lock().unwrap().insert(poll_id, votes);
        source
    }

    pub fn set(&self, poll_id: i64, votes: Vec<Vote>) {
        self.votes.lock().unwrap().insert(poll_id, votes);
    }

    pub fn fail(&self, poll_id: i64) {
        self.failing.lock().unwrap().insert(poll_id);
    }

    /// Make fetches for `poll_id` never complete until `release` is called.
    pub fn hang(&self, poll_id: i64) {
        self.hanging.lock().unwrap().insert(poll_id);
    }

    pub fn release(&self, poll_id: i64) {
        self.hanging.lock().unwrap().remove(&poll_id);
    }
}

#[async_trait]
impl VoteSource for FakeVoteSource {
    async fn get_votes(&self, poll_id: i64) -> AppResult<Vec<Vote>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let hangs = self.hanging.lock().unwrap().contains(&poll_id);
        if hangs {
            std::future::pending::<()>().await;
        }
        if self.failing.lock().unwrap().contains(&poll_id) {
            return Err(AppError::ExternalService("vote service down".to_string()));
        }
        Ok(self
            .votes
            .lock()
            .unwrap()
            .get(&poll_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_poll(&self, request: CreatePollRequest) -> AppResult<PollRef> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(AppError::ExternalService("vote service down".to_string()));
        }
        let mut created = self.created.lock().unwrap();
        created.push(request);
        Ok(PollRef {
            id: 1000 + created.len() as i64,
            chat_id: -500,
            poll_message_id: Some(21),
            discussion_message_id: Some(22),
        })
    }
}

#[derive(Default)]
pub struct RecordingMessenger {
    pub sent: Mutex<Vec<OutboundMessage>>,
    pub failing_chats: Mutex<HashSet<i64>>,
    pub links: Mutex<Vec<(i64, String)>>,
    pub fail_links: AtomicBool,
}

impl RecordingMessenger {
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, chat_id: i64) -> Vec<OutboundMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.chat_id == chat_id)
            .collect()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, message: OutboundMessage) -> AppResult<()> {
        if self.failing_chats.lock().unwrap().contains(&message.chat_id) {
            return Err(AppError::ExternalService("bot was blocked".to_string()));
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn create_invite_link(&self, chat_id: i64, label: &str) -> AppResult<String> {
        if self.fail_links.load(Ordering::SeqCst) {
            return Err(AppError::ExternalService("not enough rights".to_string()));
        }
        let mut links = self.links.lock().unwrap();
        links.push((chat_id, label.to_string()));
        Ok(format!("https://t.me/+invite{chat_id}x{}", links.len()))
    }
}
