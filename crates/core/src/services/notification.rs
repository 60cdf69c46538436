//! Settlement notifications.
//!
//! Every settled proposal produces a fixed set of messages depending on its
//! final status. Delivery is best effort: failures are logged and counted,
//! never retried, and never undo the status change.

use std::{sync::Arc, time::Duration};

use accord_common::{AppError, AppResult, Config};
use accord_db::entities::{
    proposal::{self, NomineeRole, ProposalStatus},
    user,
};
use chrono::Utc;
use serde::Serialize;

use super::{
    deadline::within,
    messenger::{Messenger, OutboundMessage},
    store::UserStore,
};

/// Fixed inputs of the notification texts.
#[derive(Debug, Clone)]
pub struct NotificationSettings {
    pub community_name: String,
    pub renomination_cooldown_days: u32,
    pub members_chat_id: i64,
    pub seeders_chat_id: i64,
}

impl NotificationSettings {
    /// Take the settings from application configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            community_name: config.governance.community_name.clone(),
            renomination_cooldown_days: config.governance.renomination_cooldown_days,
            members_chat_id: config.telegram.members_chat_id,
            seeders_chat_id: config.telegram.seeders_chat_id,
        }
    }
}

/// Delivery counts for one proposal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
}

impl DispatchReport {
    fn record(&mut self, result: AppResult<()>, proposal_id: &str) {
        match result {
            Ok(()) => self.sent += 1,
            Err(e) => {
                tracing::warn!(proposal_id = %proposal_id, error = %e, "Notification not delivered");
                self.failed += 1;
            }
        }
    }
}

/// Sends the outcome of settled proposals to the people involved.
#[derive(Clone)]
pub struct NotificationDispatcher {
    users: Arc<dyn UserStore>,
    messenger: Arc<dyn Messenger>,
    settings: NotificationSettings,
    io_timeout: Duration,
}

/// Who the nominator-bound messages go to.
enum Recipient {
    Chat(i64),
    Missing(String),
}

impl NotificationDispatcher {
    /// Create a new dispatcher.
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        messenger: Arc<dyn Messenger>,
        settings: NotificationSettings,
        io_timeout: Duration,
    ) -> Self {
        Self {
            users,
            messenger,
            settings,
            io_timeout,
        }
    }

    /// Notify about a settled proposal.
    ///
    /// `nominee` is the user record that approval created or promoted, used
    /// to reuse and cache invite links.
    pub async fn dispatch(
        &self,
        proposal: &proposal::Model,
        nominee: Option<&user::Model>,
    ) -> DispatchReport {
        let recipient = self.nominator_chat(proposal).await;

        let report = match proposal.status {
            ProposalStatus::Rejected => {
                let mut report = DispatchReport::default();
                report.record(
                    self.send_to(&recipient, rejected_to_nominator(proposal, &self.settings))
                        .await,
                    &proposal.id,
                );
                report.record(
                    self.send(thread_message(
                        proposal,
                        rejected_to_thread(proposal, &self.settings),
                    ))
                    .await,
                    &proposal.id,
                );
                report
            }
            ProposalStatus::NoQuorum => {
                let mut report = DispatchReport::default();
                report.record(
                    self.send_to(&recipient, no_quorum_text(proposal)).await,
                    &proposal.id,
                );
                report.record(
                    self.send(thread_message(proposal, no_quorum_text(proposal)))
                        .await,
                    &proposal.id,
                );
                report
            }
            ProposalStatus::Approved => self.dispatch_approved(proposal, nominee, &recipient).await,
            ProposalStatus::Created => {
                tracing::warn!(proposal_id = %proposal.id, "Refusing to notify about an open proposal");
                DispatchReport::default()
            }
        };

        tracing::debug!(
            proposal_id = %proposal.id,
            status = %proposal.status,
            sent = report.sent,
            failed = report.failed,
            "Notifications dispatched"
        );
        report
    }

    async fn dispatch_approved(
        &self,
        proposal: &proposal::Model,
        nominee: Option<&user::Model>,
        recipient: &Recipient,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        report.record(
            self.send_to(recipient, approved_to_nominator(proposal)).await,
            &proposal.id,
        );

        let label = format!("@{}", proposal.nominee_telegram_nickname);
        let mut nominee = nominee.cloned();
        let mut links_changed = false;

        let members_link = self
            .invite_link(
                self.settings.members_chat_id,
                &label,
                nominee.as_ref().and_then(|u| u.members_invite_link.clone()),
            )
            .await;
        match members_link {
            Ok((link, fresh)) => {
                if let (true, Some(user)) = (fresh, nominee.as_mut()) {
                    user.members_invite_link = Some(link.clone());
                    links_changed = true;
                }
                report.record(
                    self.send_to(recipient, members_invitation(&link, &self.settings))
                        .await,
                    &proposal.id,
                );
            }
            Err(e) => report.record(Err(e), &proposal.id),
        }

        if proposal.nominee_role == NomineeRole::Seeder {
            let seeders_link = self
                .invite_link(
                    self.settings.seeders_chat_id,
                    &label,
                    nominee.as_ref().and_then(|u| u.seeders_invite_link.clone()),
                )
                .await;
            match seeders_link {
                Ok((link, fresh)) => {
                    if let (true, Some(user)) = (fresh, nominee.as_mut()) {
                        user.seeders_invite_link = Some(link.clone());
                        links_changed = true;
                    }
                    report.record(
                        self.send_to(recipient, seeders_invitation(&link)).await,
                        &proposal.id,
                    );
                }
                Err(e) => report.record(Err(e), &proposal.id),
            }
        }

        if let (true, Some(mut user)) = (links_changed, nominee) {
            user.updated_at = Some(Utc::now().into());
            let cached = within(
                self.io_timeout,
                "invite link caching",
                self.users.update(user),
            )
            .await;
            if let Err(e) = cached {
                tracing::warn!(proposal_id = %proposal.id, error = %e, "Failed to cache invite links");
            }
        }

        report
    }

    /// Reuse a cached link or create a new one. The flag is true for new links.
    async fn invite_link(
        &self,
        chat_id: i64,
        label: &str,
        cached: Option<String>,
    ) -> AppResult<(String, bool)> {
        if let Some(link) = cached.filter(|l| !l.is_empty()) {
            return Ok((link, false));
        }
        let link = within(
            self.io_timeout,
            "invite link creation",
            self.messenger.create_invite_link(chat_id, label),
        )
        .await?;
        Ok((link, true))
    }

    async fn nominator_chat(&self, proposal: &proposal::Model) -> Recipient {
        let lookup = within(
            self.io_timeout,
            "nominator lookup",
            self.users.find_by_id(&proposal.nominator_id),
        )
        .await;

        match lookup {
            Ok(Some(user::Model {
                telegram_id: Some(chat_id),
                ..
            })) => Recipient::Chat(chat_id),
            Ok(Some(_)) => Recipient::Missing(format!(
                "nominator {} has no Telegram id",
                proposal.nominator_id
            )),
            Ok(None) => Recipient::Missing(format!(
                "nominator {} not found",
                proposal.nominator_id
            )),
            Err(e) => Recipient::Missing(format!("nominator lookup failed: {e}")),
        }
    }

    async fn send_to(&self, recipient: &Recipient, message: Draft) -> AppResult<()> {
        match recipient {
            Recipient::Chat(chat_id) => self.send(message.to(*chat_id)).await,
            Recipient::Missing(reason) => Err(AppError::NotFound(reason.clone())),
        }
    }

    async fn send(&self, message: OutboundMessage) -> AppResult<()> {
        within(self.io_timeout, "message delivery", self.messenger.send(message)).await
    }
}

/// Message text not yet bound to a chat.
struct Draft {
    text: String,
    markdown: bool,
}

impl Draft {
    fn plain(text: String) -> Self {
        Self {
            text,
            markdown: false,
        }
    }

    fn markdown(text: String) -> Self {
        Self {
            text,
            markdown: true,
        }
    }

    fn to(self, chat_id: i64) -> OutboundMessage {
        if self.markdown {
            OutboundMessage::markdown(chat_id, self.text)
        } else {
            OutboundMessage::plain(chat_id, self.text)
        }
    }
}

fn thread_message(proposal: &proposal::Model, draft: Draft) -> OutboundMessage {
    draft
        .to(proposal.poll_chat_id)
        .in_reply_to(proposal.poll_message_id)
}

/// Escape the characters legacy Telegram Markdown treats as markup.
fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn rejected_to_nominator(proposal: &proposal::Model, settings: &NotificationSettings) -> Draft {
    Draft::markdown(format!(
        "The nomination of {} (@{}) was declined.\n\n\
         _Seeders of {} vote on nominations anonymously. \
         A new nomination for this person can be submitted in {} days._",
        escape_markdown(&proposal.nominee_name),
        escape_markdown(&proposal.nominee_telegram_nickname),
        escape_markdown(&settings.community_name),
        settings.renomination_cooldown_days,
    ))
}

fn rejected_to_thread(proposal: &proposal::Model, settings: &NotificationSettings) -> Draft {
    Draft::plain(format!(
        "The nomination of {} (@{}) was declined. A new nomination can be submitted in {} days.",
        proposal.nominee_name,
        proposal.nominee_telegram_nickname,
        settings.renomination_cooldown_days,
    ))
}

fn no_quorum_text(proposal: &proposal::Model) -> Draft {
    Draft::plain(format!(
        "The nomination of {} (@{}) was declined because the vote did not reach quorum.",
        proposal.nominee_name, proposal.nominee_telegram_nickname,
    ))
}

fn approved_to_nominator(proposal: &proposal::Model) -> Draft {
    let forward_hint = match proposal.nominee_role {
        NomineeRole::Member => "Forward them the invitation below.",
        NomineeRole::Seeder => "They are now a seeder. Forward them the invitations below.",
    };
    Draft::plain(format!(
        "The nomination of {} (@{}) was approved.\n\n{forward_hint}",
        proposal.nominee_name, proposal.nominee_telegram_nickname,
    ))
}

fn members_invitation(link: &str, settings: &NotificationSettings) -> Draft {
    Draft::markdown(format!(
        "Hi! I'd like to invite you to join {community}. I'm a member, and your membership \
         has been approved.\n\nTo join, open [this link]({link}) and press \"Join\".",
        community = escape_markdown(&settings.community_name),
    ))
}

fn seeders_invitation(link: &str) -> Draft {
    Draft::markdown(format!(
        "You have also been accepted as a seeder. Seeders vote on new nominations. \
         Join the seeders chat via [this link]({link})."
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::testing::{
        InMemoryUserStore, RecordingMessenger, proposal as make_proposal, user as make_user,
    };
    use accord_db::entities::user::UserRole;
    use std::sync::atomic::Ordering;

    const NOMINATOR_CHAT: i64 = 77;

    fn settings() -> NotificationSettings {
        NotificationSettings {
            community_name: "Test_Club".to_string(),
            renomination_cooldown_days: 90,
            members_chat_id: -1001,
            seeders_chat_id: -1002,
        }
    }

    fn setup() -> (
        Arc<InMemoryUserStore>,
        Arc<RecordingMessenger>,
        NotificationDispatcher,
    ) {
        let users = Arc::new(InMemoryUserStore::with(vec![make_user(
            "nominator",
            "nina",
            Some(NOMINATOR_CHAT),
            UserRole::Member,
        )]));
        let messenger = Arc::new(RecordingMessenger::default());
        let dispatcher = NotificationDispatcher::new(
            users.clone(),
            messenger.clone(),
            settings(),
            Duration::from_secs(5),
        );
        (users, messenger, dispatcher)
    }

    fn settled(status: ProposalStatus, role: NomineeRole) -> proposal::Model {
        let now = Utc::now();
        let mut proposal = make_proposal("p1", "nominator", "jane", role, 1, now, now);
        proposal.status = status;
        proposal
    }

    #[tokio::test]
    async fn test_rejected_notifies_nominator_and_thread() {
        let (_, messenger, dispatcher) = setup();
        let proposal = settled(ProposalStatus::Rejected, NomineeRole::Member);

        let report = dispatcher.dispatch(&proposal, None).await;

        assert_eq!(report, DispatchReport { sent: 2, failed: 0 });
        let to_nominator = messenger.sent_to(NOMINATOR_CHAT);
        assert_eq!(to_nominator.len(), 1);
        assert!(to_nominator[0].markdown);
        assert!(to_nominator[0].text.contains("90 days"));
        assert!(to_nominator[0].text.contains("Test\\_Club"));

        let thread = messenger.sent_to(-500);
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].reply_to_message_id, Some(11));
    }

    #[tokio::test]
    async fn test_no_quorum_mentions_quorum_twice() {
        let (_, messenger, dispatcher) = setup();
        let proposal = settled(ProposalStatus::NoQuorum, NomineeRole::Member);

        let report = dispatcher.dispatch(&proposal, None).await;

        assert_eq!(report.sent, 2);
        assert!(messenger.sent().iter().all(|m| m.text.contains("quorum")));
    }

    #[tokio::test]
    async fn test_approved_member_gets_members_invite_and_caches_it() {
        let (users, messenger, dispatcher) = setup();
        let nominee = make_user("jane-id", "jane", None, UserRole::Guest);
        users.users.lock().unwrap().push(nominee.clone());
        let proposal = settled(ProposalStatus::Approved, NomineeRole::Member);

        let report = dispatcher.dispatch(&proposal, Some(&nominee)).await;

        assert_eq!(report, DispatchReport { sent: 2, failed: 0 });
        let links = messenger.links.lock().unwrap().clone();
        assert_eq!(links, vec![(-1001, "@jane".to_string())]);

        let sent = messenger.sent_to(NOMINATOR_CHAT);
        assert!(sent[0].text.contains("approved"));
        assert!(sent[1].text.contains("https://t.me/+invite-1001x1"));

        let cached = users.get("jane-id").unwrap();
        assert_eq!(
            cached.members_invite_link.as_deref(),
            Some("https://t.me/+invite-1001x1")
        );
    }

    #[tokio::test]
    async fn test_approved_seeder_gets_both_invites() {
        let (_, messenger, dispatcher) = setup();
        let mut nominee = make_user("jane-id", "jane", Some(5), UserRole::Seeder);
        nominee.members_invite_link = Some("https://t.me/+cached".to_string());
        let proposal = settled(ProposalStatus::Approved, NomineeRole::Seeder);

        let report = dispatcher.dispatch(&proposal, Some(&nominee)).await;

        assert_eq!(report.sent, 3);
        let links = messenger.links.lock().unwrap().clone();
        assert_eq!(links, vec![(-1002, "@jane".to_string())]);
        let texts: Vec<String> = messenger.sent().into_iter().map(|m| m.text).collect();
        assert!(texts[1].contains("https://t.me/+cached"));
        assert!(texts[2].contains("seeders chat"));
    }

    #[tokio::test]
    async fn test_invite_failure_counts_but_announcement_sent() {
        let (_, messenger, dispatcher) = setup();
        messenger.fail_links.store(true, Ordering::SeqCst);
        let proposal = settled(ProposalStatus::Approved, NomineeRole::Member);

        let report = dispatcher.dispatch(&proposal, None).await;

        assert_eq!(report, DispatchReport { sent: 1, failed: 1 });
    }

    #[tokio::test]
    async fn test_missing_nominator_still_posts_to_thread() {
        let (_, messenger, dispatcher) = setup();
        let mut proposal = settled(ProposalStatus::Rejected, NomineeRole::Member);
        proposal.nominator_id = "ghost".to_string();

        let report = dispatcher.dispatch(&proposal, None).await;

        assert_eq!(report, DispatchReport { sent: 1, failed: 1 });
        assert_eq!(messenger.sent_to(-500).len(), 1);
    }

    #[tokio::test]
    async fn test_delivery_failure_is_counted() {
        let (_, messenger, dispatcher) = setup();
        messenger.failing_chats.lock().unwrap().insert(-500);
        let proposal = settled(ProposalStatus::NoQuorum, NomineeRole::Member);

        let report = dispatcher.dispatch(&proposal, None).await;

        assert_eq!(report, DispatchReport { sent: 1, failed: 1 });
    }

    #[tokio::test]
    async fn test_open_proposal_sends_nothing() {
        let (_, messenger, dispatcher) = setup();
        let proposal = settled(ProposalStatus::Created, NomineeRole::Member);

        let report = dispatcher.dispatch(&proposal, None).await;

        assert_eq!(report, DispatchReport::default());
        assert!(messenger.sent().is_empty());
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("a_b*c`d[e"), "a\\_b\\*c\\`d\\[e");
    }
}
