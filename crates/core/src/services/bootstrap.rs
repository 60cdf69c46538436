//! Initial seeder allow-list.
//!
//! A fresh community has nobody allowed to nominate. The configured
//! nicknames are made seeders at startup, creating their accounts when
//! needed. Accounts created here carry no Telegram id; their votes resolve
//! by nickname.

use std::{sync::Arc, time::Duration};

use accord_common::{AppResult, IdGenerator};
use accord_db::entities::user::{self, UserRole};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use super::{deadline::within, nomination::normalize_handle, store::UserStore};

/// What the allow-list changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    pub created: Vec<String>,
    pub promoted: Vec<String>,
    pub unchanged: Vec<String>,
}

/// Grants the seeder role to the configured nicknames.
#[derive(Clone)]
pub struct SeederBootstrap {
    users: Arc<dyn UserStore>,
    id_gen: IdGenerator,
    io_timeout: Duration,
}

impl SeederBootstrap {
    #[must_use]
    pub fn new(users: Arc<dyn UserStore>, io_timeout: Duration) -> Self {
        Self {
            users,
            id_gen: IdGenerator::new(),
            io_timeout,
        }
    }

    /// Make every nickname in `nicknames` a seeder.
    ///
    /// Idempotent. Blank entries and duplicates are ignored. The first store
    /// failure aborts, leaving earlier entries applied.
    pub async fn ensure_seeders(&self, nicknames: &[String]) -> AppResult<BootstrapReport> {
        let mut report = BootstrapReport::default();
        let mut seen = Vec::with_capacity(nicknames.len());

        for raw in nicknames {
            let nickname = normalize_handle(raw);
            if nickname.is_empty() || seen.contains(&nickname) {
                continue;
            }
            seen.push(nickname.clone());

            let existing = within(
                self.io_timeout,
                "initial seeder lookup",
                self.users.find_by_handle(&nickname),
            )
            .await?;

            match existing {
                Some(user) if user.role == UserRole::Seeder => report.unchanged.push(nickname),
                Some(mut user) => {
                    tracing::info!(user_id = %user.id, from = %user.role, "Promoting initial seeder");
                    user.role = UserRole::Seeder;
                    user.updated_at = Some(Utc::now().into());
                    within(
                        self.io_timeout,
                        "initial seeder promotion",
                        self.users.update(user),
                    )
                    .await?;
                    report.promoted.push(nickname);
                }
                None => {
                    let seeder = user::Model {
                        id: self.id_gen.generate(),
                        name: nickname.clone(),
                        telegram_id: None,
                        telegram_nickname: nickname.clone(),
                        discord_id: None,
                        role: UserRole::Seeder,
                        backers_id: json!([]),
                        members_invite_link: None,
                        seeders_invite_link: None,
                        created_at: Utc::now().into(),
                        updated_at: None,
                    };
                    let created = within(
                        self.io_timeout,
                        "initial seeder creation",
                        self.users.create(seeder),
                    )
                    .await?;
                    tracing::info!(user_id = %created.id, nickname = %nickname, "Initial seeder created");
                    report.created.push(nickname);
                }
            }
        }

        Ok(report)
    }
}
