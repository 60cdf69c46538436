//! User entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Governance role of a community member.
///
/// Variants are declared in ascending trust order, so `Ord` reflects rank.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[sea_orm(string_value = "guest")]
    Guest,
    #[sea_orm(string_value = "member")]
    Member,
    #[sea_orm(string_value = "seeder")]
    Seeder,
}

impl UserRole {
    /// Lowercase name as stored in the database.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::Member => "member",
            Self::Seeder => "seeder",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Display name
    pub name: String,

    /// Telegram user id, known once the user has talked to a bot
    #[sea_orm(unique, nullable)]
    pub telegram_id: Option<i64>,

    /// Telegram nickname without the leading `@`, lowercased
    #[sea_orm(unique)]
    pub telegram_nickname: String,

    #[sea_orm(nullable)]
    pub discord_id: Option<String>,

    #[sea_orm(indexed)]
    pub role: UserRole,

    /// Identities of the seeders who voted "yes" on this user's nomination (JSON array)
    #[sea_orm(column_type = "Json")]
    pub backers_id: Json,

    /// Cached members chat invite link
    #[sea_orm(nullable)]
    pub members_invite_link: Option<String>,

    /// Cached seeders chat invite link
    #[sea_orm(nullable)]
    pub seeders_invite_link: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::proposal::Entity")]
    Proposal,
}

impl Related<super::proposal::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Proposal.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
