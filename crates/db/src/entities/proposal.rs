//! Proposal entity for nominations put to a seeder vote.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::user::UserRole;

/// Lifecycle status of a proposal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    #[sea_orm(string_value = "created")]
    Created,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
    #[sea_orm(string_value = "no_quorum")]
    NoQuorum,
}

impl ProposalStatus {
    /// Whether the status is final. Terminal proposals are never settled again.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Created)
    }

    /// Lowercase name as stored in the database.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::NoQuorum => "no_quorum",
        }
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role the nominee is proposed for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum NomineeRole {
    #[sea_orm(string_value = "member")]
    Member,
    #[sea_orm(string_value = "seeder")]
    Seeder,
}

impl From<NomineeRole> for UserRole {
    fn from(role: NomineeRole) -> Self {
        match role {
            NomineeRole::Member => Self::Member,
            NomineeRole::Seeder => Self::Seeder,
        }
    }
}

impl std::fmt::Display for NomineeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(UserRole::from(*self).as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "proposal")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// User who submitted the nomination
    #[sea_orm(indexed)]
    pub nominator_id: String,

    pub nominee_name: String,

    /// Nominee nickname without the leading `@`, lowercased
    #[sea_orm(indexed)]
    pub nominee_telegram_nickname: String,

    #[sea_orm(nullable)]
    pub nominee_telegram_id: Option<i64>,

    pub nominee_role: NomineeRole,

    #[sea_orm(column_type = "Text")]
    pub comment: String,

    /// Poll id in the external vote service
    pub poll_id: i64,

    /// Chat the poll was posted into
    pub poll_chat_id: i64,

    #[sea_orm(nullable)]
    pub poll_message_id: Option<i32>,

    /// Message that opens the discussion thread for the poll
    #[sea_orm(nullable)]
    pub discussion_message_id: Option<i32>,

    #[sea_orm(indexed)]
    pub status: ProposalStatus,

    pub created_at: DateTimeWithTimeZone,

    /// Voting deadline
    pub finished_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::NominatorId",
        to = "super::user::Column::Id"
    )]
    Nominator,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Nominator.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_created_is_open() {
        assert!(!ProposalStatus::Created.is_terminal());
        assert!(ProposalStatus::Approved.is_terminal());
        assert!(ProposalStatus::Rejected.is_terminal());
        assert!(ProposalStatus::NoQuorum.is_terminal());
    }

    #[test]
    fn test_nominee_role_maps_to_user_role() {
        assert_eq!(UserRole::from(NomineeRole::Member), UserRole::Member);
        assert_eq!(UserRole::from(NomineeRole::Seeder), UserRole::Seeder);
        assert!(UserRole::Guest < UserRole::Member);
        assert!(UserRole::Member < UserRole::Seeder);
    }
}
