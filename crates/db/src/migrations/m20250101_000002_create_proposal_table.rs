//! Create proposal table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Proposal::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Proposal::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Proposal::NominatorId).string_len(32).not_null())
                    .col(ColumnDef::new(Proposal::NomineeName).string_len(256).not_null())
                    .col(
                        ColumnDef::new(Proposal::NomineeTelegramNickname)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Proposal::NomineeTelegramId).big_integer())
                    .col(ColumnDef::new(Proposal::NomineeRole).string_len(16).not_null())
                    .col(ColumnDef::new(Proposal::Comment).text().not_null())
                    .col(ColumnDef::new(Proposal::PollId).big_integer().not_null())
                    .col(ColumnDef::new(Proposal::PollChatId).big_integer().not_null())
                    .col(ColumnDef::new(Proposal::PollMessageId).integer())
                    .col(ColumnDef::new(Proposal::DiscussionMessageId).integer())
                    .col(
                        ColumnDef::new(Proposal::Status)
                            .string_len(16)
                            .not_null()
                            .default("created"),
                    )
                    .col(
                        ColumnDef::new(Proposal::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Proposal::FinishedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Proposal::UpdatedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .from(Proposal::Table, Proposal::NominatorId)
                            .to(User::Table, User::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: status + finished_at (settlement pass selects open proposals)
        manager
            .create_index(
                Index::create()
                    .name("idx_proposal_status_finished_at")
                    .table(Proposal::Table)
                    .col(Proposal::Status)
                    .col(Proposal::FinishedAt)
                    .to_owned(),
            )
            .await?;

        // Index: nominee nickname (pending check and re-nomination cooldown)
        manager
            .create_index(
                Index::create()
                    .name("idx_proposal_nominee_telegram_nickname")
                    .table(Proposal::Table)
                    .col(Proposal::NomineeTelegramNickname)
                    .to_owned(),
            )
            .await?;

        // Unique index: poll_id (one poll backs exactly one proposal)
        manager
            .create_index(
                Index::create()
                    .name("idx_proposal_poll_id")
                    .table(Proposal::Table)
                    .col(Proposal::PollId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Proposal::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Proposal {
    Table,
    Id,
    NominatorId,
    NomineeName,
    NomineeTelegramNickname,
    NomineeTelegramId,
    NomineeRole,
    Comment,
    PollId,
    PollChatId,
    PollMessageId,
    DiscussionMessageId,
    Status,
    CreatedAt,
    FinishedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
