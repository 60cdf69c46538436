//! Create user table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(User::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(User::Id).string_len(32).not_null().primary_key())
                    .col(ColumnDef::new(User::Name).string_len(256).not_null())
                    .col(ColumnDef::new(User::TelegramId).big_integer())
                    .col(ColumnDef::new(User::TelegramNickname).string_len(64).not_null())
                    .col(ColumnDef::new(User::DiscordId).string_len(64))
                    .col(
                        ColumnDef::new(User::Role)
                            .string_len(16)
                            .not_null()
                            .default("guest"),
                    )
                    .col(
                        ColumnDef::new(User::BackersId)
                            .json()
                            .not_null()
                            .default("[]"),
                    )
                    .col(ColumnDef::new(User::MembersInviteLink).string_len(256))
                    .col(ColumnDef::new(User::SeedersInviteLink).string_len(256))
                    .col(
                        ColumnDef::new(User::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(User::UpdatedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // Unique index: telegram_nickname
        manager
            .create_index(
                Index::create()
                    .name("idx_user_telegram_nickname")
                    .table(User::Table)
                    .col(User::TelegramNickname)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Unique index: telegram_id (NULL until the user talks to a bot)
        manager
            .create_index(
                Index::create()
                    .name("idx_user_telegram_id")
                    .table(User::Table)
                    .col(User::TelegramId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index: role (seeder roster lookups)
        manager
            .create_index(
                Index::create()
                    .name("idx_user_role")
                    .table(User::Table)
                    .col(User::Role)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(User::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum User {
    Table,
    Id,
    Name,
    TelegramId,
    TelegramNickname,
    DiscordId,
    Role,
    BackersId,
    MembersInviteLink,
    SeedersInviteLink,
    CreatedAt,
    UpdatedAt,
}
