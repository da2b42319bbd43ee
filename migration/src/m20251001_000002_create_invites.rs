use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Invites {
    Table,
    Id,
    Code,
    InviterId,
    InviteePhone,
    InviteeUserId,
    Status,
    ExpiresAt,
    SignedUpAt,
    ActivatedAt,
    ExpiredAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Invites::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Invites::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Invites::Code).string_len(16).not_null())
                    .col(ColumnDef::new(Invites::InviterId).big_integer().not_null())
                    .col(ColumnDef::new(Invites::InviteePhone).string_len(32).not_null())
                    .col(ColumnDef::new(Invites::InviteeUserId).big_integer().null())
                    // pending | signed_up | activated | expired
                    .col(
                        ColumnDef::new(Invites::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Invites::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Invites::SignedUpAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Invites::ActivatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Invites::ExpiredAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Invites::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Invites::UpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_invites_code")
                    .table(Invites::Table)
                    .col(Invites::Code)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 同一邀请人对同一号码只能邀请一次
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_invites_inviter_phone")
                    .table(Invites::Table)
                    .col(Invites::InviterId)
                    .col(Invites::InviteePhone)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_invites_inviter_created")
                    .table(Invites::Table)
                    .col(Invites::InviterId)
                    .col(Invites::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_invites_invitee_user")
                    .table(Invites::Table)
                    .col(Invites::InviteeUserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Invites::Table).to_owned())
            .await?;
        Ok(())
    }
}
