use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Phone,
    Username,
    KycTier,
    ReferralCode,
    ReferrerId,
    Balance,
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
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Users::Phone).string_len(32).not_null())
                    .col(ColumnDef::new(Users::Username).string_len(64).not_null())
                    // kyc_tier: unverified | basic | verified
                    .col(
                        ColumnDef::new(Users::KycTier)
                            .string_len(16)
                            .not_null()
                            .default("unverified"),
                    )
                    .col(ColumnDef::new(Users::ReferralCode).string_len(16).null())
                    .col(ColumnDef::new(Users::ReferrerId).big_integer().null())
                    .col(
                        ColumnDef::new(Users::Balance)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Users::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Users::UpdatedAt)
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
                    .name("uq_users_phone")
                    .table(Users::Table)
                    .col(Users::Phone)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 多个 NULL 不冲突，推荐码按需生成
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_users_referral_code")
                    .table(Users::Table)
                    .col(Users::ReferralCode)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_users_referrer")
                    .table(Users::Table)
                    .col(Users::ReferrerId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}
