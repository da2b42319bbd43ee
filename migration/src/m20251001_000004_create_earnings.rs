use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Earnings {
    Table,
    Id,
    EarnerId,
    SourceTransactionId,
    SourceUserId,
    TransactionType,
    Level,
    Percentage,
    RevenueMinorUnits,
    AmountMinorUnits,
    Capped,
    OriginalAmountMinorUnits,
    Status,
    MonthKey,
    ClaimToken,
    ClaimedBatchId,
    ClaimedAt,
    PaidBatchId,
    PaidAt,
    CreatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Earnings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Earnings::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Earnings::EarnerId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Earnings::SourceTransactionId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Earnings::SourceUserId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Earnings::TransactionType)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Earnings::Level).integer().not_null())
                    // 十进制百分比原文保存，例如 "5.00"
                    .col(ColumnDef::new(Earnings::Percentage).string_len(16).not_null())
                    .col(
                        ColumnDef::new(Earnings::RevenueMinorUnits)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Earnings::AmountMinorUnits)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Earnings::Capped)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Earnings::OriginalAmountMinorUnits)
                            .big_integer()
                            .null(),
                    )
                    // pending | paid
                    .col(
                        ColumnDef::new(Earnings::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Earnings::MonthKey).string_len(7).not_null())
                    .col(ColumnDef::new(Earnings::ClaimToken).string_len(36).null())
                    .col(ColumnDef::new(Earnings::ClaimedBatchId).string_len(32).null())
                    .col(
                        ColumnDef::new(Earnings::ClaimedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Earnings::PaidBatchId).string_len(32).null())
                    .col(
                        ColumnDef::new(Earnings::PaidAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Earnings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // 同一笔交易重复投递时依赖此唯一键去重
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_earnings_tx_level_earner")
                    .table(Earnings::Table)
                    .col(Earnings::SourceTransactionId)
                    .col(Earnings::Level)
                    .col(Earnings::EarnerId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_earnings_status_claim")
                    .table(Earnings::Table)
                    .col(Earnings::Status)
                    .col(Earnings::ClaimToken)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_earnings_earner_level_month")
                    .table(Earnings::Table)
                    .col(Earnings::EarnerId)
                    .col(Earnings::Level)
                    .col(Earnings::MonthKey)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Earnings::Table).to_owned())
            .await?;
        Ok(())
    }
}
