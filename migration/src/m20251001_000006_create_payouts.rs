use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum PayoutBatches {
    Table,
    BatchId,
    AsOfDate,
    Status,
    TotalAmount,
    EarningsPaid,
    UsersPaid,
    UsersFailed,
    FailedUsers,
    LastError,
    RunCount,
    StartedAt,
    FinishedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum LedgerTransactions {
    Table,
    Id,
    UserId,
    BatchId,
    Amount,
    EarningIds,
    Description,
    CreatedAt,
}

#[derive(DeriveIden)]
enum WalletTransactions {
    Table,
    Id,
    UserId,
    TransactionType,
    Amount,
    BalanceAfter,
    Reference,
    Description,
    Metadata,
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
                    .table(PayoutBatches::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PayoutBatches::BatchId)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PayoutBatches::AsOfDate).date().not_null())
                    // processing | completed | failed
                    .col(
                        ColumnDef::new(PayoutBatches::Status)
                            .string_len(16)
                            .not_null()
                            .default("processing"),
                    )
                    .col(
                        ColumnDef::new(PayoutBatches::TotalAmount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(PayoutBatches::EarningsPaid)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(PayoutBatches::UsersPaid)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(PayoutBatches::UsersFailed)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(PayoutBatches::FailedUsers).json().not_null())
                    .col(ColumnDef::new(PayoutBatches::LastError).text().null())
                    .col(
                        ColumnDef::new(PayoutBatches::RunCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(PayoutBatches::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PayoutBatches::FinishedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PayoutBatches::UpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 追加写入的审计账本
        manager
            .create_table(
                Table::create()
                    .table(LedgerTransactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LedgerTransactions::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(LedgerTransactions::UserId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(LedgerTransactions::BatchId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(LedgerTransactions::Amount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(LedgerTransactions::EarningIds)
                            .json()
                            .not_null(),
                    )
                    .col(ColumnDef::new(LedgerTransactions::Description).text().null())
                    .col(
                        ColumnDef::new(LedgerTransactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_ledger_transactions_batch_user")
                    .table(LedgerTransactions::Table)
                    .col(LedgerTransactions::BatchId)
                    .col(LedgerTransactions::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(WalletTransactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WalletTransactions::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(WalletTransactions::UserId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WalletTransactions::TransactionType)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WalletTransactions::Amount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WalletTransactions::BalanceAfter)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WalletTransactions::Reference)
                            .string_len(64)
                            .null(),
                    )
                    .col(ColumnDef::new(WalletTransactions::Description).text().null())
                    .col(ColumnDef::new(WalletTransactions::Metadata).json().null())
                    .col(
                        ColumnDef::new(WalletTransactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_wallet_transactions_user")
                    .table(WalletTransactions::Table)
                    .col(WalletTransactions::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(WalletTransactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(LedgerTransactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PayoutBatches::Table).to_owned())
            .await?;
        Ok(())
    }
}
