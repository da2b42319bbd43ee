use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum UserStats {
    Table,
    UserId,
    TotalEarned,
    TotalPaid,
    PendingAmount,
    EarningsCount,
    MonthKey,
    MonthEarned,
    MonthPaid,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum UserLevelStats {
    Table,
    UserId,
    Level,
    ReferralCount,
    EarningsCount,
    EarnedMinorUnits,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let counter = |col: UserStats| {
            ColumnDef::new(col)
                .big_integer()
                .not_null()
                .default(0)
                .to_owned()
        };

        manager
            .create_table(
                Table::create()
                    .table(UserStats::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserStats::UserId)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(&mut counter(UserStats::TotalEarned))
                    .col(&mut counter(UserStats::TotalPaid))
                    .col(&mut counter(UserStats::PendingAmount))
                    .col(&mut counter(UserStats::EarningsCount))
                    .col(ColumnDef::new(UserStats::MonthKey).string_len(7).not_null())
                    .col(&mut counter(UserStats::MonthEarned))
                    .col(&mut counter(UserStats::MonthPaid))
                    .col(
                        ColumnDef::new(UserStats::UpdatedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserLevelStats::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserLevelStats::UserId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(UserLevelStats::Level).integer().not_null())
                    .col(
                        ColumnDef::new(UserLevelStats::ReferralCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(UserLevelStats::EarningsCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(UserLevelStats::EarnedMinorUnits)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .primary_key(
                        Index::create()
                            .col(UserLevelStats::UserId)
                            .col(UserLevelStats::Level),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserLevelStats::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(UserStats::Table).to_owned())
            .await?;
        Ok(())
    }
}
