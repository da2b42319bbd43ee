use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Chains {
    Table,
    UserId,
    InviterId,
    Depth,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ChainLinks {
    Table,
    UserId,
    Level,
    AncestorId,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Chains::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Chains::UserId)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Chains::InviterId).big_integer().not_null())
                    .col(ColumnDef::new(Chains::Depth).integer().not_null())
                    .col(
                        ColumnDef::new(Chains::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // 每个用户的上级快照，level 1 = 直接邀请人
        manager
            .create_table(
                Table::create()
                    .table(ChainLinks::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(ChainLinks::UserId).big_integer().not_null())
                    .col(ColumnDef::new(ChainLinks::Level).integer().not_null())
                    .col(
                        ColumnDef::new(ChainLinks::AncestorId)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(ChainLinks::UserId)
                            .col(ChainLinks::Level),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_chain_links_ancestor_level")
                    .table(ChainLinks::Table)
                    .col(ChainLinks::AncestorId)
                    .col(ChainLinks::Level)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ChainLinks::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Chains::Table).to_owned())
            .await?;
        Ok(())
    }
}
