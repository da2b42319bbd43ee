pub use sea_orm_migration::prelude::*;

mod m20251001_000001_create_users;
mod m20251001_000002_create_invites;
mod m20251001_000003_create_chains;
mod m20251001_000004_create_earnings;
mod m20251001_000005_create_user_stats;
mod m20251001_000006_create_payouts;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20251001_000001_create_users::Migration),
            Box::new(m20251001_000002_create_invites::Migration),
            Box::new(m20251001_000003_create_chains::Migration),
            Box::new(m20251001_000004_create_earnings::Migration),
            Box::new(m20251001_000005_create_user_stats::Migration),
            Box::new(m20251001_000006_create_payouts::Migration),
        ]
    }
}
