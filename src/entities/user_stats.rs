use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

/// 仪表盘用的冗余计数，不参与任何金额计算
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "user_stats")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: i64,
    pub total_earned: i64,
    pub total_paid: i64,
    pub pending_amount: i64,
    pub earnings_count: i64,
    pub month_key: String,
    pub month_earned: i64,
    pub month_paid: i64,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
