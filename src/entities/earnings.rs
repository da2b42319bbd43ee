use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(None)")]
#[serde(rename_all = "snake_case")]
pub enum EarningStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    Paid,
}

impl std::fmt::Display for EarningStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EarningStatus::Pending => write!(f, "pending"),
            EarningStatus::Paid => write!(f, "paid"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "earnings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub earner_id: i64,
    pub source_transaction_id: String,
    pub source_user_id: i64,
    pub transaction_type: String,
    pub level: i32,
    pub percentage: String,
    pub revenue_minor_units: i64,
    pub amount_minor_units: i64,
    pub capped: bool,
    pub original_amount_minor_units: Option<i64>,
    pub status: EarningStatus,
    /// YYYY-MM
    pub month_key: String,
    pub claim_token: Option<String>,
    pub claimed_batch_id: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub paid_batch_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Model {
    pub fn percentage_value(&self) -> Option<Decimal> {
        Decimal::from_str(&self.percentage).ok()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
