use crate::entities::{EarningStatus, earning_entity as earnings};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EarningResponse {
    pub id: i64,
    pub earner_id: i64,
    pub source_transaction_id: String,
    pub level: i32,
    #[schema(example = "5.00")]
    pub percentage: String,
    pub revenue_minor_units: i64,
    pub amount_minor_units: i64,
    pub capped: bool,
    pub original_amount_minor_units: Option<i64>,
    pub status: EarningStatus,
    pub month_key: String,
    pub paid_batch_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<earnings::Model> for EarningResponse {
    fn from(m: earnings::Model) -> Self {
        Self {
            id: m.id,
            earner_id: m.earner_id,
            source_transaction_id: m.source_transaction_id,
            level: m.level,
            percentage: m.percentage,
            revenue_minor_units: m.revenue_minor_units,
            amount_minor_units: m.amount_minor_units,
            capped: m.capped,
            original_amount_minor_units: m.original_amount_minor_units,
            status: m.status,
            month_key: m.month_key,
            paid_batch_id: m.paid_batch_id,
            paid_at: m.paid_at,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EarningsSummaryResponse {
    pub user_id: i64,
    pub pending_amount: i64,
    pub pending_count: i64,
    pub paid_amount: i64,
    pub paid_count: i64,
    pub month_key: String,
    pub month_earned: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EarningQuery {
    pub status: Option<EarningStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}
