use crate::entities::{BatchStatus, payout_batch_entity as batches};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct PayoutFailure {
    pub user_id: i64,
    pub reason: String,
    pub earning_count: usize,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BatchResult {
    pub batch_id: String,
    pub as_of_date: NaiveDate,
    pub status: BatchStatus,
    pub total_amount: i64,
    pub earnings_paid: i64,
    pub users_paid: i64,
    pub users_failed: i64,
    pub failed_users: Vec<PayoutFailure>,
    pub last_error: Option<String>,
    pub run_count: i32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<batches::Model> for BatchResult {
    fn from(m: batches::Model) -> Self {
        // 存储格式异常时不影响查询
        let failed_users: Vec<PayoutFailure> =
            serde_json::from_value(m.failed_users).unwrap_or_default();
        Self {
            batch_id: m.batch_id,
            as_of_date: m.as_of_date,
            status: m.status,
            total_amount: m.total_amount,
            earnings_paid: m.earnings_paid,
            users_paid: m.users_paid,
            users_failed: m.users_failed,
            failed_users,
            last_error: m.last_error,
            run_count: m.run_count,
            started_at: m.started_at,
            finished_at: m.finished_at,
        }
    }
}
