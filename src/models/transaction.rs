use crate::models::EarningResponse;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A completed, revenue-bearing wallet transaction reported by the payment pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RevenueTransaction {
    #[schema(example = "tx_20261018_0001")]
    pub id: String,
    /// 产生收入的用户（佣金沿其上级链分配）
    pub source_user_id: i64,
    pub net_revenue_minor_units: i64,
    #[serde(rename = "type")]
    #[schema(example = "transfer")]
    pub transaction_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionCompletedResponse {
    pub earnings_created: usize,
    pub earnings: Vec<EarningResponse>,
}
