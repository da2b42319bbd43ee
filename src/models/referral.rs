use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReferralLinkResponse {
    pub user_id: i64,
    #[schema(example = "K7QX2M")]
    pub referral_code: String,
    #[schema(example = "https://wallet.example/join?ref=K7QX2M")]
    pub share_link: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct NetworkLevelCount {
    pub level: i32,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NetworkResponse {
    pub user_id: i64,
    /// 直接邀请（level 1）
    pub direct_count: i64,
    /// 继承的下级（level >= 2）
    pub inherited_count: i64,
    pub total_count: i64,
    pub levels: Vec<NetworkLevelCount>,
    /// 该用户自身上级链的深度
    pub upline_depth: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LevelStatsResponse {
    pub level: i32,
    pub referral_count: i64,
    pub earnings_count: i64,
    pub earned_minor_units: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserStatsResponse {
    pub user_id: i64,
    pub total_earned: i64,
    pub total_paid: i64,
    pub pending_amount: i64,
    pub earnings_count: i64,
    pub month_key: String,
    pub month_earned: i64,
    pub month_paid: i64,
    pub levels: Vec<LevelStatsResponse>,
}
