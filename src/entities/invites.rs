use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(None)")]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "signed_up")]
    SignedUp,
    #[sea_orm(string_value = "activated")]
    Activated,
    #[sea_orm(string_value = "expired")]
    Expired,
}

impl InviteStatus {
    /// 状态只能向前推进
    pub fn can_transition_to(self, next: InviteStatus) -> bool {
        matches!(
            (self, next),
            (InviteStatus::Pending, InviteStatus::SignedUp)
                | (InviteStatus::SignedUp, InviteStatus::Activated)
                | (InviteStatus::Pending, InviteStatus::Expired)
                | (InviteStatus::SignedUp, InviteStatus::Expired)
        )
    }
}

impl std::fmt::Display for InviteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InviteStatus::Pending => write!(f, "pending"),
            InviteStatus::SignedUp => write!(f, "signed_up"),
            InviteStatus::Activated => write!(f, "activated"),
            InviteStatus::Expired => write!(f, "expired"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "invites")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub code: String,
    pub inviter_id: i64,
    pub invitee_phone: String,
    pub invitee_user_id: Option<i64>,
    pub status: InviteStatus,
    pub expires_at: DateTime<Utc>,
    pub signed_up_at: Option<DateTime<Utc>>,
    pub activated_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
