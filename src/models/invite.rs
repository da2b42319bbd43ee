use crate::entities::{InviteStatus, invite_entity as invites};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SendInviteRequest {
    pub requester_id: i64,
    #[schema(example = "+12345678901")]
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AcceptInviteRequest {
    /// 邀请码或个人推荐码
    #[schema(example = "K7QX2M9P")]
    pub code: String,
    pub user_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InviteResponse {
    pub id: i64,
    pub code: String,
    pub inviter_id: i64,
    pub invitee_phone: String,
    pub invitee_user_id: Option<i64>,
    pub status: InviteStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<invites::Model> for InviteResponse {
    fn from(m: invites::Model) -> Self {
        Self {
            id: m.id,
            code: m.code,
            inviter_id: m.inviter_id,
            invitee_phone: m.invitee_phone,
            invitee_user_id: m.invitee_user_id,
            status: m.status,
            expires_at: m.expires_at,
            created_at: m.created_at,
        }
    }
}
