use crate::entities::{invite_entity as invites, user_entity as users};
use crate::error::AppResult;
use crate::utils::generate_code;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter};

pub const REFERRAL_CODE_LEN: usize = 6;
pub const INVITE_CODE_LEN: usize = 8;

/// 生成唯一的个人推荐码
pub async fn generate_unique_referral_code<C: ConnectionTrait>(conn: &C) -> AppResult<String> {
    loop {
        let code = generate_code(REFERRAL_CODE_LEN);
        let exists = users::Entity::find()
            .filter(users::Column::ReferralCode.eq(code.clone()))
            .count(conn)
            .await?;
        if exists == 0 {
            return Ok(code);
        }
    }
}

/// 生成唯一的邀请码
pub async fn generate_unique_invite_code<C: ConnectionTrait>(conn: &C) -> AppResult<String> {
    loop {
        let code = generate_code(INVITE_CODE_LEN);
        let exists = invites::Entity::find()
            .filter(invites::Column::Code.eq(code.clone()))
            .count(conn)
            .await?;
        if exists == 0 {
            return Ok(code);
        }
    }
}
