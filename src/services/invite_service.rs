use crate::config::{ChainTrigger, ReferralConfig};
use crate::entities::{InviteStatus, invite_entity as invites, user_entity as users};
use crate::error::{AppError, AppResult, IneligibilityReason};
use crate::external::InviteNotifier;
use crate::models::ReferralLinkResponse;
use crate::services::chain_builder::{UplineChain, load_chain};
use crate::services::{ChainBuilder, FraudGuard};
use crate::utils::{generate_unique_invite_code, generate_unique_referral_code, normalize_us_phone};
use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use std::collections::HashSet;
use std::sync::Arc;

/// 沿 referrer_id 向上查找的最大步数
const MAX_REFERRER_WALK: usize = 256;

#[derive(Debug, Clone)]
pub struct InviteSettings {
    pub ttl: Duration,
    pub chain_trigger: ChainTrigger,
    pub share_base_url: String,
}

impl From<&ReferralConfig> for InviteSettings {
    fn from(config: &ReferralConfig) -> Self {
        Self {
            ttl: Duration::hours(config.invite_ttl_hours),
            chain_trigger: config.chain_trigger,
            share_base_url: config.share_base_url.clone(),
        }
    }
}

pub fn share_link(base_url: &str, code: &str) -> String {
    format!("{base_url}?ref={code}")
}

#[derive(Clone)]
pub struct InviteService {
    pool: DatabaseConnection,
    fraud_guard: FraudGuard,
    chain_builder: ChainBuilder,
    notifier: Arc<dyn InviteNotifier>,
    settings: InviteSettings,
}

impl InviteService {
    pub fn new(
        pool: DatabaseConnection,
        fraud_guard: FraudGuard,
        chain_builder: ChainBuilder,
        notifier: Arc<dyn InviteNotifier>,
        settings: InviteSettings,
    ) -> Self {
        Self {
            pool,
            fraud_guard,
            chain_builder,
            notifier,
            settings,
        }
    }

    async fn find_user(&self, user_id: i64) -> AppResult<users::Model> {
        users::Entity::find_by_id(user_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {user_id} not found")))
    }

    /// 发送邀请：校验号码 -> 自邀/已注册检查 -> 风控 -> 建邀请 -> 异步发短信
    pub async fn send_invite(&self, requester_id: i64, phone: &str) -> AppResult<invites::Model> {
        let phone = normalize_us_phone(phone)?;
        let requester = self.find_user(requester_id).await?;

        if requester.phone == phone {
            return Err(IneligibilityReason::SelfReferral.into());
        }
        let registered = users::Entity::find()
            .filter(users::Column::Phone.eq(phone.as_str()))
            .count(&self.pool)
            .await?;
        if registered > 0 {
            return Err(IneligibilityReason::TargetAlreadyRegistered.into());
        }

        let now = Utc::now();
        self.fraud_guard.check_invite(&requester, &phone, now).await?;

        // 风控被旁路时唯一索引仍然兜底
        let duplicate = invites::Entity::find()
            .filter(invites::Column::InviterId.eq(requester_id))
            .filter(invites::Column::InviteePhone.eq(phone.as_str()))
            .count(&self.pool)
            .await?;
        if duplicate > 0 {
            return Err(IneligibilityReason::AlreadyInvited.into());
        }

        let code = generate_unique_invite_code(&self.pool).await?;
        let invite = invites::ActiveModel {
            code: Set(code),
            inviter_id: Set(requester_id),
            invitee_phone: Set(phone.clone()),
            invitee_user_id: Set(None),
            status: Set(InviteStatus::Pending),
            expires_at: Set(now + self.settings.ttl),
            signed_up_at: Set(None),
            activated_at: Set(None),
            expired_at: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
            ..Default::default()
        }
        .insert(&self.pool)
        .await?;
        log::info!(
            "Invite {} created by user {requester_id} for {phone}",
            invite.code
        );

        let notifier = self.notifier.clone();
        let link = share_link(&self.settings.share_base_url, &invite.code);
        let inviter_name = requester.username.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.send_invite(&phone, &inviter_name, &link).await {
                log::warn!("Invite SMS delivery to {phone} failed: {e}");
            }
        });

        Ok(invite)
    }

    /// 新用户通过邀请码或个人推荐码注册。
    ///
    /// 推荐码注册会为 (推荐人, 新用户手机号) 补建一条邀请记录，再走同样的状态流转。
    pub async fn accept_signup(&self, code: &str, new_user_id: i64) -> AppResult<invites::Model> {
        let code = code.trim().to_uppercase();
        let user = self.find_user(new_user_id).await?;
        if user.referrer_id.is_some() {
            return Err(IneligibilityReason::AlreadyReferred.into());
        }
        let now = Utc::now();

        let by_invite = invites::Entity::find()
            .filter(invites::Column::Code.eq(code.as_str()))
            .one(&self.pool)
            .await?;
        let inviter_id = match &by_invite {
            Some(invite) => invite.inviter_id,
            None => {
                users::Entity::find()
                    .filter(users::Column::ReferralCode.eq(code.as_str()))
                    .one(&self.pool)
                    .await?
                    .ok_or(IneligibilityReason::InviteNotFound)?
                    .id
            }
        };

        if inviter_id == new_user_id {
            return Err(IneligibilityReason::SelfReferral.into());
        }
        if self.referrer_path_contains(inviter_id, new_user_id).await? {
            return Err(IneligibilityReason::CyclicReferral.into());
        }

        let invite = match by_invite {
            Some(invite) => invite,
            None => self.invite_for_referral_code(inviter_id, &user, now).await?,
        };
        self.check_acceptable(&invite, now).await?;

        let txn = self.pool.begin().await?;
        let moved = invites::Entity::update_many()
            .col_expr(invites::Column::Status, Expr::value(InviteStatus::SignedUp))
            .col_expr(invites::Column::InviteeUserId, Expr::value(Some(new_user_id)))
            .col_expr(invites::Column::SignedUpAt, Expr::value(Some(now)))
            .col_expr(invites::Column::UpdatedAt, Expr::value(Some(now)))
            .filter(invites::Column::Id.eq(invite.id))
            .filter(invites::Column::Status.eq(InviteStatus::Pending))
            .exec(&txn)
            .await?;
        if moved.rows_affected == 0 {
            txn.rollback().await?;
            return Err(IneligibilityReason::InviteAlreadyUsed.into());
        }
        let linked = users::Entity::update_many()
            .col_expr(users::Column::ReferrerId, Expr::value(Some(inviter_id)))
            .col_expr(users::Column::UpdatedAt, Expr::value(Some(now)))
            .filter(users::Column::Id.eq(new_user_id))
            .filter(users::Column::ReferrerId.is_null())
            .exec(&txn)
            .await?;
        if linked.rows_affected == 0 {
            txn.rollback().await?;
            return Err(IneligibilityReason::AlreadyReferred.into());
        }
        txn.commit().await?;
        log::info!("User {new_user_id} signed up with invite {} from user {inviter_id}", invite.code);

        if self.settings.chain_trigger == ChainTrigger::Signup
            && let Err(e) = self.chain_builder.build_chain(new_user_id, inviter_id).await
        {
            // 激活时会再补建
            log::error!("Failed to build chain for user {new_user_id} at signup: {e}");
        }

        invites::Entity::find_by_id(invite.id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Invite {} not found", invite.id)))
    }

    async fn check_acceptable(&self, invite: &invites::Model, now: DateTime<Utc>) -> AppResult<()> {
        match invite.status {
            InviteStatus::Pending if invite.expires_at <= now => {
                self.expire_one(invite.id, now).await?;
                Err(IneligibilityReason::InviteExpired.into())
            }
            InviteStatus::Pending => Ok(()),
            InviteStatus::Expired => Err(IneligibilityReason::InviteExpired.into()),
            InviteStatus::SignedUp | InviteStatus::Activated => {
                Err(IneligibilityReason::InviteAlreadyUsed.into())
            }
        }
    }

    /// 个人推荐码：为 (推荐人, 新用户手机号) 复用或新建一条 pending 邀请
    async fn invite_for_referral_code(
        &self,
        inviter_id: i64,
        user: &users::Model,
        now: DateTime<Utc>,
    ) -> AppResult<invites::Model> {
        if let Some(existing) = invites::Entity::find()
            .filter(invites::Column::InviterId.eq(inviter_id))
            .filter(invites::Column::InviteePhone.eq(user.phone.as_str()))
            .one(&self.pool)
            .await?
        {
            return Ok(existing);
        }

        let invite_code = generate_unique_invite_code(&self.pool).await?;
        let invite = invites::ActiveModel {
            code: Set(invite_code),
            inviter_id: Set(inviter_id),
            invitee_phone: Set(user.phone.clone()),
            invitee_user_id: Set(None),
            status: Set(InviteStatus::Pending),
            expires_at: Set(now + self.settings.ttl),
            signed_up_at: Set(None),
            activated_at: Set(None),
            expired_at: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
            ..Default::default()
        }
        .insert(&self.pool)
        .await?;
        Ok(invite)
    }

    /// 从 inviter 沿 referrer_id 向上走，判断是否会经过 user_id
    async fn referrer_path_contains(&self, inviter_id: i64, user_id: i64) -> AppResult<bool> {
        if let Some(chain) = load_chain(&self.pool, inviter_id).await?
            && chain.ancestors.contains(&user_id)
        {
            return Ok(true);
        }

        let mut seen = HashSet::new();
        let mut current = Some(inviter_id);
        while let Some(id) = current {
            if id == user_id {
                return Ok(true);
            }
            if !seen.insert(id) || seen.len() > MAX_REFERRER_WALK {
                break;
            }
            current = users::Entity::find_by_id(id)
                .one(&self.pool)
                .await?
                .and_then(|u| u.referrer_id);
        }
        Ok(false)
    }

    /// 首次有效活动：signed_up -> activated，并在需要时建立上级链。可重复调用。
    pub async fn activate(&self, user_id: i64) -> AppResult<Option<UplineChain>> {
        let Some(invite) = invites::Entity::find()
            .filter(invites::Column::InviteeUserId.eq(user_id))
            .order_by_desc(invites::Column::Id)
            .one(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        match invite.status {
            InviteStatus::SignedUp => {
                let now = Utc::now();
                let moved = invites::Entity::update_many()
                    .col_expr(invites::Column::Status, Expr::value(InviteStatus::Activated))
                    .col_expr(invites::Column::ActivatedAt, Expr::value(Some(now)))
                    .col_expr(invites::Column::UpdatedAt, Expr::value(Some(now)))
                    .filter(invites::Column::Id.eq(invite.id))
                    .filter(invites::Column::Status.eq(InviteStatus::SignedUp))
                    .exec(&self.pool)
                    .await?;
                if moved.rows_affected > 0 {
                    log::info!("Invite {} activated by user {user_id}", invite.code);
                }
                self.ensure_chain(user_id, invite.inviter_id).await.map(Some)
            }
            InviteStatus::Activated => self.ensure_chain(user_id, invite.inviter_id).await.map(Some),
            InviteStatus::Pending | InviteStatus::Expired => Ok(None),
        }
    }

    async fn ensure_chain(&self, user_id: i64, inviter_id: i64) -> AppResult<UplineChain> {
        match load_chain(&self.pool, user_id).await? {
            Some(chain) => Ok(chain),
            None => self.chain_builder.build_chain(user_id, inviter_id).await,
        }
    }

    async fn expire_one(&self, invite_id: i64, now: DateTime<Utc>) -> AppResult<()> {
        self.expire_where(&self.pool, Some(invite_id), now).await.map(|_| ())
    }

    async fn expire_where<C: ConnectionTrait>(
        &self,
        conn: &C,
        invite_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut query = invites::Entity::update_many()
            .col_expr(invites::Column::Status, Expr::value(InviteStatus::Expired))
            .col_expr(invites::Column::ExpiredAt, Expr::value(Some(now)))
            .col_expr(invites::Column::UpdatedAt, Expr::value(Some(now)))
            .filter(
                invites::Column::Status.is_in([InviteStatus::Pending, InviteStatus::SignedUp]),
            )
            .filter(invites::Column::ExpiresAt.lte(now));
        if let Some(id) = invite_id {
            query = query.filter(invites::Column::Id.eq(id));
        }
        Ok(query.exec(conn).await?.rows_affected)
    }

    /// 过期未完成的邀请，返回处理条数
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let expired = self.expire_where(&self.pool, None, now).await?;
        if expired > 0 {
            log::info!("Expired {expired} stale invites");
        }
        Ok(expired)
    }

    /// 当前推荐码与分享链接，首次请求时生成推荐码
    pub async fn referral_link(&self, user_id: i64) -> AppResult<ReferralLinkResponse> {
        let user = self.find_user(user_id).await?;
        let code = match user.referral_code {
            Some(code) => code,
            None => {
                let candidate = generate_unique_referral_code(&self.pool).await?;
                users::Entity::update_many()
                    .col_expr(users::Column::ReferralCode, Expr::value(Some(candidate)))
                    .filter(users::Column::Id.eq(user_id))
                    .filter(users::Column::ReferralCode.is_null())
                    .exec(&self.pool)
                    .await?;
                // 并发生成时以先写入者为准
                self.find_user(user_id)
                    .await?
                    .referral_code
                    .ok_or_else(|| {
                        AppError::InternalError(format!("referral code of user {user_id} missing"))
                    })?
            }
        };

        Ok(ReferralLinkResponse {
            user_id,
            share_link: share_link(&self.settings.share_base_url, &code),
            referral_code: code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_link() {
        assert_eq!(
            share_link("https://wallet.example/join", "K7QX2M"),
            "https://wallet.example/join?ref=K7QX2M"
        );
    }

    #[test]
    fn test_settings_from_config() {
        let config = ReferralConfig {
            max_depth: 3,
            share_base_url: "https://wallet.example/join".into(),
            chain_trigger: ChainTrigger::Signup,
            invite_ttl_hours: 48,
            commission: crate::config::CommissionSchedule::from_lists("5,3,2", None).unwrap(),
        };
        let settings = InviteSettings::from(&config);
        assert_eq!(settings.ttl, Duration::hours(48));
        assert_eq!(settings.chain_trigger, ChainTrigger::Signup);
    }
}
