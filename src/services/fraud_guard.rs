use crate::config::{FraudGuardConfig, FraudGuardMode};
use crate::entities::{KycTier, invite_entity as invites, user_entity as users};
use crate::error::{AppResult, IneligibilityReason};
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};

/// 邀请资格阈值
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FraudPolicy {
    pub min_account_age: Duration,
    pub max_invites_per_day: u64,
    pub max_invites_per_month: u64,
}

/// Injected gate policy. `Bypass` exists for non-production environments only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardPolicy {
    Enforce(FraudPolicy),
    Bypass,
}

impl From<&FraudGuardConfig> for GuardPolicy {
    fn from(config: &FraudGuardConfig) -> Self {
        match config.mode {
            FraudGuardMode::Bypass => GuardPolicy::Bypass,
            FraudGuardMode::Enforce => GuardPolicy::Enforce(FraudPolicy {
                min_account_age: Duration::days(config.min_account_age_days),
                max_invites_per_day: config.max_invites_per_day,
                max_invites_per_month: config.max_invites_per_month,
            }),
        }
    }
}

/// Facts about the requester gathered before evaluating the policy.
#[derive(Debug, Clone)]
pub struct InviteActivity {
    pub kyc_tier: KycTier,
    pub account_created_at: DateTime<Utc>,
    pub invites_today: u64,
    pub invites_this_month: u64,
    pub already_invited_target: bool,
}

impl FraudPolicy {
    /// 按固定顺序检查，返回第一条不满足的原因
    pub fn evaluate(
        &self,
        activity: &InviteActivity,
        now: DateTime<Utc>,
    ) -> Result<(), IneligibilityReason> {
        if activity.kyc_tier != KycTier::Verified {
            return Err(IneligibilityReason::KycNotVerified);
        }
        if now - activity.account_created_at < self.min_account_age {
            return Err(IneligibilityReason::AccountTooNew);
        }
        if activity.invites_today >= self.max_invites_per_day {
            return Err(IneligibilityReason::DailyInviteLimitReached);
        }
        if activity.invites_this_month >= self.max_invites_per_month {
            return Err(IneligibilityReason::MonthlyInviteLimitReached);
        }
        if activity.already_invited_target {
            return Err(IneligibilityReason::AlreadyInvited);
        }
        Ok(())
    }
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(&now.date_naive().and_time(chrono::NaiveTime::MIN))
}

fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    let first = NaiveDate::from_ymd_opt(now.year(), now.month(), 1).unwrap_or(now.date_naive());
    Utc.from_utc_datetime(&first.and_time(chrono::NaiveTime::MIN))
}

#[derive(Clone)]
pub struct FraudGuard {
    pool: DatabaseConnection,
    policy: GuardPolicy,
}

impl FraudGuard {
    pub fn new(pool: DatabaseConnection, policy: GuardPolicy) -> Self {
        Self { pool, policy }
    }

    /// 发送邀请前的同步检查
    pub async fn check_invite(
        &self,
        requester: &users::Model,
        target_phone: &str,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let policy = match &self.policy {
            GuardPolicy::Bypass => {
                log::debug!("Fraud guard bypassed for requester {}", requester.id);
                return Ok(());
            }
            GuardPolicy::Enforce(policy) => policy,
        };

        let invites_today = invites::Entity::find()
            .filter(invites::Column::InviterId.eq(requester.id))
            .filter(invites::Column::CreatedAt.gte(start_of_day(now)))
            .count(&self.pool)
            .await?;
        let invites_this_month = invites::Entity::find()
            .filter(invites::Column::InviterId.eq(requester.id))
            .filter(invites::Column::CreatedAt.gte(start_of_month(now)))
            .count(&self.pool)
            .await?;
        let already_invited_target = invites::Entity::find()
            .filter(invites::Column::InviterId.eq(requester.id))
            .filter(invites::Column::InviteePhone.eq(target_phone))
            .count(&self.pool)
            .await?
            > 0;

        let activity = InviteActivity {
            kyc_tier: requester.kyc_tier,
            account_created_at: requester.created_at,
            invites_today,
            invites_this_month,
            already_invited_target,
        };

        policy.evaluate(&activity, now).map_err(|reason| {
            log::info!("Invite rejected for requester {}: {reason}", requester.id);
            reason.into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> FraudPolicy {
        FraudPolicy {
            min_account_age: Duration::days(7),
            max_invites_per_day: 3,
            max_invites_per_month: 10,
        }
    }

    fn eligible(now: DateTime<Utc>) -> InviteActivity {
        InviteActivity {
            kyc_tier: KycTier::Verified,
            account_created_at: now - Duration::days(30),
            invites_today: 0,
            invites_this_month: 0,
            already_invited_target: false,
        }
    }

    #[test]
    fn test_eligible_requester_passes() {
        let now = Utc::now();
        assert_eq!(policy().evaluate(&eligible(now), now), Ok(()));
    }

    #[test]
    fn test_each_check_has_its_own_reason() {
        let now = Utc::now();
        let p = policy();

        let mut a = eligible(now);
        a.kyc_tier = KycTier::Basic;
        assert_eq!(p.evaluate(&a, now), Err(IneligibilityReason::KycNotVerified));

        let mut a = eligible(now);
        a.account_created_at = now - Duration::days(2);
        assert_eq!(p.evaluate(&a, now), Err(IneligibilityReason::AccountTooNew));

        let mut a = eligible(now);
        a.invites_today = 3;
        assert_eq!(
            p.evaluate(&a, now),
            Err(IneligibilityReason::DailyInviteLimitReached)
        );

        let mut a = eligible(now);
        a.invites_this_month = 10;
        assert_eq!(
            p.evaluate(&a, now),
            Err(IneligibilityReason::MonthlyInviteLimitReached)
        );

        let mut a = eligible(now);
        a.already_invited_target = true;
        assert_eq!(p.evaluate(&a, now), Err(IneligibilityReason::AlreadyInvited));
    }

    #[test]
    fn test_policy_from_config() {
        let mut config = FraudGuardConfig::default();
        assert!(matches!(GuardPolicy::from(&config), GuardPolicy::Enforce(_)));
        config.mode = FraudGuardMode::Bypass;
        assert_eq!(GuardPolicy::from(&config), GuardPolicy::Bypass);
    }

    #[test]
    fn test_window_starts() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 15, 30, 0).unwrap();
        assert_eq!(
            start_of_day(now),
            Utc.with_ymd_and_hms(2026, 10, 18, 0, 0, 0).unwrap()
        );
        assert_eq!(
            start_of_month(now),
            Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap()
        );
    }
}
