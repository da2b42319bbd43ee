#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use migration::{Migrator, MigratorTrait};
use referral_backend::config::{ChainTrigger, CommissionSchedule, PayoutConfig};
use referral_backend::entities::{KycTier, user_entity as users};
use referral_backend::error::{AppError, AppResult};
use referral_backend::external::InviteNotifier;
use referral_backend::models::RevenueTransaction;
use referral_backend::services::*;
use sea_orm::{
    ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, DatabaseTransaction, Set,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static PHONE_SEQ: AtomicU64 = AtomicU64::new(1);

/// 单连接的内存 SQLite，跑完整迁移
pub async fn setup_db() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:".to_string());
    opt.max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(opt).await.expect("connect sqlite");
    Migrator::up(&db, None).await.expect("run migrations");
    db
}

pub fn next_phone() -> String {
    let n = PHONE_SEQ.fetch_add(1, Ordering::SeqCst);
    format!("+1555{:07}", n)
}

pub async fn create_user_with(
    db: &DatabaseConnection,
    phone: &str,
    kyc_tier: KycTier,
    age_days: i64,
) -> users::Model {
    let now = Utc::now();
    users::ActiveModel {
        phone: Set(phone.to_string()),
        username: Set(format!("user{}", &phone[phone.len() - 4..])),
        kyc_tier: Set(kyc_tier),
        referral_code: Set(None),
        referrer_id: Set(None),
        balance: Set(0),
        created_at: Set(now - Duration::days(age_days)),
        updated_at: Set(Some(now)),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert user")
}

/// 已认证、注册满 30 天的用户
pub async fn create_user(db: &DatabaseConnection) -> users::Model {
    create_user_with(db, &next_phone(), KycTier::Verified, 30).await
}

pub fn schedule(percentages: &str, caps: Option<&str>) -> CommissionSchedule {
    CommissionSchedule::from_lists(percentages, caps).expect("valid schedule")
}

pub fn revenue_tx(id: &str, source_user_id: i64, revenue: i64) -> RevenueTransaction {
    RevenueTransaction {
        id: id.to_string(),
        source_user_id,
        net_revenue_minor_units: revenue,
        transaction_type: "transfer".to_string(),
    }
}

pub struct Harness {
    pub db: DatabaseConnection,
    pub stats: StatsAggregator,
    pub chains: ChainBuilder,
    pub calculator: EarningsCalculator,
}

impl Harness {
    pub async fn new(schedule: CommissionSchedule, max_depth: usize) -> Self {
        let db = setup_db().await;
        let stats = StatsAggregator::new(db.clone());
        let chains = ChainBuilder::new(db.clone(), stats.clone(), max_depth);
        let calculator = EarningsCalculator::new(db.clone(), Arc::new(schedule), stats.clone());
        Self {
            db,
            stats,
            chains,
            calculator,
        }
    }

    /// 依次邀请：users[i] 由 users[i-1] 邀请
    pub async fn referral_line(&self, len: usize) -> Vec<users::Model> {
        let mut line: Vec<users::Model> = Vec::with_capacity(len);
        for _ in 0..len {
            let user = create_user(&self.db).await;
            if let Some(inviter) = line.last() {
                self.chains
                    .build_chain(user.id, inviter.id)
                    .await
                    .expect("build chain");
            }
            line.push(user);
        }
        line
    }

    pub fn processor(&self, wallet: Arc<dyn Wallet>) -> PayoutBatchProcessor {
        self.processor_with(
            wallet,
            Arc::new(DbLedger),
            PayoutSettings::from(&PayoutConfig::default()),
        )
    }

    pub fn processor_with(
        &self,
        wallet: Arc<dyn Wallet>,
        ledger: Arc<dyn Ledger>,
        settings: PayoutSettings,
    ) -> PayoutBatchProcessor {
        PayoutBatchProcessor::new(self.db.clone(), wallet, ledger, self.stats.clone(), settings)
    }

    pub fn invite_service(
        &self,
        policy: GuardPolicy,
        trigger: ChainTrigger,
        notifier: Arc<dyn InviteNotifier>,
    ) -> InviteService {
        InviteService::new(
            self.db.clone(),
            FraudGuard::new(self.db.clone(), policy),
            self.chains.clone(),
            notifier,
            InviteSettings {
                ttl: Duration::hours(72),
                chain_trigger: trigger,
                share_base_url: "https://wallet.example/join".to_string(),
            },
        )
    }
}

/// 对指定用户入账失败，其余委托给 BalanceWallet
pub struct FlakyWallet {
    inner: BalanceWallet,
    failing: HashSet<i64>,
}

impl FlakyWallet {
    pub fn failing_for(users: &[i64]) -> Self {
        Self {
            inner: BalanceWallet,
            failing: users.iter().copied().collect(),
        }
    }
}

#[async_trait]
impl Wallet for FlakyWallet {
    async fn credit(
        &self,
        txn: &DatabaseTransaction,
        user_id: i64,
        amount: i64,
        reason: &str,
        metadata: serde_json::Value,
    ) -> AppResult<i64> {
        if self.failing.contains(&user_id) {
            return Err(AppError::ExternalApiError("wallet service unavailable".into()));
        }
        self.inner
            .credit(txn, user_id, amount, reason, metadata)
            .await
    }
}

/// 对指定用户入账前先等待，用于制造超时
pub struct SlowWallet {
    inner: BalanceWallet,
    slow: HashSet<i64>,
    delay: std::time::Duration,
}

impl SlowWallet {
    pub fn slow_for(users: &[i64], delay: std::time::Duration) -> Self {
        Self {
            inner: BalanceWallet,
            slow: users.iter().copied().collect(),
            delay,
        }
    }
}

#[async_trait]
impl Wallet for SlowWallet {
    async fn credit(
        &self,
        txn: &DatabaseTransaction,
        user_id: i64,
        amount: i64,
        reason: &str,
        metadata: serde_json::Value,
    ) -> AppResult<i64> {
        if self.slow.contains(&user_id) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner
            .credit(txn, user_id, amount, reason, metadata)
            .await
    }
}

/// 对指定用户写账本失败，其余委托给 DbLedger
pub struct FlakyLedger {
    inner: DbLedger,
    failing: HashSet<i64>,
}

impl FlakyLedger {
    pub fn failing_for(users: &[i64]) -> Self {
        Self {
            inner: DbLedger,
            failing: users.iter().copied().collect(),
        }
    }
}

#[async_trait]
impl Ledger for FlakyLedger {
    async fn record(&self, txn: &DatabaseTransaction, entry: LedgerEntry) -> AppResult<i64> {
        if self.failing.contains(&entry.user_id) {
            return Err(AppError::ExternalApiError("ledger service unavailable".into()));
        }
        self.inner.record(txn, entry).await
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl InviteNotifier for RecordingNotifier {
    async fn send_invite(&self, phone: &str, _inviter_name: &str, link: &str) -> AppResult<()> {
        self.sent
            .lock()
            .expect("notifier lock")
            .push((phone.to_string(), link.to_string()));
        Ok(())
    }
}

pub struct FailingNotifier;

#[async_trait]
impl InviteNotifier for FailingNotifier {
    async fn send_invite(&self, _phone: &str, _inviter_name: &str, _link: &str) -> AppResult<()> {
        Err(AppError::ExternalApiError("sms gateway down".into()))
    }
}
