use crate::config::PayoutConfig;
use crate::entities::{
    BatchStatus, EarningStatus, earning_entity as earnings, payout_batch_entity as batches,
};
use crate::error::{AppError, AppResult};
use crate::models::{BatchResult, PayoutFailure};
use crate::services::StatsAggregator;
use crate::services::wallet::{Ledger, LedgerEntry, Wallet};
use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder,
    Set, TransactionTrait,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

pub fn batch_id_for(date: NaiveDate) -> String {
    format!("payout-{}", date.format("%Y-%m-%d"))
}

/// 只认领在 as_of 当天结束（UTC）之前产生的佣金
pub fn claim_cutoff(as_of: NaiveDate) -> DateTime<Utc> {
    as_of
        .checked_add_days(Days::new(1))
        .map(|next| Utc.from_utc_datetime(&next.and_time(NaiveTime::MIN)))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Claimed earnings grouped per earner, ordered by user id for stable processing.
pub fn group_by_earner(claimed: Vec<earnings::Model>) -> BTreeMap<i64, Vec<earnings::Model>> {
    let mut groups: BTreeMap<i64, Vec<earnings::Model>> = BTreeMap::new();
    for earning in claimed {
        groups.entry(earning.earner_id).or_default().push(earning);
    }
    groups
}

#[derive(Debug, Clone)]
pub struct PayoutSettings {
    pub timeout: std::time::Duration,
    pub stale_claim: chrono::Duration,
}

impl From<&PayoutConfig> for PayoutSettings {
    fn from(config: &PayoutConfig) -> Self {
        Self {
            timeout: std::time::Duration::from_secs(config.timeout_secs),
            stale_claim: chrono::Duration::seconds(config.stale_claim_secs),
        }
    }
}

#[derive(Debug, Default)]
struct RunOutcome {
    total_amount: i64,
    earnings_paid: i64,
    users_paid: i64,
    failures: Vec<PayoutFailure>,
}

enum OpenedBatch {
    AlreadyCompleted(batches::Model),
    /// 另一个运行仍持有该批次
    InProgress(batches::Model),
    Running,
}

/// 每日佣金发放。
///
/// 先用本次运行的随机令牌原子认领 pending 佣金，再逐个用户在独立事务里入账并翻转状态。
/// 单个用户失败只释放该用户的认领并记录原因，不影响其他用户。
#[derive(Clone)]
pub struct PayoutBatchProcessor {
    pool: DatabaseConnection,
    wallet: Arc<dyn Wallet>,
    ledger: Arc<dyn Ledger>,
    stats: StatsAggregator,
    settings: PayoutSettings,
}

impl PayoutBatchProcessor {
    pub fn new(
        pool: DatabaseConnection,
        wallet: Arc<dyn Wallet>,
        ledger: Arc<dyn Ledger>,
        stats: StatsAggregator,
        settings: PayoutSettings,
    ) -> Self {
        Self {
            pool,
            wallet,
            ledger,
            stats,
            settings,
        }
    }

    pub async fn run_daily_batch(&self, as_of: NaiveDate) -> AppResult<BatchResult> {
        let batch_id = batch_id_for(as_of);
        let claim_token = Uuid::new_v4().to_string();

        match tokio::time::timeout(
            self.settings.timeout,
            self.run(as_of, &batch_id, &claim_token),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                let reason = format!(
                    "payout batch {batch_id} exceeded {:?}",
                    self.settings.timeout
                );
                log::error!("{reason}");
                if let Err(e) = self.release_claims(&claim_token, None).await {
                    log::error!("Failed to release claims of timed out batch {batch_id}: {e:?}");
                }
                if let Err(e) = self.mark_failed(&batch_id, &reason).await {
                    log::error!("Failed to mark batch {batch_id} as failed: {e:?}");
                }
                Err(AppError::Timeout(reason))
            }
        }
    }

    pub async fn get_batch(&self, as_of: NaiveDate) -> AppResult<Option<BatchResult>> {
        Ok(batches::Entity::find_by_id(batch_id_for(as_of))
            .one(&self.pool)
            .await?
            .map(BatchResult::from))
    }

    async fn run(&self, as_of: NaiveDate, batch_id: &str, claim_token: &str) -> AppResult<BatchResult> {
        let started = Utc::now();

        let opened = match self.open_batch(as_of, batch_id, started).await {
            Ok(opened) => opened,
            Err(e) => {
                // 批次行都没建起来时 mark_failed 也会是空操作
                if let Err(mark_err) = self.mark_failed(batch_id, &e.to_string()).await {
                    log::error!("Failed to mark batch {batch_id} as failed: {mark_err:?}");
                }
                return Err(e);
            }
        };
        match opened {
            OpenedBatch::AlreadyCompleted(model) => {
                log::info!("Payout batch {batch_id} already completed, nothing to do");
                return Ok(model.into());
            }
            OpenedBatch::InProgress(model) => {
                log::info!("Payout batch {batch_id} is being processed by another run");
                return Ok(model.into());
            }
            OpenedBatch::Running => {}
        }
        log::info!("Payout batch {batch_id} started (claim {claim_token})");

        let claimed = match self.claim(as_of, batch_id, claim_token, started).await {
            Ok(claimed) => claimed,
            Err(e) => {
                log::error!("Payout batch {batch_id} failed during claim: {e:?}");
                if let Err(release_err) = self.release_claims(claim_token, None).await {
                    log::error!("Failed to release claims of batch {batch_id}: {release_err:?}");
                }
                if let Err(mark_err) = self.mark_failed(batch_id, &e.to_string()).await {
                    log::error!("Failed to mark batch {batch_id} as failed: {mark_err:?}");
                }
                return Err(e);
            }
        };

        let mut outcome = RunOutcome::default();
        for (user_id, items) in group_by_earner(claimed) {
            let amount: i64 = items.iter().map(|e| e.amount_minor_units).sum();
            match self.pay_earner(batch_id, claim_token, user_id, &items).await {
                Ok(()) => {
                    outcome.total_amount += amount;
                    outcome.earnings_paid += items.len() as i64;
                    outcome.users_paid += 1;
                }
                Err(e) => {
                    log::error!("Payout of {amount} to user {user_id} in batch {batch_id} failed: {e}");
                    if let Err(release_err) = self.release_claims(claim_token, Some(user_id)).await {
                        // 认领会在过期后由下次运行释放
                        log::error!(
                            "Failed to release claims of user {user_id} in batch {batch_id}: {release_err:?}"
                        );
                    }
                    let failure = PayoutFailure {
                        user_id,
                        reason: e.to_string(),
                        earning_count: items.len(),
                        amount,
                    };
                    if let Err(record_err) = self.record_failure(batch_id, &failure).await {
                        log::error!(
                            "Failed to record payout failure of user {user_id} in batch {batch_id}: {record_err:?}"
                        );
                    }
                    outcome.failures.push(failure);
                }
            }
        }

        self.finalize(batch_id, outcome).await
    }

    /// 建立或恢复当天批次；已完成的批次原样返回。
    ///
    /// `processing` 状态的批次只有在新建（run_count 为 0）或最近更新早于遗留认领时限时才会被接管，
    /// 正在运行的批次不会被第二个调用方提前标记完成。
    async fn open_batch(
        &self,
        as_of: NaiveDate,
        batch_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<OpenedBatch> {
        batches::Entity::insert(batches::ActiveModel {
            batch_id: Set(batch_id.to_string()),
            as_of_date: Set(as_of),
            status: Set(BatchStatus::Processing),
            total_amount: Set(0),
            earnings_paid: Set(0),
            users_paid: Set(0),
            users_failed: Set(0),
            failed_users: Set(json!([])),
            last_error: Set(None),
            run_count: Set(0),
            started_at: Set(now),
            finished_at: Set(None),
            updated_at: Set(Some(now)),
        })
        .on_conflict(
            OnConflict::column(batches::Column::BatchId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&self.pool)
        .await?;

        // 失败列表只反映本次运行，金额与计数跨运行累加
        let resumed = batches::Entity::update_many()
            .col_expr(batches::Column::Status, Expr::value(BatchStatus::Processing))
            .col_expr(
                batches::Column::RunCount,
                Expr::col(batches::Column::RunCount).add(1),
            )
            .col_expr(batches::Column::UsersFailed, Expr::value(0i64))
            .col_expr(batches::Column::FailedUsers, Expr::value(json!([])))
            .col_expr(batches::Column::UpdatedAt, Expr::value(now))
            .filter(batches::Column::BatchId.eq(batch_id))
            .filter(batches::Column::Status.ne(BatchStatus::Completed))
            .filter(
                Condition::any()
                    .add(batches::Column::Status.ne(BatchStatus::Processing))
                    .add(batches::Column::RunCount.eq(0))
                    .add(batches::Column::UpdatedAt.lt(now - self.settings.stale_claim)),
            )
            .exec(&self.pool)
            .await?;
        if resumed.rows_affected > 0 {
            return Ok(OpenedBatch::Running);
        }

        let model = batches::Entity::find_by_id(batch_id.to_string())
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::InternalError(format!("payout batch {batch_id} missing")))?;
        if model.status == BatchStatus::Completed {
            Ok(OpenedBatch::AlreadyCompleted(model))
        } else {
            Ok(OpenedBatch::InProgress(model))
        }
    }

    /// 认领步骤：先释放遗留认领，再用一条条件 UPDATE 把未认领的 pending 佣金标记为本次运行所有
    async fn claim(
        &self,
        as_of: NaiveDate,
        batch_id: &str,
        claim_token: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<earnings::Model>> {
        let stale_before = now - self.settings.stale_claim;
        let released = earnings::Entity::update_many()
            .set(earnings::ActiveModel {
                claim_token: Set(None),
                claimed_batch_id: Set(None),
                claimed_at: Set(None),
                ..Default::default()
            })
            .filter(earnings::Column::Status.eq(EarningStatus::Pending))
            .filter(earnings::Column::ClaimToken.is_not_null())
            .filter(earnings::Column::ClaimedAt.lt(stale_before))
            .exec(&self.pool)
            .await?;
        if released.rows_affected > 0 {
            log::warn!(
                "Released {} stale earning claims before batch {batch_id}",
                released.rows_affected
            );
        }

        let claimed = earnings::Entity::update_many()
            .set(earnings::ActiveModel {
                claim_token: Set(Some(claim_token.to_string())),
                claimed_batch_id: Set(Some(batch_id.to_string())),
                claimed_at: Set(Some(now)),
                ..Default::default()
            })
            .filter(earnings::Column::Status.eq(EarningStatus::Pending))
            .filter(earnings::Column::ClaimToken.is_null())
            .filter(earnings::Column::CreatedAt.lt(claim_cutoff(as_of)))
            .exec(&self.pool)
            .await?;
        log::info!(
            "Batch {batch_id} claimed {} pending earnings",
            claimed.rows_affected
        );

        Ok(earnings::Entity::find()
            .filter(earnings::Column::ClaimToken.eq(claim_token))
            .filter(earnings::Column::Status.eq(EarningStatus::Pending))
            .order_by_asc(earnings::Column::EarnerId)
            .order_by_asc(earnings::Column::Id)
            .all(&self.pool)
            .await?)
    }

    /// 单个用户的入账单元，整体提交或整体回滚
    async fn pay_earner(
        &self,
        batch_id: &str,
        claim_token: &str,
        user_id: i64,
        items: &[earnings::Model],
    ) -> AppResult<()> {
        let txn = self.pool.begin().await?;
        match self
            .settle_earner(&txn, batch_id, claim_token, user_id, items)
            .await
        {
            Ok(()) => {
                txn.commit().await?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    log::error!("Rollback for user {user_id} in batch {batch_id} failed: {rollback_err:?}");
                }
                Err(e)
            }
        }
    }

    async fn settle_earner(
        &self,
        txn: &DatabaseTransaction,
        batch_id: &str,
        claim_token: &str,
        user_id: i64,
        items: &[earnings::Model],
    ) -> AppResult<()> {
        let now = Utc::now();
        let ids: Vec<i64> = items.iter().map(|e| e.id).collect();
        let amount: i64 = items.iter().map(|e| e.amount_minor_units).sum();

        // CAS：只有仍被本次运行认领的 pending 记录才会被翻转
        let flipped = earnings::Entity::update_many()
            .set(earnings::ActiveModel {
                status: Set(EarningStatus::Paid),
                paid_batch_id: Set(Some(batch_id.to_string())),
                paid_at: Set(Some(now)),
                ..Default::default()
            })
            .filter(earnings::Column::Id.is_in(ids.clone()))
            .filter(earnings::Column::Status.eq(EarningStatus::Pending))
            .filter(earnings::Column::ClaimToken.eq(claim_token))
            .exec(txn)
            .await?;
        if flipped.rows_affected != ids.len() as u64 {
            return Err(AppError::InternalError(format!(
                "claim lost for user {user_id}: expected {} earnings, flipped {}",
                ids.len(),
                flipped.rows_affected
            )));
        }

        self.wallet
            .credit(
                txn,
                user_id,
                amount,
                "Referral earnings payout",
                json!({ "batch_id": batch_id, "earning_ids": ids }),
            )
            .await?;

        self.ledger
            .record(
                txn,
                LedgerEntry {
                    user_id,
                    batch_id: batch_id.to_string(),
                    amount,
                    earning_ids: ids,
                    description: format!("Referral earnings payout {batch_id}"),
                },
            )
            .await?;

        self.stats.record_payout(txn, user_id, amount, now).await?;

        // 批次汇总与入账同一事务提交，运行中断也不会丢失已发放的部分
        batches::Entity::update_many()
            .col_expr(
                batches::Column::TotalAmount,
                Expr::col(batches::Column::TotalAmount).add(amount),
            )
            .col_expr(
                batches::Column::EarningsPaid,
                Expr::col(batches::Column::EarningsPaid).add(items.len() as i64),
            )
            .col_expr(
                batches::Column::UsersPaid,
                Expr::col(batches::Column::UsersPaid).add(1i64),
            )
            .col_expr(batches::Column::UpdatedAt, Expr::value(now))
            .filter(batches::Column::BatchId.eq(batch_id))
            .exec(txn)
            .await?;
        Ok(())
    }

    /// 立即把失败写入批次，超时中断的运行也保留失败原因
    async fn record_failure(&self, batch_id: &str, failure: &PayoutFailure) -> AppResult<()> {
        let Some(batch) = batches::Entity::find_by_id(batch_id.to_string())
            .one(&self.pool)
            .await?
        else {
            return Err(AppError::InternalError(format!("payout batch {batch_id} missing")));
        };
        let mut failures: Vec<PayoutFailure> =
            serde_json::from_value(batch.failed_users).unwrap_or_default();
        failures.push(failure.clone());

        batches::Entity::update_many()
            .col_expr(batches::Column::UsersFailed, Expr::value(failures.len() as i64))
            .col_expr(
                batches::Column::FailedUsers,
                Expr::value(serde_json::to_value(&failures)?),
            )
            .col_expr(batches::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(batches::Column::BatchId.eq(batch_id))
            .exec(&self.pool)
            .await?;
        Ok(())
    }

    /// 把认领还给 pending；`user_id` 为 None 时释放本次运行的全部认领
    async fn release_claims(&self, claim_token: &str, user_id: Option<i64>) -> AppResult<u64> {
        let mut query = earnings::Entity::update_many()
            .set(earnings::ActiveModel {
                claim_token: Set(None),
                claimed_batch_id: Set(None),
                claimed_at: Set(None),
                ..Default::default()
            })
            .filter(earnings::Column::ClaimToken.eq(claim_token))
            .filter(earnings::Column::Status.eq(EarningStatus::Pending));
        if let Some(user_id) = user_id {
            query = query.filter(earnings::Column::EarnerId.eq(user_id));
        }
        Ok(query.exec(&self.pool).await?.rows_affected)
    }

    async fn finalize(&self, batch_id: &str, outcome: RunOutcome) -> AppResult<BatchResult> {
        let now = Utc::now();

        // 金额与失败已在处理每个用户时写入
        batches::Entity::update_many()
            .col_expr(batches::Column::Status, Expr::value(BatchStatus::Completed))
            .col_expr(batches::Column::LastError, Expr::value(Option::<String>::None))
            .col_expr(batches::Column::FinishedAt, Expr::value(now))
            .col_expr(batches::Column::UpdatedAt, Expr::value(now))
            .filter(batches::Column::BatchId.eq(batch_id))
            .exec(&self.pool)
            .await?;

        log::info!(
            "Payout batch {batch_id} run completed: paid {} to {} users ({} earnings), {} failed",
            outcome.total_amount,
            outcome.users_paid,
            outcome.earnings_paid,
            outcome.failures.len()
        );

        batches::Entity::find_by_id(batch_id.to_string())
            .one(&self.pool)
            .await?
            .map(BatchResult::from)
            .ok_or_else(|| AppError::InternalError(format!("payout batch {batch_id} missing")))
    }

    async fn mark_failed(&self, batch_id: &str, reason: &str) -> AppResult<()> {
        let now = Utc::now();
        batches::Entity::update_many()
            .col_expr(batches::Column::Status, Expr::value(BatchStatus::Failed))
            .col_expr(batches::Column::LastError, Expr::value(Some(reason.to_string())))
            .col_expr(batches::Column::FinishedAt, Expr::value(now))
            .col_expr(batches::Column::UpdatedAt, Expr::value(now))
            .filter(batches::Column::BatchId.eq(batch_id))
            .filter(batches::Column::Status.ne(BatchStatus::Completed))
            .exec(&self.pool)
            .await?;
        Ok(())
    }
}
