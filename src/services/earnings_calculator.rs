use crate::config::CommissionSchedule;
use crate::database::sum_as_bigint;
use crate::entities::{EarningStatus, earning_entity as earnings, user_stat_entity as stats};
use crate::error::{AppError, AppResult};
use crate::models::RevenueTransaction;
use crate::services::StatsAggregator;
use crate::services::chain_builder::load_chain;
use crate::utils::{month_key, percentage_of};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QuerySelect, Set, TransactionTrait,
};
use std::sync::Arc;

/// 单层佣金的最终金额
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelAmount {
    pub amount: i64,
    /// 是否被月度上限截断
    pub capped: bool,
    /// 金额被截断时保留的原始值
    pub original_amount: Option<i64>,
}

/// Applies the monthly cap and the transaction's remaining revenue to a raw amount.
///
/// Returns `None` when nothing should be written for the level.
pub fn plan_level_amount(
    raw: i64,
    monthly_cap: Option<i64>,
    accumulated_this_month: i64,
    remaining_revenue: i64,
) -> Option<LevelAmount> {
    if raw <= 0 || remaining_revenue <= 0 {
        return None;
    }

    let mut amount = raw;
    let mut capped = false;
    if let Some(cap) = monthly_cap {
        let room = (cap - accumulated_this_month).max(0);
        if room == 0 {
            return None;
        }
        if raw > room {
            amount = room;
            capped = true;
        }
    }
    // 各层分配总额不能超过交易净收入
    amount = amount.min(remaining_revenue);

    Some(LevelAmount {
        amount,
        capped,
        original_amount: (amount < raw).then_some(raw),
    })
}

/// 百分比至少保留两位小数存储
fn percentage_text(percentage: Decimal) -> String {
    let mut p = percentage;
    if p.scale() < 2 {
        p.rescale(2);
    }
    p.to_string()
}

#[derive(Clone)]
pub struct EarningsCalculator {
    pool: DatabaseConnection,
    schedule: Arc<CommissionSchedule>,
    stats: StatsAggregator,
}

impl EarningsCalculator {
    pub fn new(
        pool: DatabaseConnection,
        schedule: Arc<CommissionSchedule>,
        stats: StatsAggregator,
    ) -> Self {
        Self {
            pool,
            schedule,
            stats,
        }
    }

    /// 把一笔已完成交易转换成沿上级链分配的佣金记录。
    ///
    /// 返回本次新建的记录；低于门槛、无链、或已计算过的交易返回空列表且不写库。
    /// 佣金记录与统计计数在同一个事务中提交。
    pub async fn calculate(&self, tx: &RevenueTransaction) -> AppResult<Vec<earnings::Model>> {
        if tx.id.trim().is_empty() {
            return Err(AppError::ValidationError("transaction id is empty".into()));
        }
        if tx.net_revenue_minor_units < 0 {
            return Err(AppError::ValidationError(format!(
                "transaction {} has negative revenue {}",
                tx.id, tx.net_revenue_minor_units
            )));
        }
        if tx.net_revenue_minor_units < self.schedule.min_revenue_minor_units {
            log::debug!(
                "Transaction {} below revenue floor ({} < {})",
                tx.id,
                tx.net_revenue_minor_units,
                self.schedule.min_revenue_minor_units
            );
            return Ok(Vec::new());
        }
        if !self.schedule.is_eligible_type(&tx.transaction_type) {
            log::debug!(
                "Transaction {} of type {} is not commissionable",
                tx.id,
                tx.transaction_type
            );
            return Ok(Vec::new());
        }

        let already = earnings::Entity::find()
            .filter(earnings::Column::SourceTransactionId.eq(tx.id.as_str()))
            .count(&self.pool)
            .await?;
        if already > 0 {
            log::info!("Earnings for transaction {} already exist, skipping", tx.id);
            return Ok(Vec::new());
        }

        let txn = self.pool.begin().await?;

        let chain = match load_chain(&txn, tx.source_user_id).await? {
            Some(chain) if chain.depth() > 0 => chain,
            _ => {
                txn.commit().await?;
                return Ok(Vec::new());
            }
        };

        let now = Utc::now();
        let month = month_key(now);
        let mut remaining = tx.net_revenue_minor_units;
        let mut created = Vec::new();

        for depth in 1..=chain.depth() {
            let Some(earner_id) = chain.ancestor_at(depth) else {
                break;
            };
            let level = depth as i32;
            let Some(rule) = self.schedule.rule_for(level as u32) else {
                continue;
            };
            if rule.percentage.is_zero() {
                continue;
            }

            let raw = percentage_of(tx.net_revenue_minor_units, rule.percentage).ok_or_else(|| {
                AppError::InternalError(format!(
                    "commission overflow for transaction {} level {level}",
                    tx.id
                ))
            })?;

            let accumulated = match rule.monthly_cap_minor_units {
                Some(_) => self.accumulated_locked(&txn, earner_id, level, &month).await?,
                None => 0,
            };

            let Some(plan) =
                plan_level_amount(raw, rule.monthly_cap_minor_units, accumulated, remaining)
            else {
                log::debug!(
                    "No earning for user {earner_id} level {level} on transaction {} (raw {raw}, accumulated {accumulated})",
                    tx.id
                );
                continue;
            };

            let inserted = earnings::Entity::insert(earnings::ActiveModel {
                earner_id: Set(earner_id),
                source_transaction_id: Set(tx.id.clone()),
                source_user_id: Set(tx.source_user_id),
                transaction_type: Set(tx.transaction_type.clone()),
                level: Set(level),
                percentage: Set(percentage_text(rule.percentage)),
                revenue_minor_units: Set(tx.net_revenue_minor_units),
                amount_minor_units: Set(plan.amount),
                capped: Set(plan.capped),
                original_amount_minor_units: Set(plan.original_amount),
                status: Set(EarningStatus::Pending),
                month_key: Set(month.clone()),
                claim_token: Set(None),
                claimed_batch_id: Set(None),
                claimed_at: Set(None),
                paid_batch_id: Set(None),
                paid_at: Set(None),
                created_at: Set(now),
                ..Default::default()
            })
            .on_conflict(
                OnConflict::columns([
                    earnings::Column::SourceTransactionId,
                    earnings::Column::Level,
                    earnings::Column::EarnerId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;
            if inserted == 0 {
                // 并发投递的同一交易
                continue;
            }

            let earning = earnings::Entity::find()
                .filter(earnings::Column::SourceTransactionId.eq(tx.id.as_str()))
                .filter(earnings::Column::Level.eq(level))
                .filter(earnings::Column::EarnerId.eq(earner_id))
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    AppError::InternalError(format!(
                        "earning for transaction {} level {level} missing after insert",
                        tx.id
                    ))
                })?;

            self.stats.record_earning(&txn, &earning).await?;
            remaining -= earning.amount_minor_units;
            created.push(earning);
        }

        txn.commit().await?;

        if !created.is_empty() {
            log::info!(
                "Created {} earnings for transaction {} (revenue {}, distributed {})",
                created.len(),
                tx.id,
                tx.net_revenue_minor_units,
                tx.net_revenue_minor_units - remaining
            );
        }
        Ok(created)
    }

    /// 计算失败不能影响支付流程：记录日志后返回空列表
    pub async fn calculate_or_skip(&self, tx: &RevenueTransaction) -> Vec<earnings::Model> {
        match self.calculate(tx).await {
            Ok(created) => created,
            Err(e) => {
                log::error!("Earning calculation skipped for transaction {}: {e}", tx.id);
                Vec::new()
            }
        }
    }

    /// Month-to-date amount for (earner, level), read while holding the earner's stats row lock
    /// so concurrent transactions for the same earner see each other's writes.
    async fn accumulated_locked<C: ConnectionTrait>(
        &self,
        conn: &C,
        earner_id: i64,
        level: i32,
        month: &str,
    ) -> AppResult<i64> {
        self.stats.ensure_current(conn, earner_id, month).await?;
        stats::Entity::find_by_id(earner_id)
            .lock_exclusive()
            .one(conn)
            .await?;

        let total = earnings::Entity::find()
            .select_only()
            .column_as(sum_as_bigint(earnings::Column::AmountMinorUnits), "total")
            .filter(earnings::Column::EarnerId.eq(earner_id))
            .filter(earnings::Column::Level.eq(level))
            .filter(earnings::Column::MonthKey.eq(month))
            .into_tuple::<i64>()
            .one(conn)
            .await?;
        Ok(total.unwrap_or(0))
    }
}
