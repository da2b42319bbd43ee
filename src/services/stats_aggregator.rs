use crate::entities::{
    earning_entity as earnings, user_level_stat_entity as level_stats, user_stat_entity as stats,
};
use crate::error::AppResult;
use crate::models::{LevelStatsResponse, UserStatsResponse};
use crate::utils::month_key;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

/// 维护仪表盘用的滚动计数。
///
/// 所有写方法都接受任意连接（含事务），调用方决定是否与业务写入放在同一个事务里。
/// 当月字段在读写时发现月份键变化就清零一次，不需要单独的定时任务。
#[derive(Clone)]
pub struct StatsAggregator {
    pool: DatabaseConnection,
}

impl StatsAggregator {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }

    /// Creates the stats row if missing and lazily resets the month fields.
    pub async fn ensure_current<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: i64,
        month: &str,
    ) -> AppResult<()> {
        stats::Entity::insert(stats::ActiveModel {
            user_id: Set(user_id),
            total_earned: Set(0),
            total_paid: Set(0),
            pending_amount: Set(0),
            earnings_count: Set(0),
            month_key: Set(month.to_string()),
            month_earned: Set(0),
            month_paid: Set(0),
            updated_at: Set(Some(Utc::now())),
        })
        .on_conflict(
            OnConflict::column(stats::Column::UserId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;

        // 单条 UPDATE 带月份条件，并发下也只会清零一次
        let reset = stats::Entity::update_many()
            .col_expr(stats::Column::MonthKey, Expr::value(month.to_string()))
            .col_expr(stats::Column::MonthEarned, Expr::value(0i64))
            .col_expr(stats::Column::MonthPaid, Expr::value(0i64))
            .filter(stats::Column::UserId.eq(user_id))
            .filter(stats::Column::MonthKey.ne(month.to_string()))
            .exec(conn)
            .await?;
        if reset.rows_affected > 0 {
            log::debug!("Monthly stats reset for user {user_id} to {month}");
        }
        Ok(())
    }

    async fn ensure_level<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: i64,
        level: i32,
    ) -> AppResult<()> {
        level_stats::Entity::insert(level_stats::ActiveModel {
            user_id: Set(user_id),
            level: Set(level),
            referral_count: Set(0),
            earnings_count: Set(0),
            earned_minor_units: Set(0),
        })
        .on_conflict(
            OnConflict::columns([level_stats::Column::UserId, level_stats::Column::Level])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;
        Ok(())
    }

    /// 新链建立后，为每个上级在对应层级的下级计数 +1（ancestors[0] 为 level 1）
    pub async fn record_referral<C: ConnectionTrait>(
        &self,
        conn: &C,
        ancestors: &[i64],
    ) -> AppResult<()> {
        for (idx, ancestor_id) in ancestors.iter().enumerate() {
            let level = idx as i32 + 1;
            self.ensure_level(conn, *ancestor_id, level).await?;
            level_stats::Entity::update_many()
                .col_expr(
                    level_stats::Column::ReferralCount,
                    Expr::col(level_stats::Column::ReferralCount).add(1i64),
                )
                .filter(level_stats::Column::UserId.eq(*ancestor_id))
                .filter(level_stats::Column::Level.eq(level))
                .exec(conn)
                .await?;
        }
        Ok(())
    }

    pub async fn record_earning<C: ConnectionTrait>(
        &self,
        conn: &C,
        earning: &earnings::Model,
    ) -> AppResult<()> {
        let amount = earning.amount_minor_units;
        self.ensure_current(conn, earning.earner_id, &earning.month_key)
            .await?;
        stats::Entity::update_many()
            .col_expr(
                stats::Column::TotalEarned,
                Expr::col(stats::Column::TotalEarned).add(amount),
            )
            .col_expr(
                stats::Column::PendingAmount,
                Expr::col(stats::Column::PendingAmount).add(amount),
            )
            .col_expr(
                stats::Column::EarningsCount,
                Expr::col(stats::Column::EarningsCount).add(1i64),
            )
            .col_expr(
                stats::Column::MonthEarned,
                Expr::col(stats::Column::MonthEarned).add(amount),
            )
            .col_expr(stats::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(stats::Column::UserId.eq(earning.earner_id))
            .exec(conn)
            .await?;

        self.ensure_level(conn, earning.earner_id, earning.level)
            .await?;
        level_stats::Entity::update_many()
            .col_expr(
                level_stats::Column::EarningsCount,
                Expr::col(level_stats::Column::EarningsCount).add(1i64),
            )
            .col_expr(
                level_stats::Column::EarnedMinorUnits,
                Expr::col(level_stats::Column::EarnedMinorUnits).add(amount),
            )
            .filter(level_stats::Column::UserId.eq(earning.earner_id))
            .filter(level_stats::Column::Level.eq(earning.level))
            .exec(conn)
            .await?;
        Ok(())
    }

    pub async fn record_payout<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: i64,
        amount: i64,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        self.ensure_current(conn, user_id, &month_key(at)).await?;
        stats::Entity::update_many()
            .col_expr(
                stats::Column::TotalPaid,
                Expr::col(stats::Column::TotalPaid).add(amount),
            )
            .col_expr(
                stats::Column::PendingAmount,
                Expr::col(stats::Column::PendingAmount).sub(amount),
            )
            .col_expr(
                stats::Column::MonthPaid,
                Expr::col(stats::Column::MonthPaid).add(amount),
            )
            .col_expr(stats::Column::UpdatedAt, Expr::value(at))
            .filter(stats::Column::UserId.eq(user_id))
            .exec(conn)
            .await?;
        Ok(())
    }

    pub async fn get_stats(&self, user_id: i64) -> AppResult<UserStatsResponse> {
        self.get_stats_at(user_id, Utc::now()).await
    }

    pub async fn get_stats_at(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<UserStatsResponse> {
        let month = month_key(now);
        self.ensure_current(&self.pool, user_id, &month).await?;

        let row = stats::Entity::find_by_id(user_id).one(&self.pool).await?;
        let levels = level_stats::Entity::find()
            .filter(level_stats::Column::UserId.eq(user_id))
            .order_by_asc(level_stats::Column::Level)
            .all(&self.pool)
            .await?
            .into_iter()
            .map(|l| LevelStatsResponse {
                level: l.level,
                referral_count: l.referral_count,
                earnings_count: l.earnings_count,
                earned_minor_units: l.earned_minor_units,
            })
            .collect();

        let (total_earned, total_paid, pending_amount, earnings_count, month_earned, month_paid) =
            row.map(|r| {
                (
                    r.total_earned,
                    r.total_paid,
                    r.pending_amount,
                    r.earnings_count,
                    r.month_earned,
                    r.month_paid,
                )
            })
            .unwrap_or_default();

        Ok(UserStatsResponse {
            user_id,
            total_earned,
            total_paid,
            pending_amount,
            earnings_count,
            month_key: month,
            month_earned,
            month_paid,
            levels,
        })
    }
}
