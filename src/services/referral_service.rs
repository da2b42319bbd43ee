use crate::database::sum_as_bigint;
use crate::entities::{
    EarningStatus, chain_entity as chains, chain_link_entity as links, earning_entity as earnings,
};
use crate::error::AppResult;
use crate::models::{
    EarningQuery, EarningResponse, EarningsSummaryResponse, NetworkLevelCount, NetworkResponse,
    PaginatedResponse, PaginationParams, RevenueTransaction, TransactionCompletedResponse,
    UserStatsResponse,
};
use crate::services::{EarningsCalculator, InviteService, StatsAggregator};
use crate::utils::month_key;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, Order, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};

/// 对外的推荐业务入口：交易回调与各类查询
#[derive(Clone)]
pub struct ReferralService {
    pool: DatabaseConnection,
    invites: InviteService,
    calculator: EarningsCalculator,
    stats: StatsAggregator,
}

impl ReferralService {
    pub fn new(
        pool: DatabaseConnection,
        invites: InviteService,
        calculator: EarningsCalculator,
        stats: StatsAggregator,
    ) -> Self {
        Self {
            pool,
            invites,
            calculator,
            stats,
        }
    }

    /// 交易完成回调。任何错误都只记日志，不会向支付流程抛出。
    pub async fn on_transaction_completed(
        &self,
        tx: &RevenueTransaction,
    ) -> TransactionCompletedResponse {
        if let Err(e) = self.invites.activate(tx.source_user_id).await {
            log::warn!(
                "Activation of user {} on transaction {} failed: {e}",
                tx.source_user_id,
                tx.id
            );
        }

        let created = self.calculator.calculate_or_skip(tx).await;
        TransactionCompletedResponse {
            earnings_created: created.len(),
            earnings: created.into_iter().map(Into::into).collect(),
        }
    }

    /// 下级网络：按层级统计以该用户为祖先的链节点
    pub async fn get_network(&self, user_id: i64) -> AppResult<NetworkResponse> {
        let rows: Vec<(i32, i64)> = links::Entity::find()
            .select_only()
            .column(links::Column::Level)
            .column_as(Expr::col(links::Column::UserId).count(), "count")
            .filter(links::Column::AncestorId.eq(user_id))
            .group_by(links::Column::Level)
            .order_by_asc(links::Column::Level)
            .into_tuple()
            .all(&self.pool)
            .await?;

        let levels: Vec<NetworkLevelCount> = rows
            .into_iter()
            .map(|(level, count)| NetworkLevelCount { level, count })
            .collect();
        let direct_count: i64 = levels
            .iter()
            .filter(|l| l.level == 1)
            .map(|l| l.count)
            .sum();
        let total_count: i64 = levels.iter().map(|l| l.count).sum();

        let upline_depth = chains::Entity::find_by_id(user_id)
            .one(&self.pool)
            .await?
            .map(|c| c.depth)
            .unwrap_or(0);

        Ok(NetworkResponse {
            user_id,
            direct_count,
            inherited_count: total_count - direct_count,
            total_count,
            levels,
            upline_depth,
        })
    }

    pub async fn get_earnings_summary(&self, user_id: i64) -> AppResult<EarningsSummaryResponse> {
        self.get_earnings_summary_at(user_id, Utc::now()).await
    }

    /// 汇总直接读佣金表，不依赖统计计数
    pub async fn get_earnings_summary_at(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<EarningsSummaryResponse> {
        let (pending_amount, pending_count) =
            self.total_by_status(user_id, EarningStatus::Pending).await?;
        let (paid_amount, paid_count) = self.total_by_status(user_id, EarningStatus::Paid).await?;

        let month = month_key(now);
        let month_earned = earnings::Entity::find()
            .select_only()
            .column_as(sum_as_bigint(earnings::Column::AmountMinorUnits), "total")
            .filter(earnings::Column::EarnerId.eq(user_id))
            .filter(earnings::Column::MonthKey.eq(month.as_str()))
            .into_tuple::<i64>()
            .one(&self.pool)
            .await?
            .unwrap_or(0);

        Ok(EarningsSummaryResponse {
            user_id,
            pending_amount,
            pending_count,
            paid_amount,
            paid_count,
            month_key: month,
            month_earned,
        })
    }

    async fn total_by_status(&self, user_id: i64, status: EarningStatus) -> AppResult<(i64, i64)> {
        let base = earnings::Entity::find()
            .filter(earnings::Column::EarnerId.eq(user_id))
            .filter(earnings::Column::Status.eq(status));
        let count = base.clone().count(&self.pool).await? as i64;
        let amount = base
            .select_only()
            .column_as(sum_as_bigint(earnings::Column::AmountMinorUnits), "total")
            .into_tuple::<i64>()
            .one(&self.pool)
            .await?
            .unwrap_or(0);
        Ok((amount, count))
    }

    pub async fn list_earnings(
        &self,
        user_id: i64,
        query: &EarningQuery,
    ) -> AppResult<PaginatedResponse<EarningResponse>> {
        let params = PaginationParams::new(query.page, query.per_page);

        let mut base = earnings::Entity::find().filter(earnings::Column::EarnerId.eq(user_id));
        if let Some(status) = query.status {
            base = base.filter(earnings::Column::Status.eq(status));
        }

        let total = base.clone().count(&self.pool).await? as i64;
        let items: Vec<EarningResponse> = base
            .order_by(earnings::Column::CreatedAt, Order::Desc)
            .order_by(earnings::Column::Id, Order::Desc)
            .limit(params.get_limit() as u64)
            .offset(params.get_offset() as u64)
            .all(&self.pool)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();

        Ok(PaginatedResponse::new(
            items,
            params.page(),
            params.page_size(),
            total,
        ))
    }

    pub async fn get_stats(&self, user_id: i64) -> AppResult<UserStatsResponse> {
        self.stats.get_stats(user_id).await
    }
}
