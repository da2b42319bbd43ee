use crate::entities::{chain_entity as chains, chain_link_entity as links};
use crate::error::{AppResult, IneligibilityReason};
use crate::services::StatsAggregator;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};

/// Immutable upline snapshot. `ancestors[0]` is the direct inviter (level 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UplineChain {
    pub user_id: i64,
    pub ancestors: Vec<i64>,
}

impl UplineChain {
    pub fn depth(&self) -> usize {
        self.ancestors.len()
    }

    /// 1-based level lookup
    pub fn ancestor_at(&self, level: usize) -> Option<i64> {
        level
            .checked_sub(1)
            .and_then(|idx| self.ancestors.get(idx).copied())
    }
}

/// `[inviter] + inviter_ancestors[0..D-1]`, never longer than `max_depth`.
pub fn compose_chain(inviter_id: i64, inviter_ancestors: &[i64], max_depth: usize) -> Vec<i64> {
    std::iter::once(inviter_id)
        .chain(inviter_ancestors.iter().copied())
        .take(max_depth)
        .collect()
}

/// 读取用户的链快照；不存在返回 None（即深度 0）
pub async fn load_chain<C: ConnectionTrait>(conn: &C, user_id: i64) -> AppResult<Option<UplineChain>> {
    let Some(head) = chains::Entity::find_by_id(user_id).one(conn).await? else {
        return Ok(None);
    };
    let ancestors: Vec<i64> = links::Entity::find()
        .filter(links::Column::UserId.eq(user_id))
        .order_by_asc(links::Column::Level)
        .all(conn)
        .await?
        .into_iter()
        .map(|l| l.ancestor_id)
        .collect();

    if ancestors.len() != head.depth as usize {
        log::warn!(
            "Chain of user {user_id} has depth {} but {} links",
            head.depth,
            ancestors.len()
        );
    }
    Ok(Some(UplineChain { user_id, ancestors }))
}

#[derive(Clone)]
pub struct ChainBuilder {
    pool: DatabaseConnection,
    stats: StatsAggregator,
    max_depth: usize,
}

impl ChainBuilder {
    pub fn new(pool: DatabaseConnection, stats: StatsAggregator, max_depth: usize) -> Self {
        Self {
            pool,
            stats,
            max_depth,
        }
    }

    /// 为新激活用户生成上级链。
    ///
    /// 链只会创建一次：已存在时直接返回旧快照，不再重复计数。
    /// 链与链节点在同一事务里写入；上级的层级计数在提交之后更新，失败只记日志
    /// （计数只用于展示，允许短暂不一致）。
    pub async fn build_chain(&self, new_user_id: i64, inviter_id: i64) -> AppResult<UplineChain> {
        if new_user_id == inviter_id {
            return Err(IneligibilityReason::SelfReferral.into());
        }

        let txn = self.pool.begin().await?;

        if let Some(existing) = load_chain(&txn, new_user_id).await? {
            txn.commit().await?;
            return Ok(existing);
        }

        let inviter_ancestors = load_chain(&txn, inviter_id)
            .await?
            .map(|c| c.ancestors)
            .unwrap_or_default();
        if inviter_ancestors.contains(&new_user_id) {
            txn.rollback().await?;
            return Err(IneligibilityReason::CyclicReferral.into());
        }

        let ancestors = compose_chain(inviter_id, &inviter_ancestors, self.max_depth);
        let depth = ancestors.len() as i32;

        let inserted = chains::Entity::insert(chains::ActiveModel {
            user_id: Set(new_user_id),
            inviter_id: Set(inviter_id),
            depth: Set(depth),
            created_at: Set(Utc::now()),
        })
        .on_conflict(
            OnConflict::column(chains::Column::UserId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&txn)
        .await?;

        if inserted == 0 {
            // 并发创建，以先写入者为准
            let existing = load_chain(&txn, new_user_id).await?;
            txn.commit().await?;
            return existing.ok_or_else(|| {
                crate::error::AppError::InternalError(format!(
                    "chain of user {new_user_id} vanished after conflict"
                ))
            });
        }

        let rows = ancestors.iter().enumerate().map(|(idx, ancestor_id)| links::ActiveModel {
            user_id: Set(new_user_id),
            level: Set(idx as i32 + 1),
            ancestor_id: Set(*ancestor_id),
        });
        links::Entity::insert_many(rows)
            .exec_without_returning(&txn)
            .await?;

        txn.commit().await?;
        log::info!(
            "Chain created for user {new_user_id}: inviter {inviter_id}, depth {depth}"
        );

        if let Err(e) = self.stats.record_referral(&self.pool, &ancestors).await {
            log::warn!("Failed to update referral counters for user {new_user_id}: {e:?}");
        }

        Ok(UplineChain {
            user_id: new_user_id,
            ancestors,
        })
    }
}
