use crate::entities::{
    WalletTransactionType, ledger_transaction_entity as ledger, user_entity as users,
    wallet_transaction_entity as wallet_tx,
};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, Set};

/// 钱包入账接口。
///
/// 调用方传入自己的数据库事务，入账与佣金状态变更一起提交或一起回滚。
/// 同一批次内对同一用户只调用一次，失败不在本次运行内重试。
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Credits `amount` minor units and returns the balance after the credit.
    async fn credit(
        &self,
        txn: &DatabaseTransaction,
        user_id: i64,
        amount: i64,
        reason: &str,
        metadata: serde_json::Value,
    ) -> AppResult<i64>;
}

#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub user_id: i64,
    pub batch_id: String,
    pub amount: i64,
    pub earning_ids: Vec<i64>,
    pub description: String,
}

/// Append-only audit trail of payouts.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn record(&self, txn: &DatabaseTransaction, entry: LedgerEntry) -> AppResult<i64>;
}

/// `users.balance` 作为钱包余额，每次入账写一条 wallet_transactions 流水
#[derive(Debug, Clone, Default)]
pub struct BalanceWallet;

#[async_trait]
impl Wallet for BalanceWallet {
    async fn credit(
        &self,
        txn: &DatabaseTransaction,
        user_id: i64,
        amount: i64,
        reason: &str,
        metadata: serde_json::Value,
    ) -> AppResult<i64> {
        if amount <= 0 {
            return Err(AppError::ValidationError(format!(
                "credit amount must be positive, got {amount}"
            )));
        }

        let now = Utc::now();
        let updated = users::Entity::update_many()
            .col_expr(
                users::Column::Balance,
                Expr::col(users::Column::Balance).add(amount),
            )
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .filter(users::Column::Id.eq(user_id))
            .exec(txn)
            .await?;
        if updated.rows_affected == 0 {
            return Err(AppError::NotFound(format!("wallet of user {user_id}")));
        }

        let balance_after = users::Entity::find_by_id(user_id)
            .one(txn)
            .await?
            .map(|u| u.balance)
            .ok_or_else(|| AppError::NotFound(format!("wallet of user {user_id}")))?;

        let reference = metadata
            .get("batch_id")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        wallet_tx::ActiveModel {
            user_id: Set(user_id),
            transaction_type: Set(WalletTransactionType::ReferralPayout),
            amount: Set(amount),
            balance_after: Set(balance_after),
            reference: Set(reference),
            description: Set(Some(reason.to_string())),
            metadata: Set(Some(metadata)),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(txn)
        .await?;

        Ok(balance_after)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DbLedger;

#[async_trait]
impl Ledger for DbLedger {
    async fn record(&self, txn: &DatabaseTransaction, entry: LedgerEntry) -> AppResult<i64> {
        let row = ledger::ActiveModel {
            user_id: Set(entry.user_id),
            batch_id: Set(entry.batch_id),
            amount: Set(entry.amount),
            earning_ids: Set(serde_json::to_value(&entry.earning_ids)?),
            description: Set(Some(entry.description)),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(txn)
        .await?;
        Ok(row.id)
    }
}
