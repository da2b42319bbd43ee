mod common;

use chrono::{Days, Duration, Utc};
use common::*;
use referral_backend::entities::{
    BatchStatus, EarningStatus, WalletTransactionType, earning_entity as earnings,
    ledger_transaction_entity as ledger, payout_batch_entity as batches, user_entity as users,
    wallet_transaction_entity as wallet_txs,
};
use referral_backend::error::AppError;
use referral_backend::services::{BalanceWallet, DbLedger, PayoutSettings};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, Set,
};
use serde_json::json;
use std::sync::Arc;

async fn one_level() -> Harness {
    Harness::new(schedule("5.00", None), 1).await
}

async fn balance_of(h: &Harness, user_id: i64) -> i64 {
    users::Entity::find_by_id(user_id)
        .one(&h.db)
        .await
        .unwrap()
        .unwrap()
        .balance
}

#[tokio::test]
async fn test_daily_batch_pays_pending_earnings() {
    let h = one_level().await;
    let line = h.referral_line(2).await;
    let earner = line[0].id;

    let a = h.calculator.calculate(&revenue_tx("tx-a", line[1].id, 1000)).await.unwrap();
    let b = h.calculator.calculate(&revenue_tx("tx-b", line[1].id, 600)).await.unwrap();
    assert_eq!(a[0].amount_minor_units, 50);
    assert_eq!(b[0].amount_minor_units, 30);

    let today = Utc::now().date_naive();
    let processor = h.processor(Arc::new(BalanceWallet));
    let result = processor.run_daily_batch(today).await.unwrap();

    assert_eq!(result.status, BatchStatus::Completed);
    assert_eq!(result.total_amount, 80);
    assert_eq!(result.earnings_paid, 2);
    assert_eq!(result.users_paid, 1);
    assert_eq!(result.users_failed, 0);
    assert_eq!(result.run_count, 1);
    assert_eq!(result.batch_id, format!("payout-{}", today.format("%Y-%m-%d")));

    assert_eq!(balance_of(&h, earner).await, 80);

    let wallet_rows = wallet_txs::Entity::find()
        .filter(wallet_txs::Column::UserId.eq(earner))
        .all(&h.db)
        .await
        .unwrap();
    assert_eq!(wallet_rows.len(), 1);
    assert_eq!(wallet_rows[0].amount, 80);
    assert_eq!(wallet_rows[0].balance_after, 80);
    assert_eq!(
        wallet_rows[0].transaction_type,
        WalletTransactionType::ReferralPayout
    );
    assert_eq!(wallet_rows[0].reference.as_deref(), Some(result.batch_id.as_str()));

    let ledger_rows = ledger::Entity::find()
        .filter(ledger::Column::UserId.eq(earner))
        .all(&h.db)
        .await
        .unwrap();
    assert_eq!(ledger_rows.len(), 1);
    assert_eq!(ledger_rows[0].amount, 80);
    assert_eq!(ledger_rows[0].earning_ids, json!([a[0].id, b[0].id]));

    let paid = earnings::Entity::find()
        .filter(earnings::Column::EarnerId.eq(earner))
        .all(&h.db)
        .await
        .unwrap();
    assert!(paid.iter().all(|e| e.status == EarningStatus::Paid));
    assert!(paid
        .iter()
        .all(|e| e.paid_batch_id.as_deref() == Some(result.batch_id.as_str())));

    let stats = h.stats.get_stats(earner).await.unwrap();
    assert_eq!(stats.total_paid, 80);
    assert_eq!(stats.pending_amount, 0);
    assert_eq!(stats.month_paid, 80);
}

#[tokio::test]
async fn test_rerun_of_completed_batch_is_noop() {
    let h = one_level().await;
    let line = h.referral_line(2).await;
    let earner = line[0].id;
    h.calculator.calculate(&revenue_tx("tx-1", line[1].id, 1000)).await.unwrap();

    let today = Utc::now().date_naive();
    let processor = h.processor(Arc::new(BalanceWallet));
    let first = processor.run_daily_batch(today).await.unwrap();
    assert_eq!(first.total_amount, 50);

    // 批次完成后才产生的佣金，重跑同一天不会发放
    let late = h.calculator.calculate(&revenue_tx("tx-2", line[1].id, 1000)).await.unwrap();

    let second = processor.run_daily_batch(today).await.unwrap();
    assert_eq!(second.status, BatchStatus::Completed);
    assert_eq!(second.run_count, 1);
    assert_eq!(second.total_amount, 50);
    assert_eq!(balance_of(&h, earner).await, 50);

    let late = earnings::Entity::find_by_id(late[0].id).one(&h.db).await.unwrap().unwrap();
    assert_eq!(late.status, EarningStatus::Pending);
    assert!(late.claim_token.is_none());

    let ledger_count = ledger::Entity::find()
        .filter(ledger::Column::UserId.eq(earner))
        .count(&h.db)
        .await
        .unwrap();
    assert_eq!(ledger_count, 1);
}

#[tokio::test]
async fn test_failed_earner_is_released_and_others_are_paid() {
    let h = one_level().await;
    let first_line = h.referral_line(2).await;
    let second_line = h.referral_line(2).await;
    let failing = first_line[0].id;
    let healthy = second_line[0].id;

    h.calculator.calculate(&revenue_tx("tx-f", first_line[1].id, 1000)).await.unwrap();
    h.calculator.calculate(&revenue_tx("tx-h", second_line[1].id, 2000)).await.unwrap();

    let today = Utc::now().date_naive();
    let flaky = h.processor(Arc::new(FlakyWallet::failing_for(&[failing])));
    let result = flaky.run_daily_batch(today).await.unwrap();

    assert_eq!(result.status, BatchStatus::Completed);
    assert_eq!(result.users_paid, 1);
    assert_eq!(result.users_failed, 1);
    assert_eq!(result.total_amount, 100);
    assert_eq!(result.failed_users.len(), 1);
    assert_eq!(result.failed_users[0].user_id, failing);
    assert_eq!(result.failed_users[0].amount, 50);

    assert_eq!(balance_of(&h, healthy).await, 100);
    assert_eq!(balance_of(&h, failing).await, 0);

    let left = earnings::Entity::find()
        .filter(earnings::Column::EarnerId.eq(failing))
        .one(&h.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(left.status, EarningStatus::Pending);
    assert!(left.claim_token.is_none());
    assert!(left.claimed_batch_id.is_none());
    // 失败用户的账本与统计都没有写入
    let ledger_count = ledger::Entity::find()
        .filter(ledger::Column::UserId.eq(failing))
        .count(&h.db)
        .await
        .unwrap();
    assert_eq!(ledger_count, 0);
    assert_eq!(h.stats.get_stats(failing).await.unwrap().pending_amount, 50);

    // 下一天的批次把它补发出去
    let tomorrow = today.checked_add_days(Days::new(1)).unwrap();
    let next = h
        .processor(Arc::new(BalanceWallet))
        .run_daily_batch(tomorrow)
        .await
        .unwrap();
    assert_eq!(next.users_paid, 1);
    assert_eq!(next.total_amount, 50);
    assert_eq!(balance_of(&h, failing).await, 50);
    assert_eq!(balance_of(&h, healthy).await, 100);
}

#[tokio::test]
async fn test_earnings_after_cutoff_wait_for_next_batch() {
    let h = one_level().await;
    let line = h.referral_line(2).await;
    h.calculator.calculate(&revenue_tx("tx-today", line[1].id, 1000)).await.unwrap();

    let yesterday = Utc::now().date_naive().checked_sub_days(Days::new(1)).unwrap();
    let processor = h.processor(Arc::new(BalanceWallet));
    let result = processor.run_daily_batch(yesterday).await.unwrap();

    assert_eq!(result.status, BatchStatus::Completed);
    assert_eq!(result.earnings_paid, 0);
    assert_eq!(result.total_amount, 0);

    let pending = earnings::Entity::find()
        .filter(earnings::Column::Status.eq(EarningStatus::Pending))
        .filter(earnings::Column::ClaimToken.is_null())
        .count(&h.db)
        .await
        .unwrap();
    assert_eq!(pending, 1);
}

#[tokio::test]
async fn test_stale_claims_are_released_fresh_ones_are_not() {
    let h = one_level().await;
    let stale_line = h.referral_line(2).await;
    let fresh_line = h.referral_line(2).await;

    let stale = h.calculator.calculate(&revenue_tx("tx-stale", stale_line[1].id, 1000)).await.unwrap();
    let fresh = h.calculator.calculate(&revenue_tx("tx-fresh", fresh_line[1].id, 1000)).await.unwrap();

    let now = Utc::now();
    // 模拟崩溃的旧运行遗留的认领
    for (earning, claimed_at) in [
        (&stale[0], now - Duration::hours(3)),
        (&fresh[0], now - Duration::minutes(5)),
    ] {
        let mut active: earnings::ActiveModel = earning.clone().into();
        active.claim_token = Set(Some("crashed-run".to_string()));
        active.claimed_batch_id = Set(Some("payout-1999-01-01".to_string()));
        active.claimed_at = Set(Some(claimed_at));
        active.update(&h.db).await.unwrap();
    }

    let result = h
        .processor(Arc::new(BalanceWallet))
        .run_daily_batch(now.date_naive())
        .await
        .unwrap();
    assert_eq!(result.users_paid, 1);
    assert_eq!(balance_of(&h, stale_line[0].id).await, 50);
    assert_eq!(balance_of(&h, fresh_line[0].id).await, 0);

    let still_claimed = earnings::Entity::find_by_id(fresh[0].id).one(&h.db).await.unwrap().unwrap();
    assert_eq!(still_claimed.status, EarningStatus::Pending);
    assert_eq!(still_claimed.claim_token.as_deref(), Some("crashed-run"));
}

#[tokio::test]
async fn test_failed_batch_is_resumed() {
    let h = one_level().await;
    let line = h.referral_line(2).await;
    h.calculator.calculate(&revenue_tx("tx-r", line[1].id, 1000)).await.unwrap();

    let today = Utc::now().date_naive();
    let now = Utc::now();
    batches::ActiveModel {
        batch_id: Set(format!("payout-{}", today.format("%Y-%m-%d"))),
        as_of_date: Set(today),
        status: Set(BatchStatus::Failed),
        total_amount: Set(0),
        earnings_paid: Set(0),
        users_paid: Set(0),
        users_failed: Set(0),
        failed_users: Set(json!([])),
        last_error: Set(Some("payout batch exceeded 900s".to_string())),
        run_count: Set(1),
        started_at: Set(now - Duration::hours(1)),
        finished_at: Set(Some(now - Duration::minutes(45))),
        updated_at: Set(Some(now - Duration::minutes(45))),
    }
    .insert(&h.db)
    .await
    .unwrap();

    let processor = h.processor(Arc::new(BalanceWallet));
    let before = processor.get_batch(today).await.unwrap().unwrap();
    assert_eq!(before.status, BatchStatus::Failed);

    let result = processor.run_daily_batch(today).await.unwrap();
    assert_eq!(result.status, BatchStatus::Completed);
    assert_eq!(result.run_count, 2);
    assert_eq!(result.total_amount, 50);
    assert!(result.last_error.is_none());
    assert_eq!(balance_of(&h, line[0].id).await, 50);
}

#[tokio::test]
async fn test_get_batch_for_unknown_date() {
    let h = one_level().await;
    let processor = h.processor(Arc::new(BalanceWallet));
    let never = chrono::NaiveDate::from_ymd_opt(2001, 1, 1).unwrap();
    assert!(processor.get_batch(never).await.unwrap().is_none());
}

#[tokio::test]
async fn test_empty_batch_completes() {
    let h = one_level().await;
    let processor = h.processor(Arc::new(BalanceWallet));
    let today = Utc::now().date_naive();

    let result = processor.run_daily_batch(today).await.unwrap();
    assert_eq!(result.status, BatchStatus::Completed);
    assert_eq!(result.users_paid, 0);
    assert!(result.finished_at.is_some());
    assert_eq!(processor.get_batch(today).await.unwrap().unwrap().run_count, 1);
}

#[tokio::test]
async fn test_overlapping_runs_pay_each_earner_once() {
    let h = one_level().await;
    let mut earners = Vec::new();
    for i in 0..5 {
        let line = h.referral_line(2).await;
        h.calculator
            .calculate(&revenue_tx(&format!("tx-o{i}"), line[1].id, 1000))
            .await
            .unwrap();
        earners.push(line[0].id);
    }

    let today = Utc::now().date_naive();
    let first = h.processor(Arc::new(BalanceWallet));
    let second = h.processor(Arc::new(BalanceWallet));
    let (a, b) = tokio::join!(first.run_daily_batch(today), second.run_daily_batch(today));
    a.unwrap();
    b.unwrap();

    for earner in &earners {
        assert_eq!(balance_of(&h, *earner).await, 50);
        let ledger_count = ledger::Entity::find()
            .filter(ledger::Column::UserId.eq(*earner))
            .count(&h.db)
            .await
            .unwrap();
        assert_eq!(ledger_count, 1);
    }
    let unpaid = earnings::Entity::find()
        .filter(earnings::Column::Status.eq(EarningStatus::Pending))
        .count(&h.db)
        .await
        .unwrap();
    assert_eq!(unpaid, 0);

    let batch = first.get_batch(today).await.unwrap().unwrap();
    assert_eq!(batch.status, BatchStatus::Completed);
    assert_eq!(batch.total_amount, 250);
    assert_eq!(batch.users_paid, 5);
    assert_eq!(batch.run_count, 1);
}

#[tokio::test]
async fn test_timed_out_run_keeps_partial_totals_and_resumes() {
    let h = one_level().await;
    let fast_line = h.referral_line(2).await;
    let slow_line = h.referral_line(2).await;
    let fast = fast_line[0].id;
    let slow = slow_line[0].id;
    h.calculator.calculate(&revenue_tx("tx-fast", fast_line[1].id, 1000)).await.unwrap();
    h.calculator.calculate(&revenue_tx("tx-slow", slow_line[1].id, 1000)).await.unwrap();

    let today = Utc::now().date_naive();
    let stuck = h.processor_with(
        Arc::new(SlowWallet::slow_for(&[slow], std::time::Duration::from_millis(500))),
        Arc::new(DbLedger),
        PayoutSettings {
            timeout: std::time::Duration::from_millis(200),
            stale_claim: Duration::hours(2),
        },
    );
    let err = stuck.run_daily_batch(today).await.unwrap_err();
    assert!(matches!(err, AppError::Timeout(_)));

    // 已提交的用户仍计入批次汇总
    let failed = stuck.get_batch(today).await.unwrap().unwrap();
    assert_eq!(failed.status, BatchStatus::Failed);
    assert_eq!(failed.total_amount, 50);
    assert_eq!(failed.users_paid, 1);
    assert_eq!(failed.earnings_paid, 1);
    assert!(failed.last_error.unwrap().contains("200ms"));
    assert_eq!(balance_of(&h, fast).await, 50);
    assert_eq!(balance_of(&h, slow).await, 0);

    let left = earnings::Entity::find()
        .filter(earnings::Column::EarnerId.eq(slow))
        .one(&h.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(left.status, EarningStatus::Pending);
    assert!(left.claim_token.is_none());

    let resumed = h
        .processor(Arc::new(BalanceWallet))
        .run_daily_batch(today)
        .await
        .unwrap();
    assert_eq!(resumed.status, BatchStatus::Completed);
    assert_eq!(resumed.run_count, 2);
    assert_eq!(resumed.total_amount, 100);
    assert_eq!(resumed.users_paid, 2);
    assert_eq!(resumed.earnings_paid, 2);
    assert_eq!(balance_of(&h, slow).await, 50);
    assert_eq!(balance_of(&h, fast).await, 50);
}

#[tokio::test]
async fn test_claim_failure_marks_batch_failed() {
    let h = one_level().await;
    let line = h.referral_line(2).await;
    h.calculator.calculate(&revenue_tx("tx-c", line[1].id, 1000)).await.unwrap();

    let today = Utc::now().date_naive();
    let processor = h.processor(Arc::new(BalanceWallet));

    h.db
        .execute_unprepared("ALTER TABLE earnings RENAME TO earnings_offline")
        .await
        .unwrap();
    assert!(processor.run_daily_batch(today).await.is_err());

    let failed = processor.get_batch(today).await.unwrap().unwrap();
    assert_eq!(failed.status, BatchStatus::Failed);
    assert!(failed.last_error.is_some());
    assert_eq!(failed.users_paid, 0);
    assert_eq!(balance_of(&h, line[0].id).await, 0);

    h.db
        .execute_unprepared("ALTER TABLE earnings_offline RENAME TO earnings")
        .await
        .unwrap();
    let resumed = processor.run_daily_batch(today).await.unwrap();
    assert_eq!(resumed.status, BatchStatus::Completed);
    assert_eq!(resumed.run_count, 2);
    assert_eq!(resumed.total_amount, 50);
    assert!(resumed.last_error.is_none());
}

#[tokio::test]
async fn test_ledger_failure_is_isolated_like_credit_failure() {
    let h = one_level().await;
    let failing_line = h.referral_line(2).await;
    let healthy_line = h.referral_line(2).await;
    let failing = failing_line[0].id;
    let healthy = healthy_line[0].id;
    h.calculator.calculate(&revenue_tx("tx-lf", failing_line[1].id, 1000)).await.unwrap();
    h.calculator.calculate(&revenue_tx("tx-lh", healthy_line[1].id, 1000)).await.unwrap();

    let today = Utc::now().date_naive();
    let result = h
        .processor_with(
            Arc::new(BalanceWallet),
            Arc::new(FlakyLedger::failing_for(&[failing])),
            PayoutSettings::from(&referral_backend::config::PayoutConfig::default()),
        )
        .run_daily_batch(today)
        .await
        .unwrap();

    assert_eq!(result.status, BatchStatus::Completed);
    assert_eq!(result.users_paid, 1);
    assert_eq!(result.users_failed, 1);
    assert_eq!(result.failed_users[0].user_id, failing);
    assert_eq!(result.total_amount, 50);

    // 入账随账本失败一起回滚
    assert_eq!(balance_of(&h, failing).await, 0);
    let wallet_rows = wallet_txs::Entity::find()
        .filter(wallet_txs::Column::UserId.eq(failing))
        .count(&h.db)
        .await
        .unwrap();
    assert_eq!(wallet_rows, 0);
    assert_eq!(balance_of(&h, healthy).await, 50);

    let left = earnings::Entity::find()
        .filter(earnings::Column::EarnerId.eq(failing))
        .one(&h.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(left.status, EarningStatus::Pending);
    assert!(left.claim_token.is_none());
}

async fn insert_processing_batch(h: &Harness, date: chrono::NaiveDate, updated_at: chrono::DateTime<Utc>) {
    batches::ActiveModel {
        batch_id: Set(format!("payout-{}", date.format("%Y-%m-%d"))),
        as_of_date: Set(date),
        status: Set(BatchStatus::Processing),
        total_amount: Set(0),
        earnings_paid: Set(0),
        users_paid: Set(0),
        users_failed: Set(0),
        failed_users: Set(json!([])),
        last_error: Set(None),
        run_count: Set(1),
        started_at: Set(updated_at),
        finished_at: Set(None),
        updated_at: Set(Some(updated_at)),
    }
    .insert(&h.db)
    .await
    .unwrap();
}

#[tokio::test]
async fn test_live_processing_batch_is_not_taken_over() {
    let h = one_level().await;
    let line = h.referral_line(2).await;
    h.calculator.calculate(&revenue_tx("tx-live", line[1].id, 1000)).await.unwrap();

    let today = Utc::now().date_naive();
    insert_processing_batch(&h, today, Utc::now()).await;

    let processor = h.processor(Arc::new(BalanceWallet));
    let result = processor.run_daily_batch(today).await.unwrap();
    assert_eq!(result.status, BatchStatus::Processing);
    assert_eq!(result.run_count, 1);
    assert_eq!(balance_of(&h, line[0].id).await, 0);

    let untouched = earnings::Entity::find()
        .filter(earnings::Column::EarnerId.eq(line[0].id))
        .one(&h.db)
        .await
        .unwrap()
        .unwrap();
    assert!(untouched.claim_token.is_none());
}

#[tokio::test]
async fn test_abandoned_processing_batch_is_resumed() {
    let h = one_level().await;
    let line = h.referral_line(2).await;
    h.calculator.calculate(&revenue_tx("tx-abandoned", line[1].id, 1000)).await.unwrap();

    let today = Utc::now().date_naive();
    insert_processing_batch(&h, today, Utc::now() - Duration::hours(3)).await;

    let result = h
        .processor(Arc::new(BalanceWallet))
        .run_daily_batch(today)
        .await
        .unwrap();
    assert_eq!(result.status, BatchStatus::Completed);
    assert_eq!(result.run_count, 2);
    assert_eq!(result.total_amount, 50);
    assert_eq!(balance_of(&h, line[0].id).await, 50);
}
