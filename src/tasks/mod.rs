//! Background scheduled tasks for the application.
//!
//! The daily payout batch and invite expiry run here. Call `spawn_all` once during
//! startup to launch them.

use crate::config::PayoutConfig;
use crate::services::{InviteService, PayoutBatchProcessor};
use chrono::{DateTime, NaiveDate, Timelike, Utc};

/// 当前时刻应当执行的批次日期；未到运行时刻返回 None
pub fn due_batch_date(now: DateTime<Utc>, run_hour_utc: u32) -> Option<NaiveDate> {
    (now.hour() >= run_hour_utc).then(|| now.date_naive())
}

/// Spawn all background tasks.
///
/// Notes
/// - The payout batch is idempotent per date, so waking up several times a day is harmless.
/// - This function detaches tasks via `tokio::spawn`; it does not block.
pub fn spawn_all(
    payout_processor: PayoutBatchProcessor,
    invite_service: InviteService,
    payout_config: PayoutConfig,
) {
    // 每日佣金发放（按配置的间隔检查，到点后执行当天批次）
    {
        let svc = payout_processor.clone();
        tokio::spawn(async move {
            loop {
                if let Some(date) = due_batch_date(Utc::now(), payout_config.run_hour_utc) {
                    match svc.run_daily_batch(date).await {
                        Ok(result) if result.users_failed > 0 => log::warn!(
                            "Payout batch {} finished with {} failed users",
                            result.batch_id,
                            result.users_failed
                        ),
                        Ok(_) => {}
                        Err(e) => log::error!("Payout batch for {date} failed: {e:?}"),
                    }
                }
                tokio::time::sleep(std::time::Duration::from_secs(
                    payout_config.scheduler_interval_secs,
                ))
                .await;
            }
        });
    }

    // 邀请过期（每小时）
    {
        let svc = invite_service.clone();
        tokio::spawn(async move {
            loop {
                match svc.expire_stale(Utc::now()).await {
                    Ok(n) if n > 0 => log::info!("Invites expired: {n}"),
                    Ok(_) => {}
                    Err(e) => log::error!("Failed to expire invites: {e:?}"),
                }
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_due_batch_date_respects_run_hour() {
        let early = Utc.with_ymd_and_hms(2026, 10, 18, 1, 59, 0).unwrap();
        assert_eq!(due_batch_date(early, 2), None);

        let due = Utc.with_ymd_and_hms(2026, 10, 18, 2, 0, 0).unwrap();
        assert_eq!(
            due_batch_date(due, 2),
            Some(NaiveDate::from_ymd_opt(2026, 10, 18).unwrap())
        );
    }
}
