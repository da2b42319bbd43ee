use actix_web::{App, HttpServer, middleware::Logger, web};
use anyhow::Context;
use chrono::Local; // timestamp in log lines
use env_logger::{Env, Target};
use std::io::Write; // for env_logger custom formatter
use std::sync::Arc;

use referral_backend::{
    config::Config,
    database::{create_pool, run_migrations},
    external::{InviteNotifier, LogNotifier, TwilioService},
    handlers,
    middlewares::create_cors,
    services::*,
    swagger::swagger_config,
    tasks,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stdout)
        .init();

    // 加载配置（含佣金方案校验）
    let config = Config::from_toml().map_err(|e| anyhow::anyhow!("Failed to load configuration: {e}"))?;

    let pool = create_pool(&config.database)
        .await
        .context("Failed to create database connection pool")?;

    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    // 短信通道未配置时只记日志
    let twilio_service = TwilioService::new(config.twilio.clone());
    let notifier: Arc<dyn InviteNotifier> = if twilio_service.is_configured() {
        Arc::new(twilio_service)
    } else {
        log::warn!("Twilio is not configured, invite SMS will only be logged");
        Arc::new(LogNotifier)
    };

    let guard_policy = GuardPolicy::from(&config.fraud_guard);
    if guard_policy == GuardPolicy::Bypass {
        log::warn!("Fraud guard is BYPASSED, do not use this setting in production");
    }

    // 创建服务
    let stats_aggregator = StatsAggregator::new(pool.clone());
    let chain_builder = ChainBuilder::new(
        pool.clone(),
        stats_aggregator.clone(),
        config.referral.max_depth,
    );
    let fraud_guard = FraudGuard::new(pool.clone(), guard_policy);
    let earnings_calculator = EarningsCalculator::new(
        pool.clone(),
        Arc::new(config.referral.commission.clone()),
        stats_aggregator.clone(),
    );
    let invite_service = InviteService::new(
        pool.clone(),
        fraud_guard,
        chain_builder,
        notifier,
        InviteSettings::from(&config.referral),
    );
    let referral_service = ReferralService::new(
        pool.clone(),
        invite_service.clone(),
        earnings_calculator,
        stats_aggregator.clone(),
    );
    let payout_processor = PayoutBatchProcessor::new(
        pool.clone(),
        Arc::new(BalanceWallet),
        Arc::new(DbLedger),
        stats_aggregator,
        PayoutSettings::from(&config.payout),
    );

    tasks::spawn_all(
        payout_processor.clone(),
        invite_service.clone(),
        config.payout.clone(),
    );

    log::info!(
        "Starting HTTP server at {}:{} (max depth {}, {} commission levels)",
        config.server.host,
        config.server.port,
        config.referral.max_depth,
        config.referral.commission.levels.len()
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(create_cors())
            .app_data(web::Data::new(invite_service.clone()))
            .app_data(web::Data::new(referral_service.clone()))
            .app_data(web::Data::new(payout_processor.clone()))
            .configure(swagger_config)
            .service(
                web::scope("/api/v1")
                    .configure(handlers::referral_config)
                    .configure(handlers::invite_config)
                    .configure(handlers::transaction_config)
                    .configure(handlers::admin_config),
            )
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await?;

    Ok(())
}
