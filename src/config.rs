use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub referral: ReferralConfig,
    #[serde(default)]
    pub fraud_guard: FraudGuardConfig,
    #[serde(default)]
    pub payout: PayoutConfig,
    #[serde(default)]
    pub twilio: TwilioConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// 何时为新用户生成上级链快照
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChainTrigger {
    Signup,
    #[default]
    FirstTransaction,
}

impl FromStr for ChainTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "signup" => Ok(ChainTrigger::Signup),
            "first_transaction" => Ok(ChainTrigger::FirstTransaction),
            other => Err(format!("unknown chain trigger: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralConfig {
    /// 链的最大深度 D
    pub max_depth: usize,
    pub share_base_url: String,
    #[serde(default)]
    pub chain_trigger: ChainTrigger,
    #[serde(default = "default_invite_ttl_hours")]
    pub invite_ttl_hours: i64,
    pub commission: CommissionSchedule,
}

fn default_invite_ttl_hours() -> i64 {
    72
}

/// One commission level. `percentage` is a plain percent value, `5.00` means 5%.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LevelRule {
    pub level: u32,
    pub percentage: Decimal,
    #[serde(default)]
    pub monthly_cap_minor_units: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommissionSchedule {
    #[serde(default)]
    pub min_revenue_minor_units: i64,
    /// 为空表示所有交易类型都计佣
    #[serde(default)]
    pub eligible_transaction_types: Vec<String>,
    pub levels: Vec<LevelRule>,
}

impl CommissionSchedule {
    pub fn rule_for(&self, level: u32) -> Option<&LevelRule> {
        self.levels.iter().find(|r| r.level == level)
    }

    pub fn is_eligible_type(&self, transaction_type: &str) -> bool {
        self.eligible_transaction_types.is_empty()
            || self
                .eligible_transaction_types
                .iter()
                .any(|t| t == transaction_type)
    }

    /// Builds a schedule from comma separated lists, e.g. `"5.00,3.00,2.00"` and `"10000,,500"`.
    /// An empty cap entry means the level is uncapped.
    pub fn from_lists(percentages: &str, caps: Option<&str>) -> Result<Self, String> {
        let caps: Vec<&str> = caps.map(|c| c.split(',').collect()).unwrap_or_default();
        let mut levels = Vec::new();
        for (idx, raw) in percentages.split(',').enumerate() {
            let percentage = Decimal::from_str(raw.trim())
                .map_err(|e| format!("invalid commission percentage {raw:?}: {e}"))?;
            let monthly_cap_minor_units = match caps.get(idx).map(|c| c.trim()) {
                None | Some("") => None,
                Some(cap) => Some(
                    cap.parse::<i64>()
                        .map_err(|e| format!("invalid monthly cap {cap:?}: {e}"))?,
                ),
            };
            levels.push(LevelRule {
                level: idx as u32 + 1,
                percentage,
                monthly_cap_minor_units,
            });
        }
        Ok(Self {
            min_revenue_minor_units: 0,
            eligible_transaction_types: Vec::new(),
            levels,
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FraudGuardMode {
    #[default]
    Enforce,
    /// 仅用于非生产环境
    Bypass,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudGuardConfig {
    #[serde(default)]
    pub mode: FraudGuardMode,
    pub min_account_age_days: i64,
    pub max_invites_per_day: u64,
    pub max_invites_per_month: u64,
}

impl Default for FraudGuardConfig {
    fn default() -> Self {
        Self {
            mode: FraudGuardMode::Enforce,
            min_account_age_days: 7,
            max_invites_per_day: 10,
            max_invites_per_month: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutConfig {
    pub timeout_secs: u64,
    /// UTC hour after which the scheduler runs today's batch
    pub run_hour_utc: u32,
    pub stale_claim_secs: i64,
    pub scheduler_interval_secs: u64,
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15 * 60,
            run_hour_utc: 2,
            stale_claim_secs: 2 * 3600,
            scheduler_interval_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_phone: String,
}

impl Config {
    pub fn from_toml() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        fn get_env(name: &str) -> Option<String> {
            env::var(name).ok()
        }
        fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
            env::var(name)
                .ok()
                .and_then(|v| v.parse::<T>().ok())
                .unwrap_or(default)
        }

        // 尝试读取配置文件，如果不存在则完全依赖环境变量
        let config_result = std::fs::read_to_string(&config_path);

        let mut config: Config = match config_result {
            Ok(config_str) => {
                toml::from_str(&config_str).map_err(|e| format!("解析配置文件失败: {e}"))?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let database_url = get_env("DATABASE_URL")
                    .ok_or("缺少 DATABASE_URL 环境变量，且未找到配置文件 config.toml")?;

                // 佣金方案没有内置默认值，必须显式选择
                let percentages = get_env("COMMISSION_PERCENTAGES")
                    .ok_or("缺少 COMMISSION_PERCENTAGES 环境变量，且未找到配置文件 config.toml")?;
                let mut commission = CommissionSchedule::from_lists(
                    &percentages,
                    get_env("COMMISSION_MONTHLY_CAPS").as_deref(),
                )?;
                commission.min_revenue_minor_units = get_env_parse("COMMISSION_MIN_REVENUE", 0i64);

                Config {
                    server: ServerConfig {
                        host: get_env("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                        port: get_env_parse("SERVER_PORT", 8080u16),
                    },
                    database: DatabaseConfig {
                        url: database_url,
                        max_connections: get_env_parse("DB_MAX_CONNECTIONS", 10u32),
                    },
                    referral: ReferralConfig {
                        max_depth: get_env_parse("REFERRAL_MAX_DEPTH", commission.levels.len()),
                        share_base_url: get_env("REFERRAL_SHARE_BASE_URL")
                            .unwrap_or_else(|| "https://example.com/join".to_string()),
                        chain_trigger: get_env_parse(
                            "REFERRAL_CHAIN_TRIGGER",
                            ChainTrigger::FirstTransaction,
                        ),
                        invite_ttl_hours: get_env_parse(
                            "REFERRAL_INVITE_TTL_HOURS",
                            default_invite_ttl_hours(),
                        ),
                        commission,
                    },
                    fraud_guard: FraudGuardConfig::default(),
                    payout: PayoutConfig::default(),
                    twilio: TwilioConfig::default(),
                }
            }
            Err(e) => {
                return Err(format!("无法读取配置文件 {config_path}: {e}").into());
            }
        };

        // 环境变量覆盖（即便文件存在时也覆盖）
        if let Ok(v) = env::var("SERVER_HOST") {
            config.server.host = v;
        }
        if let Ok(v) = env::var("SERVER_PORT")
            && let Ok(p) = v.parse()
        {
            config.server.port = p;
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            config.database.url = v;
        }
        if let Ok(v) = env::var("DB_MAX_CONNECTIONS")
            && let Ok(mc) = v.parse()
        {
            config.database.max_connections = mc;
        }
        if let Ok(v) = env::var("REFERRAL_MAX_DEPTH")
            && let Ok(d) = v.parse()
        {
            config.referral.max_depth = d;
        }
        if let Ok(v) = env::var("REFERRAL_SHARE_BASE_URL") {
            config.referral.share_base_url = v;
        }
        if let Ok(v) = env::var("REFERRAL_CHAIN_TRIGGER")
            && let Ok(t) = v.parse()
        {
            config.referral.chain_trigger = t;
        }
        if let Ok(v) = env::var("REFERRAL_INVITE_TTL_HOURS")
            && let Ok(h) = v.parse()
        {
            config.referral.invite_ttl_hours = h;
        }
        if let Ok(v) = env::var("COMMISSION_PERCENTAGES") {
            let caps = env::var("COMMISSION_MONTHLY_CAPS").ok();
            let mut schedule = CommissionSchedule::from_lists(&v, caps.as_deref())?;
            schedule.min_revenue_minor_units = config.referral.commission.min_revenue_minor_units;
            schedule.eligible_transaction_types =
                config.referral.commission.eligible_transaction_types.clone();
            config.referral.commission = schedule;
        }
        if let Ok(v) = env::var("COMMISSION_MIN_REVENUE")
            && let Ok(n) = v.parse()
        {
            config.referral.commission.min_revenue_minor_units = n;
        }
        if let Ok(v) = env::var("FRAUD_GUARD_MODE") {
            config.fraud_guard.mode = match v.as_str() {
                "bypass" => FraudGuardMode::Bypass,
                _ => FraudGuardMode::Enforce,
            };
        }
        if let Ok(v) = env::var("PAYOUT_TIMEOUT_SECS")
            && let Ok(n) = v.parse()
        {
            config.payout.timeout_secs = n;
        }
        if let Ok(v) = env::var("PAYOUT_RUN_HOUR_UTC")
            && let Ok(n) = v.parse()
        {
            config.payout.run_hour_utc = n;
        }
        if let Ok(v) = env::var("TWILIO_ACCOUNT_SID") {
            config.twilio.account_sid = v;
        }
        if let Ok(v) = env::var("TWILIO_AUTH_TOKEN") {
            config.twilio.auth_token = v;
        }
        if let Ok(v) = env::var("TWILIO_FROM_PHONE") {
            config.twilio.from_phone = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.referral.validate()?;
        if self.payout.timeout_secs == 0 {
            return Err("payout.timeout_secs must be positive".into());
        }
        if self.payout.run_hour_utc > 23 {
            return Err("payout.run_hour_utc must be within 0..=23".into());
        }
        if self.payout.stale_claim_secs <= 0 {
            return Err("payout.stale_claim_secs must be positive".into());
        }
        // 运行中的批次的认领不能被当成遗留认领释放
        if self.payout.stale_claim_secs as u64 <= self.payout.timeout_secs {
            return Err("payout.stale_claim_secs must exceed payout.timeout_secs".into());
        }
        if self.payout.scheduler_interval_secs == 0 {
            return Err("payout.scheduler_interval_secs must be positive".into());
        }
        Ok(())
    }
}

impl ReferralConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_depth < 1 {
            return Err("referral.max_depth must be at least 1".into());
        }
        if self.invite_ttl_hours <= 0 {
            return Err("referral.invite_ttl_hours must be positive".into());
        }
        self.commission.validate(self.max_depth)
    }
}

impl CommissionSchedule {
    pub fn validate(&self, max_depth: usize) -> Result<(), String> {
        if self.levels.is_empty() {
            return Err("commission schedule has no levels".into());
        }
        if self.levels.len() > max_depth {
            return Err(format!(
                "commission schedule has {} levels but max_depth is {max_depth}",
                self.levels.len()
            ));
        }
        if self.min_revenue_minor_units < 0 {
            return Err("min_revenue_minor_units must not be negative".into());
        }

        let hundred = Decimal::ONE_HUNDRED;
        let mut total = Decimal::ZERO;
        for (idx, rule) in self.levels.iter().enumerate() {
            if rule.level != idx as u32 + 1 {
                return Err(format!(
                    "commission levels must be consecutive from 1, found level {} at position {}",
                    rule.level,
                    idx + 1
                ));
            }
            if rule.percentage <= Decimal::ZERO || rule.percentage > hundred {
                return Err(format!(
                    "level {} percentage must be within (0, 100], got {}",
                    rule.level, rule.percentage
                ));
            }
            if let Some(cap) = rule.monthly_cap_minor_units
                && cap <= 0
            {
                return Err(format!("level {} monthly cap must be positive", rule.level));
            }
            total += rule.percentage;
        }
        if total > hundred {
            return Err(format!("commission percentages sum to {total}%, above 100%"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uncapped() -> CommissionSchedule {
        CommissionSchedule::from_lists("5.00,3.00,2.00", None).unwrap()
    }

    #[test]
    fn test_from_lists_parses_percentages_and_caps() {
        let schedule = CommissionSchedule::from_lists("4.00,3.00,2.00,1.00", Some("50000,,20000,10000"))
            .unwrap();
        assert_eq!(schedule.levels.len(), 4);
        assert_eq!(schedule.levels[0].percentage, Decimal::new(400, 2));
        assert_eq!(schedule.levels[0].monthly_cap_minor_units, Some(50000));
        assert_eq!(schedule.levels[1].monthly_cap_minor_units, None);
        assert_eq!(schedule.levels[3].level, 4);
        assert!(schedule.validate(4).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_schedules() {
        assert!(uncapped().validate(3).is_ok());
        // 层数超过最大深度
        assert!(uncapped().validate(2).is_err());

        let mut zero = uncapped();
        zero.levels[1].percentage = Decimal::ZERO;
        assert!(zero.validate(3).is_err());

        let mut gap = uncapped();
        gap.levels[2].level = 4;
        assert!(gap.validate(4).is_err());

        let over = CommissionSchedule::from_lists("60,50", None).unwrap();
        assert!(over.validate(2).is_err());

        let bad_cap = CommissionSchedule::from_lists("5", Some("0")).unwrap();
        assert!(bad_cap.validate(1).is_err());

        let empty = CommissionSchedule {
            min_revenue_minor_units: 0,
            eligible_transaction_types: vec![],
            levels: vec![],
        };
        assert!(empty.validate(3).is_err());
    }

    #[test]
    fn test_eligible_transaction_types() {
        let mut schedule = uncapped();
        assert!(schedule.is_eligible_type("anything"));
        schedule.eligible_transaction_types = vec!["transfer".into()];
        assert!(schedule.is_eligible_type("transfer"));
        assert!(!schedule.is_eligible_type("topup"));
    }

    #[test]
    fn test_parse_toml_schedule() {
        let raw = r#"
            [server]
            host = "127.0.0.1"
            port = 8080

            [database]
            url = "postgres://localhost/referral"
            max_connections = 5

            [referral]
            max_depth = 3
            share_base_url = "https://wallet.example/join"
            chain_trigger = "signup"

            [referral.commission]
            min_revenue_minor_units = 100
            levels = [
                { level = 1, percentage = "5.00" },
                { level = 2, percentage = "3.00" },
                { level = 3, percentage = "2.00", monthly_cap_minor_units = 10000 },
            ]
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.referral.chain_trigger, ChainTrigger::Signup);
        assert_eq!(config.referral.invite_ttl_hours, 72);
        assert_eq!(config.fraud_guard.mode, FraudGuardMode::Enforce);
        assert_eq!(
            config.referral.commission.rule_for(3).unwrap().monthly_cap_minor_units,
            Some(10000)
        );
    }
}
