use crate::error::{AppError, AppResult};
use regex::Regex;
use std::sync::LazyLock;

static US_PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+1\d{10}$").expect("valid phone regex"));

/// 验证美国手机号格式
pub fn validate_us_phone(phone: &str) -> AppResult<()> {
    if !US_PHONE.is_match(phone) {
        return Err(AppError::ValidationError(
            "Invalid phone number, expected US format (+1xxxxxxxxxx)".to_string(),
        ));
    }

    Ok(())
}

/// 格式化手机号，确保以+1开头
pub fn format_us_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() == 11 && digits.starts_with('1') {
        format!("+{digits}")
    } else if digits.len() == 10 {
        format!("+1{digits}")
    } else {
        phone.to_string()
    }
}

/// 规范化并校验，邀请目标统一用这个格式存储
pub fn normalize_us_phone(phone: &str) -> AppResult<String> {
    let formatted = format_us_phone(phone.trim());
    validate_us_phone(&formatted)?;
    Ok(formatted)
}
