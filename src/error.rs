use crate::models::ApiResponse;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

pub type AppResult<T> = Result<T, AppError>;

/// Domain rejections that the caller renders as a precise, user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IneligibilityReason {
    KycNotVerified,
    AccountTooNew,
    DailyInviteLimitReached,
    MonthlyInviteLimitReached,
    AlreadyInvited,
    TargetAlreadyRegistered,
    SelfReferral,
    CyclicReferral,
    InviteNotFound,
    InviteExpired,
    InviteAlreadyUsed,
    AlreadyReferred,
}

impl IneligibilityReason {
    pub fn code(&self) -> &'static str {
        match self {
            IneligibilityReason::KycNotVerified => "kyc_not_verified",
            IneligibilityReason::AccountTooNew => "account_too_new",
            IneligibilityReason::DailyInviteLimitReached => "daily_invite_limit_reached",
            IneligibilityReason::MonthlyInviteLimitReached => "monthly_invite_limit_reached",
            IneligibilityReason::AlreadyInvited => "already_invited",
            IneligibilityReason::TargetAlreadyRegistered => "target_already_registered",
            IneligibilityReason::SelfReferral => "self_referral",
            IneligibilityReason::CyclicReferral => "cyclic_referral",
            IneligibilityReason::InviteNotFound => "invite_not_found",
            IneligibilityReason::InviteExpired => "invite_expired",
            IneligibilityReason::InviteAlreadyUsed => "invite_already_used",
            IneligibilityReason::AlreadyReferred => "already_referred",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            IneligibilityReason::KycNotVerified => "Identity verification is required to invite",
            IneligibilityReason::AccountTooNew => "Your account is too new to send invites",
            IneligibilityReason::DailyInviteLimitReached => "Daily invite limit reached",
            IneligibilityReason::MonthlyInviteLimitReached => "Monthly invite limit reached",
            IneligibilityReason::AlreadyInvited => "You have already invited this person",
            IneligibilityReason::TargetAlreadyRegistered => "This person already has an account",
            IneligibilityReason::SelfReferral => "You cannot refer yourself",
            IneligibilityReason::CyclicReferral => "This referral would create a cycle",
            IneligibilityReason::InviteNotFound => "Invite code not found",
            IneligibilityReason::InviteExpired => "Invite has expired",
            IneligibilityReason::InviteAlreadyUsed => "Invite has already been used",
            IneligibilityReason::AlreadyReferred => "User already has a referrer",
        }
    }
}

impl std::fmt::Display for IneligibilityReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Ineligible,
    Invalid,
    SystemFailure,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Ineligible: {0}")]
    Ineligible(IneligibilityReason),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("External API error: {0}")]
    ExternalApiError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("HTTP request error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Ineligible(_) => ErrorKind::Ineligible,
            AppError::ValidationError(_) | AppError::NotFound(_) => ErrorKind::Invalid,
            _ => ErrorKind::SystemFailure,
        }
    }

    pub fn is_system_failure(&self) -> bool {
        self.kind() == ErrorKind::SystemFailure
    }
}

impl From<IneligibilityReason> for AppError {
    fn from(reason: IneligibilityReason) -> Self {
        AppError::Ineligible(reason)
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status_code, error_code, message) = match self {
            AppError::Ineligible(reason) => {
                log::info!("Ineligible request: {reason}");
                (
                    actix_web::http::StatusCode::UNPROCESSABLE_ENTITY,
                    reason.code(),
                    reason.message().to_string(),
                )
            }
            AppError::ValidationError(msg) => {
                log::warn!("Validation error: {msg}");
                (
                    actix_web::http::StatusCode::BAD_REQUEST,
                    "VALIDATION_ERROR",
                    msg.clone(),
                )
            }
            AppError::NotFound(msg) => (
                actix_web::http::StatusCode::NOT_FOUND,
                "NOT_FOUND",
                msg.clone(),
            ),
            AppError::ExternalApiError(msg) => {
                log::error!("External API error: {msg}");
                (
                    actix_web::http::StatusCode::BAD_GATEWAY,
                    "EXTERNAL_API_ERROR",
                    msg.clone(),
                )
            }
            AppError::DatabaseError(err) => {
                log::error!("Database error: {err}");
                (
                    actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Database error".to_string(),
                )
            }
            AppError::Timeout(msg) => {
                log::error!("Timeout: {msg}");
                (
                    actix_web::http::StatusCode::GATEWAY_TIMEOUT,
                    "TIMEOUT",
                    msg.clone(),
                )
            }
            _ => {
                log::error!("Internal error: {self}");
                (
                    actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
        };

        HttpResponse::build(status_code).json(ApiResponse::<()>::error(error_code, message))
    }
}
