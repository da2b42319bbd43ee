use actix_web::web;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::entities::{BatchStatus, EarningStatus, InviteStatus};
use crate::error::IneligibilityReason;
use crate::handlers;
use crate::models::*;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::referral::get_referral_link,
        handlers::referral::get_network,
        handlers::referral::get_earnings_summary,
        handlers::referral::list_earnings,
        handlers::referral::get_stats,
        handlers::invite::send_invite,
        handlers::invite::accept_invite,
        handlers::transaction::transaction_completed,
        handlers::admin::run_payout_batch,
        handlers::admin::get_payout_batch,
    ),
    components(
        schemas(
            ReferralLinkResponse,
            NetworkResponse,
            NetworkLevelCount,
            UserStatsResponse,
            LevelStatsResponse,
            EarningResponse,
            EarningsSummaryResponse,
            EarningQuery,
            EarningStatus,
            SendInviteRequest,
            AcceptInviteRequest,
            InviteResponse,
            InviteStatus,
            RevenueTransaction,
            TransactionCompletedResponse,
            BatchResult,
            BatchStatus,
            PayoutFailure,
            ApiError,
            IneligibilityReason,
        )
    ),
    tags(
        (name = "referral", description = "Referral link, network, earnings and stats API"),
        (name = "invite", description = "Invite lifecycle API"),
        (name = "transaction", description = "Payment pipeline hook"),
        (name = "admin", description = "Payout batch operations"),
    ),
    info(
        title = "Referral Backend API",
        version = "1.0.0",
        description = "Multi-level referral program REST API documentation"
    ),
    servers(
        (url = "/api/v1", description = "Local server")
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
    .route(
        "/swagger-ui",
        web::get().to(|| async {
            actix_web::HttpResponse::Found()
                .append_header(("Location", "/swagger-ui/"))
                .finish()
        }),
    );
}
