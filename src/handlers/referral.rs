use crate::entities::EarningStatus;
use crate::models::*;
use crate::services::{InviteService, ReferralService};
use actix_web::{HttpResponse, ResponseError, Result, web};
use serde_json::json;

#[utoipa::path(
    get,
    path = "/referrals/{user_id}/link",
    tag = "referral",
    params(("user_id" = i64, Path, description = "用户ID")),
    responses(
        (status = 200, description = "获取推荐码与分享链接成功", body = ReferralLinkResponse),
        (status = 404, description = "用户不存在")
    )
)]
pub async fn get_referral_link(
    invite_service: web::Data<InviteService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    match invite_service.referral_link(path.into_inner()).await {
        Ok(resp) => Ok(HttpResponse::Ok().json(json!({"success": true, "data": resp}))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/referrals/{user_id}/network",
    tag = "referral",
    params(("user_id" = i64, Path, description = "用户ID")),
    responses(
        (status = 200, description = "获取下级网络成功", body = NetworkResponse)
    )
)]
pub async fn get_network(
    referral_service: web::Data<ReferralService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    match referral_service.get_network(path.into_inner()).await {
        Ok(resp) => Ok(HttpResponse::Ok().json(json!({"success": true, "data": resp}))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/referrals/{user_id}/earnings/summary",
    tag = "referral",
    params(("user_id" = i64, Path, description = "用户ID")),
    responses(
        (status = 200, description = "获取佣金汇总成功", body = EarningsSummaryResponse)
    )
)]
pub async fn get_earnings_summary(
    referral_service: web::Data<ReferralService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    match referral_service.get_earnings_summary(path.into_inner()).await {
        Ok(resp) => Ok(HttpResponse::Ok().json(json!({"success": true, "data": resp}))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/referrals/{user_id}/earnings",
    tag = "referral",
    params(
        ("user_id" = i64, Path, description = "用户ID"),
        ("status" = Option<EarningStatus>, Query, description = "pending / paid"),
        ("page" = Option<u32>, Query, description = "页码"),
        ("per_page" = Option<u32>, Query, description = "每页条数")
    ),
    responses(
        (status = 200, description = "获取佣金列表成功", body = PaginatedResponse<EarningResponse>)
    )
)]
pub async fn list_earnings(
    referral_service: web::Data<ReferralService>,
    path: web::Path<i64>,
    query: web::Query<EarningQuery>,
) -> Result<HttpResponse> {
    match referral_service
        .list_earnings(path.into_inner(), &query.into_inner())
        .await
    {
        Ok(resp) => Ok(HttpResponse::Ok().json(json!({"success": true, "data": resp}))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/referrals/{user_id}/stats",
    tag = "referral",
    params(("user_id" = i64, Path, description = "用户ID")),
    responses(
        (status = 200, description = "获取统计成功", body = UserStatsResponse)
    )
)]
pub async fn get_stats(
    referral_service: web::Data<ReferralService>,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    match referral_service.get_stats(path.into_inner()).await {
        Ok(resp) => Ok(HttpResponse::Ok().json(json!({"success": true, "data": resp}))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn referral_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/referrals/{user_id}")
            .route("/link", web::get().to(get_referral_link))
            .route("/network", web::get().to(get_network))
            .route("/earnings/summary", web::get().to(get_earnings_summary))
            .route("/earnings", web::get().to(list_earnings))
            .route("/stats", web::get().to(get_stats)),
    );
}
