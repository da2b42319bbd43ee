use crate::models::*;
use crate::services::ReferralService;
use actix_web::{HttpResponse, Result, web};

/// 支付流程的回调，始终返回 200，佣金计算失败只记录日志
#[utoipa::path(
    post,
    path = "/transactions/completed",
    tag = "transaction",
    request_body = RevenueTransaction,
    responses(
        (status = 200, description = "已处理", body = TransactionCompletedResponse)
    )
)]
pub async fn transaction_completed(
    referral_service: web::Data<ReferralService>,
    request: web::Json<RevenueTransaction>,
) -> Result<HttpResponse> {
    let resp = referral_service
        .on_transaction_completed(&request.into_inner())
        .await;
    Ok(HttpResponse::Ok().json(ApiResponse::success(resp)))
}

pub fn transaction_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/transactions").route("/completed", web::post().to(transaction_completed)),
    );
}
