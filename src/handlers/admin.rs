use crate::error::AppError;
use crate::models::BatchResult;
use crate::services::PayoutBatchProcessor;
use actix_web::{HttpResponse, ResponseError, Result, web};
use chrono::NaiveDate;
use serde_json::json;

fn parse_date(raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::ValidationError(format!("Invalid date {raw}, expected YYYY-MM-DD")))
}

#[utoipa::path(
    post,
    path = "/admin/payout-batches/{date}",
    tag = "admin",
    params(("date" = String, Path, description = "批次日期 (YYYY-MM-DD)")),
    responses(
        (status = 200, description = "批次已执行（已完成的批次直接返回原结果）", body = BatchResult),
        (status = 400, description = "日期格式错误"),
        (status = 504, description = "批次执行超时")
    )
)]
pub async fn run_payout_batch(
    processor: web::Data<PayoutBatchProcessor>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let date = match parse_date(&path) {
        Ok(date) => date,
        Err(e) => return Ok(e.error_response()),
    };
    match processor.run_daily_batch(date).await {
        Ok(result) => Ok(HttpResponse::Ok().json(json!({"success": true, "data": result}))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/admin/payout-batches/{date}",
    tag = "admin",
    params(("date" = String, Path, description = "批次日期 (YYYY-MM-DD)")),
    responses(
        (status = 200, description = "获取批次成功", body = BatchResult),
        (status = 404, description = "批次不存在")
    )
)]
pub async fn get_payout_batch(
    processor: web::Data<PayoutBatchProcessor>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let date = match parse_date(&path) {
        Ok(date) => date,
        Err(e) => return Ok(e.error_response()),
    };
    match processor.get_batch(date).await {
        Ok(Some(result)) => Ok(HttpResponse::Ok().json(json!({"success": true, "data": result}))),
        Ok(None) => Ok(AppError::NotFound(format!("No payout batch for {date}")).error_response()),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn admin_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .route("/payout-batches/{date}", web::post().to(run_payout_batch))
            .route("/payout-batches/{date}", web::get().to(get_payout_batch)),
    );
}
