use crate::models::*;
use crate::services::InviteService;
use actix_web::{HttpResponse, ResponseError, Result, web};
use serde_json::json;

#[utoipa::path(
    post,
    path = "/invites",
    tag = "invite",
    request_body = SendInviteRequest,
    responses(
        (status = 200, description = "邀请已创建", body = InviteResponse),
        (status = 400, description = "手机号格式错误"),
        (status = 422, description = "不满足邀请条件，error.code 为具体原因")
    )
)]
pub async fn send_invite(
    invite_service: web::Data<InviteService>,
    request: web::Json<SendInviteRequest>,
) -> Result<HttpResponse> {
    let request = request.into_inner();
    match invite_service
        .send_invite(request.requester_id, &request.phone)
        .await
    {
        Ok(invite) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": InviteResponse::from(invite),
            "message": "邀请已发送"
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/invites/accept",
    tag = "invite",
    request_body = AcceptInviteRequest,
    responses(
        (status = 200, description = "注册关联成功", body = InviteResponse),
        (status = 422, description = "邀请码无效、过期或已使用")
    )
)]
pub async fn accept_invite(
    invite_service: web::Data<InviteService>,
    request: web::Json<AcceptInviteRequest>,
) -> Result<HttpResponse> {
    let request = request.into_inner();
    match invite_service
        .accept_signup(&request.code, request.user_id)
        .await
    {
        Ok(invite) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": InviteResponse::from(invite)
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn invite_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/invites")
            .route("", web::post().to(send_invite))
            .route("/accept", web::post().to(accept_invite)),
    );
}
