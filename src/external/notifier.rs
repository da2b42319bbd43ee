use crate::error::AppResult;
use async_trait::async_trait;

/// 邀请短信投递。调用方以 fire-and-forget 方式使用，失败只记日志。
#[async_trait]
pub trait InviteNotifier: Send + Sync {
    async fn send_invite(&self, phone: &str, inviter_name: &str, link: &str) -> AppResult<()>;
}

/// 未配置短信通道时使用
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl InviteNotifier for LogNotifier {
    async fn send_invite(&self, phone: &str, inviter_name: &str, link: &str) -> AppResult<()> {
        log::info!("SMS disabled, invite for {phone} from {inviter_name} not delivered: {link}");
        Ok(())
    }
}
