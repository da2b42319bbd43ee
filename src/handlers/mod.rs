pub mod admin;
pub mod invite;
pub mod referral;
pub mod transaction;

pub use admin::admin_config;
pub use invite::invite_config;
pub use referral::referral_config;
pub use transaction::transaction_config;
