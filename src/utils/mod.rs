pub mod code_generator;
pub mod money;
pub mod phone;
pub mod referral_code;

pub use code_generator::generate_code;
pub use money::*;
pub use phone::*;
pub use referral_code::{generate_unique_invite_code, generate_unique_referral_code};
