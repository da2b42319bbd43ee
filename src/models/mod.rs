pub mod common;
pub mod earning;
pub mod invite;
pub mod pagination;
pub mod payout;
pub mod referral;
pub mod transaction;

pub use common::*;
pub use earning::*;
pub use invite::*;
pub use pagination::*;
pub use payout::*;
pub use referral::*;
pub use transaction::*;
