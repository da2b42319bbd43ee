pub mod chain_builder;
pub mod earnings_calculator;
pub mod fraud_guard;
pub mod invite_service;
pub mod payout_batch_processor;
pub mod referral_service;
pub mod stats_aggregator;
pub mod wallet;

pub use chain_builder::*;
pub use earnings_calculator::*;
pub use fraud_guard::*;
pub use invite_service::*;
pub use payout_batch_processor::*;
pub use referral_service::*;
pub use stats_aggregator::*;
pub use wallet::*;
