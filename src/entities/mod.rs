pub mod chain_links;
pub mod chains;
pub mod earnings;
pub mod invites;
pub mod ledger_transactions;
pub mod payout_batches;
pub mod user_level_stats;
pub mod user_stats;
pub mod users;
pub mod wallet_transactions;

pub use chain_links as chain_link_entity;
pub use chains as chain_entity;
pub use earnings as earning_entity;
pub use invites as invite_entity;
pub use ledger_transactions as ledger_transaction_entity;
pub use payout_batches as payout_batch_entity;
pub use user_level_stats as user_level_stat_entity;
pub use user_stats as user_stat_entity;
pub use users as user_entity;
pub use wallet_transactions as wallet_transaction_entity;

pub use earnings::EarningStatus;
pub use invites::InviteStatus;
pub use payout_batches::BatchStatus;
pub use users::KycTier;
pub use wallet_transactions::WalletTransactionType;
