pub mod notifier;
pub mod twilio;

pub use notifier::*;
pub use twilio::*;
