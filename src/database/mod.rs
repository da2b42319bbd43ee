pub mod aggregate;
pub mod connection;

pub use aggregate::*;
pub use connection::*;
