//! Request and response DTOs

pub mod agent;
pub mod job;
pub mod listing;
pub mod review;
pub mod wallet;

pub use agent::*;
pub use job::*;
pub use listing::*;
pub use review::*;
pub use wallet::*;
