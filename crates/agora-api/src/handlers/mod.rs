//! HTTP handlers

pub mod agents;
pub mod fees;
pub mod health;
pub mod jobs;
pub mod listings;
pub mod reviews;
pub mod wallet;
