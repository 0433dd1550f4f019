//! Core types for the Agora marketplace
//!
//! Shared identifiers, monetary amounts, status enums, and the common error
//! taxonomy used across every Agora crate. This crate has no I/O: it only
//! defines data and the invariants that travel with it.

pub mod amount;
pub mod error;
pub mod status;
pub mod validate;

pub use amount::{credits_from_usdc, is_valid_amount, round_credits, Credits, MAX_AMOUNT};
pub use error::{AgoraError, AgoraResult, ErrorKind};
pub use status::{
    AgentStatus, DepositStatus, EscrowAction, EscrowStatus, JobStatus, ListingStatus, PriceModel,
    RefundCause, ReviewRole, WebhookStatus, WithdrawalStatus,
};
pub use validate::{
    validate_capability_tags, validate_endpoint_url, validate_skill_id, validate_text,
    MAX_COMMENT_LEN, MAX_DESCRIPTION_LEN, MAX_DISPLAY_NAME_LEN, MAX_MESSAGE_LEN,
};

/// Events emitted to webhooks, named on the wire as `job.<verb>` etc.
pub mod events {
    pub const JOB_PROPOSED: &str = "job.proposed";
    pub const JOB_COUNTERED: &str = "job.countered";
    pub const JOB_ACCEPTED: &str = "job.accepted";
    pub const JOB_FUNDED: &str = "job.funded";
    pub const JOB_STARTED: &str = "job.started";
    pub const JOB_DELIVERED: &str = "job.delivered";
    pub const JOB_COMPLETED: &str = "job.completed";
    pub const JOB_FAILED: &str = "job.failed";
    pub const JOB_DISPUTED: &str = "job.disputed";
    pub const JOB_CANCELLED: &str = "job.cancelled";
    pub const REVIEW_CREATED: &str = "review.created";
    pub const DEADLINE_WARNING: &str = "deadline_warning";
}
