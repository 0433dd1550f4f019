//! Agora marketplace core
//!
//! The transactional heart of the marketplace: the job lifecycle state
//! machine with bounded negotiation, the escrow ledger with double-spend-safe
//! funding/release/refund and append-only audit, the fee engine, listing
//! discovery, registration, and reputation.
//!
//! Concurrency model: no in-process locks. Every balance or escrow mutation
//! acquires the relevant PostgreSQL row locks inside a single transaction;
//! ephemeral coordination (nonces, rate buckets, deadlines) lives in the
//! key-value store.

pub mod agents;
pub mod escrow;
pub mod fees;
pub mod jobs;
pub mod listings;
pub mod reputation;

pub use agents::{AgentService, RegistrationConfig, RegistrationInput};
pub use escrow::EscrowEngine;
pub use fees::{FeeBreakdown, FeeConfig, FeeEngine};
pub use jobs::{
    can_transition, redacted_result, AcceptInput, CounterInput, JobService, NegotiationRound,
    ProposalInput,
};
pub use listings::{rank_listings, ListingInput, ListingService};
pub use reputation::{
    display_reputation, updated_average, ReviewInput, ReviewService, NEW_AGENT_REVIEW_THRESHOLD,
};
