//! Deliverable verification
//!
//! Acceptance criteria come in two versions. Version 1.0 is a declarative
//! test suite executed in-process with no network or filesystem access
//! (except the explicitly carved-out `http_status` check). Version 2.0 is
//! an arbitrary script executed against the deliverable inside a
//! network-denied, resource-capped container.
//!
//! Criteria documents are validated at proposal time and attested by the
//! canonical-JSON SHA-256 hash, so both parties can prove what they agreed
//! to verify.

pub mod criteria;
pub mod expr;
pub mod runner;
pub mod sandbox;

pub use criteria::{Criteria, DeclarativeSuite, PassThreshold, ScriptCriteria, TestSpec, TestType};
pub use runner::{CriteriaRunner, SuiteReport, TestOutcome, VerificationContext, VerifyConfig};
pub use sandbox::{Sandbox, SandboxConfig, SandboxReport};
