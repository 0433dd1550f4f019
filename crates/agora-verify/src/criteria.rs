//! Acceptance criteria documents
//!
//! Parsing and validation of both criteria versions. Validation runs at
//! job proposal time so malformed criteria are rejected before any money
//! moves; the hash of the canonical serialization is what the seller
//! attests to on accept.

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use agora_types::{AgoraError, AgoraResult};

pub const MAX_TESTS_PER_SUITE: usize = 20;
pub const MAX_EXPRESSION_LEN: usize = 500;
pub const MAX_SCRIPT_BYTES: usize = 1024 * 1024;
pub const MAX_TIMEOUT_SECONDS: u64 = 300;
pub const MAX_MEMORY_LIMIT_MB: u64 = 512;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 60;
pub const DEFAULT_MEMORY_LIMIT_MB: u64 = 256;

/// Runtime labels and the immutable images they map to. Closed set: any
/// other label is rejected at validation.
pub const ALLOWED_RUNTIMES: &[(&str, &str)] = &[
    ("python:3.13", "python:3.13-slim"),
    ("python:3.12", "python:3.12-slim"),
    ("node:20", "node:20-slim"),
    ("node:22", "node:22-slim"),
    ("bash:5", "bash:5"),
    ("ruby:3.3", "ruby:3.3-slim"),
];

pub fn runtime_image(runtime: &str) -> Option<&'static str> {
    ALLOWED_RUNTIMES
        .iter()
        .find(|(label, _)| *label == runtime)
        .map(|(_, image)| *image)
}

/// A parsed criteria document.
#[derive(Debug, Clone)]
pub enum Criteria {
    V1(DeclarativeSuite),
    V2(ScriptCriteria),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclarativeSuite {
    pub tests: Vec<TestSpec>,
    #[serde(default)]
    pub pass_threshold: PassThreshold,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSpec {
    pub test_id: String,
    #[serde(rename = "type")]
    pub test_type: TestType,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    JsonSchema,
    CountGte,
    CountLte,
    Contains,
    LatencyLte,
    HttpStatus,
    Checksum,
    Assertion,
}

/// Pass threshold for a declarative suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PassThreshold {
    Named(NamedThreshold),
    MinPass { min_pass: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamedThreshold {
    All,
    Majority,
}

impl Default for PassThreshold {
    fn default() -> Self {
        PassThreshold::Named(NamedThreshold::All)
    }
}

impl PassThreshold {
    /// Whether `passed` of `total` tests satisfies the threshold.
    pub fn satisfied(&self, passed: usize, total: usize) -> bool {
        match self {
            PassThreshold::Named(NamedThreshold::All) => passed == total,
            PassThreshold::Named(NamedThreshold::Majority) => passed * 2 > total,
            PassThreshold::MinPass { min_pass } => passed >= *min_pass as usize,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptCriteria {
    /// Base64-encoded verification script.
    pub script: String,
    #[serde(default = "default_runtime")]
    pub runtime: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_memory")]
    pub memory_limit_mb: u64,
}

fn default_runtime() -> String {
    "python:3.13".to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

fn default_memory() -> u64 {
    DEFAULT_MEMORY_LIMIT_MB
}

impl Criteria {
    /// Parse and validate a criteria document.
    pub fn parse(value: &Value) -> AgoraResult<Criteria> {
        let version = value
            .get("version")
            .and_then(Value::as_str)
            .ok_or_else(|| AgoraError::Schema("criteria must declare a version".into()))?;

        match version {
            "1.0" => {
                let suite: DeclarativeSuite = serde_json::from_value(value.clone())
                    .map_err(|e| AgoraError::Schema(format!("invalid criteria: {}", e)))?;
                suite.validate()?;
                Ok(Criteria::V1(suite))
            }
            "2.0" => {
                let script: ScriptCriteria = serde_json::from_value(value.clone())
                    .map_err(|e| AgoraError::Schema(format!("invalid criteria: {}", e)))?;
                script.validate()?;
                Ok(Criteria::V2(script))
            }
            other => Err(AgoraError::Schema(format!(
                "unsupported criteria version: {}",
                other
            ))),
        }
    }
}

impl DeclarativeSuite {
    pub fn validate(&self) -> AgoraResult<()> {
        if self.tests.is_empty() {
            return Err(AgoraError::Schema("criteria must contain at least one test".into()));
        }
        if self.tests.len() > MAX_TESTS_PER_SUITE {
            return Err(AgoraError::Schema(format!(
                "at most {} tests per suite",
                MAX_TESTS_PER_SUITE
            )));
        }
        for test in &self.tests {
            if test.test_id.is_empty() {
                return Err(AgoraError::Schema("test_id must not be empty".into()));
            }
            if test.test_type == TestType::Assertion {
                let expr = test
                    .params
                    .get("expression")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                if expr.len() > MAX_EXPRESSION_LEN {
                    return Err(AgoraError::Schema(format!(
                        "assertion expression exceeds {} characters",
                        MAX_EXPRESSION_LEN
                    )));
                }
            }
        }
        if let PassThreshold::MinPass { min_pass } = self.pass_threshold {
            if min_pass as usize > self.tests.len() {
                return Err(AgoraError::Schema(
                    "min_pass cannot exceed the number of tests".into(),
                ));
            }
        }
        Ok(())
    }
}

impl ScriptCriteria {
    pub fn validate(&self) -> AgoraResult<()> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&self.script)
            .map_err(|_| AgoraError::Schema("script must be valid base64".into()))?;
        if bytes.is_empty() {
            return Err(AgoraError::Schema("script must not be empty".into()));
        }
        if bytes.len() > MAX_SCRIPT_BYTES {
            return Err(AgoraError::Schema(format!(
                "script too large: {} bytes (max {})",
                bytes.len(),
                MAX_SCRIPT_BYTES
            )));
        }
        if runtime_image(&self.runtime).is_none() {
            return Err(AgoraError::Schema(format!(
                "unsupported runtime: {} (allowed: {})",
                self.runtime,
                ALLOWED_RUNTIMES
                    .iter()
                    .map(|(l, _)| *l)
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
        if self.timeout_seconds == 0 || self.timeout_seconds > MAX_TIMEOUT_SECONDS {
            return Err(AgoraError::Schema(format!(
                "timeout_seconds must be within 1..={}",
                MAX_TIMEOUT_SECONDS
            )));
        }
        if self.memory_limit_mb == 0 || self.memory_limit_mb > MAX_MEMORY_LIMIT_MB {
            return Err(AgoraError::Schema(format!(
                "memory_limit_mb must be within 1..={}",
                MAX_MEMORY_LIMIT_MB
            )));
        }
        Ok(())
    }

    pub fn script_bytes(&self) -> AgoraResult<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.script)
            .map_err(|_| AgoraError::Schema("script must be valid base64".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_v1_suite() {
        let doc = json!({
            "version": "1.0",
            "tests": [
                {"test_id": "t1", "type": "count_gte", "params": {"path": "$", "min_count": 1}},
                {"test_id": "t2", "type": "contains", "params": {"pattern": "ok"}},
            ],
            "pass_threshold": "all",
        });
        let Criteria::V1(suite) = Criteria::parse(&doc).unwrap() else {
            panic!("expected v1");
        };
        assert_eq!(suite.tests.len(), 2);
        assert!(suite.pass_threshold.satisfied(2, 2));
        assert!(!suite.pass_threshold.satisfied(1, 2));
    }

    #[test]
    fn parses_v2_script() {
        let doc = json!({
            "version": "2.0",
            "script": base64::engine::general_purpose::STANDARD.encode("exit 0"),
            "runtime": "bash:5",
            "timeout_seconds": 30,
            "memory_limit_mb": 128,
        });
        let Criteria::V2(script) = Criteria::parse(&doc).unwrap() else {
            panic!("expected v2");
        };
        assert_eq!(script.runtime, "bash:5");
        assert_eq!(script.script_bytes().unwrap(), b"exit 0");
    }

    #[test]
    fn rejects_unknown_version_and_missing_version() {
        assert!(Criteria::parse(&json!({"version": "3.0", "tests": []})).is_err());
        assert!(Criteria::parse(&json!({"tests": []})).is_err());
    }

    #[test]
    fn rejects_oversized_suite() {
        let tests: Vec<Value> = (0..21)
            .map(|i| json!({"test_id": format!("t{}", i), "type": "contains", "params": {"pattern": "x"}}))
            .collect();
        let doc = json!({"version": "1.0", "tests": tests});
        assert!(Criteria::parse(&doc).is_err());
    }

    #[test]
    fn rejects_bad_script_criteria() {
        let enc = |s: &str| base64::engine::general_purpose::STANDARD.encode(s);
        // Not base64
        assert!(Criteria::parse(&json!({"version": "2.0", "script": "!!!"})).is_err());
        // Unknown runtime
        assert!(Criteria::parse(
            &json!({"version": "2.0", "script": enc("x"), "runtime": "perl:5"})
        )
        .is_err());
        // Timeout over the cap
        assert!(Criteria::parse(
            &json!({"version": "2.0", "script": enc("x"), "timeout_seconds": 301})
        )
        .is_err());
        // Memory over the cap
        assert!(Criteria::parse(
            &json!({"version": "2.0", "script": enc("x"), "memory_limit_mb": 513})
        )
        .is_err());
    }

    #[test]
    fn thresholds() {
        let majority = PassThreshold::Named(NamedThreshold::Majority);
        assert!(majority.satisfied(2, 3));
        assert!(!majority.satisfied(1, 2));
        assert!(!majority.satisfied(1, 3));

        let min2 = PassThreshold::MinPass { min_pass: 2 };
        assert!(min2.satisfied(2, 5));
        assert!(!min2.satisfied(1, 5));
    }

    #[test]
    fn min_pass_cannot_exceed_test_count() {
        let doc = json!({
            "version": "1.0",
            "tests": [{"test_id": "t1", "type": "contains", "params": {"pattern": "x"}}],
            "pass_threshold": {"min_pass": 2},
        });
        assert!(Criteria::parse(&doc).is_err());
    }
}
