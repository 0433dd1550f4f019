//! Acceptance-test execution
//!
//! Declarative suites run in-process against the deliverable; no test may
//! touch the filesystem, and only the explicitly carved-out `http_status`
//! check (disabled by config where unwanted) performs network I/O. Script
//! criteria delegate to the sandbox.

use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use agora_crypto::criteria_hash;
use agora_types::AgoraResult;

use crate::criteria::{Criteria, DeclarativeSuite, TestSpec, TestType};
use crate::expr;
use crate::sandbox::{Sandbox, SandboxReport};

/// Verification limits and switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Allow the http_status test to perform outbound GETs.
    pub allow_http_status: bool,
    /// Wall-clock budget per individual test.
    #[serde(default = "default_test_timeout")]
    pub per_test_timeout_secs: u64,
    /// Wall-clock budget for a whole suite.
    #[serde(default = "default_suite_timeout")]
    pub per_suite_timeout_secs: u64,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            allow_http_status: true,
            per_test_timeout_secs: default_test_timeout(),
            per_suite_timeout_secs: default_suite_timeout(),
        }
    }
}

fn default_test_timeout() -> u64 {
    60
}

fn default_suite_timeout() -> u64 {
    300
}

/// Timing context for latency checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerificationContext {
    pub started_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// One test's outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestOutcome {
    pub test_id: String,
    pub passed: bool,
    pub message: String,
}

impl TestOutcome {
    fn pass(test_id: &str, message: impl Into<String>) -> Self {
        Self {
            test_id: test_id.to_string(),
            passed: true,
            message: message.into(),
        }
    }

    fn fail(test_id: &str, message: impl Into<String>) -> Self {
        Self {
            test_id: test_id.to_string(),
            passed: false,
            message: message.into(),
        }
    }
}

/// The full verification report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub passed: bool,
    pub results: Vec<TestOutcome>,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<SandboxReport>,
    /// CPU seconds billed by the verification fee.
    pub cpu_seconds: f64,
}

impl SuiteReport {
    fn rejection(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            passed: false,
            results: vec![TestOutcome {
                test_id: "criteria".into(),
                passed: false,
                message: message.clone(),
            }],
            summary: message,
            sandbox: None,
            cpu_seconds: 0.0,
        }
    }
}

pub struct CriteriaRunner {
    config: VerifyConfig,
    sandbox: Sandbox,
    http: reqwest::Client,
}

impl CriteriaRunner {
    pub fn new(config: VerifyConfig, sandbox: Sandbox) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        Self {
            config,
            sandbox,
            http,
        }
    }

    /// Validate a criteria document without running it. Used at proposal
    /// time so malformed criteria never reach a funded job.
    pub fn validate(&self, criteria: &Value) -> AgoraResult<()> {
        Criteria::parse(criteria).map(|_| ())
    }

    /// Run the criteria against a deliverable. Never errors outward: every
    /// failure mode becomes a failed report.
    pub async fn run(
        &self,
        criteria: &Value,
        deliverable: &Value,
        ctx: &VerificationContext,
    ) -> SuiteReport {
        let parsed = match Criteria::parse(criteria) {
            Ok(parsed) => parsed,
            Err(e) => return SuiteReport::rejection(e.to_string()),
        };

        match parsed {
            Criteria::V1(suite) => {
                let budget = Duration::from_secs(self.config.per_suite_timeout_secs);
                match tokio::time::timeout(budget, self.run_suite(&suite, deliverable, ctx)).await {
                    Ok(report) => report,
                    Err(_) => SuiteReport::rejection("suite timed out"),
                }
            }
            Criteria::V2(script) => {
                let report = self.sandbox.run(&script, deliverable).await;
                let outcome = if report.passed {
                    TestOutcome::pass("script", truncate(&report.stdout, 500))
                } else if report.timed_out {
                    TestOutcome::fail("script", "timed_out")
                } else {
                    let message = report
                        .error
                        .clone()
                        .unwrap_or_else(|| truncate(&report.stderr, 500));
                    TestOutcome::fail("script", message)
                };
                SuiteReport {
                    passed: report.passed,
                    summary: format!("{}/1 passed", if report.passed { 1 } else { 0 }),
                    results: vec![outcome],
                    cpu_seconds: report.duration_seconds,
                    sandbox: Some(report),
                }
            }
        }
    }

    async fn run_suite(
        &self,
        suite: &DeclarativeSuite,
        deliverable: &Value,
        ctx: &VerificationContext,
    ) -> SuiteReport {
        let mut results = Vec::with_capacity(suite.tests.len());
        for test in &suite.tests {
            let budget = Duration::from_secs(self.config.per_test_timeout_secs);
            let outcome = match tokio::time::timeout(budget, self.run_test(test, deliverable, ctx))
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => TestOutcome::fail(&test.test_id, "test timed out"),
            };
            results.push(outcome);
        }

        let passed_count = results.iter().filter(|r| r.passed).count();
        SuiteReport {
            passed: suite.pass_threshold.satisfied(passed_count, results.len()),
            summary: format!("{}/{} passed", passed_count, results.len()),
            results,
            sandbox: None,
            cpu_seconds: 0.0,
        }
    }

    async fn run_test(
        &self,
        test: &TestSpec,
        deliverable: &Value,
        ctx: &VerificationContext,
    ) -> TestOutcome {
        let id = &test.test_id;
        match test.test_type {
            TestType::JsonSchema => run_json_schema(id, deliverable, &test.params),
            TestType::CountGte => run_count(id, deliverable, &test.params, true),
            TestType::CountLte => run_count(id, deliverable, &test.params, false),
            TestType::Contains => run_contains(id, deliverable, &test.params),
            TestType::LatencyLte => run_latency(id, &test.params, ctx),
            TestType::Checksum => run_checksum(id, deliverable, &test.params),
            TestType::Assertion => run_assertion(id, deliverable, &test.params),
            TestType::HttpStatus => self.run_http_status(id, deliverable, &test.params).await,
        }
    }

    async fn run_http_status(&self, id: &str, deliverable: &Value, params: &Value) -> TestOutcome {
        if !self.config.allow_http_status {
            return TestOutcome::fail(id, "http_status checks are disabled");
        }
        let expected = params
            .get("expected_status")
            .and_then(Value::as_u64)
            .unwrap_or(200);

        let url = match deliverable {
            Value::String(s) => s.clone(),
            Value::Object(map) => match map.get("url").and_then(Value::as_str) {
                Some(url) => url.to_string(),
                None => return TestOutcome::fail(id, "deliverable carries no URL"),
            },
            _ => return TestOutcome::fail(id, "deliverable is not a URL"),
        };

        match self.http.get(&url).send().await {
            Ok(resp) => {
                let actual = resp.status().as_u16() as u64;
                if actual == expected {
                    TestOutcome::pass(id, format!("HTTP status {} == {}", actual, expected))
                } else {
                    TestOutcome::fail(id, format!("HTTP status {} != {}", actual, expected))
                }
            }
            Err(e) => TestOutcome::fail(id, format!("request failed: {}", e)),
        }
    }
}

// ============================================================================
// Individual test kinds
// ============================================================================

fn run_json_schema(id: &str, deliverable: &Value, params: &Value) -> TestOutcome {
    let Some(schema) = params.get("schema") else {
        return TestOutcome::fail(id, "missing schema parameter");
    };
    let compiled = match jsonschema::draft202012::new(schema) {
        Ok(compiled) => compiled,
        Err(e) => return TestOutcome::fail(id, format!("invalid schema: {}", e)),
    };
    match compiled.validate(deliverable) {
        Ok(()) => TestOutcome::pass(id, ""),
        Err(error) => TestOutcome::fail(id, truncate(&error.to_string(), 200)),
    }
}

fn run_count(id: &str, deliverable: &Value, params: &Value, gte: bool) -> TestOutcome {
    let path = params.get("path").and_then(Value::as_str).unwrap_or("$");
    let target = match resolve_path(deliverable, path) {
        Ok(target) => target,
        Err(e) => return TestOutcome::fail(id, e),
    };
    let Value::Array(items) = target else {
        return TestOutcome::fail(id, "target is not an array");
    };
    let count = items.len() as u64;

    if gte {
        let Some(min) = params.get("min_count").and_then(Value::as_u64) else {
            return TestOutcome::fail(id, "missing min_count parameter");
        };
        if count >= min {
            TestOutcome::pass(id, format!("count {} >= {}", count, min))
        } else {
            TestOutcome::fail(id, format!("count {} < {}", count, min))
        }
    } else {
        let Some(max) = params.get("max_count").and_then(Value::as_u64) else {
            return TestOutcome::fail(id, "missing max_count parameter");
        };
        if count <= max {
            TestOutcome::pass(id, format!("count {} <= {}", count, max))
        } else {
            TestOutcome::fail(id, format!("count {} > {}", count, max))
        }
    }
}

fn run_contains(id: &str, deliverable: &Value, params: &Value) -> TestOutcome {
    let Some(pattern) = params.get("pattern").and_then(Value::as_str) else {
        return TestOutcome::fail(id, "missing pattern parameter");
    };
    let is_regex = params.get("is_regex").and_then(Value::as_bool).unwrap_or(false);

    let haystack = match deliverable {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    if is_regex {
        match Regex::new(pattern) {
            Ok(re) if re.is_match(&haystack) => TestOutcome::pass(id, ""),
            Ok(_) => TestOutcome::fail(id, format!("pattern '{}' not found", pattern)),
            Err(e) => TestOutcome::fail(id, format!("invalid regex: {}", e)),
        }
    } else if haystack.contains(pattern) {
        TestOutcome::pass(id, "")
    } else {
        TestOutcome::fail(id, format!("substring '{}' not found", pattern))
    }
}

fn run_latency(id: &str, params: &Value, ctx: &VerificationContext) -> TestOutcome {
    let Some(max_seconds) = params.get("max_seconds").and_then(Value::as_f64) else {
        return TestOutcome::fail(id, "missing max_seconds parameter");
    };

    let actual = match params.get("actual_seconds").and_then(Value::as_f64) {
        Some(actual) => actual,
        None => match (ctx.started_at, ctx.delivered_at) {
            (Some(started), Some(delivered)) => {
                (delivered - started).num_milliseconds() as f64 / 1000.0
            }
            _ => return TestOutcome::fail(id, "cannot determine delivery latency"),
        },
    };

    if actual <= max_seconds {
        TestOutcome::pass(id, format!("latency {:.1}s <= {}s", actual, max_seconds))
    } else {
        TestOutcome::fail(id, format!("latency {:.1}s > {}s", actual, max_seconds))
    }
}

fn run_checksum(id: &str, deliverable: &Value, params: &Value) -> TestOutcome {
    let Some(expected) = params.get("expected_hash").and_then(Value::as_str) else {
        return TestOutcome::fail(id, "missing expected_hash parameter");
    };
    let actual = criteria_hash(deliverable);
    if actual == expected.to_lowercase() {
        TestOutcome::pass(id, "")
    } else {
        TestOutcome::fail(
            id,
            format!("hash mismatch: {}... != {}...", &actual[..16.min(actual.len())], &expected[..16.min(expected.len())]),
        )
    }
}

fn run_assertion(id: &str, deliverable: &Value, params: &Value) -> TestOutcome {
    let Some(expression) = params.get("expression").and_then(Value::as_str) else {
        return TestOutcome::fail(id, "missing expression parameter");
    };
    if expression.len() > crate::criteria::MAX_EXPRESSION_LEN {
        return TestOutcome::fail(id, "expression too long");
    }
    match expr::evaluate(expression, deliverable) {
        Ok(true) => TestOutcome::pass(id, ""),
        Ok(false) => TestOutcome::fail(id, format!("assertion failed: {}", expression)),
        Err(e) => TestOutcome::fail(id, e.to_string()),
    }
}

/// Minimal JSON-pointer-like path: `$`, then `.field` and `[index]` steps.
fn resolve_path<'a>(data: &'a Value, path: &str) -> Result<&'a Value, String> {
    static STEP: OnceLock<Regex> = OnceLock::new();
    let step = STEP.get_or_init(|| Regex::new(r"\.([A-Za-z0-9_-]+)|\[(\d+)\]").expect("static pattern"));

    let rest = path.strip_prefix('$').unwrap_or(path);
    let mut current = data;
    for captures in step.captures_iter(rest) {
        if let Some(field) = captures.get(1) {
            current = current
                .get(field.as_str())
                .ok_or_else(|| format!("field '{}' not found", field.as_str()))?;
        } else if let Some(index) = captures.get(2) {
            let i: usize = index.as_str().parse().map_err(|_| "bad index".to_string())?;
            current = current
                .get(i)
                .ok_or_else(|| format!("index {} out of range", i))?;
        }
    }
    Ok(current)
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s[..end].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::SandboxConfig;
    use serde_json::json;

    fn runner() -> CriteriaRunner {
        CriteriaRunner::new(
            VerifyConfig {
                allow_http_status: false,
                ..Default::default()
            },
            Sandbox::new(SandboxConfig {
                enabled: false,
                ..Default::default()
            }),
        )
    }

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(f)
    }

    #[test]
    fn count_gte_suite_passes() {
        let criteria = json!({
            "version": "1.0",
            "tests": [{"test_id": "t1", "type": "count_gte", "params": {"path": "$", "min_count": 1}}],
            "pass_threshold": "all",
        });
        let report = block_on(runner().run(&criteria, &json!([{"x": 1}]), &Default::default()));
        assert!(report.passed);
        assert_eq!(report.summary, "1/1 passed");
        assert_eq!(report.cpu_seconds, 0.0);
    }

    #[test]
    fn majority_threshold() {
        let criteria = json!({
            "version": "1.0",
            "tests": [
                {"test_id": "a", "type": "contains", "params": {"pattern": "hello"}},
                {"test_id": "b", "type": "contains", "params": {"pattern": "world"}},
                {"test_id": "c", "type": "contains", "params": {"pattern": "absent"}},
            ],
            "pass_threshold": "majority",
        });
        let report = block_on(runner().run(&criteria, &json!("hello world"), &Default::default()));
        assert!(report.passed);
        assert_eq!(report.summary, "2/3 passed");
    }

    #[test]
    fn json_schema_test() {
        let criteria = json!({
            "version": "1.0",
            "tests": [{"test_id": "schema", "type": "json_schema", "params": {"schema": {
                "type": "object",
                "required": ["name"],
                "properties": {"name": {"type": "string", "minLength": 1}},
            }}}],
        });
        let ok = block_on(runner().run(&criteria, &json!({"name": "x"}), &Default::default()));
        assert!(ok.passed);
        let bad = block_on(runner().run(&criteria, &json!({"name": ""}), &Default::default()));
        assert!(!bad.passed);
    }

    #[test]
    fn assertion_test_unsupported_construct() {
        let criteria = json!({
            "version": "1.0",
            "tests": [{"test_id": "a", "type": "assertion", "params": {"expression": "output.__class__"}}],
        });
        let report = block_on(runner().run(&criteria, &json!({}), &Default::default()));
        assert!(!report.passed);
        assert_eq!(report.results[0].message, "unsupported");
    }

    #[test]
    fn assertion_test_passes() {
        let criteria = json!({
            "version": "1.0",
            "tests": [{"test_id": "a", "type": "assertion", "params": {"expression": "len(output) == 2 and output[0] < output[1]"}}],
        });
        let report = block_on(runner().run(&criteria, &json!([1, 5]), &Default::default()));
        assert!(report.passed);
    }

    #[test]
    fn checksum_uses_canonical_form() {
        let deliverable: Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
        let reordered: Value = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        let expected = criteria_hash(&reordered);

        let criteria = json!({
            "version": "1.0",
            "tests": [{"test_id": "c", "type": "checksum", "params": {"expected_hash": expected}}],
        });
        let report = block_on(runner().run(&criteria, &deliverable, &Default::default()));
        assert!(report.passed);
    }

    #[test]
    fn latency_from_context() {
        let started = chrono::Utc::now();
        let ctx = VerificationContext {
            started_at: Some(started),
            delivered_at: Some(started + chrono::Duration::seconds(5)),
        };
        let criteria = json!({
            "version": "1.0",
            "tests": [{"test_id": "l", "type": "latency_lte", "params": {"max_seconds": 10}}],
        });
        let report = block_on(runner().run(&criteria, &json!({}), &ctx));
        assert!(report.passed);

        let slow = json!({
            "version": "1.0",
            "tests": [{"test_id": "l", "type": "latency_lte", "params": {"max_seconds": 2}}],
        });
        let report = block_on(runner().run(&slow, &json!({}), &ctx));
        assert!(!report.passed);
    }

    #[test]
    fn http_status_disabled_fails() {
        let criteria = json!({
            "version": "1.0",
            "tests": [{"test_id": "h", "type": "http_status", "params": {"expected_status": 200}}],
        });
        let report = block_on(runner().run(&criteria, &json!("https://example.com"), &Default::default()));
        assert!(!report.passed);
        assert!(report.results[0].message.contains("disabled"));
    }

    #[test]
    fn malformed_criteria_reported_not_panicked() {
        let report = block_on(runner().run(&json!({"version": "9.9"}), &json!({}), &Default::default()));
        assert!(!report.passed);
        assert!(report.summary.contains("unsupported criteria version"));
    }

    #[test]
    fn path_resolution() {
        let data = json!({"items": [{"x": 1}, {"x": 2}], "meta": {"n": 5}});
        assert_eq!(resolve_path(&data, "$").unwrap(), &data);
        assert_eq!(resolve_path(&data, "$.items[1].x").unwrap(), &json!(2));
        assert_eq!(resolve_path(&data, "$.meta.n").unwrap(), &json!(5));
        assert!(resolve_path(&data, "$.missing").is_err());
        assert!(resolve_path(&data, "$.items[9]").is_err());
    }
}
