//! Input validators shared by the API layer and services
//!
//! Capability/skill tag grammar, free-text length bounds, and the SSRF guard
//! for agent endpoint URLs. Host resolution is left to the caller so these
//! checks stay synchronous and testable.

use regex::Regex;
use std::net::IpAddr;
use std::sync::OnceLock;
use url::{Host, Url};

use crate::error::{AgoraError, AgoraResult};

pub const MAX_TAG_LEN: usize = 64;
pub const MAX_TAGS: usize = 20;
pub const MAX_DISPLAY_NAME_LEN: usize = 128;
pub const MAX_DESCRIPTION_LEN: usize = 4096;
pub const MAX_COMMENT_LEN: usize = 4096;
pub const MAX_MESSAGE_LEN: usize = 2048;

fn tag_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9-]+$").expect("static pattern"))
}

/// Validate a single capability or skill tag against the tag grammar.
pub fn validate_skill_id(tag: &str) -> AgoraResult<()> {
    if tag.is_empty() || tag.len() > MAX_TAG_LEN {
        return Err(AgoraError::Validation(format!(
            "tag must be 1-{} characters",
            MAX_TAG_LEN
        )));
    }
    if !tag_pattern().is_match(tag) {
        return Err(AgoraError::Validation(format!(
            "tag '{}' must match [A-Za-z0-9-]+",
            tag
        )));
    }
    Ok(())
}

/// Validate an agent's capability tag set: grammar, per-tag length, count cap.
pub fn validate_capability_tags(tags: &[String]) -> AgoraResult<()> {
    if tags.len() > MAX_TAGS {
        return Err(AgoraError::Validation(format!(
            "at most {} capability tags allowed",
            MAX_TAGS
        )));
    }
    for tag in tags {
        validate_skill_id(tag)?;
    }
    Ok(())
}

/// Whether an IP belongs to a range that must never be dialed from the
/// platform: loopback, private, link-local, unique-local, or unspecified.
pub fn is_forbidden_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique-local
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                // fe80::/10 link-local
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

/// Parse and statically validate an agent endpoint URL: HTTPS only, a real
/// host, and no IP literal in a forbidden range. DNS-resolved addresses are
/// checked separately by the registration service.
pub fn validate_endpoint_url(raw: &str) -> AgoraResult<Url> {
    let url = Url::parse(raw)
        .map_err(|e| AgoraError::Validation(format!("invalid endpoint_url: {}", e)))?;

    if url.scheme() != "https" {
        return Err(AgoraError::Validation(
            "endpoint_url must use https".into(),
        ));
    }

    match url.host() {
        None => return Err(AgoraError::Validation("endpoint_url must have a host".into())),
        Some(Host::Ipv4(ip)) if is_forbidden_ip(IpAddr::V4(ip)) => {
            return Err(AgoraError::Validation(
                "endpoint_url resolves to a private network".into(),
            ));
        }
        Some(Host::Ipv6(ip)) if is_forbidden_ip(IpAddr::V6(ip)) => {
            return Err(AgoraError::Validation(
                "endpoint_url resolves to a private network".into(),
            ));
        }
        Some(Host::Domain(domain)) => {
            if domain == "localhost" || domain.ends_with(".localhost") || domain.ends_with(".local")
            {
                return Err(AgoraError::Validation(
                    "endpoint_url resolves to a private network".into(),
                ));
            }
        }
        _ => {}
    }

    Ok(url)
}

/// Bound a free-text field, returning a validation error naming the field.
pub fn validate_text(field: &str, value: &str, max_len: usize) -> AgoraResult<()> {
    if value.len() > max_len {
        return Err(AgoraError::Validation(format!(
            "{} exceeds {} characters",
            field, max_len
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_grammar() {
        assert!(validate_skill_id("web-scraping").is_ok());
        assert!(validate_skill_id("GPT4").is_ok());
        assert!(validate_skill_id("").is_err());
        assert!(validate_skill_id("has space").is_err());
        assert!(validate_skill_id("under_score").is_err());
        assert!(validate_skill_id(&"x".repeat(65)).is_err());
    }

    #[test]
    fn tag_count_cap() {
        let ok: Vec<String> = (0..20).map(|i| format!("tag-{}", i)).collect();
        assert!(validate_capability_tags(&ok).is_ok());
        let too_many: Vec<String> = (0..21).map(|i| format!("tag-{}", i)).collect();
        assert!(validate_capability_tags(&too_many).is_err());
    }

    #[test]
    fn endpoint_rejects_non_https() {
        assert!(validate_endpoint_url("http://agent.example.com").is_err());
        assert!(validate_endpoint_url("ftp://agent.example.com").is_err());
        assert!(validate_endpoint_url("not a url").is_err());
    }

    #[test]
    fn endpoint_rejects_private_hosts() {
        assert!(validate_endpoint_url("https://127.0.0.1/hook").is_err());
        assert!(validate_endpoint_url("https://10.0.0.5/hook").is_err());
        assert!(validate_endpoint_url("https://192.168.1.1/hook").is_err());
        assert!(validate_endpoint_url("https://169.254.169.254/meta").is_err());
        assert!(validate_endpoint_url("https://localhost/hook").is_err());
        assert!(validate_endpoint_url("https://[::1]/hook").is_err());
        assert!(validate_endpoint_url("https://[fd00::1]/hook").is_err());
    }

    #[test]
    fn endpoint_accepts_public_https() {
        assert!(validate_endpoint_url("https://agent.example.com/webhook").is_ok());
        assert!(validate_endpoint_url("https://8.8.8.8/webhook").is_ok());
    }

    #[test]
    fn text_bounds() {
        assert!(validate_text("display_name", "fine", MAX_DISPLAY_NAME_LEN).is_ok());
        assert!(validate_text("display_name", &"x".repeat(129), MAX_DISPLAY_NAME_LEN).is_err());
    }
}
