//! Origin validation for upgrade requests.
//!
//! Browsers always send `Origin` on WebSocket upgrades, so the relay only
//! accepts upgrades from pages it has been told about.

use crate::error::UpgradeRejected;
use axum::http::header::ORIGIN;
use axum::http::HeaderMap;

/// Allow-list entry that accepts any origin.
pub const ANY_ORIGIN: &str = "*";

/// Allow-list of scheme-qualified origins.
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    allowed: Vec<String>,
    allow_any: bool,
}

impl OriginPolicy {
    /// Build a policy from configured origins such as `https://app.example.com`.
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut allow_any = false;
        let mut allowed = Vec::new();
        for origin in origins {
            let origin = origin.as_ref().trim();
            if origin == ANY_ORIGIN {
                allow_any = true;
            } else if !origin.is_empty() {
                allowed.push(normalize(origin).to_string());
            }
        }
        Self { allowed, allow_any }
    }

    /// Whether `origin` is on the allow-list.
    pub fn allows(&self, origin: &str) -> bool {
        self.allow_any || self.allowed.iter().any(|a| a == normalize(origin))
    }

    /// Approve or reject an upgrade request by its `Origin` header.
    ///
    /// # Errors
    ///
    /// Returns [`UpgradeRejected`] if the header is missing, unreadable,
    /// or not on the allow-list.
    pub fn check(&self, headers: &HeaderMap) -> Result<(), UpgradeRejected> {
        let origin = headers.get(ORIGIN).and_then(|v| v.to_str().ok());
        match origin {
            Some(origin) if self.allows(origin) => Ok(()),
            Some(origin) => Err(UpgradeRejected {
                origin: Some(origin.to_string()),
            }),
            None => Err(UpgradeRejected { origin: None }),
        }
    }
}

fn normalize(origin: &str) -> &str {
    origin.trim().trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(origin: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ORIGIN, HeaderValue::from_str(origin).unwrap());
        headers
    }

    #[test]
    fn exact_origin_is_allowed() {
        let policy = OriginPolicy::new(["https://app.example.com"]);
        assert!(policy.check(&headers("https://app.example.com")).is_ok());
    }

    #[test]
    fn scheme_must_match() {
        let policy = OriginPolicy::new(["https://app.example.com"]);
        let err = policy.check(&headers("http://app.example.com")).unwrap_err();
        assert_eq!(err.origin.as_deref(), Some("http://app.example.com"));
    }

    #[test]
    fn port_must_match() {
        let policy = OriginPolicy::new(["http://localhost:5173"]);
        assert!(policy.allows("http://localhost:5173"));
        assert!(!policy.allows("http://localhost:8080"));
        assert!(!policy.allows("http://localhost"));
    }

    #[test]
    fn trailing_slash_is_ignored() {
        let policy = OriginPolicy::new(["https://app.example.com/"]);
        assert!(policy.allows("https://app.example.com"));
        assert!(policy.allows("https://app.example.com/"));
    }

    #[test]
    fn missing_origin_is_rejected() {
        let policy = OriginPolicy::new(["https://app.example.com"]);
        let err = policy.check(&HeaderMap::new()).unwrap_err();
        assert!(err.origin.is_none());
    }

    #[test]
    fn empty_list_allows_nothing() {
        let policy = OriginPolicy::new(Vec::<String>::new());
        assert!(policy.check(&headers("https://app.example.com")).is_err());
    }

    #[test]
    fn wildcard_allows_any_present_origin() {
        let policy = OriginPolicy::new(["*"]);
        assert!(policy.check(&headers("https://anything.example")).is_ok());
        assert!(policy.check(&HeaderMap::new()).is_err());
    }

    #[test]
    fn subdomain_is_not_a_match() {
        let policy = OriginPolicy::new(["https://example.com"]);
        assert!(!policy.allows("https://evil.example.com"));
        assert!(!policy.allows("https://example.com.evil.net"));
    }
}
