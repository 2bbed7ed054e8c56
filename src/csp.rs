//! Content Security Policy and companion security headers for the site.

use indexmap::IndexMap;
use serde::Serialize;

/// An ordered set of CSP directives.
///
/// A directive without a value (`upgrade-insecure-requests`) is a flag and is
/// rendered bare.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CspPolicy {
    directives: IndexMap<String, Option<String>>,
}

impl CspPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn directive(mut self, name: &str, value: &str) -> Self {
        self.directives
            .insert(name.to_owned(), Some(value.to_owned()));
        self
    }

    #[must_use]
    pub fn flag(mut self, name: &str) -> Self {
        self.directives.insert(name.to_owned(), None);
        self
    }

    /// The policy the portfolio ships with.
    pub fn portfolio() -> Self {
        Self::new()
            .directive("default-src", "'self'")
            .directive(
                "script-src",
                "'self' 'unsafe-inline' https://generativelanguage.googleapis.com",
            )
            .directive("style-src", "'self' 'unsafe-inline'")
            .directive("img-src", "'self' data: https: blob:")
            .directive("connect-src", "'self' https://generativelanguage.googleapis.com")
            .directive("font-src", "'self' data:")
            .directive("object-src", "'none'")
            .directive("base-uri", "'self'")
            .directive("form-action", "'self'")
            .directive("frame-ancestors", "'none'")
            .flag("upgrade-insecure-requests")
            .flag("block-all-mixed-content")
    }

    pub fn header_value(&self) -> String {
        self.directives
            .iter()
            .map(|(name, value)| match value {
                Some(value) => format!("{name} {value}"),
                None => name.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// The CSP header together with the fixed hardening headers.
    pub fn security_headers(&self) -> IndexMap<&'static str, String> {
        IndexMap::from([
            ("Content-Security-Policy", self.header_value()),
            ("X-Content-Type-Options", "nosniff".to_owned()),
            ("X-Frame-Options", "DENY".to_owned()),
            ("X-XSS-Protection", "1; mode=block".to_owned()),
            (
                "Referrer-Policy",
                "strict-origin-when-cross-origin".to_owned(),
            ),
            (
                "Permissions-Policy",
                "geolocation=(), microphone=(), camera=()".to_owned(),
            ),
            (
                "Strict-Transport-Security",
                "max-age=31536000; includeSubDomains".to_owned(),
            ),
        ])
    }

    pub fn meta_tag(&self) -> String {
        format!(
            r#"<meta http-equiv="Content-Security-Policy" content="{}">"#,
            self.header_value()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_render_bare() {
        let policy = CspPolicy::new()
            .directive("default-src", "'self'")
            .directive("object-src", "'none'")
            .flag("upgrade-insecure-requests");
        assert_eq!(
            policy.header_value(),
            "default-src 'self'; object-src 'none'; upgrade-insecure-requests"
        );
    }

    #[test]
    fn portfolio_policy_is_stable() {
        let header = CspPolicy::portfolio().header_value();
        assert!(header.starts_with("default-src 'self'; script-src 'self' 'unsafe-inline'"));
        assert!(header.contains(
            "object-src 'none'; base-uri 'self'; form-action 'self'; frame-ancestors 'none'; upgrade-insecure-requests; block-all-mixed-content"
        ));
        assert!(header.ends_with("block-all-mixed-content"));
        assert!(!header.contains(";;"));
    }

    #[test]
    fn redefining_a_directive_keeps_its_position() {
        let policy = CspPolicy::new()
            .directive("a", "1")
            .directive("b", "2")
            .directive("a", "3");
        assert_eq!(policy.header_value(), "a 3; b 2");
    }

    #[test]
    fn security_headers_lead_with_csp() {
        let policy = CspPolicy::portfolio();
        let headers = policy.security_headers();
        let (first, value) = headers.first().unwrap();
        assert_eq!(*first, "Content-Security-Policy");
        assert_eq!(value, &policy.header_value());
        assert_eq!(headers["X-Frame-Options"], "DENY");
        assert_eq!(headers.len(), 7);
    }

    #[test]
    fn meta_tag_embeds_header() {
        let policy = CspPolicy::new().directive("default-src", "'self'");
        assert_eq!(
            policy.meta_tag(),
            r#"<meta http-equiv="Content-Security-Policy" content="default-src 'self'">"#
        );
    }
}
