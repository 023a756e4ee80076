/// A parsed allowed-domain pattern
///
/// Two forms are supported:
/// 1. Exact: `"example.com"` matches only `example.com`
/// 2. Wildcard: `"*.example.com"` matches `example.com` itself and any
///    subdomain at any nesting level
///
/// Matching is ASCII case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainPattern {
    Exact(String),
    Wildcard(String),
}

impl DomainPattern {
    pub fn parse(pattern: &str) -> Self {
        let pattern = pattern.trim().to_ascii_lowercase();
        match pattern.strip_prefix("*.") {
            Some(base) => Self::Wildcard(base.to_string()),
            None => Self::Exact(pattern),
        }
    }

    /// Checks whether `host` falls under this pattern
    ///
    /// # Examples
    ///
    /// ```
    /// use trace_scraper::url::DomainPattern;
    ///
    /// let pattern = DomainPattern::parse("*.example.com");
    /// assert!(pattern.matches("example.com"));
    /// assert!(pattern.matches("api.v2.example.com"));
    /// assert!(!pattern.matches("myexample.com"));
    /// ```
    pub fn matches(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        match self {
            Self::Exact(domain) => host == *domain,
            Self::Wildcard(base) => {
                host == *base
                    || (host.len() > base.len()
                        && host.ends_with(base.as_str())
                        && host.as_bytes()[host.len() - base.len() - 1] == b'.')
            }
        }
    }
}
