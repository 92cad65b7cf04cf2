//! Route matching logic.
//!
//! # Responsibilities
//! - Match path prefix on segment boundaries (case-sensitive)
//! - Strip leading path segments before forwarding
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - `/api/users` matches `/api/users` and `/api/users/...`, never `/api/usersX`
//! - No regex to guarantee O(n) matching

/// Matches the request path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// Create a new path prefix matcher.
    /// Trailing slashes are dropped so `/api/` and `/api` behave the same.
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let trimmed = prefix.trim_end_matches('/');
        Self {
            prefix: trimmed.to_string(),
        }
    }

    /// Returns true if `path` lies under this prefix.
    pub fn matches(&self, path: &str) -> bool {
        if self.prefix.is_empty() {
            return path.starts_with('/');
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Prefix length, used to rank overlapping routes.
    pub fn specificity(&self) -> usize {
        self.prefix.len()
    }

    pub fn as_str(&self) -> &str {
        if self.prefix.is_empty() {
            "/"
        } else {
            &self.prefix
        }
    }
}

/// Remove `count` leading segments from `path`, always returning an absolute path.
pub fn strip_segments(path: &str, count: usize) -> String {
    if count == 0 {
        return if path.is_empty() { "/".to_string() } else { path.to_string() };
    }

    let mut rest = path;
    for _ in 0..count {
        let trimmed = rest.strip_prefix('/').unwrap_or(rest);
        rest = match trimmed.find('/') {
            Some(idx) => &trimmed[idx..],
            None => "",
        };
    }

    if rest.is_empty() {
        "/".to_string()
    } else {
        rest.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_matcher() {
        let matcher = PathPrefixMatcher::new("/api/users");

        assert!(matcher.matches("/api/users"));
        assert!(matcher.matches("/api/users/"));
        assert!(matcher.matches("/api/users/42/profile"));
        assert!(!matcher.matches("/api/usersX"));
        assert!(!matcher.matches("/api"));
        assert!(!matcher.matches("/API/users"));
    }

    #[test]
    fn trailing_slash_and_root_prefixes() {
        assert!(PathPrefixMatcher::new("/ws/").matches("/ws/notifications"));
        assert_eq!(PathPrefixMatcher::new("/ws/").as_str(), "/ws");

        let root = PathPrefixMatcher::new("/");
        assert!(root.matches("/anything"));
        assert_eq!(root.specificity(), 0);
    }

    #[test]
    fn strips_leading_segments() {
        assert_eq!(strip_segments("/api/users/register", 1), "/users/register");
        assert_eq!(strip_segments("/api/users/register", 2), "/register");
        assert_eq!(strip_segments("/api/users", 2), "/");
        assert_eq!(strip_segments("/api", 5), "/");
        assert_eq!(strip_segments("/api/users", 0), "/api/users");
        assert_eq!(strip_segments("/api/users/", 1), "/users/");
    }
}
