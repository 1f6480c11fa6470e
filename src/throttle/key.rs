//! Bucket key generation and handling.

/// Identity shared by every client whose origin address is unknown.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// A key that uniquely identifies a throttle bucket.
///
/// The key is composed of the scope (the policy name of the operation being
/// throttled) and the client identity, so one client keeps independent counts
/// for each operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    /// The policy scope this bucket belongs to
    pub scope: String,
    /// The client identity, usually its network address
    pub identity: String,
}

impl BucketKey {
    /// Create a new bucket key from a scope and identity.
    ///
    /// An empty identity falls back to [`UNKNOWN_IDENTITY`].
    pub fn new(scope: &str, identity: &str) -> Self {
        let identity = identity.trim();
        let identity = if identity.is_empty() {
            UNKNOWN_IDENTITY
        } else {
            identity
        };

        Self {
            scope: scope.to_string(),
            identity: identity.to_string(),
        }
    }

    /// Whether this key lands in the shared bucket for unknown origins.
    pub fn is_unknown_identity(&self) -> bool {
        self.identity == UNKNOWN_IDENTITY
    }
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.scope, self.identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_key_creation() {
        let key = BucketKey::new("auth_login", "203.0.113.9");

        assert_eq!(key.scope, "auth_login");
        assert_eq!(key.identity, "203.0.113.9");
        assert!(!key.is_unknown_identity());
    }

    #[test]
    fn test_bucket_key_display() {
        let key = BucketKey::new("lookup", "10.0.0.1");
        assert_eq!(key.to_string(), "lookup:10.0.0.1");
    }

    #[test]
    fn test_empty_identity_uses_sentinel() {
        let key = BucketKey::new("lookup", "  ");
        assert_eq!(key.identity, UNKNOWN_IDENTITY);
        assert!(key.is_unknown_identity());
    }

    #[test]
    fn test_bucket_key_equality() {
        let key1 = BucketKey::new("lookup", "10.0.0.1");
        let key2 = BucketKey::new("lookup", "10.0.0.1");
        let key3 = BucketKey::new("health", "10.0.0.1");

        assert_eq!(key1, key2);
        assert_ne!(key1, key3);
    }
}
