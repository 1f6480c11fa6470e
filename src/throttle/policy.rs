//! Throttle policies and the named policy table.
//!
//! Every throttled operation names the policy it runs under; there is no
//! fallback limit. Policies come from the built-in table, optionally
//! overridden by a YAML policy file and inline configuration.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroU32;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{QuillgateError, Result};

/// Destructive account operations.
pub const ACCOUNT_DELETE: &str = "account_delete";
/// New account sign-up.
pub const ACCOUNT_REGISTER: &str = "account_register";
/// Password sign-in.
pub const AUTH_LOGIN: &str = "auth_login";
/// Topic and schedule preference changes.
pub const PREFERENCES_UPDATE: &str = "preferences_update";
/// Starting a donation checkout session.
pub const DONATION_CHECKOUT: &str = "donation_checkout";
/// Submitting a gratitude challenge entry.
pub const GRATITUDE_ENTRY: &str = "gratitude_entry";
/// Opening a support ticket.
pub const SUPPORT_TICKET: &str = "support_ticket";
/// Read-only lookups.
pub const LOOKUP: &str = "lookup";
/// Liveness check.
pub const HEALTH: &str = "health";

/// A request cap over a fixed window.
///
/// Both values are non-zero by construction, which keeps
/// [`Throttle::admit`](super::Throttle::admit) total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PolicyRule", into = "PolicyRule")]
pub struct Policy {
    max_requests: NonZeroU32,
    window: Duration,
}

impl Policy {
    /// Create a policy admitting `max_requests` per `window`.
    pub fn new(max_requests: u32, window: Duration) -> Result<Self> {
        let max_requests = NonZeroU32::new(max_requests)
            .ok_or_else(|| QuillgateError::Policy("max_requests must be positive".to_string()))?;
        if window.is_zero() {
            return Err(QuillgateError::Policy("window must be positive".to_string()));
        }
        Ok(Self {
            max_requests,
            window,
        })
    }

    /// Create a policy from a window expressed in milliseconds.
    pub fn from_millis(max_requests: u32, window_ms: u64) -> Result<Self> {
        Self::new(max_requests, Duration::from_millis(window_ms))
    }

    /// Maximum admitted requests per window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests.get()
    }

    /// Length of the window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Window length in whole seconds, rounded up.
    pub fn window_secs_ceil(&self) -> u64 {
        ceil_secs(self.window)
    }
}

/// Serialized form of a [`Policy`].
///
/// Windows are whole seconds here; a policy built with a sub-second
/// remainder serializes with its window rounded up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyRule {
    /// Number of requests admitted per window
    pub max_requests: u32,
    /// Window length in seconds
    pub window_secs: u64,
}

impl TryFrom<PolicyRule> for Policy {
    type Error = QuillgateError;

    fn try_from(rule: PolicyRule) -> Result<Self> {
        Policy::new(rule.max_requests, Duration::from_secs(rule.window_secs))
    }
}

impl From<Policy> for PolicyRule {
    fn from(policy: Policy) -> Self {
        Self {
            max_requests: policy.max_requests(),
            window_secs: policy.window_secs_ceil(),
        }
    }
}

/// Round a duration up to whole seconds.
pub(crate) fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

fn parse_error(e: serde_yaml::Error) -> QuillgateError {
    QuillgateError::Policy(format!("Failed to parse policy file: {}", e))
}

/// Named policies keyed by operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyTable {
    #[serde(default)]
    policies: HashMap<String, Policy>,
}

impl PolicyTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The policies the journaling application ships with.
    pub fn builtin() -> Self {
        const MINUTE: u64 = 60;
        const HOUR: u64 = 60 * MINUTE;

        let rules: [(&str, u32, u64); 9] = [
            (ACCOUNT_DELETE, 5, 15 * MINUTE),
            (ACCOUNT_REGISTER, 5, 15 * MINUTE),
            (AUTH_LOGIN, 10, 15 * MINUTE),
            (PREFERENCES_UPDATE, 20, MINUTE),
            (DONATION_CHECKOUT, 10, HOUR),
            (GRATITUDE_ENTRY, 20, MINUTE),
            (SUPPORT_TICKET, 5, HOUR),
            (LOOKUP, 30, MINUTE),
            (HEALTH, 60, MINUTE),
        ];

        let policies = rules
            .into_iter()
            .filter_map(|(name, max, secs)| {
                let policy = Policy::new(max, Duration::from_secs(secs)).ok()?;
                Some((name.to_string(), policy))
            })
            .collect();

        Self { policies }
    }

    /// Load a policy table from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading throttle policies");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse a policy table from YAML.
    ///
    /// Accepts either a top-level `policies:` mapping or a bare mapping of
    /// policy name to rule.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(yaml).map_err(parse_error)?;

        if value.get("policies").is_some() {
            serde_yaml::from_value(value).map_err(parse_error)
        } else {
            let policies: HashMap<String, Policy> =
                serde_yaml::from_value(value).map_err(parse_error)?;
            Ok(Self { policies })
        }
    }

    /// Build the effective table: built-in policies, overridden by the file
    /// at `path` (if any), overridden by `overrides`.
    pub fn layered(path: Option<&Path>, overrides: &PolicyTable) -> Result<Self> {
        let mut table = Self::builtin();
        if let Some(path) = path {
            table.merge(Self::from_file(path)?);
        }
        table.merge(overrides.clone());
        Ok(table)
    }

    /// Add or replace a policy.
    pub fn insert(&mut self, name: impl Into<String>, policy: Policy) {
        self.policies.insert(name.into(), policy);
    }

    /// Override entries of this table with every entry of `other`.
    pub fn merge(&mut self, other: PolicyTable) {
        self.policies.extend(other.policies);
    }

    /// Look up a policy by name.
    pub fn get(&self, name: &str) -> Option<Policy> {
        self.policies.get(name).copied()
    }

    /// Whether the table defines `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.policies.contains_key(name)
    }

    /// Number of policies.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

/// The live policy table shared by routes, swappable at runtime.
///
/// Routes claim their policy names through [`PolicyRegistry::require`]; a
/// replacement table that drops a claimed name is refused so that no mounted
/// route is left without a limit.
#[derive(Debug, Default)]
pub struct PolicyRegistry {
    table: RwLock<PolicyTable>,
    required: RwLock<BTreeSet<String>>,
}

impl PolicyRegistry {
    /// Create a registry serving `table`.
    pub fn new(table: PolicyTable) -> Self {
        Self {
            table: RwLock::new(table),
            required: RwLock::new(BTreeSet::new()),
        }
    }

    /// Claim `name` for a route and return its current policy.
    pub fn require(&self, name: &str) -> Result<Policy> {
        let policy = self
            .get(name)
            .ok_or_else(|| QuillgateError::UnknownPolicy(name.to_string()))?;
        self.required.write().insert(name.to_string());
        Ok(policy)
    }

    /// Current policy for `name`.
    pub fn get(&self, name: &str) -> Option<Policy> {
        self.table.read().get(name)
    }

    /// Swap in a new table, keeping the old one if a claimed policy is missing.
    pub fn replace(&self, table: PolicyTable) -> Result<()> {
        let required = self.required.read();
        if let Some(missing) = required.iter().find(|name| !table.contains(name)) {
            warn!(policy = %missing, "Refusing policy table without a policy in use");
            return Err(QuillgateError::UnknownPolicy(missing.clone()));
        }

        let mut current = self.table.write();
        if *current != table {
            info!(policies = table.len(), "Throttle policy table replaced");
            *current = table;
        }
        Ok(())
    }

    /// Snapshot of the current table.
    pub fn snapshot(&self) -> PolicyTable {
        self.table.read().clone()
    }
}
