//! Strongly-typed identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle for one registration on a notification bus.
///
/// Tokens are only meaningful to the bus that issued them. Handing a token
/// back to a bus that doesn't know it is harmless.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionToken(String);

impl SubscriptionToken {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn from_string(s: String) -> Result<Self, &'static str> {
        if s.is_empty() {
            return Err("SubscriptionToken cannot be empty");
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SubscriptionToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
