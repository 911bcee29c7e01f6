//! JWT claims carried by holder and admin tokens.

use serde::{Deserialize, Serialize};

/// Which half of a token pair a token is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenScope {
    Access,
    Refresh,
}

impl TokenScope {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

impl std::fmt::Display for TokenScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// JWT ID (unique per token).
    pub jti: String,
    /// Subject: the holder or admin ID, as a decimal string.
    pub sub: String,
    pub scope: TokenScope,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiration (unix timestamp).
    pub exp: i64,
}

impl Claims {
    /// Parse the subject as an entity ID.
    pub fn subject_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }
}
