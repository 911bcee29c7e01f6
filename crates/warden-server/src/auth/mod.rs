//! Authentication primitives.
//!
//! JWT issuance, password hashing, and the random secrets handed to holders
//! (confirmation codes) and member nodes (API keys).

pub mod claims;
pub mod jwt;
pub mod password;
pub mod secrets;

pub use claims::{Claims, TokenScope};
pub use jwt::{JwtManager, TokenPair};
