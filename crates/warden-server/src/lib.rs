//! Network Warden Control Plane
//!
//! Registry and admission authority for one warden:
//! - Holder and admin accounts with server-side sessions
//! - Member node admission (waitlist, moderation, activation, initiation)
//! - Hierarchical time-ordered ID allocation
//! - Rate-limited, audited confirmation notifications
//! - Paginated directory of nodes and wardens

pub mod auth;
pub mod control_plane;
pub mod idgen;
pub mod notifications;
pub mod server;
pub mod services;
pub mod storage;

pub use control_plane::ControlPlane;
