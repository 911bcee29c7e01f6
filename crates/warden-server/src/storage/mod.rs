//! `SQLite` storage for the warden control plane.
//!
//! Persists holders, admins, their sessions, member nodes, wardens, and the
//! outbound notification ledger.

mod db;
mod models;
mod queries_admins;
mod queries_holders;
mod queries_nodes;
mod queries_notifications;
mod queries_sessions;
mod queries_wardens;

#[cfg(test)]
mod tests;

pub use db::{DatabaseError, WardenDatabase};
pub use models::{
    Admin, ContactKind, Holder, Location, MemberNode, NodeKind, NodeStatus, RateLimit,
    SentNotification, Session, Warden,
};
pub use queries_admins::CreateAdminParams;
pub use queries_holders::{CreateHolderParams, UpdateHolderProfileParams};
pub use queries_nodes::{InitiateMemberNodeParams, InsertMemberNodeParams, MemberNodeFilter};
pub use queries_sessions::{CreateSessionParams, SessionTable};
pub use queries_wardens::InsertWardenParams;
