//! `SQLite` database for the warden control plane.

pub use warden_core::db::DatabaseError;

warden_core::define_database!(WardenDatabase, "Warden database migrations complete");
