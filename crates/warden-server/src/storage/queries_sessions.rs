//! Session queries, shared by holder and admin sessions.
//!
//! Both tables have the same layout; [`SessionTable`] selects which one a
//! query runs against. Rows are never deleted: logout moves `expired_at`.

use warden_core::db::unix_timestamp;

use super::db::{DatabaseError, WardenDatabase};
use super::models::Session;
use crate::auth::TokenScope;

/// Which session table to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTable {
    Holder,
    Admin,
}

impl SessionTable {
    const fn table(self) -> &'static str {
        match self {
            Self::Holder => "holder_sessions",
            Self::Admin => "admin_sessions",
        }
    }

    const fn owner_column(self) -> &'static str {
        match self {
            Self::Holder => "holder_id",
            Self::Admin => "admin_id",
        }
    }

    /// Columns projected into [`Session`].
    fn select_columns(self) -> String {
        format!(
            "id, {} AS owner_id, token_digest, refresh_token_digest, expired_at, \
             remote_ip_address, remote_mac_address, created_at, last_modified_at",
            self.owner_column()
        )
    }
}

pub struct CreateSessionParams<'a> {
    pub id: i64,
    pub owner_id: i64,
    pub token_digest: &'a str,
    pub refresh_token_digest: &'a str,
    pub expired_at: i64,
    pub remote_ip_address: Option<&'a str>,
    pub remote_mac_address: Option<&'a str>,
}

impl WardenDatabase {
    // =========================================================================
    // Session queries
    // =========================================================================

    pub async fn create_session(
        &self,
        table: SessionTable,
        params: &CreateSessionParams<'_>,
    ) -> Result<Session, DatabaseError> {
        let now = unix_timestamp();
        let sql = format!(
            "INSERT INTO {} (id, {}, token_digest, refresh_token_digest, expired_at, \
             remote_ip_address, remote_mac_address, created_at, last_modified_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            table.table(),
            table.owner_column()
        );

        sqlx::query(&sql)
            .bind(params.id)
            .bind(params.owner_id)
            .bind(params.token_digest)
            .bind(params.refresh_token_digest)
            .bind(params.expired_at)
            .bind(params.remote_ip_address)
            .bind(params.remote_mac_address)
            .bind(now)
            .bind(now)
            .execute(self.pool())
            .await?;

        self.get_session(table, params.id).await
    }

    pub async fn get_session(&self, table: SessionTable, id: i64) -> Result<Session, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?",
            table.select_columns(),
            table.table()
        );
        sqlx::query_as::<_, Session>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Session {id}")))
    }

    /// Look up a session by the digest of its access or refresh token.
    pub async fn find_session_by_token_digest(
        &self,
        table: SessionTable,
        scope: TokenScope,
        digest: &str,
    ) -> Result<Option<Session>, DatabaseError> {
        let column = match scope {
            TokenScope::Access => "token_digest",
            TokenScope::Refresh => "refresh_token_digest",
        };
        let sql = format!(
            "SELECT {} FROM {} WHERE {column} = ?",
            table.select_columns(),
            table.table()
        );
        let session = sqlx::query_as::<_, Session>(&sql)
            .bind(digest)
            .fetch_optional(self.pool())
            .await?;

        Ok(session)
    }

    /// Replace both token digests and push `expired_at` forward.
    pub async fn rotate_session(
        &self,
        table: SessionTable,
        id: i64,
        token_digest: &str,
        refresh_token_digest: &str,
        expired_at: i64,
    ) -> Result<Session, DatabaseError> {
        let sql = format!(
            "UPDATE {} SET token_digest = ?, refresh_token_digest = ?, expired_at = ?, \
             last_modified_at = ? WHERE id = ?",
            table.table()
        );
        let result = sqlx::query(&sql)
            .bind(token_digest)
            .bind(refresh_token_digest)
            .bind(expired_at)
            .bind(unix_timestamp())
            .bind(id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Session {id}")));
        }
        self.get_session(table, id).await
    }

    /// Soft-revoke: set `expired_at` to `at`.
    pub async fn expire_session(
        &self,
        table: SessionTable,
        id: i64,
        at: i64,
    ) -> Result<(), DatabaseError> {
        let sql = format!(
            "UPDATE {} SET expired_at = ?, last_modified_at = ? WHERE id = ?",
            table.table()
        );
        let result = sqlx::query(&sql)
            .bind(at)
            .bind(unix_timestamp())
            .bind(id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Session {id}")));
        }
        Ok(())
    }
}
