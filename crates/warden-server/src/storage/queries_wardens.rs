//! Warden directory queries.

use warden_core::db::unix_timestamp;

use super::db::{DatabaseError, WardenDatabase};
use super::models::{Location, RateLimit, Warden, WardenRow};

pub struct InsertWardenParams<'a> {
    pub id: i64,
    pub label: &'a str,
    pub address: &'a str,
    pub name: &'a str,
    pub description: &'a str,
    pub location: Location,
    pub pdn_capacity: i64,
    pub nn_capacity: i64,
    pub is_open: bool,
    pub url: &'a str,
    pub version: &'a str,
    pub rate_limit: RateLimit,
    pub id_gen_top_node: u16,
}

impl WardenDatabase {
    // =========================================================================
    // Warden queries
    // =========================================================================

    pub async fn insert_warden(&self, params: &InsertWardenParams<'_>) -> Result<Warden, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO wardens (id, label, address, name, description, location_latitude, \
             location_longitude, pdn_capacity, nn_capacity, alive, is_open, url, version, \
             rate_limit_max_requests, rate_limit_interval_secs, id_gen_top_node, created_at, \
             last_modified_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(params.id)
        .bind(params.label)
        .bind(params.address)
        .bind(params.name)
        .bind(params.description)
        .bind(params.location.latitude)
        .bind(params.location.longitude)
        .bind(params.pdn_capacity)
        .bind(params.nn_capacity)
        .bind(params.is_open)
        .bind(params.url)
        .bind(params.version)
        .bind(params.rate_limit.max_requests)
        .bind(params.rate_limit.interval_secs)
        .bind(i64::from(params.id_gen_top_node))
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_warden(params.id).await
    }

    pub async fn get_warden(&self, id: i64) -> Result<Warden, DatabaseError> {
        sqlx::query_as::<_, WardenRow>("SELECT * FROM wardens WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Warden {id}")))?
            .try_into()
    }

    pub async fn warden_label_in_use(&self, label: &str) -> Result<bool, DatabaseError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM wardens WHERE label = ?")
            .bind(label)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.is_some())
    }

    pub async fn warden_top_node_in_use(&self, top_node: u16) -> Result<bool, DatabaseError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM wardens WHERE id_gen_top_node = ?")
            .bind(i64::from(top_node))
            .fetch_optional(self.pool())
            .await?;
        Ok(row.is_some())
    }

    /// List wardens ordered by ID.
    pub async fn list_wardens(&self, limit: u32, offset: u32) -> Result<Vec<Warden>, DatabaseError> {
        sqlx::query_as::<_, WardenRow>("SELECT * FROM wardens ORDER BY id LIMIT ? OFFSET ?")
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(self.pool())
            .await?
            .into_iter()
            .map(Warden::try_from)
            .collect()
    }
}
