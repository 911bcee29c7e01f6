//! Member node queries.
//!
//! Every state transition is a compare-and-swap on `revision`: the update
//! only applies if the row still carries the revision the caller read, and
//! bumps it. A lost race surfaces as [`DatabaseError::Stale`].

use warden_core::db::unix_timestamp;

use super::db::{DatabaseError, WardenDatabase};
use super::models::{Location, MemberNode, MemberNodeRow, NodeKind, NodeStatus, RateLimit};
use crate::idgen::Coordinate;

pub struct InsertMemberNodeParams<'a> {
    pub id: i64,
    pub kind: NodeKind,
    pub warden_id: i64,
    pub owner_holder_id: i64,
    pub name: &'a str,
    pub description: &'a str,
    pub label: &'a str,
    pub domain_name: Option<&'a str>,
    pub address: Option<&'a str>,
    pub location: Location,
    pub url: &'a str,
}

/// Operational parameters a node declares when it initiates.
pub struct InitiateMemberNodeParams<'a> {
    pub accounts_capacity: i64,
    pub is_open: bool,
    pub is_invite_code_required: bool,
    pub version: &'a str,
    pub rate_limit: RateLimit,
    pub crawl_rate_limit: RateLimit,
    pub coordinate: Coordinate,
}

/// Equality filters for [`WardenDatabase::list_member_nodes`].
#[derive(Debug, Clone, Copy)]
pub struct MemberNodeFilter {
    pub kind: NodeKind,
    pub owner_holder_id: Option<i64>,
    pub status: Option<NodeStatus>,
}

impl WardenDatabase {
    // =========================================================================
    // Member node queries
    // =========================================================================

    /// Insert a node in `pending` status.
    pub async fn insert_member_node(
        &self,
        params: &InsertMemberNodeParams<'_>,
    ) -> Result<MemberNode, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO member_nodes (id, kind, warden_id, owner_holder_id, name, description, \
             label, domain_name, address, location_latitude, location_longitude, url, status, \
             revision, created_at, last_modified_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', 0, ?, ?)",
        )
        .bind(params.id)
        .bind(params.kind.as_str())
        .bind(params.warden_id)
        .bind(params.owner_holder_id)
        .bind(params.name)
        .bind(params.description)
        .bind(params.label)
        .bind(params.domain_name)
        .bind(params.address)
        .bind(params.location.latitude)
        .bind(params.location.longitude)
        .bind(params.url)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_member_node(params.kind, params.id).await
    }

    /// Get a node of the given kind by ID.
    pub async fn get_member_node(&self, kind: NodeKind, id: i64) -> Result<MemberNode, DatabaseError> {
        sqlx::query_as::<_, MemberNodeRow>("SELECT * FROM member_nodes WHERE id = ? AND kind = ?")
            .bind(id)
            .bind(kind.as_str())
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("{kind} node {id}")))?
            .try_into()
    }

    pub async fn find_member_node_by_api_key_digest(
        &self,
        digest: &str,
    ) -> Result<Option<MemberNode>, DatabaseError> {
        sqlx::query_as::<_, MemberNodeRow>("SELECT * FROM member_nodes WHERE api_key_digest = ?")
            .bind(digest)
            .fetch_optional(self.pool())
            .await?
            .map(MemberNode::try_from)
            .transpose()
    }

    /// Whether `label` is taken by any member node of `warden_id`.
    pub async fn member_node_label_in_use(
        &self,
        warden_id: i64,
        label: &str,
    ) -> Result<bool, DatabaseError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM member_nodes WHERE warden_id = ? AND label = ?")
                .bind(warden_id)
                .bind(label)
                .fetch_optional(self.pool())
                .await?;
        Ok(row.is_some())
    }

    /// Whether a node other than `except_id` already holds `low_node`.
    pub async fn low_node_in_use(&self, low_node: u16, except_id: i64) -> Result<bool, DatabaseError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM member_nodes WHERE id_gen_low_node = ? AND id != ?")
                .bind(i64::from(low_node))
                .bind(except_id)
                .fetch_optional(self.pool())
                .await?;
        Ok(row.is_some())
    }

    /// Overwrite the moderation status.
    pub async fn set_member_node_status(
        &self,
        id: i64,
        status: NodeStatus,
        expected_revision: i64,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE member_nodes SET status = ?, revision = revision + 1, last_modified_at = ? \
             WHERE id = ? AND revision = ?",
        )
        .bind(status.as_str())
        .bind(unix_timestamp())
        .bind(id)
        .bind(expected_revision)
        .execute(self.pool())
        .await?;

        check_swapped(result.rows_affected(), id, expected_revision)
    }

    /// Store a new API key digest, replacing any previous one.
    pub async fn set_member_node_api_key(
        &self,
        id: i64,
        api_key_digest: &str,
        expected_revision: i64,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE member_nodes SET api_key_digest = ?, revision = revision + 1, \
             last_modified_at = ? WHERE id = ? AND revision = ?",
        )
        .bind(api_key_digest)
        .bind(unix_timestamp())
        .bind(id)
        .bind(expected_revision)
        .execute(self.pool())
        .await?;

        check_swapped(result.rows_affected(), id, expected_revision)
    }

    /// Persist the declared operational parameters and coordinate.
    pub async fn initiate_member_node(
        &self,
        id: i64,
        params: &InitiateMemberNodeParams<'_>,
        expected_revision: i64,
    ) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE member_nodes SET accounts_capacity = ?, is_open = ?, \
             is_invite_code_required = ?, version = ?, rate_limit_max_requests = ?, \
             rate_limit_interval_secs = ?, crawl_rate_limit_max_requests = ?, \
             crawl_rate_limit_interval_secs = ?, id_gen_top_node = ?, id_gen_low_node = ?, \
             revision = revision + 1, last_modified_at = ? \
             WHERE id = ? AND revision = ?",
        )
        .bind(params.accounts_capacity)
        .bind(params.is_open)
        .bind(params.is_invite_code_required)
        .bind(params.version)
        .bind(params.rate_limit.max_requests)
        .bind(params.rate_limit.interval_secs)
        .bind(params.crawl_rate_limit.max_requests)
        .bind(params.crawl_rate_limit.interval_secs)
        .bind(i64::from(params.coordinate.top))
        .bind(i64::from(params.coordinate.low))
        .bind(unix_timestamp())
        .bind(id)
        .bind(expected_revision)
        .execute(self.pool())
        .await?;

        check_swapped(result.rows_affected(), id, expected_revision)
    }

    /// List nodes matching `filter`, ordered by ID.
    pub async fn list_member_nodes(
        &self,
        filter: &MemberNodeFilter,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<MemberNode>, DatabaseError> {
        let mut sql = String::from("SELECT * FROM member_nodes WHERE kind = ?");
        if filter.owner_holder_id.is_some() {
            sql.push_str(" AND owner_holder_id = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        sql.push_str(" ORDER BY id LIMIT ? OFFSET ?");

        let mut query = sqlx::query_as::<_, MemberNodeRow>(&sql).bind(filter.kind.as_str());
        if let Some(owner) = filter.owner_holder_id {
            query = query.bind(owner);
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }

        query
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(self.pool())
            .await?
            .into_iter()
            .map(MemberNode::try_from)
            .collect()
    }
}

fn check_swapped(rows: u64, id: i64, expected_revision: i64) -> Result<(), DatabaseError> {
    if rows == 0 {
        return Err(DatabaseError::Stale(format!(
            "member node {id} changed since revision {expected_revision}"
        )));
    }
    Ok(())
}
