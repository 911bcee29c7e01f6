//! Read-only directory of member nodes and wardens.

use tracing::instrument;
use warden_core::config::{DirectoryConfig, WardenConfig};

use super::{AdminSession, HolderSession, Pagination, ServiceError, ServiceResult};
use crate::storage::{MemberNode, MemberNodeFilter, NodeKind, NodeStatus, Warden, WardenDatabase};

pub struct DirectoryService {
    db: WardenDatabase,
    config: DirectoryConfig,
}

impl DirectoryService {
    pub fn new(db: WardenDatabase, config: &WardenConfig) -> Self {
        Self {
            db,
            config: config.directory.clone(),
        }
    }

    /// List nodes of `kind` in creation order.
    ///
    /// With `only_own` the caller must be signed in and only their nodes
    /// are returned. Otherwise the whole directory is public.
    #[instrument(skip(self, caller))]
    pub async fn list_nodes(
        &self,
        kind: NodeKind,
        caller: Option<&HolderSession>,
        only_own: bool,
        pagination: Pagination,
    ) -> ServiceResult<Vec<MemberNode>> {
        let owner_holder_id = if only_own {
            let session = caller.ok_or_else(|| {
                ServiceError::Unauthenticated("a session is required to list own nodes".into())
            })?;
            Some(session.holder_id())
        } else {
            None
        };

        let (limit, offset) = pagination.resolve(&self.config);
        let filter = MemberNodeFilter {
            kind,
            owner_holder_id,
            status: None,
        };
        Ok(self.db.list_member_nodes(&filter, limit, offset).await?)
    }

    pub async fn get_node(&self, kind: NodeKind, id: i64) -> ServiceResult<MemberNode> {
        Ok(self.db.get_member_node(kind, id).await?)
    }

    /// Admin lookup. The session parameter proves the caller is an admin.
    pub async fn get_node_admin(
        &self,
        _session: &AdminSession,
        kind: NodeKind,
        id: i64,
    ) -> ServiceResult<MemberNode> {
        Ok(self.db.get_member_node(kind, id).await?)
    }

    /// Admin listing, optionally narrowed to one moderation status.
    #[instrument(skip(self, session), fields(admin_id = session.admin_id()))]
    pub async fn list_nodes_admin(
        &self,
        session: &AdminSession,
        kind: NodeKind,
        status: Option<NodeStatus>,
        pagination: Pagination,
    ) -> ServiceResult<Vec<MemberNode>> {
        let (limit, offset) = pagination.resolve(&self.config);
        let filter = MemberNodeFilter {
            kind,
            owner_holder_id: None,
            status,
        };
        Ok(self.db.list_member_nodes(&filter, limit, offset).await?)
    }

    pub async fn list_wardens(&self, pagination: Pagination) -> ServiceResult<Vec<Warden>> {
        let (limit, offset) = pagination.resolve(&self.config);
        Ok(self.db.list_wardens(limit, offset).await?)
    }

    pub async fn get_warden(&self, id: i64) -> ServiceResult<Warden> {
        Ok(self.db.get_warden(id).await?)
    }
}
