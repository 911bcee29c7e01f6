//! Member node admission and warden registration.
//!
//! A node joins the waitlist as `pending`, is approved or rejected by an
//! admin, is activated by its owner (which issues an API key) and finally
//! initiates itself with that key, receiving its ID allocator coordinate.
//! Activation and initiation have no status of their own; they are recorded
//! as the presence of an API key digest and a coordinate.
//!
//! Every transition is a compare-and-swap on the node's `revision`, so two
//! concurrent transitions cannot both apply. The loser gets
//! [`ServiceError::Conflict`].

use std::sync::Arc;

use tracing::{info, instrument, warn};
use warden_core::config::WardenConfig;
use warden_core::validation::{validate_domain_name, validate_label};

use super::{AdminSession, HolderSession, ServiceError, ServiceResult};
use crate::auth::secrets::{api_key, api_key_digest};
use crate::idgen::{Coordinate, IdAllocators, MAX_LOW_NODE, MAX_TOP_NODE};
use crate::storage::{
    InitiateMemberNodeParams, InsertMemberNodeParams, InsertWardenParams, Location, MemberNode,
    NodeKind, NodeStatus, RateLimit, Warden, WardenDatabase,
};

/// Input of [`AdmissionService::join_waitlist`].
#[derive(Debug, Clone, Default)]
pub struct JoinWaitlistParams {
    pub name: String,
    pub description: String,
    /// Domain name for network nodes, plain label for personal data nodes.
    pub label: String,
    pub location: Location,
    pub url: String,
}

/// What a node declares about itself when it initiates.
#[derive(Debug, Clone, Default)]
pub struct InitiateParams {
    pub accounts_capacity: i64,
    pub is_open: bool,
    pub is_invite_code_required: bool,
    pub version: String,
    pub rate_limit: RateLimit,
    pub crawl_rate_limit: RateLimit,
    pub id_gen_low_node: u16,
}

#[derive(Debug, Clone, Default)]
pub struct RegisterWardenParams {
    pub label: String,
    pub name: String,
    pub description: String,
    pub location: Location,
    pub pdn_capacity: i64,
    pub nn_capacity: i64,
    pub is_open: bool,
    pub url: String,
    pub version: String,
    pub rate_limit: RateLimit,
    pub id_gen_top_node: u16,
}

pub struct AdmissionService {
    db: WardenDatabase,
    ids: Arc<IdAllocators>,
    warden_id: i64,
    address_suffix: String,
}

impl AdmissionService {
    pub fn new(db: WardenDatabase, ids: Arc<IdAllocators>, config: &WardenConfig) -> Self {
        Self {
            db,
            ids,
            warden_id: config.app.warden_id,
            address_suffix: config.app.address_suffix.clone(),
        }
    }

    /// Put a new node of `kind` on the waitlist, owned by the caller.
    #[instrument(skip(self, params), fields(holder_id = session.holder_id(), label = %params.label))]
    pub async fn join_waitlist(
        &self,
        session: &HolderSession,
        kind: NodeKind,
        params: JoinWaitlistParams,
    ) -> ServiceResult<MemberNode> {
        let holder = self.db.get_holder(session.holder_id()).await?;
        if !holder.confirmed {
            return Err(ServiceError::PermissionDenied(
                "holder is not confirmed".into(),
            ));
        }

        match kind {
            NodeKind::Network => validate_domain_name(&params.label)?,
            NodeKind::PersonalData => validate_label(&params.label)?,
        }
        if self
            .db
            .member_node_label_in_use(self.warden_id, &params.label)
            .await?
        {
            return Err(ServiceError::Validation(format!(
                "{kind} node already exists (label = {})",
                params.label
            )));
        }

        let id = self.ids.member_nodes.generate()?;
        let (domain_name, address) = match kind {
            NodeKind::Network => (Some(params.label.clone()), None),
            NodeKind::PersonalData => (
                None,
                Some(format!("#{}::{}", params.label, self.address_suffix)),
            ),
        };

        let node = self
            .db
            .insert_member_node(&InsertMemberNodeParams {
                id,
                kind,
                warden_id: self.warden_id,
                owner_holder_id: holder.id,
                name: &params.name,
                description: &params.description,
                label: &params.label,
                domain_name: domain_name.as_deref(),
                address: address.as_deref(),
                location: params.location,
                url: &params.url,
            })
            .await?;
        info!(node_id = node.id, %kind, "Node joined waitlist");
        Ok(node)
    }

    /// Overwrite a node's moderation status. Any status may follow any other.
    #[instrument(skip(self), fields(admin_id = session.admin_id()))]
    pub async fn set_status(
        &self,
        session: &AdminSession,
        kind: NodeKind,
        node_id: i64,
        status: NodeStatus,
    ) -> ServiceResult<MemberNode> {
        let node = self.db.get_member_node(kind, node_id).await?;
        self.db
            .set_member_node_status(node.id, status, node.revision)
            .await?;
        info!(node_id, from = %node.status, to = %status, "Node status changed");
        Ok(self.db.get_member_node(kind, node_id).await?)
    }

    /// Issue an API key for an approved node. Returns the plaintext key once.
    ///
    /// Activating again replaces the key; the previous one stops working.
    #[instrument(skip(self), fields(holder_id = session.holder_id()))]
    pub async fn activate(
        &self,
        session: &HolderSession,
        kind: NodeKind,
        node_id: i64,
    ) -> ServiceResult<String> {
        let node = self.db.get_member_node(kind, node_id).await?;
        if node.owner_holder_id != session.holder_id() {
            warn!(node_id, "Activation attempted by a non-owner");
            return Err(ServiceError::no_permissions());
        }
        if node.status != NodeStatus::Approved {
            return Err(ServiceError::FailedPrecondition(format!(
                "{kind} node is not approved"
            )));
        }

        let key = api_key(kind.api_key_prefix(), self.warden_id);
        self.db
            .set_member_node_api_key(node.id, &api_key_digest(&key), node.revision)
            .await?;
        info!(node_id, reissued = node.is_activated(), "Node activated");
        Ok(key)
    }

    /// Record a node's declared parameters and hand it its coordinate.
    #[instrument(skip(self, key, params), fields(low_node = params.id_gen_low_node))]
    pub async fn initiate(&self, key: &str, params: InitiateParams) -> ServiceResult<Coordinate> {
        let node = self
            .db
            .find_member_node_by_api_key_digest(&api_key_digest(key))
            .await?
            .ok_or_else(|| ServiceError::NotFound("node not found".into()))?;
        if node.status != NodeStatus::Approved {
            return Err(ServiceError::FailedPrecondition(format!(
                "{} node must be approved",
                node.kind
            )));
        }

        if params.accounts_capacity < 0 {
            return Err(ServiceError::Validation(
                "accounts capacity must not be negative".into(),
            ));
        }
        ensure_rate_limit(&params.rate_limit, "rate limit")?;
        ensure_rate_limit(&params.crawl_rate_limit, "crawl rate limit")?;
        if params.id_gen_low_node == 0 || params.id_gen_low_node > MAX_LOW_NODE {
            return Err(ServiceError::Validation(format!(
                "low node must be between 1 and {MAX_LOW_NODE} (low_node = {})",
                params.id_gen_low_node
            )));
        }
        if self
            .db
            .low_node_in_use(params.id_gen_low_node, node.id)
            .await?
        {
            return Err(ServiceError::Validation(format!(
                "low node is already in use (low_node = {})",
                params.id_gen_low_node
            )));
        }

        let coordinate = Coordinate::new(self.ids.top_node(), params.id_gen_low_node)?;
        self.db
            .initiate_member_node(
                node.id,
                &InitiateMemberNodeParams {
                    accounts_capacity: params.accounts_capacity,
                    is_open: params.is_open,
                    is_invite_code_required: params.is_invite_code_required,
                    version: &params.version,
                    rate_limit: params.rate_limit,
                    crawl_rate_limit: params.crawl_rate_limit,
                    coordinate,
                },
                node.revision,
            )
            .await?;
        info!(node_id = node.id, kind = %node.kind, "Node initiated");
        Ok(coordinate)
    }

    /// Register a peer warden. There is no moderation step.
    #[instrument(skip(self, params), fields(label = %params.label))]
    pub async fn register_warden(&self, params: RegisterWardenParams) -> ServiceResult<Warden> {
        validate_label(&params.label)?;
        if params.pdn_capacity < 0 || params.nn_capacity < 0 {
            return Err(ServiceError::Validation(
                "capacity must not be negative".into(),
            ));
        }
        ensure_rate_limit(&params.rate_limit, "rate limit")?;
        if params.id_gen_top_node > MAX_TOP_NODE {
            return Err(ServiceError::Validation(format!(
                "top node must be at most {MAX_TOP_NODE} (top_node = {})",
                params.id_gen_top_node
            )));
        }

        if self.db.warden_label_in_use(&params.label).await? {
            return Err(ServiceError::Validation(format!(
                "warden already exists (label = {})",
                params.label
            )));
        }
        if self.db.warden_top_node_in_use(params.id_gen_top_node).await? {
            return Err(ServiceError::Validation(format!(
                "top node is already in use (top_node = {})",
                params.id_gen_top_node
            )));
        }

        let id = self.ids.wardens.generate()?;
        let address = format!("::{}", params.label);
        let warden = self
            .db
            .insert_warden(&InsertWardenParams {
                id,
                label: &params.label,
                address: &address,
                name: &params.name,
                description: &params.description,
                location: params.location,
                pdn_capacity: params.pdn_capacity,
                nn_capacity: params.nn_capacity,
                is_open: params.is_open,
                url: &params.url,
                version: &params.version,
                rate_limit: params.rate_limit,
                id_gen_top_node: params.id_gen_top_node,
            })
            .await?;
        info!(warden_id = warden.id, "Warden registered");
        Ok(warden)
    }
}

fn ensure_rate_limit(limit: &RateLimit, what: &str) -> ServiceResult<()> {
    if limit.max_requests < 0 || limit.interval_secs < 0 {
        return Err(ServiceError::Validation(format!(
            "{what} must not be negative"
        )));
    }
    Ok(())
}
