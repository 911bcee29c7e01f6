//! Wires every service from one configuration and one database handle.

use std::sync::Arc;

use warden_core::config::WardenConfig;

use crate::auth::JwtManager;
use crate::idgen::{IdAllocators, IdGenError};
use crate::notifications::{Dispatcher, QuotaLedger};
use crate::services::admin::AdminService;
use crate::services::admission::AdmissionService;
use crate::services::directory::DirectoryService;
use crate::services::identity::IdentityService;
use crate::storage::WardenDatabase;

/// The assembled control plane.
pub struct ControlPlane {
    pub identity: IdentityService,
    pub admins: AdminService,
    pub admission: AdmissionService,
    pub directory: DirectoryService,
    pub ledger: Arc<QuotaLedger>,
    pub ids: Arc<IdAllocators>,
}

impl ControlPlane {
    /// Fails only if the configured top node does not fit the ID layout.
    pub fn new(
        db: WardenDatabase,
        config: &WardenConfig,
        jwt_secret: &[u8],
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Self, IdGenError> {
        let ids = Arc::new(IdAllocators::new(config.app.id_gen_top_node)?);
        let jwt = Arc::new(JwtManager::new(
            jwt_secret,
            config.auth.access_token_ttl_secs,
            config.auth.refresh_token_ttl_secs,
        ));
        let ledger = Arc::new(QuotaLedger::new(
            db.clone(),
            Arc::clone(&ids),
            dispatcher,
            &config.notifications,
        ));

        Ok(Self {
            identity: IdentityService::new(
                db.clone(),
                Arc::clone(&ids),
                Arc::clone(&jwt),
                Arc::clone(&ledger),
                config,
            ),
            admins: AdminService::new(db.clone(), Arc::clone(&ids), jwt, config),
            admission: AdmissionService::new(db.clone(), Arc::clone(&ids), config),
            directory: DirectoryService::new(db, config),
            ledger,
            ids,
        })
    }
}
