//! Token-backed sessions, shared by holders and admins.
//!
//! A token is accepted only if all of these hold:
//! 1. the JWT verifies and carries the requested scope,
//! 2. its subject parses as an ID,
//! 3. a server-side session row exists for the token digest (looked up in
//!    the column for that scope) and belongs to the subject,
//! 4. the session has not expired,
//! 5. the caller's IP matches the one recorded at sign-in, if any,
//! 6. a caller-supplied MAC matches the recorded MAC, if both exist.
//!
//! Failures of 1-4 are `Unauthenticated`; 5-6 are `PermissionDenied`.

use std::sync::Arc;

use tracing::{debug, warn};
use warden_core::db::unix_timestamp;

use super::{RemoteEndpoint, ServiceError, ServiceResult};
use crate::auth::{JwtManager, TokenPair, TokenScope};
use crate::idgen::IdAllocators;
use crate::storage::{CreateSessionParams, Session, SessionTable, WardenDatabase};

pub struct SessionManager {
    db: WardenDatabase,
    jwt: Arc<JwtManager>,
    ids: Arc<IdAllocators>,
    table: SessionTable,
    session_age_secs: i64,
}

impl SessionManager {
    pub fn new(
        db: WardenDatabase,
        jwt: Arc<JwtManager>,
        ids: Arc<IdAllocators>,
        table: SessionTable,
        session_age_secs: i64,
    ) -> Self {
        Self {
            db,
            jwt,
            ids,
            table,
            session_age_secs,
        }
    }

    fn next_id(&self) -> ServiceResult<i64> {
        let allocator = match self.table {
            SessionTable::Holder => &self.ids.holder_sessions,
            SessionTable::Admin => &self.ids.admin_sessions,
        };
        Ok(allocator.generate()?)
    }

    /// Open a session for `owner_id`, binding it to the caller's endpoint.
    pub async fn open(
        &self,
        owner_id: i64,
        remote: &RemoteEndpoint,
    ) -> ServiceResult<(Session, TokenPair)> {
        let tokens = self.jwt.issue_pair(owner_id)?;
        let id = self.next_id()?;
        let session = self
            .db
            .create_session(
                self.table,
                &CreateSessionParams {
                    id,
                    owner_id,
                    token_digest: &JwtManager::hash_token(&tokens.access_token),
                    refresh_token_digest: &JwtManager::hash_token(&tokens.refresh_token),
                    expired_at: unix_timestamp() + self.session_age_secs,
                    remote_ip_address: remote.ip.as_deref(),
                    remote_mac_address: remote.mac.as_deref(),
                },
            )
            .await?;
        debug!(session_id = id, owner_id, "Session opened");
        Ok((session, tokens))
    }

    /// Validate `token` for `scope` and return its live session.
    pub async fn authenticate(
        &self,
        token: &str,
        scope: TokenScope,
        remote: &RemoteEndpoint,
    ) -> ServiceResult<Session> {
        let claims = self
            .jwt
            .decode(token)
            .map_err(|e| ServiceError::Unauthenticated(format!("invalid token: {e}")))?;
        if claims.scope != scope {
            return Err(ServiceError::Unauthenticated(format!(
                "expected {scope} token, got {}",
                claims.scope
            )));
        }
        let subject = claims
            .subject_id()
            .ok_or_else(|| ServiceError::Unauthenticated("invalid token subject".into()))?;

        let session = self
            .db
            .find_session_by_token_digest(self.table, scope, &JwtManager::hash_token(token))
            .await?
            .filter(|s| s.owner_id == subject)
            .ok_or_else(|| ServiceError::Unauthenticated("session not found".into()))?;

        if !session.is_active_at(unix_timestamp()) {
            return Err(ServiceError::Unauthenticated("session expired".into()));
        }

        if let Some(recorded) = session.remote_ip_address.as_deref() {
            if remote.ip.as_deref() != Some(recorded) {
                warn!(session_id = session.id, "Session used from a different IP address");
                return Err(ServiceError::no_permissions());
            }
        }

        if let (Some(observed), Some(recorded)) =
            (remote.mac.as_deref(), session.remote_mac_address.as_deref())
        {
            if observed != recorded {
                warn!(session_id = session.id, "Session used from a different MAC address");
                return Err(ServiceError::no_permissions());
            }
        }

        Ok(session)
    }

    /// Rotate both tokens of the session the refresh token belongs to.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        remote: &RemoteEndpoint,
    ) -> ServiceResult<TokenPair> {
        let session = self
            .authenticate(refresh_token, TokenScope::Refresh, remote)
            .await?;
        let tokens = self.jwt.issue_pair(session.owner_id)?;
        self.db
            .rotate_session(
                self.table,
                session.id,
                &JwtManager::hash_token(&tokens.access_token),
                &JwtManager::hash_token(&tokens.refresh_token),
                unix_timestamp() + self.session_age_secs,
            )
            .await?;
        debug!(session_id = session.id, "Session refreshed");
        Ok(tokens)
    }

    /// Soft-expire the session the access token belongs to.
    pub async fn logout(&self, token: &str, remote: &RemoteEndpoint) -> ServiceResult<()> {
        let session = self.authenticate(token, TokenScope::Access, remote).await?;
        self.db
            .expire_session(self.table, session.id, unix_timestamp())
            .await?;
        debug!(session_id = session.id, "Session closed");
        Ok(())
    }
}
