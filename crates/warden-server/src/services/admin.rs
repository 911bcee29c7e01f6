//! Operator accounts. Same session rules as holders, against admin tables.

use std::sync::Arc;

use tracing::{info, instrument};
use warden_core::config::WardenConfig;
use warden_core::validation::{
    ensure_distinct, validate_country, validate_email, validate_language, validate_password,
    validate_phone_number,
};

use super::{AdminSession, RemoteEndpoint, ServiceError, ServiceResult, SessionManager};
use crate::auth::password::{hash_password, verify_password};
use crate::auth::{JwtManager, TokenPair, TokenScope};
use crate::idgen::IdAllocators;
use crate::storage::{Admin, CreateAdminParams, SessionTable, WardenDatabase};

#[derive(Debug, Clone, Default)]
pub struct CreateAdminRequest {
    pub emails: Vec<String>,
    pub phone_numbers: Vec<String>,
    pub countries: Vec<String>,
    pub languages: Vec<String>,
    pub password: String,
    pub avatar_url: Option<String>,
}

pub struct AdminService {
    db: WardenDatabase,
    ids: Arc<IdAllocators>,
    sessions: SessionManager,
}

impl AdminService {
    pub fn new(
        db: WardenDatabase,
        ids: Arc<IdAllocators>,
        jwt: Arc<JwtManager>,
        config: &WardenConfig,
    ) -> Self {
        let sessions = SessionManager::new(
            db.clone(),
            jwt,
            Arc::clone(&ids),
            SessionTable::Admin,
            config.auth.session_age_secs,
        );
        Self { db, ids, sessions }
    }

    #[instrument(skip(self, request), fields(emails = request.emails.len()))]
    pub async fn create_admin(&self, request: CreateAdminRequest) -> ServiceResult<Admin> {
        if request.emails.is_empty() && request.phone_numbers.is_empty() {
            return Err(ServiceError::Validation(
                "at least one email or phone number is required".into(),
            ));
        }
        for email in &request.emails {
            validate_email(email)?;
        }
        for phone in &request.phone_numbers {
            validate_phone_number(phone)?;
        }
        for country in &request.countries {
            validate_country(country)?;
        }
        for language in &request.languages {
            validate_language(language)?;
        }
        validate_password(&request.password)?;
        ensure_distinct(request.emails.iter().map(String::as_str), "email")?;
        ensure_distinct(request.phone_numbers.iter().map(String::as_str), "phone number")?;

        for contact in request.emails.iter().chain(&request.phone_numbers) {
            if self.db.find_admin_by_contact(contact).await?.is_some() {
                return Err(ServiceError::Validation(format!(
                    "contact is already in use (contact = {contact})"
                )));
            }
        }

        let id = self.ids.admins.generate()?;
        let digest = hash_password(&request.password)?;
        let admin = self
            .db
            .create_admin(&CreateAdminParams {
                id,
                emails: &request.emails,
                phone_numbers: &request.phone_numbers,
                password_digest: &digest,
                avatar_url: request.avatar_url.as_deref(),
                countries: &request.countries,
                languages: &request.languages,
            })
            .await?;
        info!(admin_id = admin.id, "Admin created");
        Ok(admin)
    }

    /// Create the bootstrap admin unless one with this email already exists.
    pub async fn ensure_admin(&self, email: &str, password: &str) -> ServiceResult<Admin> {
        if let Some(existing) = self.db.find_admin_by_contact(email).await? {
            return Ok(existing);
        }
        self.create_admin(CreateAdminRequest {
            emails: vec![email.to_string()],
            password: password.to_string(),
            ..CreateAdminRequest::default()
        })
        .await
    }

    /// Sign in by email or phone number.
    #[instrument(skip(self, password, remote))]
    pub async fn login(
        &self,
        contact: &str,
        password: &str,
        remote: &RemoteEndpoint,
    ) -> ServiceResult<(Admin, TokenPair)> {
        if contact.is_empty() {
            return Err(ServiceError::Validation(
                "email or phone number is required".into(),
            ));
        }
        let admin = self
            .db
            .find_admin_by_contact(contact)
            .await?
            .ok_or_else(|| ServiceError::NotFound("admin not found".into()))?;
        if !verify_password(password, &admin.password_digest)? {
            return Err(ServiceError::InvalidPassword);
        }
        let (_, tokens) = self.sessions.open(admin.id, remote).await?;
        info!(admin_id = admin.id, "Admin logged in");
        Ok((admin, tokens))
    }

    pub async fn refresh(
        &self,
        refresh_token: &str,
        remote: &RemoteEndpoint,
    ) -> ServiceResult<TokenPair> {
        self.sessions.refresh(refresh_token, remote).await
    }

    pub async fn logout(&self, token: &str, remote: &RemoteEndpoint) -> ServiceResult<()> {
        self.sessions.logout(token, remote).await
    }

    pub async fn authenticate(
        &self,
        token: &str,
        scope: TokenScope,
        remote: &RemoteEndpoint,
    ) -> ServiceResult<AdminSession> {
        let session = self.sessions.authenticate(token, scope, remote).await?;
        Ok(AdminSession::new(session.owner_id, session.id))
    }

    #[instrument(skip(self, old_password, new_password), fields(admin_id = session.admin_id()))]
    pub async fn change_password(
        &self,
        session: &AdminSession,
        old_password: &str,
        new_password: &str,
    ) -> ServiceResult<()> {
        let admin = self.db.get_admin(session.admin_id()).await?;
        if !verify_password(old_password, &admin.password_digest)? {
            return Err(ServiceError::InvalidPassword);
        }
        validate_password(new_password)?;
        let digest = hash_password(new_password)?;
        self.db.update_admin_password(admin.id, &digest).await?;
        Ok(())
    }
}
