//! Holder accounts: registration, confirmation, sessions and profile.
//!
//! Holders move from pending confirmation to confirmed. Confirmation codes
//! are delivered through the [`QuotaLedger`], so a holder cannot be sent
//! more codes than the template's window allows.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use warden_core::config::WardenConfig;
use warden_core::db::DatabaseError;
use warden_core::validation::{
    ensure_distinct, validate_country, validate_email, validate_language, validate_password,
    validate_phone_number,
};

use super::{HolderSession, RemoteEndpoint, ServiceError, ServiceResult, SessionManager};
use crate::auth::password::{hash_password, verify_password};
use crate::auth::secrets::confirmation_code;
use crate::auth::{JwtManager, TokenPair, TokenScope};
use crate::idgen::IdAllocators;
use crate::notifications::{Channel, NotificationError, Payload, QuotaLedger, Template};
use crate::storage::{
    CreateHolderParams, Holder, SessionTable, UpdateHolderProfileParams, WardenDatabase,
};

/// Input of [`IdentityService::register`].
#[derive(Debug, Clone, Default)]
pub struct RegisterParams {
    pub emails: Vec<String>,
    pub phone_numbers: Vec<String>,
    pub countries: Vec<String>,
    pub languages: Vec<String>,
    pub password: String,
    pub avatar_url: Option<String>,
}

/// Input of [`IdentityService::login`]. Email takes precedence over phone.
#[derive(Debug, Clone, Default)]
pub struct LoginParams {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub password: String,
}

/// Partial profile update; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ModifyProfileParams {
    pub avatar_url: Option<String>,
    pub countries: Option<Vec<String>>,
    pub languages: Option<Vec<String>>,
}

/// What happened to the confirmation message sent at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    QuotaExceeded,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub channel: Channel,
    pub recipient: String,
    pub outcome: DeliveryOutcome,
}

/// Result of a successful registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub holder: Holder,
    pub tokens: TokenPair,
    pub delivery: Delivery,
}

/// Result of an availability probe. `problems` names every rejected value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactCheck {
    pub valid: bool,
    pub problems: Vec<String>,
}

pub struct IdentityService {
    db: WardenDatabase,
    ids: Arc<IdAllocators>,
    sessions: SessionManager,
    ledger: Arc<QuotaLedger>,
    sender_email: String,
    sender_sms: String,
}

impl IdentityService {
    pub fn new(
        db: WardenDatabase,
        ids: Arc<IdAllocators>,
        jwt: Arc<JwtManager>,
        ledger: Arc<QuotaLedger>,
        config: &WardenConfig,
    ) -> Self {
        let sessions = SessionManager::new(
            db.clone(),
            jwt,
            Arc::clone(&ids),
            SessionTable::Holder,
            config.auth.session_age_secs,
        );
        Self {
            db,
            ids,
            sessions,
            ledger,
            sender_email: config.notifications.sender_email.clone(),
            sender_sms: config.notifications.sender_sms.clone(),
        }
    }

    /// Create a holder, open its first session and send a confirmation code.
    ///
    /// A refused or failed confirmation message does not fail registration;
    /// it is reported in [`Registration::delivery`].
    #[instrument(skip(self, params, remote), fields(emails = params.emails.len(), phones = params.phone_numbers.len()))]
    pub async fn register(
        &self,
        params: RegisterParams,
        remote: &RemoteEndpoint,
    ) -> ServiceResult<Registration> {
        validate_registration(&params)?;
        self.ensure_contacts_free(&params).await?;

        let id = self.ids.holders.generate()?;
        let password_digest = hash_password(&params.password)?;
        let code = confirmation_code();

        let holder = self
            .db
            .create_holder(&CreateHolderParams {
                id,
                emails: &params.emails,
                phone_numbers: &params.phone_numbers,
                password_digest: &password_digest,
                avatar_url: params.avatar_url.as_deref(),
                countries: &params.countries,
                languages: &params.languages,
                confirmation_code: &code,
            })
            .await
            .map_err(|e| match e {
                DatabaseError::UniqueViolation(_) => {
                    ServiceError::Validation("contact is already in use".into())
                }
                other => other.into(),
            })?;

        let (_, tokens) = self.sessions.open(holder.id, remote).await?;
        info!(holder_id = holder.id, "Holder registered");

        let (channel, recipient) = match holder.emails.first() {
            Some(email) => (Channel::Email, email.clone()),
            None => match holder.phone_numbers.first() {
                Some(phone) => (Channel::Sms, phone.clone()),
                None => {
                    return Err(ServiceError::Validation(
                        "at least one email or phone number is required".into(),
                    ));
                }
            },
        };
        let outcome = match self.send_confirmation(channel, &recipient, &code).await {
            Ok(()) => DeliveryOutcome::Sent,
            Err(NotificationError::QuotaExceeded { .. }) => DeliveryOutcome::QuotaExceeded,
            Err(e) => {
                warn!(holder_id = holder.id, error = %e, "Confirmation delivery failed");
                DeliveryOutcome::Failed(e.to_string())
            }
        };

        Ok(Registration {
            holder,
            tokens,
            delivery: Delivery {
                channel,
                recipient,
                outcome,
            },
        })
    }

    async fn ensure_contacts_free(&self, params: &RegisterParams) -> ServiceResult<()> {
        if let Some(email) = self
            .db
            .holder_contacts_in_use(&params.emails)
            .await?
            .into_iter()
            .next()
        {
            return Err(ServiceError::Validation(format!(
                "email is already in use (email = {email})"
            )));
        }
        if let Some(phone) = self
            .db
            .holder_contacts_in_use(&params.phone_numbers)
            .await?
            .into_iter()
            .next()
        {
            return Err(ServiceError::Validation(format!(
                "phone number is already in use (phone_number = {phone})"
            )));
        }
        Ok(())
    }

    async fn send_confirmation(
        &self,
        channel: Channel,
        recipient: &str,
        code: &str,
    ) -> Result<(), NotificationError> {
        let template = Template::confirmation(channel);
        let recipients = [recipient.to_string()];
        match channel {
            Channel::Email => {
                self.ledger
                    .send(
                        template,
                        &recipients,
                        &self.sender_email,
                        Payload::ConfirmationEmail {
                            display_name: recipient,
                            code,
                        },
                    )
                    .await
            }
            Channel::Sms => {
                let body = format!("Your confirmation code: {code}");
                self.ledger
                    .send(template, &recipients, &self.sender_sms, Payload::Sms { body: &body })
                    .await
            }
        }
    }

    /// Mark the holder confirmed if `code` matches. Repeating a successful
    /// confirmation with the same code is a no-op.
    #[instrument(skip(self, code))]
    pub async fn confirm(&self, holder_id: i64, code: &str) -> ServiceResult<Holder> {
        let holder = self.db.get_holder(holder_id).await?;
        if holder.confirmation_code != code {
            return Err(ServiceError::Validation("invalid confirmation code".into()));
        }
        if holder.confirmed {
            return Ok(holder);
        }
        self.db.mark_holder_confirmed(holder_id).await?;
        info!(holder_id, "Holder confirmed");
        Ok(self.db.get_holder(holder_id).await?)
    }

    /// Issue a fresh confirmation code over `channel`.
    ///
    /// The new code replaces the stored one only after it was delivered, so
    /// a failed send leaves the previous code valid.
    #[instrument(skip(self))]
    pub async fn resend_confirmation(&self, holder_id: i64, channel: Channel) -> ServiceResult<()> {
        let holder = self.db.get_holder(holder_id).await?;
        if holder.confirmed {
            return Err(ServiceError::Validation("holder is already confirmed".into()));
        }
        let recipient = match channel {
            Channel::Email => holder.emails.first(),
            Channel::Sms => holder.phone_numbers.first(),
        }
        .cloned()
        .ok_or_else(|| ServiceError::Validation(format!("holder has no {channel} contact")))?;

        let template = Template::confirmation(channel);
        if !self
            .ledger
            .can_send(template, std::slice::from_ref(&recipient))
            .await?
        {
            return Err(ServiceError::QuotaExceeded {
                template,
                recipient,
            });
        }

        let code = confirmation_code();
        self.send_confirmation(channel, &recipient, &code).await?;
        self.db.reset_holder_confirmation(holder_id, &code).await?;
        Ok(())
    }

    #[instrument(skip(self, params, remote))]
    pub async fn login(
        &self,
        params: LoginParams,
        remote: &RemoteEndpoint,
    ) -> ServiceResult<(Holder, TokenPair)> {
        let contact = params
            .email
            .as_deref()
            .or(params.phone_number.as_deref())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ServiceError::Validation("email or phone number is required".into()))?;

        let holder = self
            .db
            .find_holder_by_contact(contact)
            .await?
            .ok_or_else(|| ServiceError::NotFound("holder not found".into()))?;
        if !verify_password(&params.password, &holder.password_digest)? {
            return Err(ServiceError::InvalidPassword);
        }

        let (_, tokens) = self.sessions.open(holder.id, remote).await?;
        info!(holder_id = holder.id, "Holder logged in");
        Ok((holder, tokens))
    }

    #[instrument(skip_all)]
    pub async fn refresh(
        &self,
        refresh_token: &str,
        remote: &RemoteEndpoint,
    ) -> ServiceResult<TokenPair> {
        self.sessions.refresh(refresh_token, remote).await
    }

    #[instrument(skip_all)]
    pub async fn logout(&self, token: &str, remote: &RemoteEndpoint) -> ServiceResult<()> {
        self.sessions.logout(token, remote).await
    }

    /// Validate a holder token and return proof of the session.
    pub async fn authenticate(
        &self,
        token: &str,
        scope: TokenScope,
        remote: &RemoteEndpoint,
    ) -> ServiceResult<HolderSession> {
        let session = self.sessions.authenticate(token, scope, remote).await?;
        Ok(HolderSession::new(session.owner_id, session.id))
    }

    #[instrument(skip(self, old_password, new_password), fields(holder_id = session.holder_id()))]
    pub async fn change_password(
        &self,
        session: &HolderSession,
        old_password: &str,
        new_password: &str,
    ) -> ServiceResult<()> {
        let holder = self.db.get_holder(session.holder_id()).await?;
        if !verify_password(old_password, &holder.password_digest)? {
            return Err(ServiceError::InvalidPassword);
        }
        validate_password(new_password)?;
        let digest = hash_password(new_password)?;
        self.db.update_holder_password(holder.id, &digest).await?;
        info!(holder_id = holder.id, "Holder password changed");
        Ok(())
    }

    #[instrument(skip(self, params), fields(holder_id = session.holder_id()))]
    pub async fn modify_profile(
        &self,
        session: &HolderSession,
        params: ModifyProfileParams,
    ) -> ServiceResult<Holder> {
        if let Some(countries) = &params.countries {
            for country in countries {
                validate_country(country)?;
            }
        }
        if let Some(languages) = &params.languages {
            for language in languages {
                validate_language(language)?;
            }
        }

        let current = self.db.get_holder(session.holder_id()).await?;
        let avatar_url = params.avatar_url.or(current.avatar_url);
        let countries = params.countries.unwrap_or(current.countries);
        let languages = params.languages.unwrap_or(current.languages);

        Ok(self
            .db
            .update_holder_profile(
                current.id,
                &UpdateHolderProfileParams {
                    avatar_url: avatar_url.as_deref(),
                    countries: &countries,
                    languages: &languages,
                },
            )
            .await?)
    }

    pub async fn get_holder(&self, session: &HolderSession) -> ServiceResult<Holder> {
        Ok(self.db.get_holder(session.holder_id()).await?)
    }

    /// Delete the caller's account along with its sessions and nodes.
    #[instrument(skip(self), fields(holder_id = session.holder_id()))]
    pub async fn delete(&self, session: &HolderSession) -> ServiceResult<()> {
        if !self.db.delete_holder(session.holder_id()).await? {
            return Err(ServiceError::NotFound("holder not found".into()));
        }
        info!(holder_id = session.holder_id(), "Holder deleted");
        Ok(())
    }

    /// Report which emails are malformed or already registered.
    pub async fn check_emails(&self, emails: &[String]) -> ServiceResult<ContactCheck> {
        self.check_contacts(emails, ("email", "email"), validate_email)
            .await
    }

    /// Report which phone numbers are malformed or already registered.
    pub async fn check_phone_numbers(&self, phones: &[String]) -> ServiceResult<ContactCheck> {
        self.check_contacts(phones, ("phone number", "phone_number"), validate_phone_number)
            .await
    }

    async fn check_contacts(
        &self,
        values: &[String],
        (what, field): (&str, &str),
        validate: fn(&str) -> warden_core::Result<()>,
    ) -> ServiceResult<ContactCheck> {
        let mut problems = Vec::new();
        let mut well_formed = Vec::new();
        for value in values {
            match validate(value) {
                Ok(()) => well_formed.push(value.clone()),
                Err(warden_core::Error::Validation(msg)) => problems.push(msg),
                Err(other) => problems.push(other.to_string()),
            }
        }
        for value in self.db.holder_contacts_in_use(&well_formed).await? {
            problems.push(format!("{what} is already in use ({field} = {value})"));
        }
        Ok(ContactCheck {
            valid: problems.is_empty(),
            problems,
        })
    }
}

fn validate_registration(params: &RegisterParams) -> ServiceResult<()> {
    if params.emails.is_empty() && params.phone_numbers.is_empty() {
        return Err(ServiceError::Validation(
            "at least one email or phone number is required".into(),
        ));
    }
    for email in &params.emails {
        validate_email(email)?;
    }
    for phone in &params.phone_numbers {
        validate_phone_number(phone)?;
    }
    for country in &params.countries {
        validate_country(country)?;
    }
    for language in &params.languages {
        validate_language(language)?;
    }
    validate_password(&params.password)?;
    ensure_distinct(params.emails.iter().map(String::as_str), "email")?;
    ensure_distinct(params.phone_numbers.iter().map(String::as_str), "phone number")?;
    Ok(())
}
