//! Shared setup for service test modules.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use warden_core::config::WardenConfig;

use super::identity::{RegisterParams, Registration};
use super::{AdminSession, HolderSession, RemoteEndpoint};
use crate::auth::TokenScope;
use crate::control_plane::ControlPlane;
use crate::notifications::RecordingDispatcher;
use crate::storage::WardenDatabase;

pub const PASSWORD: &str = "correct-horse";
pub const ADMIN_EMAIL: &str = "root@warden.test";
pub const ADMIN_PASSWORD: &str = "admin-password";

pub struct Harness {
    pub plane: ControlPlane,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub db: WardenDatabase,
}

pub fn remote() -> RemoteEndpoint {
    RemoteEndpoint::new(Some("10.0.0.1"), None)
}

pub async fn harness() -> Harness {
    harness_with(WardenConfig::default()).await
}

pub async fn harness_with(config: WardenConfig) -> Harness {
    let db = WardenDatabase::open_in_memory().await.unwrap();
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let plane =
        ControlPlane::new(db.clone(), &config, b"test-secret", Arc::clone(&dispatcher) as _)
            .unwrap();
    Harness {
        plane,
        dispatcher,
        db,
    }
}

pub fn email_registration(email: &str) -> RegisterParams {
    RegisterParams {
        emails: vec![email.to_string()],
        password: PASSWORD.to_string(),
        ..RegisterParams::default()
    }
}

impl Harness {
    pub async fn register(&self, email: &str) -> Registration {
        self.plane
            .identity
            .register(email_registration(email), &remote())
            .await
            .unwrap()
    }

    /// Register, confirm with the delivered code and return the session.
    pub async fn confirmed_holder(&self, email: &str) -> HolderSession {
        let registration = self.register(email).await;
        let code = self
            .dispatcher
            .last_email_code(email)
            .expect("confirmation email was sent");
        self.plane
            .identity
            .confirm(registration.holder.id, &code)
            .await
            .unwrap();
        self.holder_session(&registration.tokens.access_token).await
    }

    pub async fn holder_session(&self, access_token: &str) -> HolderSession {
        self.plane
            .identity
            .authenticate(access_token, TokenScope::Access, &remote())
            .await
            .unwrap()
    }

    pub async fn admin_session(&self) -> AdminSession {
        self.plane
            .admins
            .ensure_admin(ADMIN_EMAIL, ADMIN_PASSWORD)
            .await
            .unwrap();
        let (_, tokens) = self
            .plane
            .admins
            .login(ADMIN_EMAIL, ADMIN_PASSWORD, &remote())
            .await
            .unwrap();
        self.plane
            .admins
            .authenticate(&tokens.access_token, TokenScope::Access, &remote())
            .await
            .unwrap()
    }
}
