//! Data models for warden storage.
//!
//! List-valued and enum-valued columns are stored as text; the private
//! `*Row` types mirror the table layout and are converted into the public
//! models on the way out.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::db::DatabaseError;
use crate::idgen::Coordinate;

/// Kind of a holder or admin contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactKind {
    Email,
    Phone,
}

impl ContactKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Phone => "phone",
        }
    }
}

/// Kind of a member node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Network,
    PersonalData,
}

impl NodeKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::PersonalData => "personal_data",
        }
    }

    /// Prefix of API keys issued to this kind of node.
    pub const fn api_key_prefix(self) -> &'static str {
        match self {
            Self::Network => "nn",
            Self::PersonalData => "pdn",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "network" => Ok(Self::Network),
            "personal_data" => Ok(Self::PersonalData),
            other => Err(DatabaseError::Corrupt(format!("unknown node kind {other:?}"))),
        }
    }
}

/// Moderation status of a member node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Approved,
    Rejected,
}

impl NodeStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeStatus {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(DatabaseError::Corrupt(format!("unknown node status {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// `max_requests` per `interval_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RateLimit {
    pub max_requests: i64,
    pub interval_secs: i64,
}

// =========================================================================
// Holders and admins
// =========================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holder {
    pub id: i64,
    pub emails: Vec<String>,
    pub phone_numbers: Vec<String>,
    #[serde(skip_serializing)]
    pub password_digest: String,
    pub avatar_url: Option<String>,
    pub countries: Vec<String>,
    pub languages: Vec<String>,
    pub confirmed: bool,
    #[serde(skip_serializing)]
    pub confirmation_code: String,
    pub created_at: i64,
    pub last_modified_at: i64,
}

#[derive(sqlx::FromRow)]
pub(super) struct HolderRow {
    pub id: i64,
    pub password_digest: String,
    pub avatar_url: Option<String>,
    pub countries: String,
    pub languages: String,
    pub confirmed: bool,
    pub confirmation_code: String,
    pub created_at: i64,
    pub last_modified_at: i64,
}

impl HolderRow {
    pub(super) fn into_holder(self, contacts: Contacts) -> Result<Holder, DatabaseError> {
        Ok(Holder {
            id: self.id,
            emails: contacts.emails,
            phone_numbers: contacts.phone_numbers,
            password_digest: self.password_digest,
            avatar_url: self.avatar_url,
            countries: serde_json::from_str(&self.countries)?,
            languages: serde_json::from_str(&self.languages)?,
            confirmed: self.confirmed,
            confirmation_code: self.confirmation_code,
            created_at: self.created_at,
            last_modified_at: self.last_modified_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admin {
    pub id: i64,
    pub emails: Vec<String>,
    pub phone_numbers: Vec<String>,
    #[serde(skip_serializing)]
    pub password_digest: String,
    pub avatar_url: Option<String>,
    pub countries: Vec<String>,
    pub languages: Vec<String>,
    pub created_at: i64,
    pub last_modified_at: i64,
}

#[derive(sqlx::FromRow)]
pub(super) struct AdminRow {
    pub id: i64,
    pub password_digest: String,
    pub avatar_url: Option<String>,
    pub countries: String,
    pub languages: String,
    pub created_at: i64,
    pub last_modified_at: i64,
}

impl AdminRow {
    pub(super) fn into_admin(self, contacts: Contacts) -> Result<Admin, DatabaseError> {
        Ok(Admin {
            id: self.id,
            emails: contacts.emails,
            phone_numbers: contacts.phone_numbers,
            password_digest: self.password_digest,
            avatar_url: self.avatar_url,
            countries: serde_json::from_str(&self.countries)?,
            languages: serde_json::from_str(&self.languages)?,
            created_at: self.created_at,
            last_modified_at: self.last_modified_at,
        })
    }
}

/// Contacts of one account, in insertion order.
#[derive(Debug, Default)]
pub(super) struct Contacts {
    pub emails: Vec<String>,
    pub phone_numbers: Vec<String>,
}

#[derive(sqlx::FromRow)]
pub(super) struct ContactRow {
    pub value: String,
    pub kind: String,
}

impl FromIterator<ContactRow> for Contacts {
    fn from_iter<I: IntoIterator<Item = ContactRow>>(rows: I) -> Self {
        let mut contacts = Self::default();
        for row in rows {
            if row.kind == ContactKind::Phone.as_str() {
                contacts.phone_numbers.push(row.value);
            } else {
                contacts.emails.push(row.value);
            }
        }
        contacts
    }
}

// =========================================================================
// Sessions
// =========================================================================

/// A holder or admin session. Tokens are stored as SHA-256 digests.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: i64,
    pub owner_id: i64,
    pub token_digest: String,
    pub refresh_token_digest: String,
    pub expired_at: i64,
    pub remote_ip_address: Option<String>,
    pub remote_mac_address: Option<String>,
    pub created_at: i64,
    pub last_modified_at: i64,
}

impl Session {
    pub const fn is_active_at(&self, now: i64) -> bool {
        now < self.expired_at
    }
}

// =========================================================================
// Member nodes and wardens
// =========================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberNode {
    pub id: i64,
    pub kind: NodeKind,
    pub warden_id: i64,
    pub owner_holder_id: i64,
    pub name: String,
    pub description: String,
    pub label: String,
    pub domain_name: Option<String>,
    pub address: Option<String>,
    pub location: Location,
    pub accounts_capacity: i64,
    pub alive: bool,
    pub last_pinged_at: Option<i64>,
    pub is_open: bool,
    pub is_invite_code_required: bool,
    pub url: String,
    #[serde(skip_serializing)]
    pub api_key_digest: Option<String>,
    pub version: String,
    pub rate_limit: RateLimit,
    pub crawl_rate_limit: RateLimit,
    pub status: NodeStatus,
    pub id_gen_coordinate: Option<Coordinate>,
    pub revision: i64,
    pub created_at: i64,
    pub last_modified_at: i64,
}

impl MemberNode {
    /// Activation is represented by an issued API key.
    pub const fn is_activated(&self) -> bool {
        self.api_key_digest.is_some()
    }

    /// Initiation is represented by an assigned coordinate.
    pub const fn is_initiated(&self) -> bool {
        self.id_gen_coordinate.is_some()
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct MemberNodeRow {
    pub id: i64,
    pub kind: String,
    pub warden_id: i64,
    pub owner_holder_id: i64,
    pub name: String,
    pub description: String,
    pub label: String,
    pub domain_name: Option<String>,
    pub address: Option<String>,
    pub location_latitude: f64,
    pub location_longitude: f64,
    pub accounts_capacity: i64,
    pub alive: bool,
    pub last_pinged_at: Option<i64>,
    pub is_open: bool,
    pub is_invite_code_required: bool,
    pub url: String,
    pub api_key_digest: Option<String>,
    pub version: String,
    pub rate_limit_max_requests: i64,
    pub rate_limit_interval_secs: i64,
    pub crawl_rate_limit_max_requests: i64,
    pub crawl_rate_limit_interval_secs: i64,
    pub status: String,
    pub id_gen_top_node: Option<i64>,
    pub id_gen_low_node: Option<i64>,
    pub revision: i64,
    pub created_at: i64,
    pub last_modified_at: i64,
}

fn coordinate_from_columns(top: i64, low: i64) -> Result<Coordinate, DatabaseError> {
    let corrupt = || DatabaseError::Corrupt(format!("invalid coordinate ({top}, {low})"));
    let top = u16::try_from(top).map_err(|_| corrupt())?;
    let low = u16::try_from(low).map_err(|_| corrupt())?;
    Coordinate::new(top, low).map_err(|_| corrupt())
}

impl TryFrom<MemberNodeRow> for MemberNode {
    type Error = DatabaseError;

    fn try_from(row: MemberNodeRow) -> Result<Self, Self::Error> {
        let id_gen_coordinate = match (row.id_gen_top_node, row.id_gen_low_node) {
            (Some(top), Some(low)) => Some(coordinate_from_columns(top, low)?),
            _ => None,
        };
        Ok(Self {
            id: row.id,
            kind: row.kind.parse()?,
            warden_id: row.warden_id,
            owner_holder_id: row.owner_holder_id,
            name: row.name,
            description: row.description,
            label: row.label,
            domain_name: row.domain_name,
            address: row.address,
            location: Location {
                latitude: row.location_latitude,
                longitude: row.location_longitude,
            },
            accounts_capacity: row.accounts_capacity,
            alive: row.alive,
            last_pinged_at: row.last_pinged_at,
            is_open: row.is_open,
            is_invite_code_required: row.is_invite_code_required,
            url: row.url,
            api_key_digest: row.api_key_digest,
            version: row.version,
            rate_limit: RateLimit {
                max_requests: row.rate_limit_max_requests,
                interval_secs: row.rate_limit_interval_secs,
            },
            crawl_rate_limit: RateLimit {
                max_requests: row.crawl_rate_limit_max_requests,
                interval_secs: row.crawl_rate_limit_interval_secs,
            },
            status: row.status.parse()?,
            id_gen_coordinate,
            revision: row.revision,
            created_at: row.created_at,
            last_modified_at: row.last_modified_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warden {
    pub id: i64,
    pub label: String,
    pub address: String,
    pub name: String,
    pub description: String,
    pub location: Location,
    pub pdn_capacity: i64,
    pub nn_capacity: i64,
    pub alive: bool,
    pub last_pinged_at: Option<i64>,
    pub is_open: bool,
    pub url: String,
    pub version: String,
    pub rate_limit: RateLimit,
    pub id_gen_coordinate: Coordinate,
    pub created_at: i64,
    pub last_modified_at: i64,
}

#[derive(sqlx::FromRow)]
pub(super) struct WardenRow {
    pub id: i64,
    pub label: String,
    pub address: String,
    pub name: String,
    pub description: String,
    pub location_latitude: f64,
    pub location_longitude: f64,
    pub pdn_capacity: i64,
    pub nn_capacity: i64,
    pub alive: bool,
    pub last_pinged_at: Option<i64>,
    pub is_open: bool,
    pub url: String,
    pub version: String,
    pub rate_limit_max_requests: i64,
    pub rate_limit_interval_secs: i64,
    pub id_gen_top_node: i64,
    pub created_at: i64,
    pub last_modified_at: i64,
}

impl TryFrom<WardenRow> for Warden {
    type Error = DatabaseError;

    fn try_from(row: WardenRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            label: row.label,
            address: row.address,
            name: row.name,
            description: row.description,
            location: Location {
                latitude: row.location_latitude,
                longitude: row.location_longitude,
            },
            pdn_capacity: row.pdn_capacity,
            nn_capacity: row.nn_capacity,
            alive: row.alive,
            last_pinged_at: row.last_pinged_at,
            is_open: row.is_open,
            url: row.url,
            version: row.version,
            rate_limit: RateLimit {
                max_requests: row.rate_limit_max_requests,
                interval_secs: row.rate_limit_interval_secs,
            },
            id_gen_coordinate: coordinate_from_columns(row.id_gen_top_node, 0)?,
            created_at: row.created_at,
            last_modified_at: row.last_modified_at,
        })
    }
}

// =========================================================================
// Notification ledger
// =========================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SentNotification {
    pub id: i64,
    pub sender_address: String,
    pub receiver_address: String,
    pub template_name: String,
    pub created_at: i64,
    pub last_modified_at: i64,
}
