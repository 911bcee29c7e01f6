//! Storage layer tests for the warden.

use super::db::{DatabaseError, WardenDatabase};
use super::models::{Location, NodeKind, NodeStatus, RateLimit};
use super::queries_admins::CreateAdminParams;
use super::queries_holders::{CreateHolderParams, UpdateHolderProfileParams};
use super::queries_nodes::{InitiateMemberNodeParams, InsertMemberNodeParams, MemberNodeFilter};
use super::queries_sessions::{CreateSessionParams, SessionTable};
use super::queries_wardens::InsertWardenParams;
use crate::auth::TokenScope;
use crate::idgen::Coordinate;
use warden_core::db::unix_timestamp;

async fn test_db() -> WardenDatabase {
    WardenDatabase::open_in_memory().await.unwrap()
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

async fn seed_holder(db: &WardenDatabase, id: i64, email: &str) {
    let emails = strings(&[email]);
    db.create_holder(&CreateHolderParams {
        id,
        emails: &emails,
        phone_numbers: &[],
        password_digest: "digest",
        avatar_url: None,
        countries: &strings(&["US"]),
        languages: &strings(&["en"]),
        confirmation_code: "0123456789",
    })
    .await
    .unwrap();
}

async fn seed_node(db: &WardenDatabase, id: i64, owner: i64, kind: NodeKind, label: &str) {
    db.insert_member_node(&InsertMemberNodeParams {
        id,
        kind,
        warden_id: 1,
        owner_holder_id: owner,
        name: "node",
        description: "",
        label,
        domain_name: None,
        address: None,
        location: Location::default(),
        url: "https://node.example.com",
    })
    .await
    .unwrap();
}

// === Holder tests ===

#[tokio::test]
async fn create_and_get_holder() {
    let db = test_db().await;
    let emails = strings(&["alice@example.com", "alt@example.com"]);
    let phones = strings(&["+14155552671"]);
    let holder = db
        .create_holder(&CreateHolderParams {
            id: 10,
            emails: &emails,
            phone_numbers: &phones,
            password_digest: "digest",
            avatar_url: Some("https://img.example.com/a.png"),
            countries: &strings(&["US", "CA"]),
            languages: &strings(&["en"]),
            confirmation_code: "0000000001",
        })
        .await
        .unwrap();

    assert_eq!(holder.id, 10);
    assert_eq!(holder.emails, emails);
    assert_eq!(holder.phone_numbers, phones);
    assert_eq!(holder.countries, strings(&["US", "CA"]));
    assert!(!holder.confirmed);
    assert_eq!(holder.confirmation_code, "0000000001");
}

#[tokio::test]
async fn duplicate_contact_rolls_back_holder() {
    let db = test_db().await;
    seed_holder(&db, 1, "alice@example.com").await;

    let emails = strings(&["new@example.com", "alice@example.com"]);
    let err = db
        .create_holder(&CreateHolderParams {
            id: 2,
            emails: &emails,
            phone_numbers: &[],
            password_digest: "digest",
            avatar_url: None,
            countries: &[],
            languages: &[],
            confirmation_code: "1",
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DatabaseError::UniqueViolation(_)), "got {err}");
    assert!(matches!(db.get_holder(2).await, Err(DatabaseError::NotFound(_))));
    assert!(db.find_holder_by_contact("new@example.com").await.unwrap().is_none());
}

#[tokio::test]
async fn contacts_in_use_preserves_input_order() {
    let db = test_db().await;
    seed_holder(&db, 1, "a@example.com").await;
    seed_holder(&db, 2, "b@example.com").await;

    let probe = strings(&["b@example.com", "c@example.com", "a@example.com"]);
    let in_use = db.holder_contacts_in_use(&probe).await.unwrap();
    assert_eq!(in_use, strings(&["b@example.com", "a@example.com"]));
}

#[tokio::test]
async fn confirmation_flags() {
    let db = test_db().await;
    seed_holder(&db, 1, "a@example.com").await;

    db.mark_holder_confirmed(1).await.unwrap();
    assert!(db.get_holder(1).await.unwrap().confirmed);

    db.reset_holder_confirmation(1, "9999999999").await.unwrap();
    let holder = db.get_holder(1).await.unwrap();
    assert!(!holder.confirmed);
    assert_eq!(holder.confirmation_code, "9999999999");

    assert!(matches!(
        db.mark_holder_confirmed(404).await,
        Err(DatabaseError::NotFound(_))
    ));
}

#[tokio::test]
async fn update_profile_replaces_fields() {
    let db = test_db().await;
    seed_holder(&db, 1, "a@example.com").await;

    let holder = db
        .update_holder_profile(
            1,
            &UpdateHolderProfileParams {
                avatar_url: Some("https://img/x.png"),
                countries: &strings(&["DE"]),
                languages: &strings(&["de", "en"]),
            },
        )
        .await
        .unwrap();
    assert_eq!(holder.avatar_url.as_deref(), Some("https://img/x.png"));
    assert_eq!(holder.countries, strings(&["DE"]));
    assert_eq!(holder.languages, strings(&["de", "en"]));
}

#[tokio::test]
async fn deleting_holder_cascades() {
    let db = test_db().await;
    seed_holder(&db, 1, "a@example.com").await;
    seed_node(&db, 100, 1, NodeKind::PersonalData, "alice").await;
    db.create_session(
        SessionTable::Holder,
        &CreateSessionParams {
            id: 50,
            owner_id: 1,
            token_digest: "t",
            refresh_token_digest: "r",
            expired_at: unix_timestamp() + 60,
            remote_ip_address: None,
            remote_mac_address: None,
        },
    )
    .await
    .unwrap();

    assert!(db.delete_holder(1).await.unwrap());
    assert!(!db.delete_holder(1).await.unwrap());
    assert!(db.find_holder_by_contact("a@example.com").await.unwrap().is_none());
    assert!(db.get_session(SessionTable::Holder, 50).await.is_err());
    assert!(db.get_member_node(NodeKind::PersonalData, 100).await.is_err());
}

// === Admin tests ===

#[tokio::test]
async fn admin_contacts_are_separate_from_holders() {
    let db = test_db().await;
    seed_holder(&db, 1, "ops@example.com").await;

    let emails = strings(&["ops@example.com"]);
    let admin = db
        .create_admin(&CreateAdminParams {
            id: 7,
            emails: &emails,
            phone_numbers: &[],
            password_digest: "digest",
            avatar_url: None,
            countries: &[],
            languages: &[],
        })
        .await
        .unwrap();
    assert_eq!(admin.emails, emails);

    let found = db.find_admin_by_contact("ops@example.com").await.unwrap().unwrap();
    assert_eq!(found.id, 7);

    db.update_admin_password(7, "new-digest").await.unwrap();
    assert_eq!(db.get_admin(7).await.unwrap().password_digest, "new-digest");
}

// === Session tests ===

#[tokio::test]
async fn session_lookup_by_scope() {
    let db = test_db().await;
    seed_holder(&db, 1, "a@example.com").await;
    let expired_at = unix_timestamp() + 3600;
    db.create_session(
        SessionTable::Holder,
        &CreateSessionParams {
            id: 5,
            owner_id: 1,
            token_digest: "access-digest",
            refresh_token_digest: "refresh-digest",
            expired_at,
            remote_ip_address: Some("10.0.0.1"),
            remote_mac_address: None,
        },
    )
    .await
    .unwrap();

    let by_access = db
        .find_session_by_token_digest(SessionTable::Holder, TokenScope::Access, "access-digest")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_access.owner_id, 1);
    assert_eq!(by_access.remote_ip_address.as_deref(), Some("10.0.0.1"));

    // The refresh digest is not an access token.
    assert!(db
        .find_session_by_token_digest(SessionTable::Holder, TokenScope::Access, "refresh-digest")
        .await
        .unwrap()
        .is_none());
    assert!(db
        .find_session_by_token_digest(SessionTable::Holder, TokenScope::Refresh, "refresh-digest")
        .await
        .unwrap()
        .is_some());

    // Admin table is disjoint.
    assert!(db
        .find_session_by_token_digest(SessionTable::Admin, TokenScope::Access, "access-digest")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn rotate_and_expire_session() {
    let db = test_db().await;
    seed_holder(&db, 1, "a@example.com").await;
    let now = unix_timestamp();
    db.create_session(
        SessionTable::Holder,
        &CreateSessionParams {
            id: 5,
            owner_id: 1,
            token_digest: "a1",
            refresh_token_digest: "r1",
            expired_at: now + 10,
            remote_ip_address: None,
            remote_mac_address: None,
        },
    )
    .await
    .unwrap();

    let rotated = db
        .rotate_session(SessionTable::Holder, 5, "a2", "r2", now + 100)
        .await
        .unwrap();
    assert_eq!(rotated.token_digest, "a2");
    assert_eq!(rotated.expired_at, now + 100);
    assert!(rotated.is_active_at(now));

    db.expire_session(SessionTable::Holder, 5, now).await.unwrap();
    let session = db.get_session(SessionTable::Holder, 5).await.unwrap();
    assert!(!session.is_active_at(now));
}

// === Member node tests ===

#[tokio::test]
async fn label_unique_per_warden() {
    let db = test_db().await;
    seed_holder(&db, 1, "a@example.com").await;
    seed_node(&db, 100, 1, NodeKind::PersonalData, "alice").await;

    assert!(db.member_node_label_in_use(1, "alice").await.unwrap());
    assert!(!db.member_node_label_in_use(2, "alice").await.unwrap());

    let err = db
        .insert_member_node(&InsertMemberNodeParams {
            id: 101,
            kind: NodeKind::Network,
            warden_id: 1,
            owner_holder_id: 1,
            name: "dup",
            description: "",
            label: "alice",
            domain_name: None,
            address: None,
            location: Location::default(),
            url: "",
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::UniqueViolation(_)));
}

#[tokio::test]
async fn get_member_node_checks_kind() {
    let db = test_db().await;
    seed_holder(&db, 1, "a@example.com").await;
    seed_node(&db, 100, 1, NodeKind::Network, "node.example.com").await;

    let node = db.get_member_node(NodeKind::Network, 100).await.unwrap();
    assert_eq!(node.status, NodeStatus::Pending);
    assert_eq!(node.revision, 0);
    assert!(!node.is_activated());
    assert!(matches!(
        db.get_member_node(NodeKind::PersonalData, 100).await,
        Err(DatabaseError::NotFound(_))
    ));
}

#[tokio::test]
async fn status_update_is_compare_and_swap() {
    let db = test_db().await;
    seed_holder(&db, 1, "a@example.com").await;
    seed_node(&db, 100, 1, NodeKind::PersonalData, "alice").await;

    db.set_member_node_status(100, NodeStatus::Approved, 0).await.unwrap();
    let err = db
        .set_member_node_status(100, NodeStatus::Rejected, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::Stale(_)));

    let node = db.get_member_node(NodeKind::PersonalData, 100).await.unwrap();
    assert_eq!(node.status, NodeStatus::Approved);
    assert_eq!(node.revision, 1);
}

#[tokio::test]
async fn api_key_and_initiation() {
    let db = test_db().await;
    seed_holder(&db, 1, "a@example.com").await;
    seed_node(&db, 100, 1, NodeKind::PersonalData, "alice").await;

    db.set_member_node_api_key(100, "key-digest", 0).await.unwrap();
    let node = db
        .find_member_node_by_api_key_digest("key-digest")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(node.id, 100);
    assert!(node.is_activated());

    db.initiate_member_node(
        100,
        &InitiateMemberNodeParams {
            accounts_capacity: 1000,
            is_open: true,
            is_invite_code_required: false,
            version: "1.2.3",
            rate_limit: RateLimit {
                max_requests: 100,
                interval_secs: 60,
            },
            crawl_rate_limit: RateLimit {
                max_requests: 10,
                interval_secs: 60,
            },
            coordinate: Coordinate::new(0, 3).unwrap(),
        },
        1,
    )
    .await
    .unwrap();

    let node = db.get_member_node(NodeKind::PersonalData, 100).await.unwrap();
    assert_eq!(node.accounts_capacity, 1000);
    assert_eq!(node.version, "1.2.3");
    assert_eq!(node.id_gen_coordinate, Some(Coordinate { top: 0, low: 3 }));
    assert!(node.is_initiated());
    assert!(db.low_node_in_use(3, 999).await.unwrap());
    assert!(!db.low_node_in_use(3, 100).await.unwrap());
}

#[tokio::test]
async fn list_member_nodes_filters_and_paginates() {
    let db = test_db().await;
    seed_holder(&db, 1, "a@example.com").await;
    seed_holder(&db, 2, "b@example.com").await;
    for (i, owner) in [(1, 1), (2, 2), (3, 1), (4, 1)] {
        seed_node(&db, 100 + i, owner, NodeKind::PersonalData, &format!("node-{i}")).await;
    }
    seed_node(&db, 200, 1, NodeKind::Network, "net.example.com").await;
    db.set_member_node_status(103, NodeStatus::Approved, 0).await.unwrap();

    let all = MemberNodeFilter {
        kind: NodeKind::PersonalData,
        owner_holder_id: None,
        status: None,
    };
    let ids: Vec<i64> = db
        .list_member_nodes(&all, 10, 0)
        .await
        .unwrap()
        .iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(ids, vec![101, 102, 103, 104]);

    let page: Vec<i64> = db
        .list_member_nodes(&all, 2, 1)
        .await
        .unwrap()
        .iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(page, vec![102, 103]);

    let own = MemberNodeFilter {
        owner_holder_id: Some(1),
        ..all
    };
    assert_eq!(db.list_member_nodes(&own, 10, 0).await.unwrap().len(), 3);

    let approved = MemberNodeFilter {
        status: Some(NodeStatus::Approved),
        ..all
    };
    let approved = db.list_member_nodes(&approved, 10, 0).await.unwrap();
    assert_eq!(approved.len(), 1);
    assert_eq!(approved[0].id, 103);
}

// === Warden tests ===

#[tokio::test]
async fn insert_and_list_wardens() {
    let db = test_db().await;
    for (id, label, top) in [(1, "eu-west", 1), (2, "us-east", 2)] {
        db.insert_warden(&InsertWardenParams {
            id,
            label,
            address: &format!("::{label}"),
            name: label,
            description: "",
            location: Location::default(),
            pdn_capacity: 10,
            nn_capacity: 5,
            is_open: true,
            url: "",
            version: "1.0.0",
            rate_limit: RateLimit::default(),
            id_gen_top_node: top,
        })
        .await
        .unwrap();
    }

    let warden = db.get_warden(2).await.unwrap();
    assert_eq!(warden.address, "::us-east");
    assert_eq!(warden.id_gen_coordinate, Coordinate { top: 2, low: 0 });
    assert!(db.warden_label_in_use("eu-west").await.unwrap());
    assert!(db.warden_top_node_in_use(1).await.unwrap());
    assert!(!db.warden_top_node_in_use(3).await.unwrap());

    let listed = db.list_wardens(1, 1).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].label, "us-east");
}

// === Notification ledger tests ===

#[tokio::test]
async fn count_sent_notifications_in_window() {
    let db = test_db().await;
    for id in 1..=3 {
        db.insert_sent_notification(id, "no-reply@w", "a@example.com", "confirm-holder-registration")
            .await
            .unwrap();
    }
    db.insert_sent_notification(4, "no-reply@w", "b@example.com", "confirm-holder-registration")
        .await
        .unwrap();

    let since = unix_timestamp() - 300;
    let count = db
        .count_sent_notifications_since("confirm-holder-registration", "a@example.com", since)
        .await
        .unwrap();
    assert_eq!(count, 3);

    let other_template = db
        .count_sent_notifications_since("confirm-holder-registration-sms", "a@example.com", since)
        .await
        .unwrap();
    assert_eq!(other_template, 0);

    let future = db
        .count_sent_notifications_since("confirm-holder-registration", "a@example.com", unix_timestamp() + 1)
        .await
        .unwrap();
    assert_eq!(future, 0);
}

#[tokio::test]
async fn modify_sent_notification() {
    let db = test_db().await;
    db.insert_sent_notification(1, "s", "r", "t").await.unwrap();
    db.modify_sent_notification(1, "s2", "r2").await.unwrap();
    assert!(db.modify_sent_notification(2, "s", "r").await.is_err());
}
