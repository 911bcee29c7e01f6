//! Tests for directory listings.

#![allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]

use super::admission::{JoinWaitlistParams, RegisterWardenParams};
use super::test_support::{Harness, harness};
use super::{HolderSession, Pagination, ServiceError};
use crate::storage::{MemberNode, NodeKind, NodeStatus};

async fn join(h: &Harness, owner: &HolderSession, kind: NodeKind, label: &str) -> MemberNode {
    h.plane
        .admission
        .join_waitlist(
            owner,
            kind,
            JoinWaitlistParams {
                name: label.into(),
                label: label.into(),
                ..JoinWaitlistParams::default()
            },
        )
        .await
        .unwrap()
}

fn ids(nodes: &[MemberNode]) -> Vec<i64> {
    nodes.iter().map(|n| n.id).collect()
}

#[tokio::test]
async fn public_listing_spans_owners_in_creation_order() {
    let h = harness().await;
    let alice = h.confirmed_holder("alice@example.com").await;
    let bob = h.confirmed_holder("bob@example.com").await;

    let a1 = join(&h, &alice, NodeKind::PersonalData, "a1").await;
    let b1 = join(&h, &bob, NodeKind::PersonalData, "b1").await;
    let a2 = join(&h, &alice, NodeKind::PersonalData, "a2").await;
    join(&h, &alice, NodeKind::Network, "net.example.com").await;

    let nodes = h
        .plane
        .directory
        .list_nodes(NodeKind::PersonalData, None, false, Pagination::default())
        .await
        .unwrap();
    assert_eq!(ids(&nodes), vec![a1.id, b1.id, a2.id]);

    let own = h
        .plane
        .directory
        .list_nodes(NodeKind::PersonalData, Some(&alice), true, Pagination::default())
        .await
        .unwrap();
    assert_eq!(ids(&own), vec![a1.id, a2.id]);

    let networks = h
        .plane
        .directory
        .list_nodes(NodeKind::Network, Some(&bob), true, Pagination::default())
        .await
        .unwrap();
    assert!(networks.is_empty());
}

#[tokio::test]
async fn own_listing_requires_a_session() {
    let h = harness().await;
    let err = h
        .plane
        .directory
        .list_nodes(NodeKind::PersonalData, None, true, Pagination::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Unauthenticated(_)));
}

#[tokio::test]
async fn pagination_windows_the_listing() {
    let h = harness().await;
    let owner = h.confirmed_holder("alice@example.com").await;
    let mut created = Vec::new();
    for label in ["n1", "n2", "n3", "n4", "n5"] {
        created.push(join(&h, &owner, NodeKind::PersonalData, label).await.id);
    }
    let directory = &h.plane.directory;

    let page = directory
        .list_nodes(NodeKind::PersonalData, None, false, Pagination::new(2, 1))
        .await
        .unwrap();
    assert_eq!(ids(&page), created[1..3].to_vec());

    let tail = directory
        .list_nodes(NodeKind::PersonalData, None, false, Pagination::new(10, 4))
        .await
        .unwrap();
    assert_eq!(ids(&tail), vec![created[4]]);

    let clamped = directory
        .list_nodes(NodeKind::PersonalData, None, false, Pagination::new(0, 0))
        .await
        .unwrap();
    assert_eq!(clamped.len(), 1);

    let past_end = directory
        .list_nodes(NodeKind::PersonalData, None, false, Pagination::new(10, 50))
        .await
        .unwrap();
    assert!(past_end.is_empty());
}

#[tokio::test]
async fn admin_listing_filters_by_status() {
    let h = harness().await;
    let admin = h.admin_session().await;
    let owner = h.confirmed_holder("alice@example.com").await;
    let first = join(&h, &owner, NodeKind::PersonalData, "first").await;
    let second = join(&h, &owner, NodeKind::PersonalData, "second").await;

    h.plane
        .admission
        .set_status(&admin, NodeKind::PersonalData, second.id, NodeStatus::Approved)
        .await
        .unwrap();

    let directory = &h.plane.directory;
    let pending = directory
        .list_nodes_admin(
            &admin,
            NodeKind::PersonalData,
            Some(NodeStatus::Pending),
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(ids(&pending), vec![first.id]);

    let all = directory
        .list_nodes_admin(&admin, NodeKind::PersonalData, None, Pagination::default())
        .await
        .unwrap();
    assert_eq!(ids(&all), vec![first.id, second.id]);

    let node = directory
        .get_node_admin(&admin, NodeKind::PersonalData, second.id)
        .await
        .unwrap();
    assert_eq!(node.status, NodeStatus::Approved);
}

#[tokio::test]
async fn get_node_checks_kind() {
    let h = harness().await;
    let owner = h.confirmed_holder("alice@example.com").await;
    let node = join(&h, &owner, NodeKind::PersonalData, "home").await;
    let directory = &h.plane.directory;

    assert_eq!(
        directory
            .get_node(NodeKind::PersonalData, node.id)
            .await
            .unwrap()
            .label,
        "home"
    );
    assert!(matches!(
        directory.get_node(NodeKind::Network, node.id).await,
        Err(ServiceError::NotFound(_))
    ));
}

#[tokio::test]
async fn wardens_are_listed_and_fetched() {
    let h = harness().await;
    let mut created = Vec::new();
    for (label, top) in [("north", 1), ("south", 2), ("east", 3)] {
        let warden = h
            .plane
            .admission
            .register_warden(RegisterWardenParams {
                label: label.into(),
                id_gen_top_node: top,
                ..RegisterWardenParams::default()
            })
            .await
            .unwrap();
        created.push(warden.id);
    }
    let directory = &h.plane.directory;

    let all = directory.list_wardens(Pagination::default()).await.unwrap();
    assert_eq!(all.iter().map(|w| w.id).collect::<Vec<_>>(), created);

    let page = directory.list_wardens(Pagination::new(1, 2)).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].label, "east");

    assert_eq!(directory.get_warden(created[1]).await.unwrap().label, "south");
    assert!(matches!(
        directory.get_warden(created[2] + 1).await,
        Err(ServiceError::NotFound(_))
    ));
}
