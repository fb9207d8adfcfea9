//! Live integration tests for the Postgres backend using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/dealdesk-store/`), so `"../../migrations"` resolves to the
//! workspace migration directory.

use std::sync::Arc;
use std::time::Duration;

use dealdesk_core::{Analysis, LeadStatus, NewContact, NewLead};
use dealdesk_store::{
    Collection, CollectionPath, DocumentStore, Fields, Gateway, PgStore, StoreError, UserId,
};

const APP_ID: &str = "live-app";

async fn gateway(pool: sqlx::PgPool, token: &str) -> Gateway {
    let store = PgStore::connect(pool)
        .await
        .expect("listener should connect");
    let gateway = Gateway::new(Arc::new(store), APP_ID);
    gateway
        .sign_in_with_custom_token(token)
        .expect("token is not blank");
    gateway
}

fn lead(details: &str) -> NewLead {
    NewLead {
        property_details: details.to_string(),
        ..NewLead::default()
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn lead_round_trips_through_postgres(pool: sqlx::PgPool) {
    let gateway = gateway(pool, "owner").await;
    let analysis = Analysis {
        summary: "Duplex with upside".to_string(),
        offer_range: "$210k-$230k".to_string(),
        buyer_profiles: vec!["House hacker".to_string()],
        seller_outreach_angles: vec!["Tired landlord".to_string()],
        due_diligence_checklist: vec!["Leases".to_string(), "Roof".to_string()],
    };
    let new_lead = NewLead::from_analysis("88 Pine St", None, &analysis).unwrap();

    let id = gateway.create_lead(new_lead).await.unwrap();
    let leads = gateway.list_leads().await.unwrap();

    assert_eq!(leads.len(), 1);
    assert_eq!(leads[0].id, id);
    assert_eq!(leads[0].effective_status(), LeadStatus::New);
    assert_eq!(leads[0].analysis().unwrap(), Some(analysis));
}

#[sqlx::test(migrations = "../../migrations")]
async fn status_update_merges_single_field(pool: sqlx::PgPool) {
    let gateway = gateway(pool, "owner").await;
    let id = gateway.create_lead(lead("5 Birch Ln")).await.unwrap();

    gateway
        .update_lead_status(&id, LeadStatus::OfferMade)
        .await
        .unwrap();

    let leads = gateway.list_leads().await.unwrap();
    assert_eq!(leads[0].status, Some(LeadStatus::OfferMade));
    assert_eq!(leads[0].property_details, "5 Birch Ln");
}

#[sqlx::test(migrations = "../../migrations")]
async fn status_update_of_unknown_or_malformed_id_is_not_found(pool: sqlx::PgPool) {
    let gateway = gateway(pool, "owner").await;

    for id in ["not-a-uuid", "7f1b4f6e-2d0c-4d8e-9a51-3c2f8b0f9e11"] {
        let err = gateway
            .update_lead_status(id, LeadStatus::Sold)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }), "id {id}");
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn delete_is_idempotent(pool: sqlx::PgPool) {
    let gateway = gateway(pool, "owner").await;
    let id = gateway
        .create_contact(NewContact {
            seller_name: "Sam Ortiz".to_string(),
            ..NewContact::default()
        })
        .await
        .unwrap();

    gateway.delete_contact(&id).await.unwrap();
    gateway.delete_contact(&id).await.unwrap();
    gateway.delete_contact("not-a-uuid").await.unwrap();

    assert!(gateway.list_contacts().await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn notify_trigger_feeds_subscriptions(pool: sqlx::PgPool) {
    let viewer = gateway(pool.clone(), "shared").await;
    let writer = gateway(pool, "shared").await;

    let mut sub = viewer.subscribe_leads().await.unwrap();
    assert!(sub.next_snapshot().await.unwrap().is_empty());

    writer.create_lead(lead("written elsewhere")).await.unwrap();

    let snapshot = tokio::time::timeout(Duration::from_secs(10), sub.next_snapshot())
        .await
        .expect("notification should arrive")
        .unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].property_details, "written elsewhere");
}

#[sqlx::test(migrations = "../../migrations")]
async fn list_is_scoped_to_path(pool: sqlx::PgPool) {
    let store = PgStore::connect(pool).await.unwrap();
    let alice = UserId::from_raw("alice");
    let bob = UserId::from_raw("bob");
    let alice_ideas = CollectionPath::new(APP_ID, &alice, Collection::Ideas);

    store.insert(&alice_ideas, Fields::new()).await.unwrap();
    store
        .insert(&CollectionPath::new(APP_ID, &alice, Collection::Contacts), Fields::new())
        .await
        .unwrap();

    assert_eq!(store.list(&alice_ideas).await.unwrap().len(), 1);
    assert!(store
        .list(&CollectionPath::new(APP_ID, &bob, Collection::Ideas))
        .await
        .unwrap()
        .is_empty());
    assert!(store
        .list(&CollectionPath::new("other-app", &alice, Collection::Ideas))
        .await
        .unwrap()
        .is_empty());
}
