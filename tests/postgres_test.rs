//! Repository tests against a real database. Ignored by default; run with
//! `cargo test -- --ignored` after pointing DATABASE_URL at a migrated
//! test database.

use coursepay::domain::booking::BookingStatus;
use coursepay::domain::money::{Currency, MoneyAmount};
use coursepay::domain::payment::{NewPaymentRecord, PaymentStatus, PaymentUpdate};
use coursepay::domain::ports::{BookingStore, LockManager, PaymentStore, WebhookStore};
use coursepay::domain::webhook::{Claim, NewWebhookEvent};
use coursepay::infra::postgres::{
    booking_repo::PgBookingStore, lock::PgLockManager, payment_repo::PgPaymentStore,
    webhook_repo::PgWebhookStore,
};
use chrono::Utc;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

async fn pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for ignored tests");
    let pool = PgPool::connect(&url).await.expect("connect test db");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");
    pool
}

async fn seed_booking(pool: &PgPool, id: &str) {
    sqlx::query("INSERT INTO bookings (id, reference) VALUES ($1, $2) ON CONFLICT DO NOTHING")
        .bind(id)
        .bind(format!("REF-{id}"))
        .execute(pool)
        .await
        .expect("seed booking");
}

fn new_record(booking_id: &str, intent_id: &str, status: PaymentStatus) -> NewPaymentRecord {
    NewPaymentRecord {
        id: Uuid::now_v7(),
        booking_id: booking_id.to_string(),
        gateway_intent_id: intent_id.to_string(),
        idempotency_key: format!("booking_{booking_id}_{}", Uuid::now_v7()),
        amount: MoneyAmount::from_major(75.0).unwrap(),
        currency: Currency::Gbp,
        status,
        customer_email: "student@example.com".to_string(),
        customer_name: None,
    }
}

#[tokio::test]
#[ignore]
async fn payment_roundtrip_and_partial_update() {
    let pool = pool().await;
    let store = PgPaymentStore::new(pool.clone());
    let booking_id = format!("bk_{}", Uuid::now_v7());
    let intent_id = format!("pi_{}", Uuid::now_v7());
    seed_booking(&pool, &booking_id).await;

    store
        .insert(&new_record(&booking_id, &intent_id, PaymentStatus::Processing))
        .await
        .unwrap();

    let record = store.find_by_intent(&intent_id).await.unwrap().unwrap();
    assert_eq!(record.amount, "75.00");
    assert_eq!(record.status, PaymentStatus::Processing);
    assert!(!store.has_succeeded(&booking_id).await.unwrap());

    let mut update = PaymentUpdate::status(PaymentStatus::Succeeded);
    update.card_last4 = Some("4242".to_string());
    store.update(&intent_id, &update).await.unwrap();

    let record = store.find_by_intent(&intent_id).await.unwrap().unwrap();
    assert_eq!(record.status, PaymentStatus::Succeeded);
    assert_eq!(record.card_last4.as_deref(), Some("4242"));
    // Untouched columns survive the partial update.
    assert_eq!(record.customer_email, "student@example.com");
    assert!(store.has_succeeded(&booking_id).await.unwrap());
}

#[tokio::test]
#[ignore]
async fn second_succeeded_payment_for_booking_is_rejected() {
    let pool = pool().await;
    let store = PgPaymentStore::new(pool.clone());
    let booking_id = format!("bk_{}", Uuid::now_v7());
    seed_booking(&pool, &booking_id).await;

    store
        .insert(&new_record(
            &booking_id,
            &format!("pi_{}", Uuid::now_v7()),
            PaymentStatus::Succeeded,
        ))
        .await
        .unwrap();

    let second = store
        .insert(&new_record(
            &booking_id,
            &format!("pi_{}", Uuid::now_v7()),
            PaymentStatus::Succeeded,
        ))
        .await;
    assert!(second.is_err(), "partial unique index must reject the second row");
}

#[tokio::test]
#[ignore]
async fn webhook_claim_is_first_writer_wins() {
    let pool = pool().await;
    let store = PgWebhookStore::new(pool);
    let event = NewWebhookEvent {
        event_id: format!("evt_{}", Uuid::now_v7()),
        event_type: "payment_intent.succeeded".to_string(),
        payload: serde_json::json!({}),
        headers: serde_json::json!({}),
        signature_verified: true,
    };

    let first = store.claim(&event).await.unwrap();
    let Claim::New(claimed) = first else {
        panic!("first claim must win");
    };
    assert!(matches!(
        store.claim(&event).await.unwrap(),
        Claim::Duplicate
    ));

    store.mark_processed(claimed.id, 12).await.unwrap();
    // A processed event is never re-claimed, even long after.
    assert!(matches!(
        store.claim(&event).await.unwrap(),
        Claim::Duplicate
    ));
}

#[tokio::test]
#[ignore]
async fn failed_claim_is_retaken_once_retry_is_due() {
    let pool = pool().await;
    let store = PgWebhookStore::new(pool);
    let event = NewWebhookEvent {
        event_id: format!("evt_{}", Uuid::now_v7()),
        event_type: "payment_intent.succeeded".to_string(),
        payload: serde_json::json!({}),
        headers: serde_json::json!({}),
        signature_verified: true,
    };

    let Claim::New(claimed) = store.claim(&event).await.unwrap() else {
        panic!("first claim must win");
    };

    // Retry scheduled in the future: redeliveries stay deduplicated.
    store
        .record_failure(claimed.id, 1, Utc::now() + chrono::Duration::minutes(5), "boom")
        .await
        .unwrap();
    assert!(matches!(
        store.claim(&event).await.unwrap(),
        Claim::Duplicate
    ));

    // Retry due: the next delivery takes the row back, carrying the count.
    store
        .record_failure(claimed.id, 1, Utc::now() - chrono::Duration::minutes(1), "boom")
        .await
        .unwrap();
    let Claim::New(retaken) = store.claim(&event).await.unwrap() else {
        panic!("failed event past its retry time must be re-claimed");
    };
    assert_eq!(retaken.id, claimed.id);
    assert_eq!(retaken.retry_count, 1);
}

#[tokio::test]
#[ignore]
async fn lock_is_exclusive_until_released_or_expired() {
    let pool = pool().await;
    let locks = PgLockManager::new(pool);
    let name = format!("test:{}", Uuid::now_v7());

    let token = locks
        .try_acquire(&name, Duration::from_secs(30))
        .await
        .unwrap()
        .expect("first acquire succeeds");
    assert!(
        locks
            .try_acquire(&name, Duration::from_secs(30))
            .await
            .unwrap()
            .is_none(),
        "held lock must not be re-acquirable"
    );

    locks.release(&name, &token).await.unwrap();
    assert!(
        locks
            .try_acquire(&name, Duration::from_secs(30))
            .await
            .unwrap()
            .is_some(),
        "released lock is acquirable again"
    );

    // Expired locks are stolen by the conditional upsert.
    let short = format!("test:{}", Uuid::now_v7());
    locks
        .try_acquire(&short, Duration::from_millis(50))
        .await
        .unwrap()
        .expect("acquire with short ttl");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        locks
            .try_acquire(&short, Duration::from_secs(30))
            .await
            .unwrap()
            .is_some(),
        "expired lock is stealable"
    );
}

#[tokio::test]
#[ignore]
async fn booking_status_updates_apply() {
    let pool = pool().await;
    let store = PgBookingStore::new(pool.clone());
    let booking_id = format!("bk_{}", Uuid::now_v7());
    seed_booking(&pool, &booking_id).await;

    let booking = store.get_for_update(&booking_id).await.unwrap().unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);

    store
        .set_status(&booking_id, BookingStatus::Confirmed)
        .await
        .unwrap();
    store
        .set_payment_intent(&booking_id, "pi_test")
        .await
        .unwrap();

    let booking = store.get_for_update(&booking_id).await.unwrap().unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
}
