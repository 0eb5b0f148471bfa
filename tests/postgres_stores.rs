//! Postgres-backed store tests
//!
//! Need a running Postgres reachable with `configuration.yaml`; run with
//! `cargo test -- --ignored`.

use chrono::{Duration, Utc};
use std::sync::Arc;
use sqlx::{Connection, Executor, PgConnection, PgPool};
use uuid::Uuid;

use blogapi::auth::{PgRefreshTokenStore, RefreshTokenStore, SessionId};
use blogapi::configuration::{get_configuration, DatabaseSettings};
use blogapi::models::{Post, PostFilter, User};
use blogapi::store::{PgPostStore, PgUserStore, PostStore, StoreError, UserStore};

pub async fn configure_database(config: &DatabaseSettings) -> PgPool {
    // Create database
    let mut connection = PgConnection::connect(&config.connection_string_without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, config.database_name))
        .await
        .expect("Failed to create database.");
    // Migrate database
    let connection_pool = PgPool::connect(&config.connection_string())
        .await
        .expect("Failed to connect to Postgres.");
    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .expect("Failed to migrate the database.");
    connection_pool
}

async fn fresh_pool() -> PgPool {
    let mut configuration = get_configuration().expect("Failed to read configuration.");
    configuration.database.database_name = Uuid::new_v4().to_string();
    configure_database(&configuration.database).await
}

async fn seed_user(pool: &PgPool, name: &str) -> User {
    let user = User::new(
        name.to_string(),
        format!("{}@x.com", name),
        "$2b$04$hash".to_string(),
    );
    PgUserStore::new(pool.clone()).create(&user).await.unwrap();
    user
}

#[tokio::test]
#[ignore]
async fn user_uniqueness_is_enforced() {
    let pool = fresh_pool().await;
    let users = PgUserStore::new(pool.clone());
    let alice = seed_user(&pool, "alice").await;

    let duplicate = User::new("other".into(), alice.email.clone(), "h".into());
    let result = users.create(&duplicate).await;

    assert!(matches!(result, Err(StoreError::UniqueViolation(_))));
    assert!(users.exists_by_username("alice").await.unwrap());
    assert_eq!(
        users.get_by_email("alice@x.com").await.unwrap().unwrap().id,
        alice.id
    );
}

#[tokio::test]
#[ignore]
async fn refresh_token_rotation_is_single_use() {
    let pool = fresh_pool().await;
    let store = PgRefreshTokenStore::new(pool.clone());
    let user = seed_user(&pool, "alice").await;
    let expires_at = Utc::now() + Duration::days(7);

    let first = SessionId::generate();
    store.create(&first, "h1", user.id, expires_at).await.unwrap();
    assert!(store.is_valid(&first).await.unwrap());

    let second = SessionId::generate();
    store
        .rotate_token(&first, &second, "h2", user.id, expires_at)
        .await
        .unwrap();

    assert!(!store.is_valid(&first).await.unwrap());
    assert!(store.is_valid(&second).await.unwrap());

    let replay = store
        .rotate_token(&first, &SessionId::generate(), "h3", user.id, expires_at)
        .await;
    assert!(matches!(replay, Err(StoreError::InvalidRefreshToken)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn concurrent_rotation_of_one_token_has_a_single_winner() {
    let pool = fresh_pool().await;
    let store = Arc::new(PgRefreshTokenStore::new(pool.clone()));
    let user = seed_user(&pool, "alice").await;
    let expires_at = Utc::now() + Duration::days(7);

    let old = SessionId::generate();
    store.create(&old, "h0", user.id, expires_at).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            let old = old.clone();
            tokio::spawn(async move {
                let new = SessionId::generate();
                let result = store
                    .rotate_token(&old, &new, &format!("h{}", i + 1), user.id, expires_at)
                    .await;
                (new, result)
            })
        })
        .collect();

    let mut winners = Vec::new();
    for handle in handles {
        let (new, result) = handle.await.unwrap();
        match result {
            Ok(()) => winners.push(new),
            Err(StoreError::InvalidRefreshToken) => {}
            Err(e) => panic!("unexpected rotation error: {}", e),
        }
    }

    assert_eq!(winners.len(), 1);
    assert!(store.is_valid(&winners[0]).await.unwrap());
    assert!(!store.is_valid(&old).await.unwrap());

    let active: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM refresh_tokens WHERE user_id = $1 AND is_revoked = false",
    )
    .bind(user.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(active, 1);
}

#[tokio::test]
#[ignore]
async fn revoke_all_and_sweep() {
    let pool = fresh_pool().await;
    let store = PgRefreshTokenStore::new(pool.clone());
    let user = seed_user(&pool, "alice").await;

    let live = Utc::now() + Duration::days(7);
    store.create(&SessionId::generate(), "a", user.id, live).await.unwrap();
    store.create(&SessionId::generate(), "b", user.id, live).await.unwrap();
    store
        .create(&SessionId::generate(), "c", user.id, Utc::now() - Duration::seconds(1))
        .await
        .unwrap();

    assert_eq!(store.revoke_all_for_user(user.id).await.unwrap(), 3);
    assert_eq!(store.delete_expired().await.unwrap(), 1);
}

#[tokio::test]
#[ignore]
async fn posts_cascade_with_their_author() {
    let pool = fresh_pool().await;
    let posts = PgPostStore::new(pool.clone());
    let users = PgUserStore::new(pool.clone());
    let alice = seed_user(&pool, "alice").await;

    posts
        .create(&Post::new(alice.id, "Draft".into(), "Body".into(), false))
        .await
        .unwrap();
    posts
        .create(&Post::new(alice.id, "Live".into(), "Body".into(), true))
        .await
        .unwrap();

    let published = PostFilter {
        author_id: None,
        published_only: true,
    };
    assert_eq!(posts.count(published).await.unwrap(), 1);
    assert_eq!(posts.count(PostFilter::default()).await.unwrap(), 2);

    assert!(users.delete(alice.id).await.unwrap());
    assert_eq!(posts.count(PostFilter::default()).await.unwrap(), 0);
}
