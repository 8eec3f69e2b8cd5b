use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::RwLock;
use tracing::{debug, info};

use shared::types::Identity;

use crate::error::StoreError;

/// A user as the credential store knows them: identity plus password hash.
#[derive(Clone)]
pub struct StoredCredential {
    pub identity: Identity,
    pub password_hash: String,
}

impl fmt::Debug for StoredCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCredential")
            .field("identity", &self.identity)
            .field("password_hash", &"<redacted>")
            .finish()
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// `Ok(None)` for an unknown username; `Err` only when the store itself
    /// cannot answer.
    async fn lookup(&self, username: &str) -> Result<Option<StoredCredential>, StoreError>;
}

/// Credentials held in process memory. Used when no database is configured
/// and by tests.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    users: RwLock<HashMap<String, StoredCredential>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, identity: Identity, password_hash: impl Into<String>) {
        let mut users = self.users.write().await;
        users.insert(
            identity.username.clone(),
            StoredCredential {
                identity,
                password_hash: password_hash.into(),
            },
        );
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn lookup(&self, username: &str) -> Result<Option<StoredCredential>, StoreError> {
        let users = self.users.read().await;
        Ok(users.get(username).cloned())
    }
}

/// Reads an existing `users(id, username, email, role, password)` table.
/// The schema is owned elsewhere; nothing here creates or migrates it.
#[derive(Debug, Clone)]
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        info!("Connecting to credential database");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn lookup(&self, username: &str) -> Result<Option<StoredCredential>, StoreError> {
        debug!("Looking up credentials for {}", username);

        let row = sqlx::query_as::<_, (i64, String, String, String, String)>(
            "SELECT id, username, email, role, password FROM users WHERE username = ?1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, username, email, role, password_hash)| StoredCredential {
            identity: Identity {
                id,
                username,
                email,
                role,
            },
            password_hash,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        sqlx::query(
            "CREATE TABLE users (
                id INTEGER PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL,
                role TEXT NOT NULL,
                password TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();

        sqlx::query("INSERT INTO users (id, username, email, role, password) VALUES (?1, ?2, ?3, ?4, ?5)")
            .bind(3_i64)
            .bind("admin")
            .bind("admin@example.com")
            .bind("admin")
            .bind("$2b$04$hash")
            .execute(&pool)
            .await
            .unwrap();

        pool
    }

    #[tokio::test]
    async fn sqlite_lookup_finds_user() {
        let store = SqliteCredentialStore::new(seeded_pool().await);
        let found = store.lookup("admin").await.unwrap().unwrap();
        assert_eq!(found.identity.id, 3);
        assert_eq!(found.identity.email, "admin@example.com");
        assert_eq!(found.identity.role, "admin");
        assert_eq!(found.password_hash, "$2b$04$hash");
    }

    #[tokio::test]
    async fn sqlite_unknown_user_is_none() {
        let store = SqliteCredentialStore::new(seeded_pool().await);
        assert!(store.lookup("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn closed_pool_is_unavailable() {
        let pool = seeded_pool().await;
        let store = SqliteCredentialStore::new(pool.clone());
        pool.close().await;
        assert!(matches!(
            store.lookup("admin").await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = InMemoryCredentialStore::new();
        let identity = Identity {
            id: 1,
            username: "alice".into(),
            email: "alice@example.com".into(),
            role: "user".into(),
        };
        store.insert(identity.clone(), "hash").await;
        assert_eq!(store.lookup("alice").await.unwrap().unwrap().identity, identity);
        assert!(store.lookup("ALICE").await.unwrap().is_none());
    }

    #[test]
    fn debug_hides_hash() {
        let cred = StoredCredential {
            identity: Identity {
                id: 1,
                username: "a".into(),
                email: "a@b.c".into(),
                role: "user".into(),
            },
            password_hash: "$argon2id$secret".into(),
        };
        assert!(!format!("{:?}", cred).contains("argon2id"));
    }
}
