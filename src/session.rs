use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::AppError;

pub const TOKEN_KEY: &str = "token";
pub const USER_ID_KEY: &str = "userId";

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn { user_id: String },
    LoggedOut,
    /// The server rejected the stored token.
    Invalidated,
}

/// Durable key/value storage for session credentials.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), AppError>;
    async fn remove_many(&self, keys: &[&str]) -> Result<(), AppError>;
}

pub struct SqliteSessionStorage {
    db: SqlitePool,
}

impl SqliteSessionStorage {
    pub async fn connect(database_url: &str) -> Result<Self, AppError> {
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;
        Self::from_pool(db).await
    }

    pub async fn from_pool(db: SqlitePool) -> Result<Self, AppError> {
        sqlx::migrate!("./migrations").run(&db).await?;
        Ok(Self { db })
    }
}

#[async_trait]
impl SessionStorage for SqliteSessionStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM session_entries WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.db)
                .await?;
        Ok(value)
    }

    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.db.begin().await?;
        for (key, value) in entries {
            sqlx::query(
                r#"
                INSERT INTO session_entries (key, value, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(*key)
            .bind(*value)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn remove_many(&self, keys: &[&str]) -> Result<(), AppError> {
        let mut tx = self.db.begin().await?;
        for key in keys {
            sqlx::query("DELETE FROM session_entries WHERE key = ?")
                .bind(*key)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySessionStorage {
    entries: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl SessionStorage for MemorySessionStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    async fn set_many(&self, new_entries: &[(&str, &str)]) -> Result<(), AppError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        for (key, value) in new_entries {
            entries.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    async fn remove_many(&self, keys: &[&str]) -> Result<(), AppError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}

/// Owns the persisted token/user id pair and announces every change to it.
#[derive(Clone)]
pub struct SessionManager {
    storage: Arc<dyn SessionStorage>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { storage, events }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySessionStorage::default()))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn token(&self) -> Result<Option<String>, AppError> {
        let token = self.storage.get(TOKEN_KEY).await?;
        debug!("Token being used: {}", if token.is_some() { "present" } else { "none" });
        Ok(token)
    }

    pub async fn user_id(&self) -> Result<Option<String>, AppError> {
        self.storage.get(USER_ID_KEY).await
    }

    pub async fn current(&self) -> Result<Option<Session>, AppError> {
        let token = self.storage.get(TOKEN_KEY).await?;
        let user_id = self.storage.get(USER_ID_KEY).await?;
        Ok(match (token, user_id) {
            (Some(token), Some(user_id)) => Some(Session { token, user_id }),
            _ => None,
        })
    }

    pub async fn store(&self, session: &Session) -> Result<(), AppError> {
        self.storage
            .set_many(&[
                (TOKEN_KEY, session.token.as_str()),
                (USER_ID_KEY, session.user_id.as_str()),
            ])
            .await?;
        info!("Session stored for user {}", session.user_id);
        let _ = self.events.send(SessionEvent::LoggedIn {
            user_id: session.user_id.clone(),
        });
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), AppError> {
        self.storage.remove_many(&[TOKEN_KEY, USER_ID_KEY]).await
    }

    pub async fn logout(&self) -> Result<(), AppError> {
        self.clear().await?;
        info!("Session cleared by logout");
        let _ = self.events.send(SessionEvent::LoggedOut);
        Ok(())
    }

    /// Clears the session after the server rejected it. The event is sent even
    /// when clearing storage fails so listeners still leave the logged-in state.
    pub async fn invalidate(&self) -> Result<(), AppError> {
        let result = self.clear().await;
        if let Err(e) = &result {
            warn!("Failed to clear invalidated session: {}", e);
        }
        let _ = self.events.send(SessionEvent::Invalidated);
        result
    }
}
