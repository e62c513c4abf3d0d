//! Generic TTL idempotency store with atomic check-and-set registration.
//!
//! Two consumers: client-supplied `Idempotency-Key` headers on mutating
//! payment endpoints, and gateway event ids on webhook deliveries. Either
//! way the guarantee is the same: for a given (scope, key) exactly one
//! caller observes `New`; everyone else replays the recorded outcome.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::ports::StoreError;

const KEY_PREFIX: &str = "idem";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub status_code: u16,
    pub response_body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum Registration {
    /// First observation; the caller proceeds and must `complete` or
    /// `release` the placeholder.
    New,
    /// A concurrent caller holds the placeholder and has not completed yet.
    InFlight,
    /// A finished outcome exists; replay it instead of reprocessing.
    Replay(IdempotencyRecord),
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomic check-and-set: insert a pending placeholder if and only if no
    /// live record exists. Never read-then-write; two concurrent callers
    /// with the same key must not both see `New`.
    async fn register(
        &self,
        scope: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<Registration, StoreError>;

    /// Attach the final outcome for future replay.
    async fn complete(
        &self,
        scope: &str,
        key: &str,
        status_code: u16,
        response_body: String,
        remaining_ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Drop a pending placeholder so a transient failure can be retried.
    async fn release(&self, scope: &str, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    pending: bool,
    status_code: Option<u16>,
    response_body: Option<String>,
    created_at: DateTime<Utc>,
}

impl StoredRecord {
    fn pending() -> Self {
        Self {
            pending: true,
            status_code: None,
            response_body: None,
            created_at: Utc::now(),
        }
    }

    fn into_registration(self) -> Registration {
        if self.pending {
            Registration::InFlight
        } else {
            Registration::Replay(IdempotencyRecord {
                status_code: self.status_code.unwrap_or(200),
                response_body: self.response_body.unwrap_or_default(),
                created_at: self.created_at,
            })
        }
    }
}

fn full_key(scope: &str, key: &str) -> String {
    format!("{}:{}:{}", KEY_PREFIX, scope, key)
}

fn store_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Database(e.to_string())
}

// --- Redis implementation ---

#[derive(Clone)]
pub struct RedisIdempotencyStore {
    client: redis::Client,
}

impl RedisIdempotencyStore {
    pub fn new(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl IdempotencyStore for RedisIdempotencyStore {
    async fn register(
        &self,
        scope: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<Registration, StoreError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(store_err)?;
        let key = full_key(scope, key);
        let placeholder = serde_json::to_string(&StoredRecord::pending()).map_err(store_err)?;

        // SET NX PX is the atomic check-and-set; a plain GET-then-SET would
        // let two concurrent deliveries both proceed as new.
        let set: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(&placeholder)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;

        if set.is_some() {
            return Ok(Registration::New);
        }

        let existing: Option<String> = conn.get(&key).await.map_err(store_err)?;
        match existing {
            Some(value) => {
                let record: StoredRecord = serde_json::from_str(&value).map_err(store_err)?;
                Ok(record.into_registration())
            }
            // Expired between SET NX and GET; the next delivery starts fresh.
            None => Ok(Registration::InFlight),
        }
    }

    async fn complete(
        &self,
        scope: &str,
        key: &str,
        status_code: u16,
        response_body: String,
        remaining_ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(store_err)?;
        let record = StoredRecord {
            pending: false,
            status_code: Some(status_code),
            response_body: Some(response_body),
            created_at: Utc::now(),
        };
        let value = serde_json::to_string(&record).map_err(store_err)?;
        let _: () = redis::cmd("SET")
            .arg(full_key(scope, key))
            .arg(value)
            .arg("PX")
            .arg(remaining_ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn release(&self, scope: &str, key: &str) -> Result<(), StoreError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(store_err)?;
        let _: () = conn.del(full_key(scope, key)).await.map_err(store_err)?;
        Ok(())
    }
}

// --- In-memory implementation ---

/// Mutex-guarded map; registration is a single critical section, which gives
/// the same check-and-set guarantee as redis `SET NX`.
#[derive(Default)]
pub struct InMemoryIdempotencyStore {
    entries: Mutex<HashMap<String, (Instant, StoredRecord)>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn register(
        &self,
        scope: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<Registration, StoreError> {
        let key = full_key(scope, key);
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("idempotency map poisoned");

        if let Some((deadline, record)) = entries.get(&key) {
            if *deadline > now {
                return Ok(match record.pending {
                    true => Registration::InFlight,
                    false => Registration::Replay(IdempotencyRecord {
                        status_code: record.status_code.unwrap_or(200),
                        response_body: record.response_body.clone().unwrap_or_default(),
                        created_at: record.created_at,
                    }),
                });
            }
        }

        entries.insert(key, (now + ttl, StoredRecord::pending()));
        Ok(Registration::New)
    }

    async fn complete(
        &self,
        scope: &str,
        key: &str,
        status_code: u16,
        response_body: String,
        remaining_ttl: Duration,
    ) -> Result<(), StoreError> {
        let key = full_key(scope, key);
        let record = StoredRecord {
            pending: false,
            status_code: Some(status_code),
            response_body: Some(response_body),
            created_at: Utc::now(),
        };
        self.entries
            .lock()
            .expect("idempotency map poisoned")
            .insert(key, (Instant::now() + remaining_ttl, record));
        Ok(())
    }

    async fn release(&self, scope: &str, key: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .expect("idempotency map poisoned")
            .remove(&full_key(scope, key));
        Ok(())
    }
}
