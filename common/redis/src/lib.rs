use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, RedisError};
use thiserror::Error;
use tokio::time::timeout;

const DEFAULT_REDIS_TIMEOUT_MILLISECS: u64 = 100;

fn get_redis_timeout_ms() -> u64 {
    std::env::var("REDIS_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_REDIS_TIMEOUT_MILLISECS)
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CustomRedisError {
    #[error("Not found in redis")]
    NotFound,
    #[error("Redis error: {0}")]
    Other(String),
    #[error("Timeout error")]
    Timeout,
}

impl From<RedisError> for CustomRedisError {
    fn from(err: RedisError) -> Self {
        CustomRedisError::Other(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for CustomRedisError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        CustomRedisError::Timeout
    }
}

/// The key-value operations the gateway's projections, policy store and
/// dedup filters need: strings with optional TTL, sets, sorted sets, and
/// the approximate-membership filter commands of the RedisBloom module.
#[async_trait]
pub trait Client {
    async fn get(&self, k: String) -> Result<String, CustomRedisError>;
    async fn set(&self, k: String, v: String) -> Result<(), CustomRedisError>;
    async fn setex(&self, k: String, v: String, seconds: u64) -> Result<(), CustomRedisError>;

    async fn sadd(&self, k: String, member: String) -> Result<(), CustomRedisError>;
    async fn smembers(&self, k: String) -> Result<Vec<String>, CustomRedisError>;

    async fn zadd(&self, k: String, member: String, score: f64) -> Result<(), CustomRedisError>;

    /// BF.RESERVE: create an approximate-membership filter. Errors if the
    /// filter already exists; callers treat that as success.
    async fn bf_reserve(
        &self,
        k: String,
        error_rate: f64,
        capacity: u64,
    ) -> Result<(), CustomRedisError>;

    /// BF.ADD: add an item to a filter. Returns true when the item was new,
    /// false when it was (probably) already present.
    async fn bf_add(&self, k: String, item: String) -> Result<bool, CustomRedisError>;
}

pub struct RedisClient {
    connection: redis::aio::MultiplexedConnection,
}

impl RedisClient {
    pub async fn new(addr: String) -> Result<RedisClient, CustomRedisError> {
        let client = redis::Client::open(addr)?;
        let connection = client.get_multiplexed_async_connection().await?;
        Ok(RedisClient { connection })
    }
}

#[async_trait]
impl Client for RedisClient {
    async fn get(&self, k: String) -> Result<String, CustomRedisError> {
        let mut conn = self.connection.clone();
        let results = conn.get(k);
        let fut: Result<Option<String>, RedisError> =
            timeout(Duration::from_millis(get_redis_timeout_ms()), results).await?;

        match fut? {
            Some(value) => Ok(value),
            None => Err(CustomRedisError::NotFound),
        }
    }

    async fn set(&self, k: String, v: String) -> Result<(), CustomRedisError> {
        let mut conn = self.connection.clone();
        let results = conn.set(k, v);
        let fut: Result<(), RedisError> =
            timeout(Duration::from_millis(get_redis_timeout_ms()), results).await?;
        Ok(fut?)
    }

    async fn setex(&self, k: String, v: String, seconds: u64) -> Result<(), CustomRedisError> {
        let mut conn = self.connection.clone();
        let results = conn.set_ex(k, v, seconds);
        let fut: Result<(), RedisError> =
            timeout(Duration::from_millis(get_redis_timeout_ms()), results).await?;
        Ok(fut?)
    }

    async fn sadd(&self, k: String, member: String) -> Result<(), CustomRedisError> {
        let mut conn = self.connection.clone();
        let results = conn.sadd(k, member);
        let fut: Result<i64, RedisError> =
            timeout(Duration::from_millis(get_redis_timeout_ms()), results).await?;
        fut?;
        Ok(())
    }

    async fn smembers(&self, k: String) -> Result<Vec<String>, CustomRedisError> {
        let mut conn = self.connection.clone();
        let results = conn.smembers(k);
        let fut: Result<Vec<String>, RedisError> =
            timeout(Duration::from_millis(get_redis_timeout_ms()), results).await?;
        Ok(fut?)
    }

    async fn zadd(&self, k: String, member: String, score: f64) -> Result<(), CustomRedisError> {
        let mut conn = self.connection.clone();
        let results = conn.zadd(k, member, score);
        let fut: Result<i64, RedisError> =
            timeout(Duration::from_millis(get_redis_timeout_ms()), results).await?;
        fut?;
        Ok(())
    }

    async fn bf_reserve(
        &self,
        k: String,
        error_rate: f64,
        capacity: u64,
    ) -> Result<(), CustomRedisError> {
        let mut conn = self.connection.clone();
        let cmd = redis::cmd("BF.RESERVE")
            .arg(&k)
            .arg(error_rate)
            .arg(capacity)
            .clone();
        let results = cmd.query_async(&mut conn);
        let fut: Result<(), RedisError> =
            timeout(Duration::from_millis(get_redis_timeout_ms()), results).await?;
        Ok(fut?)
    }

    async fn bf_add(&self, k: String, item: String) -> Result<bool, CustomRedisError> {
        let mut conn = self.connection.clone();
        let cmd = redis::cmd("BF.ADD").arg(&k).arg(&item).clone();
        let results = cmd.query_async(&mut conn);
        let fut: Result<i64, RedisError> =
            timeout(Duration::from_millis(get_redis_timeout_ms()), results).await?;
        Ok(fut? == 1)
    }
}

/// In-memory implementation backing every test that would otherwise need a
/// redis server. State is shared across clones so a test can hand the
/// client to the code under test and assert on it afterwards.
#[derive(Clone, Default)]
pub struct MockRedisClient {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    strings: HashMap<String, String>,
    ttls: HashMap<String, u64>,
    sets: HashMap<String, HashSet<String>>,
    zsets: HashMap<String, HashMap<String, f64>>,
    filters: HashMap<String, HashSet<String>>,
    fail_all: bool,
}

impl MockRedisClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail, to exercise store-error paths.
    pub fn fail_all(&self, fail: bool) {
        self.inner.lock().unwrap().fail_all = fail;
    }

    /// TTL recorded by `setex` for the given key, if any.
    pub fn ttl(&self, k: &str) -> Option<u64> {
        self.inner.lock().unwrap().ttls.get(k).copied()
    }

    pub fn zscore(&self, k: &str, member: &str) -> Option<f64> {
        self.inner
            .lock()
            .unwrap()
            .zsets
            .get(k)
            .and_then(|z| z.get(member))
            .copied()
    }

    fn check_failure(&self) -> Result<(), CustomRedisError> {
        if self.inner.lock().unwrap().fail_all {
            return Err(CustomRedisError::Other("mock failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Client for MockRedisClient {
    async fn get(&self, k: String) -> Result<String, CustomRedisError> {
        self.check_failure()?;
        match self.inner.lock().unwrap().strings.get(&k) {
            Some(v) => Ok(v.clone()),
            None => Err(CustomRedisError::NotFound),
        }
    }

    async fn set(&self, k: String, v: String) -> Result<(), CustomRedisError> {
        self.check_failure()?;
        self.inner.lock().unwrap().strings.insert(k, v);
        Ok(())
    }

    async fn setex(&self, k: String, v: String, seconds: u64) -> Result<(), CustomRedisError> {
        self.check_failure()?;
        let mut state = self.inner.lock().unwrap();
        state.strings.insert(k.clone(), v);
        state.ttls.insert(k, seconds);
        Ok(())
    }

    async fn sadd(&self, k: String, member: String) -> Result<(), CustomRedisError> {
        self.check_failure()?;
        self.inner
            .lock()
            .unwrap()
            .sets
            .entry(k)
            .or_default()
            .insert(member);
        Ok(())
    }

    async fn smembers(&self, k: String) -> Result<Vec<String>, CustomRedisError> {
        self.check_failure()?;
        Ok(self
            .inner
            .lock()
            .unwrap()
            .sets
            .get(&k)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn zadd(&self, k: String, member: String, score: f64) -> Result<(), CustomRedisError> {
        self.check_failure()?;
        self.inner
            .lock()
            .unwrap()
            .zsets
            .entry(k)
            .or_default()
            .insert(member, score);
        Ok(())
    }

    async fn bf_reserve(
        &self,
        k: String,
        _error_rate: f64,
        _capacity: u64,
    ) -> Result<(), CustomRedisError> {
        self.check_failure()?;
        let mut state = self.inner.lock().unwrap();
        if state.filters.contains_key(&k) {
            return Err(CustomRedisError::Other("item exists".to_string()));
        }
        state.filters.insert(k, HashSet::new());
        Ok(())
    }

    async fn bf_add(&self, k: String, item: String) -> Result<bool, CustomRedisError> {
        self.check_failure()?;
        Ok(self
            .inner
            .lock()
            .unwrap()
            .filters
            .entry(k)
            .or_default()
            .insert(item))
    }
}
