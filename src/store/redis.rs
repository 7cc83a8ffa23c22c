use async_trait::async_trait;
use fred::prelude::*;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{Instrument, debug, info_span};

use super::{CappedPush, StoreError, StoreResult, TtlStore};

const DEFAULT_URL: &str = "redis://127.0.0.1:6379/0";
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Append a member, refresh the list TTL, then drop the oldest members of the
/// same group until the group fits (the rule of [`super::group_overflow`]).
/// Runs server-side so the read-modify-write cannot interleave with another
/// login for the same user.
const PUSH_CAPPED_SCRIPT: &str = r"
local key = KEYS[1]
local member = ARGV[1]
local prefix = ARGV[2]
local max = tonumber(ARGV[3])
local ttl = tonumber(ARGV[4])

redis.call('RPUSH', key, member)
redis.call('EXPIRE', key, ttl)

local grouped = {}
for _, entry in ipairs(redis.call('LRANGE', key, 0, -1)) do
  if string.sub(entry, 1, string.len(prefix)) == prefix then
    table.insert(grouped, entry)
  end
end

local evicted = {}
for i = 1, #grouped - max do
  redis.call('LREM', key, 1, grouped[i])
  table.insert(evicted, grouped[i])
end
return evicted
";

/// Redis connection settings.
#[derive(Clone, Debug)]
pub struct RedisConfig {
    url: String,
    key_prefix: String,
    command_timeout: Duration,
    connect_timeout: Duration,
}

impl RedisConfig {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key_prefix: String::new(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Namespace every key, e.g. `rentgate` turns `session:access:x` into
    /// `rentgate:session:access:x`.
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_command_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    fn prefixed_key(&self, key: &str) -> String {
        if self.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{key}", self.key_prefix)
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self::new(DEFAULT_URL)
    }
}

fn from_redis_error(err: &Error) -> StoreError {
    match err.kind() {
        ErrorKind::IO | ErrorKind::Timeout => StoreError::Connection(err.to_string()),
        ErrorKind::Config => StoreError::Configuration(err.to_string()),
        _ => StoreError::Internal(err.to_string()),
    }
}

fn seconds(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs().max(1)).unwrap_or(i64::MAX)
}

/// Redis-backed [`TtlStore`].
pub struct RedisStore {
    client: Client,
    config: RedisConfig,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The URL may embed a password.
        f.debug_struct("RedisStore")
            .field("key_prefix", &self.config.key_prefix)
            .field("command_timeout", &self.config.command_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect and wait for the initial connection.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the server is unreachable.
    pub async fn connect(config: RedisConfig) -> StoreResult<Self> {
        let redis_config = Config::from_url(config.url()).map_err(|e| from_redis_error(&e))?;
        let connect_timeout = config.connect_timeout;
        let client = Builder::from_config(redis_config)
            .with_connection_config(|connection| {
                connection.connection_timeout = connect_timeout;
            })
            .build()
            .map_err(|e| from_redis_error(&e))?;

        match timeout(connect_timeout, client.init()).await {
            Ok(Ok(_handle)) => {}
            Ok(Err(err)) => return Err(from_redis_error(&err)),
            Err(_) => return Err(StoreError::Timeout(connect_timeout)),
        }
        debug!("connected to redis");

        Ok(Self { client, config })
    }

    fn key(&self, key: &str) -> String {
        self.config.prefixed_key(key)
    }

    async fn run<T, F>(&self, operation: &'static str, command: F) -> StoreResult<T>
    where
        F: Future<Output = Result<T, Error>>,
    {
        let span = info_span!(
            "cache.command",
            cache.system = "redis",
            cache.operation = operation
        );
        match timeout(self.config.command_timeout, command)
            .instrument(span)
            .await
        {
            Ok(result) => result.map_err(|e| from_redis_error(&e)),
            Err(_) => Err(StoreError::Timeout(self.config.command_timeout)),
        }
    }
}

#[async_trait]
impl TtlStore for RedisStore {
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        let key = self.key(key);
        self.run(
            "SET",
            self.client.set::<(), _, _>(
                &key,
                value.to_vec(),
                Some(Expiration::EX(seconds(ttl))),
                None,
                false,
            ),
        )
        .await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let key = self.key(key);
        self.run("GET", self.client.get::<Option<Vec<u8>>, _>(&key))
            .await
    }

    async fn take(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let key = self.key(key);
        self.run("GETDEL", self.client.getdel::<Option<Vec<u8>>, _>(&key))
            .await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let key = self.key(key);
        self.run("DEL", self.client.del::<(), _>(&key)).await
    }

    async fn delete_many(&self, keys: &[String]) -> StoreResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = keys.iter().map(|key| self.key(key)).collect();
        self.run("DEL", self.client.del::<(), _>(keys)).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let key = self.key(key);
        let count: i64 = self
            .run("EXISTS", self.client.exists::<i64, _>(&key))
            .await?;
        Ok(count > 0)
    }

    async fn push_capped(
        &self,
        key: &str,
        member: &str,
        cap: CappedPush<'_>,
    ) -> StoreResult<Vec<String>> {
        let key = self.key(key);
        let args = vec![
            member.to_string(),
            cap.group_prefix.to_string(),
            cap.max.to_string(),
            seconds(cap.ttl).to_string(),
        ];
        self.run(
            "EVAL",
            self.client
                .eval::<Vec<String>, _, _, _>(PUSH_CAPPED_SCRIPT, vec![key], args),
        )
        .await
    }

    async fn list_remove(&self, key: &str, member: &str) -> StoreResult<()> {
        let key = self.key(key);
        self.run(
            "LREM",
            self.client.lrem::<(), _, _>(&key, 0, member.to_string()),
        )
        .await
    }

    async fn list_members(&self, key: &str) -> StoreResult<Vec<String>> {
        let key = self.key(key);
        self.run("LRANGE", self.client.lrange::<Vec<String>, _>(&key, 0, -1))
            .await
    }

    async fn ping(&self) -> StoreResult<()> {
        if self.client.is_connected() {
            Ok(())
        } else {
            Err(StoreError::Connection("redis client is not connected".to_string()))
        }
    }
}
