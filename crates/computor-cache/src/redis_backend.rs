//! Redis-backed cache backend.
//!
//! The production backend: a shared out-of-process Redis instance reached
//! through a [`ConnectionManager`], which transparently reconnects after
//! network failures.

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use crate::backend::{CacheBackend, Command};
use crate::error::CacheResult;

/// Redis implementation of [`CacheBackend`].
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    /// Create a backend over an established connection manager.
    #[must_use]
    pub const fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Connect to Redis at `url` (e.g. `redis://127.0.0.1:6379/0`).
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    fn apply(pipe: &mut redis::Pipeline, command: Command) {
        match command {
            Command::SetEx {
                key,
                value,
                ttl_seconds,
            } => {
                pipe.cmd("SETEX").arg(key).arg(ttl_seconds).arg(value).ignore();
            },
            Command::Del { keys } => {
                pipe.cmd("DEL").arg(keys).ignore();
            },
            Command::SAdd { key, members } => {
                pipe.cmd("SADD").arg(key).arg(members).ignore();
            },
            Command::SRem { key, members } => {
                pipe.cmd("SREM").arg(key).arg(members).ignore();
            },
        }
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let value: Option<String> =
            redis::cmd("GET").arg(key).query_async(&mut self.conn.clone()).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> CacheResult<()> {
        redis::cmd("SETEX")
            .arg(key)
            .arg(ttl_seconds)
            .arg(value)
            .query_async::<()>(&mut self.conn.clone())
            .await?;
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> CacheResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        redis::cmd("DEL").arg(keys).query_async::<()>(&mut self.conn.clone()).await?;
        Ok(())
    }

    async fn sadd(&self, key: &str, members: &[String]) -> CacheResult<()> {
        if members.is_empty() {
            return Ok(());
        }
        redis::cmd("SADD")
            .arg(key)
            .arg(members)
            .query_async::<()>(&mut self.conn.clone())
            .await?;
        Ok(())
    }

    async fn srem(&self, key: &str, members: &[String]) -> CacheResult<()> {
        if members.is_empty() {
            return Ok(());
        }
        redis::cmd("SREM")
            .arg(key)
            .arg(members)
            .query_async::<()>(&mut self.conn.clone())
            .await?;
        Ok(())
    }

    async fn smembers(&self, key: &str) -> CacheResult<Vec<String>> {
        let members: Vec<String> =
            redis::cmd("SMEMBERS").arg(key).query_async(&mut self.conn.clone()).await?;
        Ok(members)
    }

    async fn incr(&self, key: &str) -> CacheResult<i64> {
        let value: i64 = redis::cmd("INCR").arg(key).query_async(&mut self.conn.clone()).await?;
        Ok(value)
    }

    async fn scan_match(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let mut found = Vec::new();
        let mut cursor = 0u64;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut self.conn.clone())
                .await?;
            found.extend(keys);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(found)
    }

    async fn pipeline(&self, commands: Vec<Command>) -> CacheResult<()> {
        if commands.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        for command in commands {
            Self::apply(&mut pipe, command);
        }
        pipe.query_async::<()>(&mut self.conn.clone()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_backend_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<RedisBackend>();
        // Behavioral coverage lives in the MemoryBackend tests; exercising
        // RedisBackend requires a running Redis instance.
    }

    #[test]
    fn test_pipeline_command_shapes() {
        let mut pipe = redis::pipe();
        RedisBackend::apply(
            &mut pipe,
            Command::SetEx {
                key:         "computor:course:1".to_string(),
                value:       "{}".to_string(),
                ttl_seconds: 60,
            },
        );
        RedisBackend::apply(
            &mut pipe,
            Command::SAdd {
                key:     "computor:tag:course:1".to_string(),
                members: vec!["computor:course:1".to_string()],
            },
        );
        // Two commands queued, none dropped.
        assert_eq!(pipe.cmd_iter().count(), 2);
    }
}
