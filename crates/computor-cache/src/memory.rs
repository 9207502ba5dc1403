//! In-memory cache backend for tests and single-process deployments.
//!
//! Implements the same contract as the Redis backend over mutex-guarded maps.
//! TTLs are honored by storing a deadline and checking it on read; expired
//! entries are dropped lazily.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::backend::{CacheBackend, Command};
use crate::error::CacheResult;

#[derive(Debug)]
struct Entry {
    value:    String,
    deadline: Instant,
}

#[derive(Debug, Default)]
struct State {
    values: HashMap<String, Entry>,
    sets:   HashMap<String, HashSet<String>>,
    counts: HashMap<String, i64>,
}

/// In-memory implementation of [`CacheBackend`].
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) values, for test assertions.
    #[must_use]
    pub fn value_count(&self) -> usize {
        let now = Instant::now();
        self.state.lock().values.values().filter(|e| e.deadline > now).count()
    }

    fn glob_match(pattern: &str, key: &str) -> bool {
        // Only the trailing-star form is used by the cache layer.
        pattern.strip_suffix('*').map_or(pattern == key, |prefix| key.starts_with(prefix))
    }

    fn exec(state: &mut State, command: Command) {
        match command {
            Command::SetEx {
                key,
                value,
                ttl_seconds,
            } => {
                state.values.insert(key, Entry {
                    value,
                    deadline: Instant::now() + Duration::from_secs(ttl_seconds),
                });
            },
            Command::Del { keys } => {
                for key in keys {
                    state.values.remove(&key);
                    state.sets.remove(&key);
                    state.counts.remove(&key);
                }
            },
            Command::SAdd { key, members } => {
                state.sets.entry(key).or_default().extend(members);
            },
            Command::SRem { key, members } => {
                if let Some(set) = state.sets.get_mut(&key) {
                    for member in &members {
                        set.remove(member);
                    }
                    if set.is_empty() {
                        state.sets.remove(&key);
                    }
                }
            },
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut state = self.state.lock();
        match state.values.get(key) {
            Some(entry) if entry.deadline > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                state.values.remove(key);
                Ok(None)
            },
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> CacheResult<()> {
        Self::exec(&mut self.state.lock(), Command::SetEx {
            key:         key.to_string(),
            value:       value.to_string(),
            ttl_seconds,
        });
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> CacheResult<()> {
        Self::exec(&mut self.state.lock(), Command::Del { keys: keys.to_vec() });
        Ok(())
    }

    async fn sadd(&self, key: &str, members: &[String]) -> CacheResult<()> {
        Self::exec(&mut self.state.lock(), Command::SAdd {
            key:     key.to_string(),
            members: members.to_vec(),
        });
        Ok(())
    }

    async fn srem(&self, key: &str, members: &[String]) -> CacheResult<()> {
        Self::exec(&mut self.state.lock(), Command::SRem {
            key:     key.to_string(),
            members: members.to_vec(),
        });
        Ok(())
    }

    async fn smembers(&self, key: &str) -> CacheResult<Vec<String>> {
        Ok(self
            .state
            .lock()
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn incr(&self, key: &str) -> CacheResult<i64> {
        let mut state = self.state.lock();
        let counter = state.counts.entry(key.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn scan_match(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let state = self.state.lock();
        let mut keys: Vec<String> = state
            .values
            .keys()
            .chain(state.sets.keys())
            .chain(state.counts.keys())
            .filter(|k| Self::glob_match(pattern, k))
            .cloned()
            .collect();
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    async fn pipeline(&self, commands: Vec<Command>) -> CacheResult<()> {
        let mut state = self.state.lock();
        for command in commands {
            Self::exec(&mut state, command);
        }
        Ok(())
    }
}
