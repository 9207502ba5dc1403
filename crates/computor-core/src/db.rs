//! PostgreSQL pool access and lazy per-request connections.

use std::sync::atomic::{AtomicBool, Ordering};

use computor_error::{CoreError, Result};
use deadpool_postgres::{Config as PoolConfig, ManagerConfig, RecyclingMethod, Runtime};
use tokio::sync::OnceCell;
use tokio_postgres::NoTls;
use tracing::debug;
use uuid::Uuid;

use crate::config::DatabaseConfig;

/// Shared connection pool handle.
pub type PgPool = deadpool_postgres::Pool;

/// A pooled client. Derefs to [`tokio_postgres::Client`].
pub type PgClient = deadpool_postgres::Object;

/// Build the process-wide connection pool.
///
/// The pool does not connect eagerly; the first `get()` does.
pub fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let mut pool_config = PoolConfig::new();
    pool_config.host = Some(config.host.clone());
    pool_config.port = Some(config.port);
    pool_config.user = Some(config.user.clone());
    pool_config.password = Some(config.password.clone());
    pool_config.dbname = Some(config.dbname.clone());
    pool_config.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    pool_config.pool = Some(deadpool_postgres::PoolConfig {
        max_size: config.pool_size,
        timeouts: deadpool_postgres::Timeouts {
            wait: Some(config.acquire_timeout),
            ..Default::default()
        },
        ..Default::default()
    });

    pool_config.create_pool(Some(Runtime::Tokio1), NoTls).map_err(|err| CoreError::Internal {
        message: "failed to build connection pool".to_string(),
        source:  Some(Box::new(err)),
    })
}

/// Acquire a client, mapping pool exhaustion/timeouts to `StoreUnavailable`.
pub async fn acquire(pool: &PgPool) -> Result<PgClient> {
    pool.get().await.map_err(|err| CoreError::StoreUnavailable {
        reason:      format!("database pool unavailable: {err}"),
        retry_after: Some(2),
    })
}

/// Lazily-acquired per-request database handle.
///
/// View repositories hold one of these so the cache-hit path executes without
/// ever consulting the pool; the connection is acquired on first access and
/// released when the request drops the handle. When an audit user is set, the
/// first acquisition stamps `app.user_id` (transaction-scoped) so database
/// triggers can attribute writes.
pub struct LazyDb {
    pool:     PgPool,
    user_id:  Option<Uuid>,
    client:   OnceCell<PgClient>,
    acquired: AtomicBool,
}

impl LazyDb {
    /// Create a handle that will acquire from `pool` on first use.
    #[must_use]
    pub fn new(pool: PgPool, user_id: Option<Uuid>) -> Self {
        Self {
            pool,
            user_id,
            client: OnceCell::new(),
            acquired: AtomicBool::new(false),
        }
    }

    /// Get the client, acquiring it on first call.
    pub async fn client(&self) -> Result<&PgClient> {
        self.client
            .get_or_try_init(|| async {
                debug!(user_id = ?self.user_id, "acquiring database connection on demand");
                let client = acquire(&self.pool).await?;
                if let Some(user_id) = self.user_id {
                    // SET LOCAL resets on commit; per-request transactions are
                    // assumed, long-running transactions are not modeled.
                    client
                        .execute(
                            "SELECT set_config('app.user_id', $1, true)",
                            &[&user_id.to_string()],
                        )
                        .await?;
                }
                self.acquired.store(true, Ordering::Release);
                Ok(client)
            })
            .await
    }

    /// Whether a connection was ever acquired through this handle.
    ///
    /// The lazy-connection property is checked against this: a view method
    /// answered from cache must leave it `false`.
    #[must_use]
    pub fn was_acquired(&self) -> bool {
        self.acquired.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for LazyDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyDb")
            .field("user_id", &self.user_id)
            .field("acquired", &self.was_acquired())
            .finish_non_exhaustive()
    }
}
