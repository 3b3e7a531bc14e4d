use async_trait::async_trait;
use deadpool_postgres::Config as PoolConfig;
use deadpool_postgres::ManagerConfig;
use deadpool_postgres::Pool;
use deadpool_postgres::RecyclingMethod;
use deadpool_postgres::Runtime;
#[cfg(test)]
use mockall::automock;
use tokio_postgres::NoTls;
use tracing::debug;

use crate::Result;

/// Liveness record of the change producer, read by an external monitor.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HeartbeatStore: Send + Sync + 'static {
    /// Returns the number of rows touched.
    async fn beat(&self) -> Result<u64>;
}

pub struct PostgresHeartbeat {
    pool: Pool,
    statement: String,
}

impl PostgresHeartbeat {
    /// Builds the pool lazily; no connection is opened until the first beat.
    pub fn new(
        url: &str,
        statement: &str,
    ) -> Result<Self> {
        let mut cfg = PoolConfig::new();
        cfg.url = Some(url.to_string());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls)?;
        Ok(Self {
            pool,
            statement: statement.to_string(),
        })
    }
}

#[async_trait]
impl HeartbeatStore for PostgresHeartbeat {
    async fn beat(&self) -> Result<u64> {
        let client = self.pool.get().await?;
        let rows = client.execute(self.statement.as_str(), &[]).await?;
        debug!("heartbeat touched {rows} rows");
        Ok(rows)
    }
}
