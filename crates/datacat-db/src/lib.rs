//! # datacat-db
//!
//! Backing stores for datacat.
//!
//! This crate provides:
//! - `RedisJobStore`: job records and the priority queue over Redis
//! - `PgCatalogRepository`: the PostgreSQL metadata catalog
//! - `MemoryJobStore` / `MemoryCatalog`: in-process stores for tests
//! - Connection pool management and SQL migrations
//!
//! ## Example
//!
//! ```rust,ignore
//! use datacat_db::{Database, RedisJobStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/taxi_catalog").await?;
//!     let jobs = RedisJobStore::connect("redis://localhost:6379").await?;
//!     let tables = db.catalog.list_tables(None).await?;
//!     println!("{} tables in catalog", tables.len());
//!     Ok(())
//! }
//! ```
pub mod catalog;
pub mod jobs;
pub mod memory;
pub mod pool;

// Re-export core types
pub use datacat_core::*;

pub use catalog::PgCatalogRepository;
pub use jobs::RedisJobStore;
pub use memory::{MemoryCatalog, MemoryJobStore};
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};

/// PostgreSQL context holding the pool and the catalog repository.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Metadata catalog repository.
    pub catalog: PgCatalogRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            catalog: PgCatalogRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
