//! Application state wiring the engine to its collaborators.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use procedo_core::Engine;
use procedo_core::repository::DynProcedureRepository;
use procedo_infra::config::load_config;
use procedo_infra::credential::CredentialResolver;
use procedo_infra::executor::integration::audit::{DynAuditSink, TracingAuditSink};
use procedo_infra::executor::{DataExecutor, IntegrationExecutor, NotificationExecutor, WaitExecutor};
use procedo_infra::repository::FileProcedureRepository;
use procedo_infra::sqlite::pool::{default_data_dir, default_database_url};
use procedo_infra::sqlite::{DatabasePool, SqliteAuditSink, SqliteRecordStore};
use procedo_infra::store::InMemoryRecordStore;

use crate::cli::{Cli, StoreKind};

pub struct AppState {
    pub engine: Arc<Engine>,
    pub repository: Arc<FileProcedureRepository>,
    /// Present when the SQLite store is selected.
    pub db_pool: Option<DatabasePool>,
}

impl AppState {
    /// Load configuration, open the store and build the engine.
    pub async fn init(cli: &Cli) -> anyhow::Result<Self> {
        let config = load_config(&cli.config_dir).await;
        let repository = Arc::new(FileProcedureRepository::new(cli.procedures.clone()));

        let db_pool = match cli.store {
            StoreKind::Memory => None,
            StoreKind::Sqlite => Some(open_database(cli.database.as_deref()).await?),
        };

        let audit: DynAuditSink = match &db_pool {
            Some(pool) => Arc::new(SqliteAuditSink::new(pool.clone())),
            None => Arc::new(TracingAuditSink),
        };
        let integration = IntegrationExecutor::new(
            config.integration.clone(),
            CredentialResolver::new(config.credentials.clone()),
            audit,
        )
        .context("failed to build the integration client")?;

        let builder = Engine::builder()
            .config(config.engine.clone())
            .repository(repository.clone() as DynProcedureRepository)
            .executor(integration)
            .executor(NotificationExecutor)
            .executor(WaitExecutor);
        let builder = match &db_pool {
            Some(pool) => builder.executor(DataExecutor::new(SqliteRecordStore::new(pool.clone()))),
            None => builder.executor(DataExecutor::new(InMemoryRecordStore::new())),
        };
        let engine = builder.build().context("failed to build the engine")?;

        Ok(Self {
            engine: Arc::new(engine),
            repository,
            db_pool,
        })
    }
}

async fn open_database(url: Option<&str>) -> anyhow::Result<DatabasePool> {
    let url = match url {
        Some(url) => url.to_string(),
        None => {
            let data_dir: PathBuf = default_data_dir();
            tokio::fs::create_dir_all(&data_dir)
                .await
                .with_context(|| format!("failed to create {}", data_dir.display()))?;
            default_database_url()
        }
    };
    DatabasePool::new(&url)
        .await
        .with_context(|| format!("failed to open database {url}"))
}
