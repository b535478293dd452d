use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use freightgate_core::config::{AppConfig, ConfigError, LoadOptions};
use freightgate_db::{connect, migrations, DbPool};
use freightgate_notify::{HttpMailer, NoopNotifier, Notifier, NotifyError};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Mailer(#[from] NotifyError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    let schema_version =
        migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        schema_version,
        "database migrations applied"
    );

    let notifier: Arc<dyn Notifier> = match HttpMailer::from_config(&config.mailer)? {
        Some(mailer) => Arc::new(mailer),
        None => {
            info!(
                event_name = "system.bootstrap.mailer_disabled",
                correlation_id = "bootstrap",
                "mailer disabled; approval notifications will be dropped"
            );
            Arc::new(NoopNotifier)
        }
    };

    Ok(Application { config, db_pool, notifier })
}
