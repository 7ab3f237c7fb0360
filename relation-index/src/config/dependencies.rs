//! Dependency initialization and wiring for the relation index tool.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::config::Settings;
use crate::AppError;
use relation_index_pipeline::ConnectionManager;

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// The verified connection shared by every service.
    pub manager: Arc<ConnectionManager>,
    /// Where the property report is written.
    pub report_path: PathBuf,
}

impl Dependencies {
    /// Initialize all dependencies from environment variables.
    ///
    /// See [`Settings::from_env`] for the variables read.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies with a verified connection
    /// * `Err(AppError)` - If configuration is invalid or the cluster is unreachable
    pub async fn new() -> Result<Self, AppError> {
        let settings = Settings::from_env()?;
        Self::from_settings(settings).await
    }

    /// Initialize dependencies from already loaded settings.
    pub async fn from_settings(settings: Settings) -> Result<Self, AppError> {
        let connection = &settings.service.connection;
        let layout = &settings.service.layout;

        info!(
            url = %connection.url(),
            cluster_name = connection.cluster_name.as_deref().unwrap_or("<any>"),
            index_name = %layout.index_name,
            write_index = %layout.write_index,
            report_path = %settings.report_path.display(),
            "Initializing dependencies"
        );

        let manager = ConnectionManager::new(settings.service);

        // Verify the cluster is reachable before doing any work
        manager.connection().await?;

        info!("Search engine connection verified");

        Ok(Self {
            manager: Arc::new(manager),
            report_path: settings.report_path,
        })
    }
}
