use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::User;

/// Shared state handed to every command handler.
pub struct App {
    pub config: Config,
    config_path: PathBuf,
    pub repository: Arc<Repository>,
}

impl App {
    pub async fn new(config: Config, config_path: PathBuf) -> Result<Self> {
        let repository = Repository::new(&config.db_path).await?;
        Ok(Self::with_repository(config, config_path, repository))
    }

    pub fn with_repository(config: Config, config_path: PathBuf, repository: Repository) -> Self {
        Self {
            config,
            config_path,
            repository: Arc::new(repository),
        }
    }

    /// The user named in the config, which must exist in the store.
    pub async fn current_user(&self) -> Result<User> {
        let name = self.config.current_user.as_deref().ok_or_else(|| {
            AppError::InvalidArgument("no current user, run `register <name>` first".to_string())
        })?;

        self.repository
            .get_user_by_name(name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {:?}", name)))
    }

    pub fn set_current_user(&mut self, name: &str) -> Result<()> {
        self.config.current_user = Some(name.to_string());
        self.config.save_to(&self.config_path)
    }
}
