use crate::config::AppConfig;
use crate::storage::{LocalPhotoStore, PhotoStore};
use crate::table::UserTable;
use crate::users::services::UserService;
use anyhow::Context;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: UserService,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;
        Self::from_config(config).await
    }

    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let table = UserTable::open(&config.data_file)
            .with_context(|| format!("open user table {}", config.data_file.display()))?;
        let photos = Arc::new(LocalPhotoStore::new(&config.upload_dir).await?) as Arc<dyn PhotoStore>;
        let users = UserService::load(table, photos)
            .await
            .context("load user table")?;

        Ok(Self {
            config: Arc::new(config),
            users,
        })
    }

    #[cfg(test)]
    pub async fn fake(root: &std::path::Path, max_photo_bytes: usize) -> Self {
        let config = AppConfig {
            host: "127.0.0.1".into(),
            port: 0,
            data_file: root.join("users.csv"),
            upload_dir: root.join("uploads"),
            max_photo_bytes,
        };
        Self::from_config(config).await.expect("test state")
    }
}
