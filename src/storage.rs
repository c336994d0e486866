use std::{
    io::ErrorKind,
    path::PathBuf,
    pin::Pin,
};

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::{
    fs,
    io::{AsyncRead, AsyncWriteExt},
};
use tracing::debug;

pub type PhotoStream = Pin<Box<dyn AsyncRead + Send>>;

#[derive(Debug, Error)]
pub enum PhotoError {
    #[error("photo {0} not found")]
    NotFound(String),
    #[error("invalid photo name {0:?}")]
    InvalidName(String),
    #[error("photo {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait PhotoStore: Send + Sync {
    /// Stores `body` under `name`, replacing any previous content. Returns
    /// only once the bytes are durable.
    async fn save(&self, name: &str, body: Bytes) -> Result<(), PhotoError>;
    async fn delete(&self, name: &str) -> Result<(), PhotoError>;
    async fn open(&self, name: &str) -> Result<PhotoStream, PhotoError>;
}

/// Photos as plain files in one directory.
#[derive(Debug, Clone)]
pub struct LocalPhotoStore {
    root: PathBuf,
}

impl LocalPhotoStore {
    pub async fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .with_context(|| format!("create upload dir {}", root.display()))?;
        Ok(Self { root })
    }

    #[cfg(test)]
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, PhotoError> {
        ensure_plain_name(name)?;
        Ok(self.root.join(name))
    }
}

/// Rejects anything that could resolve outside the storage root.
fn ensure_plain_name(name: &str) -> Result<(), PhotoError> {
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);
    if plain {
        Ok(())
    } else {
        Err(PhotoError::InvalidName(name.to_owned()))
    }
}

#[async_trait]
impl PhotoStore for LocalPhotoStore {
    async fn save(&self, name: &str, body: Bytes) -> Result<(), PhotoError> {
        let path = self.path_for(name)?;
        let partial = self.root.join(format!("{name}.part"));

        let written = async {
            let mut file = fs::File::create(&partial).await?;
            file.write_all(&body).await?;
            file.sync_all().await?;
            fs::rename(&partial, &path).await?;
            Ok::<_, std::io::Error>(())
        }
        .await;

        if let Err(source) = written {
            if let Err(e) = fs::remove_file(&partial).await {
                debug!(photo = name, error = %e, "partial photo cleanup failed");
            }
            return Err(PhotoError::Io {
                name: name.to_owned(),
                source,
            });
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), PhotoError> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(PhotoError::NotFound(name.to_owned())),
            Err(source) => Err(PhotoError::Io {
                name: name.to_owned(),
                source,
            }),
        }
    }

    async fn open(&self, name: &str) -> Result<PhotoStream, PhotoError> {
        let path = self.path_for(name)?;
        match fs::File::open(&path).await {
            Ok(file) => Ok(Box::pin(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(PhotoError::NotFound(name.to_owned())),
            Err(source) => Err(PhotoError::Io {
                name: name.to_owned(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod storage_tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn read_all(store: &LocalPhotoStore, name: &str) -> Vec<u8> {
        let mut stream = store.open(name).await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn save_open_and_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalPhotoStore::new(dir.path().join("uploads")).await.unwrap();

        store.save("a.png", Bytes::from_static(b"first")).await.unwrap();
        assert_eq!(read_all(&store, "a.png").await, b"first");

        store.save("a.png", Bytes::from_static(b"second")).await.unwrap();
        assert_eq!(read_all(&store, "a.png").await, b"second");

        let leftovers: Vec<_> = std::fs::read_dir(store.root())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(leftovers, vec!["a.png".to_string()]);
    }

    #[tokio::test]
    async fn delete_and_open_report_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalPhotoStore::new(dir.path()).await.unwrap();
        store.save("b.jpg", Bytes::from_static(b"x")).await.unwrap();

        store.delete("b.jpg").await.unwrap();

        assert!(matches!(store.delete("b.jpg").await, Err(PhotoError::NotFound(_))));
        assert!(matches!(store.open("b.jpg").await, Err(PhotoError::NotFound(_))));
    }

    #[tokio::test]
    async fn rejects_names_escaping_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalPhotoStore::new(dir.path().join("uploads")).await.unwrap();

        for name in ["", ".", "..", "../users.csv", "a/b.png", "a\\b.png", "nul\0.png"] {
            let err = store.save(name, Bytes::from_static(b"x")).await.unwrap_err();
            assert!(matches!(err, PhotoError::InvalidName(_)), "{name:?} gave {err}");
        }
        assert!(!dir.path().join("users.csv").exists());
    }

    #[tokio::test]
    async fn failed_save_surfaces_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalPhotoStore::new(dir.path().join("uploads")).await.unwrap();
        std::fs::remove_dir(store.root()).unwrap();

        let err = store.save("c.png", Bytes::from_static(b"x")).await.unwrap_err();
        assert!(matches!(err, PhotoError::Io { .. }), "got: {err}");
        assert!(!store.root().join("c.png.part").exists());
    }

    #[test]
    fn plain_names_pass_validation() {
        assert!(ensure_plain_name("0b6c-1f2e.png").is_ok());
        assert!(ensure_plain_name("...png").is_ok());
        assert!(matches!(ensure_plain_name("../x"), Err(PhotoError::InvalidName(_))));
    }
}
