use std::{
    collections::HashSet,
    io::Write,
    path::{Path, PathBuf},
};

use serde_json::Value;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::users::model::{Fields, User};

const ID_COLUMN: &str = "id";
const PROFILE_COLUMN: &str = "profile";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user table {path} is unavailable: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("user table row {row} is malformed: {reason}")]
    Decode { row: usize, reason: String },
    #[error("failed to write user table {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("user table task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Whole-file persistence for the user set.
///
/// The file is CSV: a header row (`id`, `profile`, then every other field
/// name in first-seen order) and one row per user. Free-form cells hold the
/// JSON encoding of the value; an empty cell means the user lacks that field.
#[derive(Debug, Clone)]
pub struct UserTable {
    path: PathBuf,
}

impl UserTable {
    /// Opens the table, creating an empty one (header only) when missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let table = Self { path: path.into() };
        if let Some(dir) = table.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| StoreError::Write {
                path: table.path.clone(),
                source,
            })?;
        }
        if !table.path.exists() {
            debug!(path = %table.path.display(), "creating empty user table");
            table.write_all(&[])?;
        }
        Ok(table)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_all(&self) -> Result<Vec<User>, StoreError> {
        let bytes = std::fs::read(&self.path).map_err(|source| StoreError::Unavailable {
            path: self.path.clone(),
            source,
        })?;
        decode(&bytes)
    }

    /// Replaces the whole file. Writes a temp file next to the target and
    /// renames it over, so readers see either the old or the new set.
    pub fn write_all(&self, users: &[User]) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };
        let bytes = encode(users).map_err(write_err)?;

        let dir = match self.path.parent() {
            Some(d) if !d.as_os_str().is_empty() => d,
            _ => Path::new("."),
        };
        let mut temp = NamedTempFile::new_in(dir).map_err(write_err)?;
        temp.write_all(&bytes).map_err(write_err)?;
        temp.as_file().sync_all().map_err(write_err)?;
        temp.persist(&self.path).map_err(|e| write_err(e.error))?;
        debug!(path = %self.path.display(), users = users.len(), "user table written");
        Ok(())
    }

    pub async fn load(&self) -> Result<Vec<User>, StoreError> {
        let table = self.clone();
        tokio::task::spawn_blocking(move || table.load_all()).await?
    }

    /// Async `write_all` that hands the set back on success.
    pub async fn persist(&self, users: Vec<User>) -> Result<Vec<User>, StoreError> {
        let table = self.clone();
        tokio::task::spawn_blocking(move || table.write_all(&users).map(|()| users)).await?
    }
}

fn encode(users: &[User]) -> std::io::Result<Vec<u8>> {
    let mut columns: Vec<&str> = vec![ID_COLUMN, PROFILE_COLUMN];
    let mut seen: HashSet<&str> = HashSet::new();
    for user in users {
        for key in user.fields.keys() {
            if seen.insert(key.as_str()) {
                columns.push(key.as_str());
            }
        }
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&columns)?;
    for user in users {
        let mut row = Vec::with_capacity(columns.len());
        row.push(user.id.to_string());
        row.push(user.profile.clone().unwrap_or_default());
        for column in &columns[2..] {
            row.push(user.fields.get(*column).map(Value::to_string).unwrap_or_default());
        }
        writer.write_record(&row)?;
    }
    writer.into_inner().map_err(|e| e.into_error())
}

fn decode(bytes: &[u8]) -> Result<Vec<User>, StoreError> {
    let mut reader = csv::Reader::from_reader(bytes);
    let headers = reader
        .headers()
        .map_err(|e| StoreError::Decode {
            row: 0,
            reason: e.to_string(),
        })?
        .clone();
    if headers.get(0) != Some(ID_COLUMN) || headers.get(1) != Some(PROFILE_COLUMN) {
        return Err(StoreError::Decode {
            row: 0,
            reason: format!("header must start with {ID_COLUMN},{PROFILE_COLUMN}"),
        });
    }

    let mut users = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let row = index + 1;
        let bad = |reason: String| StoreError::Decode { row, reason };
        let record = record.map_err(|e| bad(e.to_string()))?;

        let id = Uuid::parse_str(record.get(0).unwrap_or_default())
            .map_err(|e| bad(format!("invalid id: {e}")))?;
        let profile = record
            .get(1)
            .filter(|cell| !cell.is_empty())
            .map(str::to_owned);

        let mut fields = Fields::new();
        for (name, cell) in headers.iter().zip(record.iter()).skip(2) {
            if cell.is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(cell)
                .map_err(|e| bad(format!("column {name}: {e}")))?;
            fields.insert(name.to_owned(), value);
        }
        users.push(User { id, profile, fields });
    }
    Ok(users)
}
