use std::{future::Future, sync::Arc};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    dto::ProfileEntry,
    model::{Fields, User},
    photos::{is_image, photo_file_name, PhotoUpload},
};
use crate::{
    error::{ApiError, ApiResult, PROFILE_NOT_FOUND, USER_NOT_FOUND},
    storage::{PhotoStore, PhotoStream},
    table::{StoreError, UserTable},
};

pub const INVALID_FILE_TYPE: &str = "Invalid File Type";
pub const PHOTO_REQUIRED: &str = "Profile Photo Required";

/// Owns the user set. The table file is only written, never re-read, after
/// startup; every mutation goes through one lock so concurrent requests
/// cannot overwrite each other's changes.
#[derive(Clone)]
pub struct UserService {
    inner: Arc<Inner>,
}

struct Inner {
    users: Mutex<Vec<User>>,
    table: UserTable,
    photos: Arc<dyn PhotoStore>,
}

impl UserService {
    pub async fn load(table: UserTable, photos: Arc<dyn PhotoStore>) -> Result<Self, StoreError> {
        let users = table.load().await?;
        info!(users = users.len(), path = %table.path().display(), "user table loaded");
        Ok(Self {
            inner: Arc::new(Inner {
                users: Mutex::new(users),
                table,
                photos,
            }),
        })
    }

    pub async fn create(&self, fields: Fields) -> ApiResult<User> {
        let user = User::new(fields);
        let created = self
            .mutate(move |users| {
                users.push(user.clone());
                Ok(user)
            })
            .await?;
        info!(user_id = %created.id, "user created");
        Ok(created)
    }

    pub async fn list(&self) -> Vec<User> {
        self.inner.users.lock().await.clone()
    }

    pub async fn get(&self, id: &str) -> ApiResult<User> {
        let id = parse_id(id)?;
        let users = self.inner.users.lock().await;
        let index = position(&users, id)?;
        Ok(users[index].clone())
    }

    pub async fn update(&self, id: &str, patch: Fields) -> ApiResult<User> {
        let id = parse_id(id)?;
        let updated = self
            .mutate(move |users| {
                let index = position(users, id)?;
                users[index].merge(patch);
                Ok(users[index].clone())
            })
            .await?;
        debug!(user_id = %id, "user updated");
        Ok(updated)
    }

    /// Removes the user and, best-effort, their photo.
    pub async fn delete(&self, id: &str) -> ApiResult<()> {
        let id = parse_id(id)?;
        let inner = self.inner.clone();
        detach(async move {
            let mut users = inner.users.lock().await;
            let index = position(&users, id)?;
            let mut next = users.clone();
            let removed = next.remove(index);
            *users = inner.table.persist(next).await?;

            if let Some(photo) = removed.profile.as_deref() {
                inner.discard_photo(id, photo).await;
            }
            info!(user_id = %id, "user deleted");
            Ok(())
        })
        .await
    }

    pub async fn list_profiles(&self) -> Vec<ProfileEntry> {
        let users = self.inner.users.lock().await;
        users.iter().map(ProfileEntry::from).collect()
    }

    /// `upload` is `None` when the request carried no `profile` part; that
    /// is reported only after the user is known to exist.
    pub async fn upload_photo(&self, id: &str, upload: Option<PhotoUpload>) -> ApiResult<User> {
        self.attach_photo(id, upload, "uploaded").await
    }

    pub async fn replace_photo(&self, id: &str, upload: Option<PhotoUpload>) -> ApiResult<User> {
        self.attach_photo(id, upload, "replaced").await
    }

    /// Opens the user's photo; the returned name carries its extension.
    pub async fn open_photo(&self, id: &str) -> ApiResult<(String, PhotoStream)> {
        let id = parse_id(id)?;
        let users = self.inner.users.lock().await;
        let index = position(&users, id)?;
        let name = users[index]
            .profile
            .clone()
            .ok_or(ApiError::NotFound(PROFILE_NOT_FOUND))?;
        let stream = self.inner.photos.open(&name).await?;
        Ok((name, stream))
    }

    pub async fn delete_photo(&self, id: &str) -> ApiResult<()> {
        let id = parse_id(id)?;
        let inner = self.inner.clone();
        detach(async move {
            let mut users = inner.users.lock().await;
            let index = position(&users, id)?;
            let Some(name) = users[index].profile.clone() else {
                return Err(ApiError::NotFound(PROFILE_NOT_FOUND));
            };
            let mut next = users.clone();
            next[index].profile = None;
            *users = inner.table.persist(next).await?;

            inner.discard_photo(id, &name).await;
            info!(user_id = %id, photo = %name, "photo deleted");
            Ok(())
        })
        .await
    }

    // Save new photo under a fresh name, persist the record, then drop the
    // old photo. A record never points at a file that is missing or half
    // written, and a failed persist leaves the old photo untouched.
    async fn attach_photo(
        &self,
        id: &str,
        upload: Option<PhotoUpload>,
        action: &'static str,
    ) -> ApiResult<User> {
        let id = parse_id(id)?;
        if let Some(upload) = &upload {
            if !is_image(&upload.content_type) {
                return Err(ApiError::BadRequest(INVALID_FILE_TYPE.into()));
            }
        }

        let inner = self.inner.clone();
        detach(async move {
            let mut users = inner.users.lock().await;
            let index = position(&users, id)?;
            let Some(upload) = upload else {
                return Err(ApiError::BadRequest(PHOTO_REQUIRED.into()));
            };
            let previous = users[index].profile.clone();
            let name = photo_file_name(id, &upload.content_type);
            let size = upload.body.len();

            inner.photos.save(&name, upload.body).await?;

            let mut next = users.clone();
            next[index].profile = Some(name.clone());
            let updated = next[index].clone();
            match inner.table.persist(next).await {
                Ok(next) => *users = next,
                Err(e) => {
                    inner.discard_photo(id, &name).await;
                    return Err(e.into());
                }
            }

            if let Some(old) = previous {
                inner.discard_photo(id, &old).await;
            }
            info!(
                user_id = %id,
                photo = %name,
                size,
                original = upload.original_name.as_deref().unwrap_or_default(),
                "photo {}",
                action
            );
            Ok(updated)
        })
        .await
    }

    /// Clone the set, apply `apply`, persist, then swap the clone in. Nothing
    /// changes in memory when the write fails.
    async fn mutate<R, F>(&self, apply: F) -> ApiResult<R>
    where
        F: FnOnce(&mut Vec<User>) -> ApiResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let inner = self.inner.clone();
        detach(async move {
            let mut users = inner.users.lock().await;
            let mut next = users.clone();
            let out = apply(&mut next)?;
            *users = inner.table.persist(next).await?;
            Ok(out)
        })
        .await
    }
}

impl Inner {
    async fn discard_photo(&self, user_id: Uuid, name: &str) {
        match self.photos.delete(name).await {
            Ok(()) => debug!(%user_id, photo = name, "photo removed"),
            Err(e) => warn!(%user_id, photo = name, error = %e, "photo cleanup failed"),
        }
    }
}

// Runs a mutation on its own task so a dropped request cannot stop it
// halfway between the photo write and the table write.
async fn detach<T, F>(task: F) -> ApiResult<T>
where
    F: Future<Output = ApiResult<T>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(task).await {
        Ok(result) => result,
        Err(e) => Err(ApiError::Internal(
            anyhow::Error::new(e).context("user mutation task failed"),
        )),
    }
}

fn parse_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound(USER_NOT_FOUND))
}

fn position(users: &[User], id: Uuid) -> ApiResult<usize> {
    users
        .iter()
        .position(|u| u.id == id)
        .ok_or(ApiError::NotFound(USER_NOT_FOUND))
}
