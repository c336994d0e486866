use serde::Serialize;
use uuid::Uuid;

use super::model::User;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileEntry {
    pub id: Uuid,
    pub profile: Option<String>,
}

impl From<&User> for ProfileEntry {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            profile: user.profile.clone(),
        }
    }
}
