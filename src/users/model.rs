use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Free-form user data, kept in the order the client supplied it.
pub type Fields = Map<String, Value>;

/// Fields owned by the server. Clients can never set them directly.
pub const MANAGED_FIELDS: [&str; 2] = ["id", "profile"];

/// User row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,                  // generated on create, never changes
    pub profile: Option<String>,   // photo file name, null when no photo
    #[serde(flatten)]
    pub fields: Fields,
}

impl User {
    /// Builds a fresh user from a create body. Client supplied `id`/`profile`
    /// are discarded, not merged.
    pub fn new(mut fields: Fields) -> Self {
        strip_managed(&mut fields);
        Self {
            id: Uuid::new_v4(),
            profile: None,
            fields,
        }
    }

    /// Shallow merge: patch values replace existing ones key by key.
    pub fn merge(&mut self, mut patch: Fields) {
        strip_managed(&mut patch);
        for (key, value) in patch {
            self.fields.insert(key, value);
        }
    }
}

fn strip_managed(fields: &mut Fields) {
    for key in MANAGED_FIELDS {
        fields.shift_remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn new_ignores_client_id_and_profile() {
        let forged = Uuid::new_v4();
        let user = User::new(fields(json!({
            "id": forged.to_string(),
            "name": "Ada",
            "profile": "../../etc/passwd",
        })));

        assert_ne!(user.id, forged);
        assert_eq!(user.profile, None);
        assert_eq!(user.fields, fields(json!({ "name": "Ada" })));
    }

    #[test]
    fn merge_is_shallow_and_keeps_identity() {
        let mut user = User::new(fields(json!({ "name": "A", "age": 1, "tags": ["x"] })));
        let id = user.id;

        user.merge(fields(json!({ "age": 2, "id": "hijack", "tags": [] })));

        assert_eq!(user.id, id);
        assert_eq!(user.fields, fields(json!({ "name": "A", "age": 2, "tags": [] })));
    }

    #[test]
    fn serializes_managed_fields_first() {
        let user = User::new(fields(json!({ "zeta": true, "alpha": "a" })));
        let json = serde_json::to_string(&user).unwrap();

        let expected = format!(
            r#"{{"id":"{}","profile":null,"zeta":true,"alpha":"a"}}"#,
            user.id
        );
        assert_eq!(json, expected);
    }
}
