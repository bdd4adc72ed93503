use serde::{Deserialize, Serialize};

/// An authenticated identity as issued by the identity provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub uid: String,
    #[serde(default)]
    pub email: String,
    /// Short-lived bearer credential; never persisted by this crate.
    #[serde(default, skip_serializing)]
    pub id_token: String,
}

/// Access tier read from a principal's role record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    User,
    /// Any tag other than `admin`/`user`. Grants nothing.
    Unrecognized(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::Unrecognized(tag) => tag.as_str(),
        }
    }

    pub fn is_admin(&self) -> bool { matches!(self, Role::Admin) }

    /// Admins and users are staff; unrecognized tags are not.
    pub fn is_staff(&self) -> bool { matches!(self, Role::Admin | Role::User) }
}

impl From<&str> for Role {
    fn from(tag: &str) -> Self {
        match tag {
            "admin" => Role::Admin,
            "user" => Role::User,
            other => Role::Unrecognized(other.to_string()),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}
