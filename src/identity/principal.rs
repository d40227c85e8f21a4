use serde::{Deserialize, Serialize};

/// Authorization tier controlling which dashboards are reachable.
/// Closed set; anything a profile row carries outside it normalizes to the
/// least-privileged tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Contributor,
    Admin,
}

impl Role {
    /// Parse a persisted role name. The stored schema enum spells the basic
    /// tier `general_user`; application logic uses `user`. Both map to the
    /// one canonical variant here so neither spelling leaks past this
    /// boundary.
    pub fn parse(raw: &str) -> Option<Role> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "user" | "general_user" => Some(Role::User),
            "contributor" => Some(Role::Contributor),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    /// Normalize a profile row's role column. Absent row, null column and
    /// unrecognized names all resolve to User: the fallback is always the
    /// least-privileged tier, never an elevated one.
    pub fn from_profile(raw: Option<&str>) -> Role {
        match raw {
            None => Role::User,
            Some(s) => Role::parse(s).unwrap_or_else(|| {
                tracing::warn!(target: "texloom::identity", "unrecognized profile role '{}', defaulting to user", s);
                Role::User
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Contributor => "contributor",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The resolved (user, role) pair handed to UI consumers such as the
/// navigation header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub role: Role,
    #[serde(default)]
    pub email: Option<String>,
}
