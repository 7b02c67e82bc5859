use serde::{Deserialize, Serialize};

/// Role held by a user account.
///
/// The hierarchy is total: every capability a lower role has, a higher role
/// has too. `Ord` follows the hierarchy (`Worker < Manager < Admin`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "WORKER", alias = "worker", alias = "beekeeper")]
    Worker,
    #[serde(rename = "MANAGER", alias = "manager")]
    Manager,
    #[serde(rename = "ADMIN", alias = "admin")]
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Manager => "MANAGER",
            Role::Worker => "WORKER",
        }
    }

    /// Whether this role carries every capability of `other`.
    pub fn includes(&self, other: Role) -> bool {
        *self >= other
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "MANAGER" => Ok(Role::Manager),
            "WORKER" | "BEEKEEPER" => Ok(Role::Worker),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy_is_linear() {
        assert!(Role::Admin.includes(Role::Manager));
        assert!(Role::Manager.includes(Role::Worker));
        assert!(!Role::Worker.includes(Role::Manager));
        assert!(Role::Worker < Role::Admin);
        assert!(Role::Manager.includes(Role::Manager));
    }

    #[test]
    fn accepts_legacy_lowercase_names() {
        let role: Role = serde_json::from_str("\"beekeeper\"").unwrap();
        assert_eq!(role, Role::Worker);
        assert_eq!(serde_json::to_string(&Role::Manager).unwrap(), "\"MANAGER\"");
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
    }
}
