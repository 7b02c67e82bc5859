//! Route-level access policy.
//!
//! `AccessPolicy::evaluate` is a pure function of the policy, the session and
//! the requested path. Performing the redirect is somebody else's job (see
//! `guard`).

use serde::{Deserialize, Serialize};

use crate::{Role, Session};

/// Outcome of evaluating a navigation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "target", rename_all = "snake_case")]
pub enum AccessDecision {
    Allow,
    Redirect(String),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allow)
    }
}

/// A gated path prefix and the least role allowed under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRule {
    pub prefix: String,
    pub minimum: Role,
}

impl PathRule {
    pub fn new(prefix: impl Into<String>, minimum: Role) -> Self {
        Self {
            prefix: normalize_path(&prefix.into()).to_string(),
            minimum,
        }
    }

    fn matches(&self, path: &str) -> bool {
        path.starts_with(&self.prefix)
    }
}

/// Route policy: public paths, gated prefixes (first match wins) and the two
/// redirect targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    pub public_paths: Vec<String>,
    pub rules: Vec<PathRule>,
    pub login_path: String,
    pub home_path: String,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            public_paths: vec!["/login".to_string()],
            rules: vec![
                PathRule::new("/dashboard/users", Role::Admin),
                PathRule::new("/dashboard/settings", Role::Admin),
                PathRule::new("/dashboard/reports", Role::Manager),
            ],
            login_path: "/login".to_string(),
            home_path: "/dashboard/hives".to_string(),
        }
    }
}

impl AccessPolicy {
    /// Decide whether `session` may visit `path`.
    ///
    /// Rule order:
    /// 1. public path → allow
    /// 2. no session → login
    /// 3. first gated prefix whose minimum role is not met → home
    /// 4. otherwise allow
    pub fn evaluate(&self, session: &Session, path: &str) -> AccessDecision {
        let path = normalize_path(path);

        if self.is_public(path) {
            return AccessDecision::Allow;
        }

        let Some(role) = session.role() else {
            return AccessDecision::Redirect(self.login_path.clone());
        };

        self.evaluate_role(role, path)
    }

    /// Role-only part of the evaluation, for callers that already hold a
    /// valid session.
    pub fn evaluate_role(&self, role: Role, path: &str) -> AccessDecision {
        let path = normalize_path(path);

        match self.required_role(path) {
            Some(minimum) if !role.includes(minimum) => {
                AccessDecision::Redirect(self.home_path.clone())
            }
            _ => AccessDecision::Allow,
        }
    }

    /// Least role the first matching rule demands, if any rule matches.
    pub fn required_role(&self, path: &str) -> Option<Role> {
        let path = normalize_path(path);
        self.rules.iter().find(|r| r.matches(path)).map(|r| r.minimum)
    }

    pub fn is_public(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.public_paths
            .iter()
            .any(|p| normalize_path(p) == path)
    }
}

/// Strip query and fragment, and any trailing slash except on the root.
pub fn normalize_path(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let path = &path[..end];
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::User;
    use hivegate_core::UserId;
    use proptest::prelude::*;

    fn session_for(role: Role) -> Session {
        Session::authenticated(
            User {
                id: UserId::new(1).unwrap(),
                username: "u".to_string(),
                full_name: "U".to_string(),
                role,
                email: "u@example.com".to_string(),
            },
            "token",
        )
    }

    fn redirect(to: &str) -> AccessDecision {
        AccessDecision::Redirect(to.to_string())
    }

    #[test]
    fn worker_is_sent_home_from_settings() {
        let policy = AccessPolicy::default();
        assert_eq!(
            policy.evaluate(&session_for(Role::Worker), "/dashboard/settings"),
            redirect("/dashboard/hives")
        );
    }

    #[test]
    fn reports_are_manager_tier() {
        let policy = AccessPolicy::default();
        assert_eq!(
            policy.evaluate(&session_for(Role::Manager), "/dashboard/reports"),
            AccessDecision::Allow
        );
        assert_eq!(
            policy.evaluate(&session_for(Role::Worker), "/dashboard/reports"),
            redirect("/dashboard/hives")
        );
        assert_eq!(
            policy.evaluate(&session_for(Role::Admin), "/dashboard/reports/2024"),
            AccessDecision::Allow
        );
    }

    #[test]
    fn anonymous_users_go_to_login_except_on_public_paths() {
        let policy = AccessPolicy::default();
        let anon = Session::anonymous();
        assert_eq!(policy.evaluate(&anon, "/login"), AccessDecision::Allow);
        assert_eq!(policy.evaluate(&anon, "/login?next=/x"), AccessDecision::Allow);
        assert_eq!(policy.evaluate(&anon, "/dashboard/hives"), redirect("/login"));
        assert_eq!(policy.evaluate(&anon, "/dashboard/users"), redirect("/login"));
    }

    #[test]
    fn manager_cannot_reach_admin_pages() {
        let policy = AccessPolicy::default();
        let manager = session_for(Role::Manager);
        assert_eq!(policy.evaluate(&manager, "/dashboard/users/7"), redirect("/dashboard/hives"));
        assert_eq!(policy.evaluate(&manager, "/dashboard/users/"), redirect("/dashboard/hives"));
        assert_eq!(policy.evaluate(&session_for(Role::Admin), "/dashboard/users"), AccessDecision::Allow);
    }

    #[test]
    fn prefixes_match_as_plain_strings() {
        let policy = AccessPolicy::default();
        let worker = session_for(Role::Worker);
        for path in [
            "/dashboard/usersettings",
            "/dashboard/reports-archive",
            "/dashboard/settings2",
        ] {
            assert_eq!(policy.evaluate(&worker, path), redirect("/dashboard/hives"), "{path}");
        }
        assert_eq!(
            policy.evaluate(&session_for(Role::Manager), "/dashboard/reports-archive"),
            AccessDecision::Allow
        );
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize_path("/a/b/?x=1#top"), "/a/b");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "/");
    }

    fn any_role() -> impl Strategy<Value = Role> {
        prop_oneof![Just(Role::Worker), Just(Role::Manager), Just(Role::Admin)]
    }

    fn any_path() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("/login".to_string()),
            Just("/dashboard/users".to_string()),
            Just("/dashboard/settings/profile".to_string()),
            Just("/dashboard/reports".to_string()),
            Just("/dashboard/hives".to_string()),
            "/[a-z]{1,8}(/[a-z0-9]{1,8}){0,3}",
        ]
    }

    proptest! {
        /// Property: evaluation is deterministic and has no hidden state.
        #[test]
        fn evaluation_is_deterministic(role in any_role(), path in any_path()) {
            let policy = AccessPolicy::default();
            let session = session_for(role);
            let first = policy.evaluate(&session, &path);
            for _ in 0..3 {
                prop_assert_eq!(&policy.evaluate(&session, &path), &first);
            }
        }

        /// Property: a higher role is never denied where a lower role is allowed.
        #[test]
        fn higher_roles_dominate(low in any_role(), high in any_role(), path in any_path()) {
            prop_assume!(high.includes(low));
            let policy = AccessPolicy::default();
            if policy.evaluate(&session_for(low), &path).is_allowed() {
                prop_assert!(policy.evaluate(&session_for(high), &path).is_allowed());
            }
        }

        /// Property: admins are never redirected once signed in.
        #[test]
        fn admin_is_always_allowed(path in any_path()) {
            let policy = AccessPolicy::default();
            prop_assert!(policy.evaluate(&session_for(Role::Admin), &path).is_allowed());
        }
    }
}
