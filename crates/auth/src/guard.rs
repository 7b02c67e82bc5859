//! Navigation guard: evaluates the policy and hands redirects to a navigator.

use crate::{AccessDecision, AccessPolicy, Session};

/// Whatever performs navigation (router, UI shell, test double).
pub trait Navigator {
    fn navigate(&self, target: &str);
}

/// Gate a navigation attempt. Returns `true` when the caller may proceed.
///
/// On a redirect the navigator is told where to go, unless that is where
/// the user already is.
pub fn guard<N: Navigator + ?Sized>(
    policy: &AccessPolicy,
    session: &Session,
    path: &str,
    navigator: &N,
) -> bool {
    match policy.evaluate(session, path) {
        AccessDecision::Allow => true,
        AccessDecision::Redirect(target) => {
            tracing::debug!(path, target = %target, "navigation redirected");
            if crate::policy::normalize_path(path) != crate::policy::normalize_path(&target) {
                navigator.navigate(&target);
            }
            false
        }
    }
}
