use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;

use hivegate_core::RegionId;

use crate::{Role, User};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: region {0} is not granted")]
    RegionNotGranted(RegionId),
}

/// Region-scope rule: admins see every region, everyone else only the
/// regions they were granted.
///
/// - No IO
/// - No panics
pub fn can_access_region<'a, I>(role: Role, granted: I, requested: RegionId) -> bool
where
    I: IntoIterator<Item = &'a RegionId>,
{
    role == Role::Admin || granted.into_iter().any(|g| *g == requested)
}

/// Same rule, as a `Result` for call sites that propagate with `?`.
pub fn authorize_region<'a, I>(user: &User, granted: I, requested: RegionId) -> Result<(), AuthzError>
where
    I: IntoIterator<Item = &'a RegionId>,
{
    if can_access_region(user.role, granted, requested) {
        Ok(())
    } else {
        Err(AuthzError::RegionNotGranted(requested))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Region decision explanation (audit trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Why a region-scoped request was allowed or denied.
#[derive(Debug, Clone, Serialize)]
pub struct RegionAccessExplanation {
    pub requested_region: RegionId,
    pub granted: bool,
    pub reason: String,
    pub role: Role,
    pub granted_regions: Vec<RegionId>,
    pub denial: Option<RegionDenial>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegionDenial {
    pub message: String,
    pub suggestions: Vec<String>,
}

pub fn explain_region_access<'a, I>(role: Role, granted: I, requested: RegionId) -> RegionAccessExplanation
where
    I: IntoIterator<Item = &'a RegionId>,
{
    let granted_regions: Vec<RegionId> = granted
        .into_iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    if role == Role::Admin {
        return RegionAccessExplanation {
            requested_region: requested,
            granted: true,
            reason: "ADMIN bypasses region scoping".to_string(),
            role,
            granted_regions,
            denial: None,
        };
    }

    if granted_regions.contains(&requested) {
        return RegionAccessExplanation {
            requested_region: requested,
            granted: true,
            reason: format!("region {requested} is explicitly granted"),
            role,
            granted_regions,
            denial: None,
        };
    }

    RegionAccessExplanation {
        requested_region: requested,
        granted: false,
        reason: format!(
            "region {requested} is not among the granted regions {:?}",
            granted_regions.iter().map(|r| r.get()).collect::<Vec<_>>()
        ),
        role,
        granted_regions,
        denial: Some(RegionDenial {
            message: format!("{role} has no grant for region {requested}"),
            suggestions: vec![
                format!("Ask a manager to grant region {requested} to this user"),
                "Re-fetch the user's allowed regions if a grant was added recently".to_string(),
            ],
        }),
    }
}
