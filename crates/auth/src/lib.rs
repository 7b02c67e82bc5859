//! `hivegate-auth` — who is signed in and what they may reach.
//!
//! Session state, role hierarchy, route policy and region scoping. Nothing in
//! this crate talks to the network.

pub mod authorize;
pub mod claims;
pub mod guard;
pub mod policy;
pub mod roles;
pub mod session;
pub mod storage;
pub mod user;

pub use authorize::{
    AuthzError, RegionAccessExplanation, authorize_region, can_access_region,
    explain_region_access,
};
pub use claims::{TokenClaims, TokenError, decode_unverified, validate_claims};
pub use guard::{Navigator, guard};
pub use policy::{AccessDecision, AccessPolicy, PathRule};
pub use roles::Role;
pub use session::{Credentials, SESSION_KEY, Session, SessionError, SessionStore, TokenSource};
pub use storage::{FileStorage, MemoryStorage, SessionStorage, StorageError};
pub use user::User;
