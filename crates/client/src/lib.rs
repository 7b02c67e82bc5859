//! `hivegate-client` — typed access to the bee-management backends.
//!
//! One request pipeline serves the REST API (`ResourceClient`) and the RPC
//! proxy (`RpcBridge`). Both read the bearer token from a `TokenSource` on
//! every call.

pub mod auth_api;
pub mod config;
pub mod error;
pub mod grants;
mod http;
pub mod reconcile;
pub mod records;
pub mod resource;
pub mod rpc;
pub mod scope;

pub use auth_api::{AuthClient, RegisterInput, UserAdmin};
pub use config::{ConfigError, GatewayConfig};
pub use error::GatewayError;
pub use grants::{RegionGrantStore, RestRegionGrants};
pub use reconcile::{
    GrantOp, ReconcileError, ReconcilePlan, ReconcileReport, RegionGrantReconciler, plan,
};
pub use records::{
    AllowedRegion, Apiary, BeeCommunity, HiveObservation, Hive, HoneyHarvest, Incident,
    MaintenancePlan, OBSERVATION_MARKER, ObservationLog, ProductionReport, Region, RegionApiary,
    Sensor, SensorReading, UserAccount, WeatherData, WorkerGroup,
};
pub use resource::{Resource, ResourceClient};
pub use rpc::{Ack, RpcBridge, RpcCall};
pub use scope::{RegionScoped, ensure_region_access, retain_in_scope};
