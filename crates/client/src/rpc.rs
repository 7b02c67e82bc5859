//! Bridge to the secondary bee-management service.
//!
//! The service speaks a remote-procedure protocol the client cannot reach
//! directly; an HTTP proxy re-exposes every unary method as
//! `POST {rpc_base}/api/grpc/<methodName>` with JSON in and JSON out.
//! Calls share the REST client's pipeline, so errors look the same
//! whichever backend answered.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Method;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Deserializer, Serialize};

use hivegate_auth::TokenSource;
use hivegate_core::{RegionId, UserId};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::http::{Auth, HttpPipeline, decode};
use crate::records::base64_bytes;

/// A unary method of the bridged service. The implementing type is the
/// request body.
pub trait RpcCall: Serialize + Send + Sync {
    /// Method name as routed by the proxy, lowerCamelCase.
    const NAME: &'static str;

    type Response: DeserializeOwned;
}

/// Empty reply of a command-style method.
///
/// Decodes from `{}`, `null`, an empty body or anything else the proxy
/// sends back on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ack;

impl<'de> Deserialize<'de> for Ack {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        IgnoredAny::deserialize(deserializer).map(|_| Ack)
    }
}

#[derive(Clone)]
pub struct RpcBridge {
    config: Arc<GatewayConfig>,
    pipeline: HttpPipeline,
}

impl RpcBridge {
    pub fn new(config: GatewayConfig, tokens: Arc<dyn TokenSource>) -> Result<Self, GatewayError> {
        let pipeline = HttpPipeline::new(&config, tokens)?;
        Ok(Self {
            config: Arc::new(config),
            pipeline,
        })
    }

    /// One request, one response. An unreachable service is an ordinary
    /// `Transport` or `RequestFailed` error.
    pub async fn call<C: RpcCall>(&self, request: &C) -> Result<C::Response, GatewayError> {
        let body = serde_json::to_value(request)
            .map_err(|e| GatewayError::Validation(format!("failed to encode {} request: {e}", C::NAME)))?;
        let url = self.config.rpc_url(&format!("/api/grpc/{}", C::NAME));

        let resp = self
            .pipeline
            .execute(Method::POST, &url, Some(&body), Auth::Session)
            .await
            .inspect_err(|err| {
                tracing::warn!(operation = C::NAME, error = %err, "rpc call failed");
            })?;

        tracing::debug!(operation = C::NAME, "rpc call completed");
        decode(&resp)
    }

    /// Like `call`, for lookups where a 404 from the proxy means "nothing".
    pub async fn call_optional<C: RpcCall>(&self, request: &C) -> Result<Option<C::Response>, GatewayError> {
        match self.call(request).await {
            Ok(response) => Ok(Some(response)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn total_honey_harvested(
        &self,
        hive_id: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<f64, GatewayError> {
        let request = GetTotalHoneyHarvested {
            hive_id,
            start_date,
            end_date,
        };
        Ok(self.call(&request).await?.total_honey)
    }

    pub async fn community_health_status(&self, community_id: i64) -> Result<String, GatewayError> {
        let request = GetCommunityHealthStatus { community_id };
        Ok(self.call(&request).await?.health_status)
    }

    pub async fn avg_temperature(&self, region_id: RegionId, days: u32) -> Result<f64, GatewayError> {
        let request = GetAvgTemperature { region_id, days };
        Ok(self.call(&request).await?.avg_temperature)
    }

    /// Server-side region check; complements the local
    /// `can_access_region` for users whose grants are not cached.
    pub async fn has_region_access(&self, user_id: UserId, region_id: RegionId) -> Result<bool, GatewayError> {
        let request = HasRegionAccess { user_id, region_id };
        Ok(self.call(&request).await?.has_access)
    }

    /// `None` when the hive has no reading of that type yet.
    pub async fn latest_sensor_reading(
        &self,
        hive_id: i64,
        sensor_type: &str,
    ) -> Result<Option<LatestSensorReading>, GatewayError> {
        let request = GetLatestSensorReading {
            hive_id,
            sensor_type: sensor_type.to_string(),
        };
        self.call_optional(&request).await
    }
}

macro_rules! rpc_call {
    ($request:ty, $name:literal, $response:ty) => {
        impl RpcCall for $request {
            const NAME: &'static str = $name;
            type Response = $response;
        }
    };
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GetTotalHoneyHarvested {
    pub hive_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TotalHoney {
    #[serde(default)]
    pub total_honey: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddObservation {
    pub hive_id: i64,
    pub observation_date: NaiveDate,
    pub description: String,
    pub recommendations: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GetCommunityHealthStatus {
    pub community_id: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommunityHealth {
    #[serde(default)]
    pub health_status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateHiveStatus {
    pub hive_id: i64,
    pub new_status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GetAvgTemperature {
    pub region_id: RegionId,
    pub days: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AvgTemperature {
    #[serde(default)]
    pub avg_temperature: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignMaintenancePlan {
    pub plan_id: i64,
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HasRegionAccess {
    pub user_id: UserId,
    pub region_id: RegionId,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegionAccess {
    // Omitted by the proxy when false.
    #[serde(default)]
    pub has_access: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegisterIncident {
    pub hive_id: i64,
    pub incident_date: NaiveDate,
    pub description: String,
    pub severity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GetLatestSensorReading {
    pub hive_id: i64,
    pub sensor_type: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LatestSensorReading {
    #[serde(default, with = "base64_bytes")]
    pub value: Vec<u8>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateProductionReport {
    pub apiary_id: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

rpc_call!(GetTotalHoneyHarvested, "getTotalHoneyHarvested", TotalHoney);
rpc_call!(AddObservation, "addObservation", Ack);
rpc_call!(GetCommunityHealthStatus, "getCommunityHealthStatus", CommunityHealth);
rpc_call!(UpdateHiveStatus, "updateHiveStatus", Ack);
rpc_call!(GetAvgTemperature, "getAvgTemperature", AvgTemperature);
rpc_call!(AssignMaintenancePlan, "assignMaintenancePlan", Ack);
rpc_call!(HasRegionAccess, "hasRegionAccess", RegionAccess);
rpc_call!(RegisterIncident, "registerIncident", Ack);
rpc_call!(GetLatestSensorReading, "getLatestSensorReading", LatestSensorReading);
rpc_call!(CreateProductionReport, "createProductionReport", Ack);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_accepts_any_success_body() {
        assert_eq!(decode::<Ack>(b"{}").unwrap(), Ack);
        assert_eq!(decode::<Ack>(b"").unwrap(), Ack);
        assert_eq!(decode::<Ack>(b"null").unwrap(), Ack);
    }

    #[test]
    fn dates_are_plain_calendar_days() {
        let request = GetTotalHoneyHarvested {
            hive_id: 1,
            start_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({"hive_id": 1, "start_date": "2023-01-01", "end_date": "2024-12-31"})
        );
    }

    #[test]
    fn missing_false_flag_decodes_as_no_access() {
        let access: RegionAccess = decode(b"{}").unwrap();
        assert!(!access.has_access);
    }

    #[test]
    fn sensor_value_arrives_as_base64() {
        let reading: LatestSensorReading =
            decode(br#"{"value":"MjEuNQ==","timestamp":"2024-06-01T12:00:00Z"}"#).unwrap();
        assert_eq!(reading.value, b"21.5".to_vec());
        assert!(reading.timestamp.is_some());
    }
}
