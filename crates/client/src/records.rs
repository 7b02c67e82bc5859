//! Record types served by the REST API and their registry entries.
//!
//! Canonical wire schema: snake_case field names, RFC 3339 timestamps,
//! binary sensor payloads as standard base64 strings. Primary keys are
//! server-assigned and omitted from create requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hivegate_auth::{Role, User};
use hivegate_core::{Entity, GrantId, RecordId, RegionId, UserId};

use crate::error::GatewayError;
use crate::resource::Resource;
use crate::scope::RegionScoped;

/// Register a record whose wire shape is the record itself.
macro_rules! plain_resource {
    ($t:ty, $endpoint:literal, $key:ident) => {
        plain_resource!($t, $endpoint, $key, update_by_key = false);
    };
    ($t:ty, $endpoint:literal, $key:ident, update_by_key = $by_key:literal) => {
        impl Entity for $t {
            const KEY_FIELD: &'static str = stringify!($key);

            fn key(&self) -> Option<RecordId> {
                self.$key.map(Into::into)
            }
        }

        impl Resource for $t {
            const ENDPOINT: &'static str = $endpoint;
            const UPDATE_BY_KEY: bool = $by_key;
            type Wire = $t;

            fn to_wire(&self) -> Self::Wire {
                self.clone()
            }

            fn from_wire(wire: Self::Wire) -> Option<Self> {
                Some(wire)
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_id: Option<RegionId>,
    pub name: String,
    pub climate_zone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Apiary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apiary_id: Option<RecordId>,
    pub location: String,
    pub manager_id: i64,
    #[serde(default)]
    pub establishment_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hive {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hive_id: Option<RecordId>,
    pub apiary_id: i64,
    pub hive_type: String,
    #[serde(default)]
    pub installation_date: Option<DateTime<Utc>>,
    pub current_status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeeCommunity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community_id: Option<RecordId>,
    pub hive_id: i64,
    pub queen_age: i32,
    pub population_estimate: i64,
    pub health_status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoneyHarvest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub harvest_id: Option<RecordId>,
    pub hive_id: i64,
    #[serde(default)]
    pub harvest_date: Option<DateTime<Utc>>,
    pub quantity: f64,
    pub quality_grade: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sensor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_id: Option<RecordId>,
    pub hive_id: i64,
    pub sensor_type: String,
    #[serde(default, with = "base64_bytes")]
    pub last_reading: Vec<u8>,
    #[serde(default)]
    pub last_reading_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading_id: Option<RecordId>,
    pub sensor_id: i64,
    #[serde(default, with = "base64_bytes")]
    pub value: Vec<u8>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<RecordId>,
    pub hive_id: i64,
    #[serde(default)]
    pub incident_date: Option<DateTime<Utc>>,
    pub description: String,
    pub severity: String,
    #[serde(default)]
    pub actions_taken: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationLog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_id: Option<RecordId>,
    pub hive_id: i64,
    #[serde(default)]
    pub observation_date: Option<DateTime<Utc>>,
    pub description: String,
    #[serde(default)]
    pub recommendations: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<RecordId>,
    pub apiary_id: i64,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(rename = "total_honey_produced")]
    pub total_honey: i64,
    pub total_expenses: i64,
    pub curated_by: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather_id: Option<RecordId>,
    pub region_id: RegionId,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub precipitation: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenancePlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<RecordId>,
    pub apiary_id: i64,
    #[serde(default)]
    pub planned_date: Option<DateTime<Utc>>,
    pub work_type: String,
    pub assigned_to: i64,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<RecordId>,
    pub group_name: String,
    pub manager_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionApiary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub apiary_id: i64,
    pub region_id: RegionId,
}

/// One (user, region) grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedRegion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<GrantId>,
    pub user_id: UserId,
    pub region_id: RegionId,
    /// Expanded region, present on reads only.
    #[serde(default, skip_serializing)]
    pub region: Option<Region>,
}

/// User account as managed by administrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub username: String,
    pub full_name: String,
    pub role: Role,
    pub email: String,
    /// Only sent when creating an account; never returned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
}

impl TryFrom<UserAccount> for User {
    type Error = GatewayError;

    fn try_from(account: UserAccount) -> Result<Self, Self::Error> {
        let id = account
            .user_id
            .ok_or_else(|| GatewayError::Transport("user record has no user_id".to_string()))?;
        Ok(User {
            id,
            username: account.username,
            full_name: account.full_name,
            role: account.role,
            email: account.email,
        })
    }
}

plain_resource!(Region, "region", region_id);
plain_resource!(Apiary, "apiary", apiary_id);
plain_resource!(Hive, "hive", hive_id);
plain_resource!(BeeCommunity, "bee-community", community_id);
plain_resource!(HoneyHarvest, "honey-harvest", harvest_id);
plain_resource!(Sensor, "sensor", sensor_id);
plain_resource!(SensorReading, "sensor-reading", reading_id);
plain_resource!(Incident, "incident", incident_id);
plain_resource!(ObservationLog, "observation", log_id);
plain_resource!(ProductionReport, "production-report", report_id);
plain_resource!(WeatherData, "weather-data", weather_id);
plain_resource!(MaintenancePlan, "maintenance", plan_id);
plain_resource!(WorkerGroup, "worker-group", group_id, update_by_key = true);
plain_resource!(RegionApiary, "region-apiary", id);
plain_resource!(AllowedRegion, "allowed-region", id);
plain_resource!(UserAccount, "user", user_id);

// ─────────────────────────────────────────────────────────────────────────────
// Observations recorded as incidents
// ─────────────────────────────────────────────────────────────────────────────

/// Severity value marking an incident record as a field observation.
pub const OBSERVATION_MARKER: &str = "OBSERVATION";

/// A field observation stored server-side as an incident carrying the
/// `OBSERVATION` severity marker. Listing yields only marked incidents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HiveObservation {
    pub incident_id: Option<RecordId>,
    pub hive_id: i64,
    pub observed_at: Option<DateTime<Utc>>,
    pub description: String,
    pub recommendations: String,
}

impl Entity for HiveObservation {
    const KEY_FIELD: &'static str = "incident_id";

    fn key(&self) -> Option<RecordId> {
        self.incident_id
    }
}

impl Resource for HiveObservation {
    const ENDPOINT: &'static str = "incident";
    type Wire = Incident;

    fn to_wire(&self) -> Incident {
        Incident {
            incident_id: self.incident_id,
            hive_id: self.hive_id,
            incident_date: self.observed_at,
            description: self.description.clone(),
            severity: OBSERVATION_MARKER.to_string(),
            actions_taken: self.recommendations.clone(),
        }
    }

    fn from_wire(wire: Incident) -> Option<Self> {
        if !wire.severity.eq_ignore_ascii_case(OBSERVATION_MARKER) {
            return None;
        }
        Some(Self {
            incident_id: wire.incident_id,
            hive_id: wire.hive_id,
            observed_at: wire.incident_date,
            description: wire.description,
            recommendations: wire.actions_taken,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Region scoping
// ─────────────────────────────────────────────────────────────────────────────

impl RegionScoped for Region {
    fn region(&self) -> Option<RegionId> {
        self.region_id
    }
}

impl RegionScoped for WeatherData {
    fn region(&self) -> Option<RegionId> {
        Some(self.region_id)
    }
}

impl RegionScoped for RegionApiary {
    fn region(&self) -> Option<RegionId> {
        Some(self.region_id)
    }
}

impl RegionScoped for AllowedRegion {
    fn region(&self) -> Option<RegionId> {
        Some(self.region_id)
    }
}

/// Binary payloads: base64 text on the wire.
///
/// Older clients sent raw byte arrays (`[1,2,3]`); those are still accepted
/// on input, as is `null`.
pub(crate) mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Encoded {
        Text(String),
        Raw(Vec<u8>),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match Option::<Encoded>::deserialize(deserializer)? {
            None => Ok(Vec::new()),
            Some(Encoded::Raw(bytes)) => Ok(bytes),
            Some(Encoded::Text(text)) => STANDARD
                .decode(text.trim())
                .map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sensor_payloads_are_base64_on_the_wire() {
        let reading = SensorReading {
            reading_id: None,
            sensor_id: 4,
            value: vec![0x01, 0xfe, 0x10],
            timestamp: None,
        };
        let value = serde_json::to_value(&reading).unwrap();
        assert_eq!(value["value"], json!("Af4Q"));
        assert!(value.get("reading_id").is_none());
    }

    #[test]
    fn legacy_byte_arrays_and_nulls_are_accepted() {
        let from_array: SensorReading = serde_json::from_value(json!({
            "reading_id": 9, "sensor_id": 4, "value": [1, 254, 16], "timestamp": null
        }))
        .unwrap();
        assert_eq!(from_array.value, vec![1, 254, 16]);

        let from_null: Sensor = serde_json::from_value(json!({
            "sensor_id": 2, "hive_id": 1, "sensor_type": "temperature",
            "last_reading": null, "last_reading_time": null
        }))
        .unwrap();
        assert!(from_null.last_reading.is_empty());
    }

    #[test]
    fn observations_travel_as_marked_incidents() {
        let obs = HiveObservation {
            incident_id: None,
            hive_id: 3,
            observed_at: None,
            description: "queen cells spotted".to_string(),
            recommendations: "split the colony".to_string(),
        };
        let wire = obs.to_wire();
        assert_eq!(wire.severity, OBSERVATION_MARKER);
        assert_eq!(wire.actions_taken, "split the colony");
        assert_eq!(HiveObservation::from_wire(wire), Some(obs));

        let real_incident = Incident {
            incident_id: RecordId::new(5).ok(),
            hive_id: 3,
            incident_date: None,
            description: "varroa".to_string(),
            severity: "HIGH".to_string(),
            actions_taken: String::new(),
        };
        assert_eq!(HiveObservation::from_wire(real_incident), None);
    }

    #[test]
    fn report_field_names_follow_the_server() {
        let report: ProductionReport = serde_json::from_value(json!({
            "report_id": 1, "apiary_id": 2, "start_date": "2024-05-01T00:00:00Z",
            "end_date": null, "total_honey_produced": 120, "total_expenses": 40, "curated_by": 7
        }))
        .unwrap();
        assert_eq!(report.total_honey, 120);
        assert_eq!(report.key(), RecordId::new(1).ok());
        assert_eq!(ProductionReport::KEY_FIELD, "report_id");
    }

    #[test]
    fn user_accounts_convert_to_session_users() {
        let account: UserAccount = serde_json::from_value(json!({
            "user_id": 8, "username": "bob", "full_name": "Bob", "role": "WORKER",
            "email": "bob@example.com", "password": "", "last_login": null
        }))
        .unwrap();
        let user = User::try_from(account).unwrap();
        assert_eq!(user.role, Role::Worker);
        assert_eq!(user.id.get(), 8);
    }

    #[test]
    fn only_worker_groups_update_by_key() {
        assert!(WorkerGroup::UPDATE_BY_KEY);
        assert!(!Hive::UPDATE_BY_KEY);
        assert!(!AllowedRegion::UPDATE_BY_KEY);
    }
}
