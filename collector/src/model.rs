use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Bearer token returned by the client-credentials exchange
#[derive(Clone, Deserialize)]
pub struct AccessToken {
    #[serde(rename = "access_token", default)]
    pub value: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(
        rename = "expires_in",
        default,
        deserialize_with = "seconds_from_number_or_string"
    )]
    pub expires_in_seconds: i64,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"***")
            .field("token_type", &self.token_type)
            .field("expires_in_seconds", &self.expires_in_seconds)
            .finish()
    }
}

// The token endpoint sends expires_in as "3599" rather than 3599.
fn seconds_from_number_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

// The devices endpoint sends null where a list or string is absent.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Envelope of the devices endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct DevicesResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub result: Vec<Device>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub t: i64,
}

/// Thermostat snapshot as reported by the cloud API
///
/// Every field tolerates `null`, so one sparse device never costs the rest
/// of the fleet. A device without an id is dropped during extraction.
#[derive(Debug, Clone, Deserialize)]
pub struct Device {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub device_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub online: bool,
    #[serde(rename = "status", default, deserialize_with = "null_as_default")]
    pub statuses: Vec<Status>,
    #[serde(default)]
    pub active_time: Option<i64>,
    #[serde(default)]
    pub create_time: Option<i64>,
    #[serde(default)]
    pub update_time: Option<i64>,
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub sub: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Status {
    #[serde(default, deserialize_with = "null_as_default")]
    pub code: String,
    #[serde(default)]
    pub value: StatusValue,
}

/// Status payloads mix JSON scalar types, sometimes within a single device.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum StatusValue {
    Integer(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    Other(serde_json::Value),
}

impl Default for StatusValue {
    fn default() -> Self {
        StatusValue::Other(serde_json::Value::Null)
    }
}

impl StatusValue {
    pub fn kind(&self) -> &'static str {
        match self {
            StatusValue::Integer(_) => "integer",
            StatusValue::Float(_) => "float",
            StatusValue::Text(_) => "string",
            StatusValue::Bool(_) => "bool",
            StatusValue::Other(serde_json::Value::Null) => "null",
            StatusValue::Other(serde_json::Value::Array(_)) => "array",
            StatusValue::Other(serde_json::Value::Object(_)) => "object",
            StatusValue::Other(_) => "unknown",
        }
    }
}

pub const TEMPERATURE_MEASURE: &str = "temperature";

/// One temperature point ready for the time-series store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedMeasurement {
    pub device_id: String,
    pub device_name: String,
    pub device_type: String,
    pub measure_name: String,
    pub value: f64,
    pub timestamp_seconds: i64,
}

/// Event that starts one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct TriggerEvent {
    pub id: uuid::Uuid,
    pub source: String,
    pub time: DateTime<Utc>,
}

impl TriggerEvent {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            source: source.into(),
            time: Utc::now(),
        }
    }
}

/// Summary of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: uuid::Uuid,
    pub source: String,
    pub devices: usize,
    pub measurements: usize,
    pub finished_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_expires_in_as_string() {
        let token: AccessToken = serde_json::from_str(
            r#"{"access_token":"abc","token_type":"Bearer","expires_in":"3599"}"#,
        )
        .unwrap();

        assert_eq!(token.value, "abc");
        assert_eq!(token.token_type, "Bearer");
        assert_eq!(token.expires_in_seconds, 3599);
    }

    #[test]
    fn test_token_expires_in_as_number() {
        let token: AccessToken =
            serde_json::from_str(r#"{"access_token":"abc","expires_in":60}"#).unwrap();

        assert_eq!(token.expires_in_seconds, 60);
        assert!(token.token_type.is_empty());
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token: AccessToken =
            serde_json::from_str(r#"{"access_token":"super-secret"}"#).unwrap();

        assert!(!format!("{:?}", token).contains("super-secret"));
    }

    #[test]
    fn test_status_values_keep_their_json_type() {
        let statuses: Vec<Status> = serde_json::from_str(
            r#"[
                {"code":"a","value":215},
                {"code":"b","value":21.5},
                {"code":"c","value":"205"},
                {"code":"d","value":true},
                {"code":"e","value":null},
                {"code":"f","value":[1,2]},
                {"code":"g"}
            ]"#,
        )
        .unwrap();

        let kinds: Vec<&str> = statuses.iter().map(|s| s.value.kind()).collect();
        assert_eq!(
            kinds,
            vec!["integer", "float", "string", "bool", "null", "array", "null"]
        );
        assert_eq!(statuses[0].value, StatusValue::Integer(215));
    }

    #[test]
    fn test_devices_response_ignores_unknown_fields() {
        let response: DevicesResponse = serde_json::from_str(
            r#"{
                "result": [{
                    "id": "bf1",
                    "name": "Living room",
                    "device_type": "Danfoss Ally Radiator Thermostat",
                    "online": true,
                    "time_zone": "+01:00",
                    "firmware": "1.2.3",
                    "status": [{"code":"temp_current","value":215}]
                }],
                "t": 1700000000000,
                "success": true
            }"#,
        )
        .unwrap();

        assert_eq!(response.result.len(), 1);
        let device = &response.result[0];
        assert_eq!(device.name, "Living room");
        assert_eq!(device.time_zone.as_deref(), Some("+01:00"));
        assert_eq!(device.statuses.len(), 1);
    }

    #[test]
    fn test_devices_response_without_result_is_empty() {
        let response: DevicesResponse = serde_json::from_str(r#"{"t": 1}"#).unwrap();
        assert!(response.result.is_empty());
    }

    #[test]
    fn test_null_result_is_empty_fleet() {
        let response: DevicesResponse =
            serde_json::from_str(r#"{"result": null, "t": null}"#).unwrap();

        assert!(response.result.is_empty());
        assert_eq!(response.t, 0);
    }

    #[test]
    fn test_null_device_fields_keep_the_rest_of_the_fleet() {
        let response: DevicesResponse = serde_json::from_str(
            r#"{
                "result": [
                    {"id": "a", "name": "Kitchen", "status": [{"code":"temp_current","value":210}]},
                    {"id": "b", "name": null, "device_type": null, "online": null,
                     "status": [{"code":"temp_current","value":190}]},
                    {"id": "c", "status": null},
                    {"id": null, "name": "Ghost"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(response.result.len(), 4);
        assert_eq!(response.result[0].name, "Kitchen");

        let sparse = &response.result[1];
        assert_eq!(sparse.id, "b");
        assert!(sparse.name.is_empty());
        assert!(sparse.device_type.is_empty());
        assert!(!sparse.online);
        assert_eq!(sparse.statuses.len(), 1);

        assert!(response.result[2].statuses.is_empty());
        assert!(response.result[3].id.is_empty());
    }

    #[test]
    fn test_status_without_code_has_empty_code() {
        let statuses: Vec<Status> =
            serde_json::from_str(r#"[{"value":215},{"code":null,"value":"205"}]"#).unwrap();

        assert!(statuses.iter().all(|s| s.code.is_empty()));
        assert_eq!(statuses[0].value, StatusValue::Integer(215));
    }
}
