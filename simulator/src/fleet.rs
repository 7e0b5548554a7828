use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};

const DEVICE_TYPE: &str = "Danfoss Ally Radiator Thermostat";
const ROOMS: [&str; 6] = ["Living room", "Kitchen", "Bedroom", "Office", "Bathroom", "Hall"];

#[derive(Debug, Clone, Serialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub device_type: String,
    pub online: bool,
    pub active_time: i64,
    pub time_zone: String,
    pub status: Vec<Status>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub code: String,
    pub value: Value,
}

#[derive(Debug, Serialize)]
pub struct DevicesResponse {
    pub result: Vec<Device>,
    pub t: i64,
}

/// Builds a random fleet snapshot in the cloud API's shape.
pub fn generate_fleet(rng: &mut impl Rng, size: usize) -> DevicesResponse {
    let result = (0..size).map(|i| generate_device(rng, i)).collect();

    DevicesResponse {
        result,
        t: chrono::Utc::now().timestamp_millis(),
    }
}

fn generate_device(rng: &mut impl Rng, index: usize) -> Device {
    // Temperatures in tenths of a degree, like the real API.
    let tenths: i64 = if rng.gen_bool(0.05) {
        rng.gen_range(50..350) // 5% outliers
    } else {
        rng.gen_range(180..240)
    };

    // Older firmware reports va_temperature, and some as a string.
    let temperature = if rng.gen_bool(0.5) {
        Status {
            code: "temp_current".to_string(),
            value: json!(tenths),
        }
    } else {
        Status {
            code: "va_temperature".to_string(),
            value: json!(tenths.to_string()),
        }
    };

    Device {
        id: format!("bf{:04x}", index),
        name: format!("{} {}", ROOMS[index % ROOMS.len()], index / ROOMS.len() + 1),
        device_type: DEVICE_TYPE.to_string(),
        online: rng.gen_bool(0.95),
        active_time: chrono::Utc::now().timestamp() - rng.gen_range(0..86_400),
        time_zone: "+01:00".to_string(),
        status: vec![
            temperature,
            Status {
                code: "battery_percentage".to_string(),
                value: json!(rng.gen_range(20..=100)),
            },
            Status {
                code: "mode".to_string(),
                value: json!(if rng.gen_bool(0.8) { "at_home" } else { "leaving_home" }),
            },
            Status {
                code: "window_state".to_string(),
                value: json!(rng.gen_bool(0.1)),
            },
        ],
    }
}
