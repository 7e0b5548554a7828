use crate::convert::convert;
use crate::metrics::CONVERSION_FAILURES_TOTAL;
use crate::model::{Device, NormalizedMeasurement, StatusValue, TEMPERATURE_MEASURE};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// Status codes the cloud API uses for the current room temperature
pub const TEMPERATURE_CODES: [&str; 2] = ["va_temperature", "temp_current"];

/// Raw temperatures are reported in tenths of a degree.
pub const RAW_SCALE: f64 = 10.0;

/// Turns a fleet snapshot into temperature measurements.
///
/// Every record carries the same `captured_at` timestamp. Output follows
/// device order, then status order. A status whose value cannot be converted
/// is logged and skipped without affecting the rest.
pub fn extract(devices: &[Device], captured_at: DateTime<Utc>) -> Vec<NormalizedMeasurement> {
    let timestamp_seconds = captured_at.timestamp();
    let mut measurements = Vec::new();

    for device in devices {
        if device.id.is_empty() {
            warn!("Skipping device {:?} without an id", device.name);
            continue;
        }
        info!("Device: {} ({}, online={})", device.name, device.id, device.online);

        for status in &device.statuses {
            if !TEMPERATURE_CODES.contains(&status.code.as_str()) {
                continue;
            }

            let raw = match convert(&status.value) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(
                        "Skipping {} on device {}: {}",
                        status.code, device.id, e
                    );
                    CONVERSION_FAILURES_TOTAL.inc();
                    continue;
                }
            };

            if let StatusValue::Bool(b) = status.value {
                // Kept as 0.0, but a boolean here almost certainly means bad upstream data.
                warn!(
                    "Device {} reported boolean {} for {}, recording 0.0",
                    device.id, b, status.code
                );
            }

            let value = raw / RAW_SCALE;
            debug!("{} {} = {}", device.id, status.code, value);

            measurements.push(NormalizedMeasurement {
                device_id: device.id.clone(),
                device_name: device.name.clone(),
                device_type: device.device_type.clone(),
                measure_name: TEMPERATURE_MEASURE.to_string(),
                value,
                timestamp_seconds,
            });
        }
    }

    measurements
}
