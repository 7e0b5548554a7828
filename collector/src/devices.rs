use crate::errors::{Error, Result};
use crate::model::{AccessToken, Device, DevicesResponse};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use tracing::{debug, error, info};

/// Fetches the current fleet snapshot.
///
/// A body that parses but carries no devices is an empty fleet, not an error.
pub async fn fetch_devices(
    client: &reqwest::Client,
    devices_url: &str,
    token: &AccessToken,
) -> Result<Vec<Device>> {
    if token.value.is_empty() {
        return Err(Error::AuthFailed("refusing to call API with empty token".to_string()));
    }

    debug!("Fetching devices from {}", devices_url);

    let response = client
        .get(devices_url)
        .header(AUTHORIZATION, format!("Bearer {}", token.value))
        .header(ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| Error::Fetch(format!("devices request failed: {}", e)))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::Fetch(format!("could not read devices response: {}", e)))?;

    if !status.is_success() {
        error!("Devices endpoint returned {}: {}", status, body);
        return Err(Error::Fetch(format!("devices endpoint returned {}", status)));
    }

    let devices: DevicesResponse = serde_json::from_str(&body)
        .map_err(|e| Error::Fetch(format!("unparsable devices response: {}", e)))?;

    info!("Fetched {} devices (t={})", devices.result.len(), devices.t);
    Ok(devices.result)
}
