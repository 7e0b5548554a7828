use crate::auth::{authenticate, Credentials};
use crate::config::Config;
use crate::devices::fetch_devices;
use crate::errors::Result;
use crate::extract::extract;
use crate::metrics::{MEASUREMENTS_TOTAL, RUNS_TOTAL, RUN_FAILURES_TOTAL, RUN_LATENCY_SECONDS};
use crate::model::{RunReport, TriggerEvent};
use crate::sigv4::{AwsCredentials, Signer, TIMESTREAM_SERVICE};
use crate::store::{BatchWriter, Destination};
use crate::transport::build_client;
use chrono::Utc;
use tokio::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

/// Runs authenticate -> fetch -> extract -> write once, strictly in sequence.
///
/// Destination and credentials are resolved before any network call. The
/// HTTP client and its connection pool live only as long as this call.
pub async fn run(config: &Config, trigger: &TriggerEvent) -> Result<RunReport> {
    let span = info_span!("run", run_id = %trigger.id, source = %trigger.source);

    async {
        RUNS_TOTAL.inc();
        let start = Instant::now();

        let result = run_steps(config, trigger).await;

        RUN_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());
        match &result {
            Ok(report) => info!(
                "Run finished: {} devices, {} measurements in {:.3}s",
                report.devices,
                report.measurements,
                start.elapsed().as_secs_f64()
            ),
            Err(e) => {
                RUN_FAILURES_TOTAL.inc();
                error!("Run failed: {}", e);
            }
        }
        result
    }
    .instrument(span)
    .await
}

async fn run_steps(config: &Config, trigger: &TriggerEvent) -> Result<RunReport> {
    let destination = Destination::from_config(config)?;
    let credentials = Credentials::from_config(config)?;

    let client = build_client(&config.transport)?;

    let token = authenticate(&client, &config.token_url, &credentials).await?;
    let devices = fetch_devices(&client, &config.devices_url, &token).await?;

    let captured_at = Utc::now();
    let measurements = extract(&devices, captured_at);
    MEASUREMENTS_TOTAL.inc_by(measurements.len() as f64);

    let signer = AwsCredentials::from_config(config)
        .map(|creds| Signer::new(creds, config.aws_region.clone(), TIMESTREAM_SERVICE));
    if signer.is_none() {
        warn!("AWS credentials not set, store requests go out unsigned");
    }

    let writer = BatchWriter::new(client, config.store_url.clone(), config.transport.max_retries)
        .with_signer(signer)
        .with_endpoint_discovery(config.endpoint_discovery);
    writer.write(&measurements, &destination).await?;

    Ok(RunReport {
        run_id: trigger.id,
        source: trigger.source.clone(),
        devices: devices.len(),
        measurements: measurements.len(),
        finished_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;

    #[tokio::test]
    async fn test_missing_destination_fails_before_credentials() {
        let config = Config::from_lookup(|_| None);

        let err = run(&config, &TriggerEvent::new("test")).await.unwrap_err();
        assert!(matches!(err, Error::ConfigMissing("TIMESTREAM_DATABASE")));
    }

    #[tokio::test]
    async fn test_missing_credentials_is_fatal() {
        let mut config = Config::from_lookup(|_| None);
        config.database = Some("home".to_string());
        config.table = Some("thermostats".to_string());

        let err = run(&config, &TriggerEvent::new("test")).await.unwrap_err();
        assert!(matches!(err, Error::CredentialsMissing("DANFOSS_API_KEY")));
    }
}
