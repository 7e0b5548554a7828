use crate::config::Config;
use crate::errors::{Error, Result};
use crate::metrics::{BATCH_SIZE, WRITE_RETRIES_TOTAL};
use crate::model::NormalizedMeasurement;
use crate::sigv4::Signer;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Records accepted by the store in a single WriteRecords call
pub const MAX_RECORDS_PER_REQUEST: usize = 100;

const WRITE_TARGET: &str = "Timestream_20181101.WriteRecords";
const DESCRIBE_ENDPOINTS_TARGET: &str = "Timestream_20181101.DescribeEndpoints";
const AMZ_JSON: &str = "application/x-amz-json-1.0";
const INITIAL_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF_MS: u64 = 2000;

/// Target database and table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub database: String,
    pub table: String,
}

impl Destination {
    pub fn from_config(config: &Config) -> Result<Self> {
        let database = config
            .database
            .clone()
            .ok_or(Error::ConfigMissing("TIMESTREAM_DATABASE"))?;
        let table = config
            .table
            .clone()
            .ok_or(Error::ConfigMissing("TIMESTREAM_TABLE"))?;

        Ok(Self { database, table })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Record {
    pub dimensions: Vec<Dimension>,
    pub measure_name: String,
    pub measure_value: String,
    pub measure_value_type: String,
    pub time: String,
    pub time_unit: String,
}

impl From<&NormalizedMeasurement> for Record {
    /// Dimensions without a value are left out; the store rejects empty ones.
    fn from(m: &NormalizedMeasurement) -> Self {
        let dimensions = [
            ("name", &m.device_name),
            ("id", &m.device_id),
            ("type", &m.device_type),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(name, value)| Dimension {
            name: name.to_string(),
            value: value.clone(),
        })
        .collect();

        Self {
            dimensions,
            measure_name: m.measure_name.clone(),
            measure_value: format!("{:.2}", m.value),
            measure_value_type: "DOUBLE".to_string(),
            time: m.timestamp_seconds.to_string(),
            time_unit: "SECONDS".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct WriteRecordsRequest<'a> {
    database_name: &'a str,
    table_name: &'a str,
    records: &'a [Record],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeEndpointsResponse {
    #[serde(default)]
    endpoints: Vec<EndpointAddress>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EndpointAddress {
    address: String,
}

/// Why a single submission failed
struct Failure {
    message: String,
    transient: bool,
}

/// Submits measurement batches to the time-series store
pub struct BatchWriter {
    client: reqwest::Client,
    endpoint: String,
    max_retries: u32,
    signer: Option<Signer>,
    discover: bool,
}

impl BatchWriter {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, max_retries: u32) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            max_retries,
            signer: None,
            discover: false,
        }
    }

    /// Signs every request with SigV4. `None` sends requests unsigned.
    pub fn with_signer(mut self, signer: Option<Signer>) -> Self {
        self.signer = signer;
        self
    }

    /// Resolves the cell endpoint through DescribeEndpoints before writing.
    pub fn with_endpoint_discovery(mut self, discover: bool) -> Self {
        self.discover = discover;
        self
    }

    /// Writes the batch, split into store-sized requests.
    ///
    /// An empty batch makes no network call. If a later request fails, the
    /// records of earlier requests stay written.
    pub async fn write(
        &self,
        batch: &[NormalizedMeasurement],
        destination: &Destination,
    ) -> Result<()> {
        BATCH_SIZE.set(batch.len() as f64);

        if batch.is_empty() {
            info!("No temperature measurements in this run, skipping write");
            return Ok(());
        }

        let endpoint = if self.discover {
            self.discover_endpoint().await?
        } else {
            self.endpoint.clone()
        };

        let records: Vec<Record> = batch.iter().map(Record::from).collect();
        let mut committed = 0;

        for chunk in records.chunks(MAX_RECORDS_PER_REQUEST) {
            if let Err(e) = self.write_chunk(&endpoint, chunk, destination).await {
                if committed > 0 {
                    error!(
                        "Partial write to {}.{}: {} of {} records committed before the failure",
                        destination.database,
                        destination.table,
                        committed,
                        records.len()
                    );
                }
                return Err(e);
            }
            committed += chunk.len();
        }

        info!(
            "Wrote {} records to {}.{}",
            committed, destination.database, destination.table
        );
        Ok(())
    }

    /// Asks the regional endpoint which cell endpoint takes writes.
    ///
    /// The cell address keeps the scheme of the configured endpoint.
    pub async fn discover_endpoint(&self) -> Result<String> {
        let response = self
            .post(&self.endpoint, DESCRIBE_ENDPOINTS_TARGET, b"{}".to_vec())
            .await
            .map_err(|f| Error::Write(format!("endpoint discovery failed: {}", f.message)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Write(format!(
                "endpoint discovery returned {}: {}",
                status, body
            )));
        }

        let described: DescribeEndpointsResponse = response
            .json()
            .await
            .map_err(|e| Error::Write(format!("endpoint discovery response: {}", e)))?;
        let address = described
            .endpoints
            .into_iter()
            .map(|e| e.address)
            .find(|a| !a.is_empty())
            .ok_or_else(|| Error::Write("endpoint discovery returned no endpoints".to_string()))?;

        let scheme = Url::parse(&self.endpoint)
            .map(|u| u.scheme().to_string())
            .unwrap_or_else(|_| "https".to_string());
        let endpoint = format!("{}://{}", scheme, address);
        info!("Discovered store endpoint {}", endpoint);
        Ok(endpoint)
    }

    async fn write_chunk(
        &self,
        endpoint: &str,
        records: &[Record],
        destination: &Destination,
    ) -> Result<()> {
        let request = WriteRecordsRequest {
            database_name: &destination.database,
            table_name: &destination.table,
            records,
        };
        let body = serde_json::to_vec(&request)
            .map_err(|e| Error::Write(format!("cannot encode request: {}", e)))?;

        let max_attempts = self.max_retries + 1;
        let mut attempts = 0;

        loop {
            attempts += 1;
            match self.submit(endpoint, records.len(), &body).await {
                Ok(()) => {
                    if attempts > 1 {
                        info!("Write succeeded after {} attempts", attempts);
                    }
                    return Ok(());
                }
                Err(failure) => {
                    if attempts >= max_attempts || !failure.transient {
                        error!(
                            "Write failed permanently after {} attempts: {}",
                            attempts, failure.message
                        );
                        return Err(Error::Write(failure.message));
                    }

                    let wait_ms = backoff_ms(attempts);
                    warn!(
                        "Write failed (attempt {}/{}), retrying in {}ms: {}",
                        attempts, max_attempts, wait_ms, failure.message
                    );
                    WRITE_RETRIES_TOTAL.inc();
                    tokio::time::sleep(Duration::from_millis(wait_ms)).await;
                }
            }
        }
    }

    async fn submit(
        &self,
        endpoint: &str,
        count: usize,
        body: &[u8],
    ) -> std::result::Result<(), Failure> {
        debug!("Submitting {} records to {}", count, endpoint);

        let response = self.post(endpoint, WRITE_TARGET, body.to_vec()).await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(Failure {
            message: format!("store returned {}: {}", status, body),
            transient: is_transient_status(status),
        })
    }

    async fn post(
        &self,
        endpoint: &str,
        target: &str,
        body: Vec<u8>,
    ) -> std::result::Result<reqwest::Response, Failure> {
        let url = Url::parse(endpoint).map_err(|e| Failure {
            message: format!("invalid store endpoint {:?}: {}", endpoint, e),
            transient: false,
        })?;

        let mut request = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, AMZ_JSON)
            .header("X-Amz-Target", target);

        if let Some(signer) = &self.signer {
            let headers = [("content-type", AMZ_JSON), ("x-amz-target", target)];
            for (name, value) in signer.sign("POST", &url, &headers, &body, Utc::now()) {
                request = request.header(name, value);
            }
        }

        request.body(body).send().await.map_err(|e| Failure {
            transient: is_transient_error(&e),
            message: e.to_string(),
        })
    }
}

// 100ms, 200ms, 400ms, ... capped
fn backoff_ms(attempt: u32) -> u64 {
    INITIAL_BACKOFF_MS
        .saturating_mul(2_u64.saturating_pow(attempt.saturating_sub(1)))
        .min(MAX_BACKOFF_MS)
}

fn is_transient_error(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}
