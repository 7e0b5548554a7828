use crate::config::Config;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Url;
use sha2::{Digest, Sha256};
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Signing name of the time-series store
pub const TIMESTREAM_SERVICE: &str = "timestream";

/// Static AWS credentials taken from the environment
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl AwsCredentials {
    /// `None` unless both the key id and the secret are set.
    pub fn from_config(config: &Config) -> Option<Self> {
        Some(Self {
            access_key_id: config.aws_access_key_id.clone()?,
            secret_access_key: config.aws_secret_access_key.clone()?,
            session_token: config.aws_session_token.clone(),
        })
    }
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .finish()
    }
}

/// Signs requests with AWS Signature Version 4
#[derive(Debug, Clone)]
pub struct Signer {
    credentials: AwsCredentials,
    region: String,
    service: String,
}

impl Signer {
    pub fn new(
        credentials: AwsCredentials,
        region: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            credentials,
            region: region.into(),
            service: service.into(),
        }
    }

    /// Signs a request and returns the headers to add to it.
    ///
    /// `headers` are the caller's own headers that must be covered by the
    /// signature. `host` is derived from the URL and always signed.
    pub fn sign(
        &self,
        method: &str,
        url: &Url,
        headers: &[(&str, &str)],
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Vec<(String, String)> {
        let datetime = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();

        let mut signed: Vec<(String, String)> = headers
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.trim().to_string()))
            .collect();
        signed.push(("host".to_string(), host_of(url)));
        signed.push(("x-amz-date".to_string(), datetime.clone()));
        if let Some(token) = &self.credentials.session_token {
            signed.push(("x-amz-security-token".to_string(), token.clone()));
        }
        signed.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers = signed
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let creq = canonical_request(method, url, &signed, &signed_headers, body);
        let scope = format!("{}/{}/{}/aws4_request", date, self.region, self.service);
        let sts = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            datetime,
            scope,
            hex::encode(Sha256::digest(creq.as_bytes()))
        );

        let key = signing_key(
            &self.credentials.secret_access_key,
            &date,
            &self.region,
            &self.service,
        );
        let signature = hex::encode(hmac(&key, sts.as_bytes()));

        let mut out = vec![("x-amz-date".to_string(), datetime)];
        if let Some(token) = &self.credentials.session_token {
            out.push(("x-amz-security-token".to_string(), token.clone()));
        }
        out.push((
            "authorization".to_string(),
            format!(
                "{} Credential={}/{}, SignedHeaders={}, Signature={}",
                ALGORITHM, self.credentials.access_key_id, scope, signed_headers, signature
            ),
        ));
        out
    }
}

// Matches the Host header reqwest sends: the port only when not the scheme default.
fn host_of(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

fn canonical_request(
    method: &str,
    url: &Url,
    headers: &[(String, String)],
    signed_headers: &str,
    body: &[u8],
) -> String {
    let mut query: Vec<&str> = url
        .query()
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .collect();
    query.sort_unstable();

    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect();

    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method,
        url.path(),
        query.join("&"),
        canonical_headers,
        signed_headers,
        hex::encode(Sha256::digest(body))
    )
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac(format!("AWS4{}", secret).as_bytes(), date.as_bytes());
    let k_region = hmac(&k_date, region.as_bytes());
    let k_service = hmac(&k_region, service.as_bytes());
    hmac(&k_service, b"aws4_request")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SECRET: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";

    fn example_signer(session_token: Option<&str>) -> Signer {
        Signer::new(
            AwsCredentials {
                access_key_id: "AKIDEXAMPLE".to_string(),
                secret_access_key: SECRET.to_string(),
                session_token: session_token.map(str::to_string),
            },
            "us-east-1",
            "service",
        )
    }

    fn example_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap()
    }

    fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
        headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_signing_key_derivation() {
        let key = signing_key(SECRET, "20150830", "us-east-1", "iam");
        assert_eq!(
            hex::encode(key),
            "c4afb1cc5771d871763a393e44b703571b55cc28424d1a5e86da6ed3c154a4b9"
        );
    }

    #[test]
    fn test_get_vanilla_signature() {
        let url = Url::parse("https://example.amazonaws.com/").unwrap();

        let headers = example_signer(None).sign("GET", &url, &[], b"", example_time());

        assert_eq!(header(&headers, "x-amz-date"), Some("20150830T123600Z"));
        assert_eq!(
            header(&headers, "authorization"),
            Some(
                "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/service/aws4_request, \
                 SignedHeaders=host;x-amz-date, \
                 Signature=5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
            )
        );
    }

    #[test]
    fn test_caller_headers_and_token_are_signed() {
        let url = Url::parse("https://ingest.timestream.eu-central-1.amazonaws.com/").unwrap();

        let headers = example_signer(Some("session")).sign(
            "POST",
            &url,
            &[
                ("Content-Type", "application/x-amz-json-1.0"),
                ("X-Amz-Target", "Timestream_20181101.WriteRecords"),
            ],
            b"{}",
            example_time(),
        );

        assert_eq!(header(&headers, "x-amz-security-token"), Some("session"));
        let auth = header(&headers, "authorization").unwrap();
        assert!(auth.contains(
            "SignedHeaders=content-type;host;x-amz-date;x-amz-security-token;x-amz-target"
        ));
    }

    #[test]
    fn test_signature_covers_the_body() {
        let url = Url::parse("https://example.amazonaws.com/").unwrap();
        let signer = example_signer(None);

        let a = signer.sign("POST", &url, &[], b"{\"a\":1}", example_time());
        let b = signer.sign("POST", &url, &[], b"{\"a\":2}", example_time());

        assert_ne!(header(&a, "authorization"), header(&b, "authorization"));
    }

    #[test]
    fn test_host_keeps_non_default_port() {
        assert_eq!(
            host_of(&Url::parse("http://127.0.0.1:9090/").unwrap()),
            "127.0.0.1:9090"
        );
        assert_eq!(
            host_of(&Url::parse("https://example.amazonaws.com:443/").unwrap()),
            "example.amazonaws.com"
        );
    }

    #[test]
    fn test_credentials_need_key_and_secret() {
        let mut config = Config::from_lookup(|_| None);
        assert!(AwsCredentials::from_config(&config).is_none());

        config.aws_access_key_id = Some("AKID".to_string());
        assert!(AwsCredentials::from_config(&config).is_none());

        config.aws_secret_access_key = Some("hunter2".to_string());
        let creds = AwsCredentials::from_config(&config).unwrap();
        assert_eq!(creds.access_key_id, "AKID");
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }
}
