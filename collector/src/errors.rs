use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("API credentials missing: {0} not set")]
    CredentialsMissing(&'static str),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Device fetch failed: {0}")]
    Fetch(String),

    #[error("Cannot parse {value:?} as a finite number")]
    Parse {
        value: String,
        #[source]
        source: Option<std::num::ParseFloatError>,
    },

    #[error("Conversion to float from {0} not supported")]
    UnsupportedType(&'static str),

    #[error("Configuration missing: {0} not set")]
    ConfigMissing(&'static str),

    #[error("Write failed: {0}")]
    Write(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Trigger queue closed")]
    TriggerQueue,
}

pub type Result<T> = std::result::Result<T, Error>;

