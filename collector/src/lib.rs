pub mod auth;
pub mod config;
pub mod convert;
pub mod devices;
pub mod errors;
pub mod extract;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod rest;
pub mod scheduler;
pub mod sigv4;
pub mod store;
pub mod transport;
