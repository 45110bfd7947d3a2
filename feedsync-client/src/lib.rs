pub mod client;
mod record;

pub use client::{ApiClient, ApiError, ClientConfig, RemoteApi};
pub use reqwest::StatusCode;
