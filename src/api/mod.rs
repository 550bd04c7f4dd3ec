// Target service contract: paths, payloads and response bodies

use serde::{Deserialize, Serialize};

use crate::transport::HttpRequest;

pub const HEALTH_PATH: &str = "/healthz";
pub const CREATE_PATH: &str = "/s";

pub const STATUS_OK: u16 = 200;
pub const STATUS_FOUND: u16 = 302;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateLinkRequest {
    pub long_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateLinkResponse {
    pub short_code: String,
}

/// Body of `GET /stats/{short_code}`. Only `click_count` is required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkStats {
    pub click_count: i64,
    #[serde(default)]
    pub long_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub last_accessed_at: Option<String>,
}

pub fn redirect_path(short_code: &str) -> String {
    format!("{}/{}", CREATE_PATH, urlencoding::encode(short_code))
}

pub fn stats_path(short_code: &str) -> String {
    format!("/stats/{}", urlencoding::encode(short_code))
}

pub fn health_request() -> HttpRequest {
    HttpRequest::get(HEALTH_PATH)
}

pub fn create_link_request(long_url: &str, ttl_seconds: Option<i64>) -> HttpRequest {
    let payload = CreateLinkRequest {
        long_url: long_url.to_string(),
        ttl_seconds,
    };
    // Serializing a struct of strings and integers cannot fail.
    let body = serde_json::to_value(&payload).unwrap_or(serde_json::Value::Null);
    HttpRequest::post_json(CREATE_PATH, body)
}

pub fn redirect_request(short_code: &str) -> HttpRequest {
    HttpRequest::get(redirect_path(short_code))
}

pub fn stats_request(short_code: &str) -> HttpRequest {
    HttpRequest::get(stats_path(short_code))
}
