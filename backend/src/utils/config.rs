use anyhow::Result;
use std::env;
use crate::constants::{
    DEFAULT_ENVIRONMENT, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_RECONCILE_INTERVAL_SECS,
    DEFAULT_SERVER_PORT,
};

/// Credentials for a Google REST API (Firestore or FCM).
#[derive(Debug, Clone)]
pub struct GoogleApiConfig {
    pub project_id: String,
    pub access_token: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    pub environment: String,
    pub allowed_origins: Vec<String>,
    pub firestore: Option<GoogleApiConfig>,
    pub fcm: Option<GoogleApiConfig>,
    pub agora_app_id: Option<String>,
    pub agora_app_certificate: Option<String>,
    pub http_timeout_secs: u64,
    pub reconcile_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            port: env::var("PORT")
                .unwrap_or_else(|_| DEFAULT_SERVER_PORT.to_string())
                .parse()
                .unwrap_or(DEFAULT_SERVER_PORT),
            jwt_secret: env::var("AUTH_JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("AUTH_JWT_SECRET must be set"))?,
            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| DEFAULT_ENVIRONMENT.to_string()),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|origins| parse_list(&origins))
                .unwrap_or_default(),
            firestore: google_api("FIRESTORE_PROJECT_ID", "FIRESTORE_ACCESS_TOKEN"),
            fcm: google_api("FCM_PROJECT_ID", "FCM_ACCESS_TOKEN"),
            agora_app_id: optional_var("AGORA_APP_ID"),
            agora_app_certificate: optional_var("AGORA_APP_CERTIFICATE"),
            http_timeout_secs: env::var("HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
            reconcile_interval_secs: env::var("RECONCILE_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_RECONCILE_INTERVAL_SECS),
        })
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn google_api(project_key: &str, token_key: &str) -> Option<GoogleApiConfig> {
    match (optional_var(project_key), optional_var(token_key)) {
        (Some(project_id), Some(access_token)) => Some(GoogleApiConfig {
            project_id,
            access_token,
        }),
        (Some(_), None) | (None, Some(_)) => {
            tracing::warn!("Only one of {} / {} is set, ignoring both", project_key, token_key);
            None
        }
        (None, None) => None,
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_skips_blanks() {
        let origins = parse_list(" https://a.example , ,https://b.example,");
        assert_eq!(origins, vec!["https://a.example", "https://b.example"]);
    }
}
