use std::path::Path;

use tracing::{info, warn};

use crate::error::AppError;

const DEFAULT_DATABASE_URL: &str = "sqlite://habits.db";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_TOKEN_TTL_HOURS: i64 = 72;

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub port: u16,
    pub token_ttl_hours: i64,
    /// Upper bound for a single progress post. `None` leaves it unbounded.
    pub max_progress_value: Option<f64>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let jwt_secret = dotenvy::var("JWT_SECRET").unwrap_or_default();
        if jwt_secret.trim().is_empty() {
            return Err(AppError::Internal(
                "JWT_SECRET environment variable not set".to_string(),
            ));
        }

        let database_url =
            dotenvy::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

        let port = match dotenvy::var("PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|e| AppError::Internal(format!("Invalid PORT '{}': {}", raw, e)))?,
            Err(_) => DEFAULT_PORT,
        };

        let token_ttl_hours = match dotenvy::var("TOKEN_TTL_HOURS") {
            Ok(raw) => raw.parse::<i64>().map_err(|e| {
                AppError::Internal(format!("Invalid TOKEN_TTL_HOURS '{}': {}", raw, e))
            })?,
            Err(_) => DEFAULT_TOKEN_TTL_HOURS,
        };

        let max_progress_value = match dotenvy::var("MAX_PROGRESS_VALUE") {
            Ok(raw) if !raw.trim().is_empty() => Some(raw.parse::<f64>().map_err(|e| {
                AppError::Internal(format!("Invalid MAX_PROGRESS_VALUE '{}': {}", raw, e))
            })?),
            _ => None,
        };

        Ok(Self {
            database_url,
            jwt_secret,
            port,
            token_ttl_hours,
            max_progress_value,
        })
    }
}

pub fn load_environment() -> Result<(), Box<dyn std::error::Error>> {
    let is_production =
        dotenvy::var("APP_PROFILE").unwrap_or("development".to_string()) == "production";

    let env_files = if is_production {
        vec!["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        vec!["config/common.env", "config/dev.env", ".secrets.env"]
    };

    for env_file in env_files {
        load_env_file(env_file)?;
    }

    Ok(())
}

fn load_env_file(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !Path::new(path).exists() {
        warn!("Warning: Environment file {} not found, skipping", path);
        return Ok(());
    }

    dotenvy::from_filename_override(path)?;
    info!("Loaded environment from: {}", path);
    Ok(())
}
