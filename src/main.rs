#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod config;
mod dates;
mod db;
mod error;
mod models;
mod random;
mod seed;
mod services;
mod telemetry;
#[cfg(test)]
mod test;
mod validation;

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use once_cell::sync::Lazy;
use rocket::figment::Figment;
use rocket::{Build, Rocket};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use thiserror::Error;
use tracing::info;

use api::{
    api_activity, api_check, api_create_habit, api_daily_stats, api_list_habits, api_login,
    api_post_progress, api_random_habits, api_register, api_summary, api_today_habits, health,
};
use auth::{
    TokenIssuer, bad_request_api, not_found_api, unauthorized_api, unprocessable_api,
};
use config::{AppConfig, load_environment};
use dates::{Clock, SystemClock};
use db::SqliteStore;
use error::AppError;
use services::{AuthService, HabitService};
use telemetry::{OtelGuard, TelemetryFairing, init_tracing, shutdown_telemetry};

pub static TELEMETRY_GUARD: Lazy<Mutex<Option<OtelGuard>>> = Lazy::new(|| Mutex::new(None));

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("{0}")]
    Rocket(#[from] rocket::Error),
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

#[rocket::main]
async fn main() -> Result<(), Error> {
    load_environment().map_err(|e| anyhow!("Failed to load environment: {}", e))?;

    let guard = init_tracing()?;
    if let Ok(mut slot) = TELEMETRY_GUARD.lock() {
        *slot = guard;
    }

    let config = AppConfig::from_env()?;
    info!(database_url = %config.database_url, port = config.port, "Starting habit tracker");

    let options = SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;

    info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(AppError::from)?;
    info!("Migrations completed successfully");

    let store = Arc::new(SqliteStore::new(pool));
    seed::seed_catalog(store.as_ref()).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let tokens = TokenIssuer::new(&config.jwt_secret, config.token_ttl_hours);
    let auth = AuthService::new(store.clone(), store.clone(), tokens.clone(), clock.clone());
    let habits = HabitService::new(store, clock)
        .with_max_progress_value(config.max_progress_value);

    let figment = rocket::Config::figment().merge(("port", config.port));
    init_rocket(figment, auth, habits, tokens).launch().await?;

    shutdown_telemetry();
    Ok(())
}

pub fn init_rocket(
    figment: Figment,
    auth: AuthService,
    habits: HabitService,
    tokens: TokenIssuer,
) -> Rocket<Build> {
    rocket::custom(figment)
        .manage(auth)
        .manage(habits)
        .manage(tokens)
        .mount(
            "/api/v1",
            routes![
                api_register,
                api_login,
                api_check,
                api_random_habits,
                api_create_habit,
                api_today_habits,
                api_list_habits,
                api_post_progress,
                api_summary,
                api_activity,
                api_daily_stats,
                health,
            ],
        )
        .register(
            "/api/v1",
            catchers![
                unauthorized_api,
                not_found_api,
                bad_request_api,
                unprocessable_api
            ],
        )
        .attach(TelemetryFairing)
}
