#[macro_use]
extern crate rocket;

pub mod api;
pub mod auth;
pub mod catalog;
pub mod db;
pub mod env;
pub mod error;
pub mod models;
pub mod progress;
pub mod quiz;
pub mod telemetry;
pub mod validation;
#[cfg(test)]
mod test;

use std::str::FromStr;

use api::*;
use auth::{forbidden_api, not_found_api, unauthorized_api};
use db::clean_expired_sessions;
use env::AppConfig;
use error::AppError;
use quiz::QuizAttempts;
use rocket::{Build, Rocket};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use telemetry::TelemetryFairing;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Anyhow(anyhow::Error),
    #[error("{0}")]
    Figment(rocket::figment::Error),
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Error::Anyhow(value)
    }
}

impl From<rocket::figment::Error> for Error {
    fn from(value: rocket::figment::Error) -> Self {
        Error::Figment(value)
    }
}

pub async fn connect(database_url: &str) -> Result<SqlitePool, Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    Ok(SqlitePoolOptions::new().connect_with(options).await?)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), AppError> {
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Migrations completed successfully");
    Ok(())
}

/// One pass of the hourly housekeeping: expired sessions and abandoned quiz
/// attempts.
pub async fn run_maintenance(pool: &SqlitePool, attempts: &QuizAttempts, config: &AppConfig) {
    match clean_expired_sessions(pool).await {
        Ok(count) => {
            if count > 0 {
                info!("Cleaned up {} expired sessions", count);
            }
        }
        Err(e) => {
            error!("Failed to clean expired sessions: {}", e);
        }
    }

    let pruned = attempts
        .prune_stale(chrono::Duration::minutes(config.quiz_attempt_max_age_minutes))
        .await;
    if pruned > 0 {
        info!("Pruned {} stale quiz attempts", pruned);
    }
}

pub fn init_rocket(pool: SqlitePool, config: AppConfig, attempts: QuizAttempts) -> Rocket<Build> {
    info!("Starting MathLearn");

    rocket::build()
        .manage(pool)
        .manage(config)
        .manage(attempts)
        .mount(
            "/api",
            routes![
                api_login,
                api_login_redirect,
                api_logout,
                api_current_user,
                api_get_courses,
                api_get_course,
                api_get_course_lessons,
                api_get_lesson,
                api_get_lesson_quiz,
                api_get_lesson_navigation,
                api_get_user_stats,
                api_get_user_progress,
                api_get_course_progress,
                api_get_course_summary,
                api_get_user_courses,
                api_get_user_achievements,
                api_update_progress,
                api_start_quiz,
                api_get_attempt,
                api_select_answer,
                api_next_question,
                api_previous_question,
                api_submit_quiz,
                api_retake_quiz,
                api_show_explanation,
                api_close_attempt,
                api_create_course,
                api_create_lesson,
                api_create_question,
                api_update_user_stats,
                api_award_achievement,
            ],
        )
        .register(
            "/api",
            catchers![unauthorized_api, forbidden_api, not_found_api],
        )
        .mount("/api", routes![health])
        .attach(TelemetryFairing)
}
