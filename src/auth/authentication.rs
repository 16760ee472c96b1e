use rocket::Request;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::request::{FromRequest, Outcome};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde_json::{Value, json};
use sqlx::SqlitePool;
use tracing::Instrument;

use crate::db::{get_session_by_token, get_user};

use super::{SESSION_COOKIE, User};

pub const LOGIN_PATH: &str = "/api/login";

pub const USER_HEADER: &str = "X-Forwarded-User";
pub const EMAIL_HEADER: &str = "X-Forwarded-Email";
pub const FIRST_NAME_HEADER: &str = "X-Forwarded-First-Name";
pub const LAST_NAME_HEADER: &str = "X-Forwarded-Last-Name";
pub const PICTURE_HEADER: &str = "X-Forwarded-Picture";

#[rocket::async_trait]
impl<'r> FromRequest<'r> for User {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        authenticate(request)
            .instrument(tracing::info_span!("user_auth_guard"))
            .await
    }
}

async fn authenticate(request: &Request<'_>) -> Outcome<User, ()> {
    let token = request
        .cookies()
        .get_private(SESSION_COOKIE)
        .map(|c| c.value().to_string());

    let Some(token) = token else {
        return Outcome::Error((Status::Unauthorized, ()));
    };

    let Some(db) = request.rocket().state::<SqlitePool>() else {
        tracing::error!("Database pool not found in managed state");
        return Outcome::Error((Status::InternalServerError, ()));
    };

    let session = match get_session_by_token(db, &token).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            tracing::warn!("Unknown session token");
            return Outcome::Error((Status::Unauthorized, ()));
        }
        Err(err) => {
            tracing::error!(error = ?err, "Failed to look up session");
            return Outcome::Error((Status::InternalServerError, ()));
        }
    };

    if !session.is_valid() {
        tracing::warn!(user_id = %session.user_id, "Session token expired");
        return Outcome::Error((Status::Unauthorized, ()));
    }

    match get_user(db, &session.user_id).await {
        Ok(Some(user)) => {
            tracing::info!(user_id = %user.id, role = %user.role.as_str(), "User authenticated via session token");
            Outcome::Success(user)
        }
        Ok(None) => {
            tracing::warn!(user_id = %session.user_id, "Session refers to a missing user");
            Outcome::Error((Status::Unauthorized, ()))
        }
        Err(err) => {
            tracing::error!(user_id = %session.user_id, error = ?err, "Failed to fetch user for valid session");
            Outcome::Error((Status::InternalServerError, ()))
        }
    }
}

/// Identity forwarded by the authenticating proxy in front of the service.
/// The proxy is trusted to strip these headers from client traffic.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardedIdentity {
    pub subject: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image_url: Option<String>,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ForwardedIdentity {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let header = |name: &str| {
            request
                .headers()
                .get_one(name)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(String::from)
        };

        match header(USER_HEADER) {
            Some(subject) => Outcome::Success(ForwardedIdentity {
                subject,
                email: header(EMAIL_HEADER),
                first_name: header(FIRST_NAME_HEADER),
                last_name: header(LAST_NAME_HEADER),
                profile_image_url: header(PICTURE_HEADER),
            }),
            None => Outcome::Forward(Status::Unauthorized),
        }
    }
}

pub fn set_session_cookie(cookies: &CookieJar<'_>, token: String, ttl_hours: i64) {
    cookies.add_private(
        Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .same_site(SameSite::Lax)
            .http_only(true)
            .max_age(rocket::time::Duration::hours(ttl_hours)),
    );
}

pub fn clear_session_cookie(cookies: &CookieJar<'_>) {
    cookies.remove_private(Cookie::build(SESSION_COOKIE).path("/"));
}

#[catch(401)]
pub fn unauthorized_api(_req: &Request) -> Custom<Json<Value>> {
    tracing::warn!("Unauthorized API access attempt");
    Custom(
        Status::Unauthorized,
        Json(json!({
            "error": "Unauthorized",
            "message": "Authentication required",
            "loginUrl": LOGIN_PATH,
        })),
    )
}

#[catch(403)]
pub fn forbidden_api(_req: &Request) -> Custom<Json<Value>> {
    tracing::warn!("Forbidden API access attempt");
    Custom(
        Status::Forbidden,
        Json(json!({
            "error": "Forbidden",
            "message": "You don't have permission to perform this action",
        })),
    )
}

#[catch(404)]
pub fn not_found_api(req: &Request) -> Custom<Json<Value>> {
    Custom(
        Status::NotFound,
        Json(json!({
            "error": "Not Found",
            "message": format!("No resource at {}", req.uri()),
        })),
    )
}
