mod challenges;
mod projects;

pub use challenges::{
    autosave_handler, get_challenge_handler, get_challenges_handler, hint_handler, reset_handler,
    run_handler, submit_handler,
};
pub use projects::{
    get_project_handler, post_project_handler, publish_project_handler, validate_project_handler,
};

use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::{HttpRequest, HttpResponse};
use serde::Serialize;
use sqlx::sqlite::SqlitePool;

use crate::database as db;
use crate::sandbox::CodingError;

#[derive(Serialize)]
struct ErrorResponse {
    reason: &'static str,
    code: u32,
}

#[derive(Serialize)]
struct ErrorResponseWithMessage {
    reason: &'static str,
    code: u32,
    message: String,
}

#[derive(Serialize)]
struct RateLimitedResponse {
    reason: &'static str,
    code: u32,
    message: &'static str,
    retry_in: i64,
}

pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = HttpResponse::BadRequest().json(ErrorResponse {
        reason: "ERR_INVALID_ARGUMENT",
        code: 1,
    });
    InternalError::from_response(err, response).into()
}

pub(crate) fn bad_request(message: impl Into<String>) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponseWithMessage {
        reason: "ERR_INVALID_ARGUMENT",
        code: 1,
        message: message.into(),
    })
}

pub(crate) fn not_found(message: String) -> HttpResponse {
    HttpResponse::NotFound().json(ErrorResponseWithMessage {
        reason: "ERR_NOT_FOUND",
        code: 3,
        message,
    })
}

pub(crate) fn rate_limited(retry_in: i64) -> HttpResponse {
    HttpResponse::TooManyRequests().json(RateLimitedResponse {
        reason: "ERR_RATE_LIMITED",
        code: 4,
        message: "Please wait before requesting another hint.",
        retry_in,
    })
}

pub(crate) fn internal_error() -> HttpResponse {
    HttpResponse::InternalServerError().json(ErrorResponse {
        reason: "ERR_EXTERNAL",
        code: 5,
    })
}

/// Maps sandbox errors onto responses: rejected input is the caller's fault,
/// infrastructure failures are ours.
pub(crate) fn coding_error_response(err: CodingError) -> HttpResponse {
    match err {
        CodingError::InvalidInput(detail) => bad_request(detail),
        CodingError::Sandbox(e) => {
            log::error!("Sandbox infrastructure failure: {e}");
            internal_error()
        }
    }
}

/// Resolves the calling student from the `X-Student-Id` header.
///
/// Identity is established by an upstream collaborator; this service trusts
/// the header completely and only checks that the student exists.
pub(crate) async fn current_student(
    req: &HttpRequest,
    pool: &SqlitePool,
) -> Result<u32, HttpResponse> {
    let Some(raw) = req
        .headers()
        .get("x-student-id")
        .and_then(|value| value.to_str().ok())
    else {
        return Err(bad_request("X-Student-Id header is required."));
    };

    let Ok(student_id) = raw.trim().parse::<u32>() else {
        return Err(bad_request("X-Student-Id must be a numeric id."));
    };

    match db::find_student(student_id, pool).await {
        Ok(true) => Ok(student_id),
        Ok(false) => Err(not_found(format!("Student {student_id} not found."))),
        Err(e) => {
            log::error!("Failed to check student existence: {e}");
            Err(internal_error())
        }
    }
}
