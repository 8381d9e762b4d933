use std::time::Duration;

use actix_web::{HttpRequest, HttpResponse, Responder, get, post, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

use super::{bad_request, coding_error_response, current_student, internal_error, not_found};
use crate::config::{ChallengeCatalog, ChallengeConfig};
use crate::database as db;
use crate::database::ChallengeState;
use crate::sandbox::{
    ExecutionResult, FileDescriptor, RawFile, TestCaseResult, resanitize, run_files,
    run_test_cases, sanitize_files,
};

pub const HINT_COOLDOWN_SECONDS: i64 = 45;

#[derive(Deserialize)]
pub struct AutosavePayload {
    #[serde(default)]
    files: Vec<RawFile>,
}

#[derive(Deserialize)]
pub struct RunPayload {
    #[serde(default)]
    files: Option<Vec<RawFile>>,
    #[serde(default)]
    stdin: Option<String>,
}

#[derive(Deserialize)]
pub struct SubmitPayload {
    #[serde(default)]
    files: Option<Vec<RawFile>>,
}

#[derive(Serialize)]
struct FilesResponse {
    files: Vec<FileDescriptor>,
}

#[derive(Serialize)]
struct RunResponse {
    #[serde(flatten)]
    result: ExecutionResult,
    files: Vec<FileDescriptor>,
}

#[derive(Serialize)]
struct SubmitResponse {
    passed: bool,
    cases: Vec<TestCaseResult>,
    files: Vec<FileDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    solution_files: Option<Vec<FileDescriptor>>,
}

#[derive(Serialize)]
struct HintResponse {
    hint: String,
    revealed: Vec<String>,
    remaining: usize,
}

#[derive(Serialize)]
struct ChallengeSummary {
    slug: String,
    title: String,
    is_completed: bool,
    completed_at: Option<String>,
    hints_revealed: u32,
    last_run_at: Option<String>,
}

#[derive(Serialize)]
struct ChallengeDetail {
    slug: String,
    title: String,
    instructions: String,
    entrypoint_filename: String,
    time_limit_seconds: u64,
    total_hints: usize,
    files: Vec<FileDescriptor>,
    hints_revealed: u32,
    revealed_hints: Vec<String>,
    is_completed: bool,
    completed_at: Option<String>,
    last_run_result: Option<serde_json::Value>,
    last_run_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    solution_files: Option<Vec<FileDescriptor>>,
}

fn find_challenge<'a>(catalog: &'a [ChallengeConfig], slug: &str) -> Option<&'a ChallengeConfig> {
    catalog.iter().find(|c| c.slug == slug)
}

/// Sanitizes the authored starter manifest and loads (or lazily creates) the
/// student's state row seeded with it.
async fn ensure_state(
    student_id: u32,
    challenge: &ChallengeConfig,
    pool: &SqlitePool,
) -> Result<(ChallengeState, Vec<FileDescriptor>), HttpResponse> {
    let starter = resanitize(&challenge.starter_files).map_err(|e| {
        log::error!("Starter files of challenge {} are unusable: {e}", challenge.slug);
        bad_request("Coding challenge starter files are misconfigured.")
    })?;

    let state = db::get_or_create_state(student_id, &challenge.slug, &starter, pool)
        .await
        .map_err(|e| {
            log::error!("Failed to load state for challenge {}: {e}", challenge.slug);
            internal_error()
        })?;

    Ok((state, starter))
}

/// Seconds the student must still wait before the next hint, if any.
pub(crate) fn hint_wait_remaining(
    last_requested_at: Option<&str>,
    now: DateTime<Utc>,
    cooldown_seconds: i64,
) -> Option<i64> {
    let last = last_requested_at.and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())?;
    let elapsed = (now - last.with_timezone(&Utc)).num_seconds();
    if elapsed < cooldown_seconds {
        Some((cooldown_seconds - elapsed).max(1))
    } else {
        None
    }
}

#[get("/challenges")]
pub async fn get_challenges_handler(
    req: HttpRequest,
    pool: web::Data<SqlitePool>,
    catalog: web::Data<ChallengeCatalog>,
) -> impl Responder {
    let student_id = match current_student(&req, &pool).await {
        Ok(id) => id,
        Err(response) => return response,
    };

    let mut summaries = Vec::with_capacity(catalog.len());
    for challenge in catalog.iter() {
        let state = match db::fetch_state(student_id, &challenge.slug, &pool).await {
            Ok(state) => state,
            Err(e) => {
                log::error!("Failed to fetch state for {}: {e}", challenge.slug);
                return internal_error();
            }
        };
        summaries.push(ChallengeSummary {
            slug: challenge.slug.clone(),
            title: challenge.title.clone(),
            is_completed: state.as_ref().is_some_and(|s| s.is_completed),
            completed_at: state.as_ref().and_then(|s| s.completed_at.clone()),
            hints_revealed: state.as_ref().map_or(0, |s| s.hints_revealed),
            last_run_at: state.and_then(|s| s.last_run_at),
        });
    }

    HttpResponse::Ok().json(summaries)
}

#[get("/challenges/{slug}")]
pub async fn get_challenge_handler(
    req: HttpRequest,
    pool: web::Data<SqlitePool>,
    catalog: web::Data<ChallengeCatalog>,
    path: web::Path<(String,)>,
) -> impl Responder {
    let slug = path.into_inner().0;
    let student_id = match current_student(&req, &pool).await {
        Ok(id) => id,
        Err(response) => return response,
    };
    let Some(challenge) = find_challenge(&catalog, &slug) else {
        return not_found(format!("Challenge {slug} not found."));
    };

    let state = match db::fetch_state(student_id, &slug, &pool).await {
        Ok(state) => state,
        Err(e) => {
            log::error!("Failed to fetch state for {slug}: {e}");
            return internal_error();
        }
    };

    let hints_revealed = state.as_ref().map_or(0, |s| s.hints_revealed) as usize;
    let is_completed = state.as_ref().is_some_and(|s| s.is_completed);
    let files = match state
        .as_ref()
        .map(|s| s.files.clone())
        .filter(|files| !files.is_empty())
    {
        Some(files) => files,
        // No saved work yet: serve the starter, normalized like every other
        // manifest leaving this service.
        None => match resanitize(&challenge.starter_files) {
            Ok(starter) => starter,
            Err(e) => {
                log::error!("Starter files of challenge {slug} are unusable: {e}");
                return bad_request("Coding challenge starter files are misconfigured.");
            }
        },
    };

    // The reference solution stays hidden until the challenge is completed.
    let solution_files = (is_completed && !challenge.solution_files.is_empty())
        .then(|| challenge.solution_files.clone());

    HttpResponse::Ok().json(ChallengeDetail {
        slug: challenge.slug.clone(),
        title: challenge.title.clone(),
        instructions: challenge.instructions.clone(),
        entrypoint_filename: challenge.entrypoint_filename.clone(),
        time_limit_seconds: challenge.time_limit_seconds,
        total_hints: challenge.hints.len(),
        files,
        hints_revealed: hints_revealed as u32,
        revealed_hints: challenge.hints[..hints_revealed.min(challenge.hints.len())].to_vec(),
        is_completed,
        completed_at: state.as_ref().and_then(|s| s.completed_at.clone()),
        last_run_result: state.as_ref().and_then(|s| s.last_run_result.clone()),
        last_run_at: state.and_then(|s| s.last_run_at),
        solution_files,
    })
}

#[post("/challenges/{slug}/autosave")]
pub async fn autosave_handler(
    req: HttpRequest,
    pool: web::Data<SqlitePool>,
    catalog: web::Data<ChallengeCatalog>,
    path: web::Path<(String,)>,
    body: web::Json<AutosavePayload>,
) -> impl Responder {
    let slug = path.into_inner().0;
    let student_id = match current_student(&req, &pool).await {
        Ok(id) => id,
        Err(response) => return response,
    };
    let Some(challenge) = find_challenge(&catalog, &slug) else {
        return not_found(format!("Challenge {slug} not found."));
    };
    if let Err(response) = ensure_state(student_id, challenge, &pool).await {
        return response;
    }

    let files = match sanitize_files(&body.files) {
        Ok(files) => files,
        Err(e) => return coding_error_response(e),
    };

    if let Err(e) = db::save_state_files(student_id, &slug, &files, &pool).await {
        log::error!("Failed to autosave files for {slug}: {e}");
        return internal_error();
    }

    HttpResponse::Ok().json(FilesResponse { files })
}

#[post("/challenges/{slug}/reset")]
pub async fn reset_handler(
    req: HttpRequest,
    pool: web::Data<SqlitePool>,
    catalog: web::Data<ChallengeCatalog>,
    path: web::Path<(String,)>,
) -> impl Responder {
    let slug = path.into_inner().0;
    let student_id = match current_student(&req, &pool).await {
        Ok(id) => id,
        Err(response) => return response,
    };
    let Some(challenge) = find_challenge(&catalog, &slug) else {
        return not_found(format!("Challenge {slug} not found."));
    };
    let (_, starter) = match ensure_state(student_id, challenge, &pool).await {
        Ok(loaded) => loaded,
        Err(response) => return response,
    };

    if let Err(e) = db::reset_state(student_id, &slug, &starter, &pool).await {
        log::error!("Failed to reset challenge {slug}: {e}");
        return internal_error();
    }

    HttpResponse::Ok().json(FilesResponse { files: starter })
}

#[post("/challenges/{slug}/run")]
pub async fn run_handler(
    req: HttpRequest,
    pool: web::Data<SqlitePool>,
    catalog: web::Data<ChallengeCatalog>,
    path: web::Path<(String,)>,
    body: web::Json<RunPayload>,
) -> impl Responder {
    let slug = path.into_inner().0;
    let student_id = match current_student(&req, &pool).await {
        Ok(id) => id,
        Err(response) => return response,
    };
    let Some(challenge) = find_challenge(&catalog, &slug) else {
        return not_found(format!("Challenge {slug} not found."));
    };
    let (state, _) = match ensure_state(student_id, challenge, &pool).await {
        Ok(loaded) => loaded,
        Err(response) => return response,
    };

    let files = match &body.files {
        Some(raw) => sanitize_files(raw),
        None => resanitize(&state.files),
    };
    let files = match files {
        Ok(files) => files,
        Err(e) => return coding_error_response(e),
    };

    let result = match run_files(
        &files,
        &challenge.entrypoint_filename,
        body.stdin.as_deref(),
        Duration::from_secs(challenge.time_limit_seconds),
    )
    .await
    {
        Ok(result) => result,
        Err(e) => return coding_error_response(e),
    };

    let stored = serde_json::json!({
        "type": "run",
        "stdout": result.stdout,
        "stderr": result.stderr,
        "exit_code": result.exit_code,
        "timed_out": result.timed_out,
    });
    if let Err(e) = db::save_run_result(student_id, &slug, &files, &stored, false, &pool).await {
        log::error!("Failed to store run result for {slug}: {e}");
        return internal_error();
    }

    HttpResponse::Ok().json(RunResponse { result, files })
}

#[post("/challenges/{slug}/submit")]
pub async fn submit_handler(
    req: HttpRequest,
    pool: web::Data<SqlitePool>,
    catalog: web::Data<ChallengeCatalog>,
    path: web::Path<(String,)>,
    body: web::Json<SubmitPayload>,
) -> impl Responder {
    let slug = path.into_inner().0;
    let student_id = match current_student(&req, &pool).await {
        Ok(id) => id,
        Err(response) => return response,
    };
    let Some(challenge) = find_challenge(&catalog, &slug) else {
        return not_found(format!("Challenge {slug} not found."));
    };
    let (state, _) = match ensure_state(student_id, challenge, &pool).await {
        Ok(loaded) => loaded,
        Err(response) => return response,
    };

    let files = match &body.files {
        Some(raw) => sanitize_files(raw),
        None => resanitize(&state.files),
    };
    let files = match files {
        Ok(files) => files,
        Err(e) => return coding_error_response(e),
    };

    let graded = run_test_cases(
        &files,
        &challenge.entrypoint_filename,
        &challenge.test_cases,
        Duration::from_secs(challenge.time_limit_seconds),
    )
    .await;
    let (passed, cases) = match graded {
        Ok(graded) => graded,
        Err(e) => return coding_error_response(e),
    };

    let stored = serde_json::json!({
        "type": "submit",
        "passed": passed,
        "cases": cases,
    });
    // Completion fires once: a repeat passing submit keeps the original
    // completed_at stamp.
    let newly_completed = passed && !state.is_completed;
    if let Err(e) =
        db::save_run_result(student_id, &slug, &files, &stored, newly_completed, &pool).await
    {
        log::error!("Failed to store submit result for {slug}: {e}");
        return internal_error();
    }

    let solution_files = (passed && !challenge.solution_files.is_empty())
        .then(|| challenge.solution_files.clone());

    HttpResponse::Ok().json(SubmitResponse {
        passed,
        cases,
        files,
        solution_files,
    })
}

#[post("/challenges/{slug}/hint")]
pub async fn hint_handler(
    req: HttpRequest,
    pool: web::Data<SqlitePool>,
    catalog: web::Data<ChallengeCatalog>,
    path: web::Path<(String,)>,
) -> impl Responder {
    let slug = path.into_inner().0;
    let student_id = match current_student(&req, &pool).await {
        Ok(id) => id,
        Err(response) => return response,
    };
    let Some(challenge) = find_challenge(&catalog, &slug) else {
        return not_found(format!("Challenge {slug} not found."));
    };
    if challenge.hints.is_empty() {
        return bad_request("Hints are not available for this challenge.");
    }
    let (state, _) = match ensure_state(student_id, challenge, &pool).await {
        Ok(loaded) => loaded,
        Err(response) => return response,
    };

    let now = Utc::now();
    if let Some(retry_in) = hint_wait_remaining(
        state.last_hint_requested_at.as_deref(),
        now,
        HINT_COOLDOWN_SECONDS,
    ) {
        return super::rate_limited(retry_in);
    }

    if state.hints_revealed as usize >= challenge.hints.len() {
        return bad_request("All hints have already been revealed.");
    }

    let revealed_count = state.hints_revealed + 1;
    let requested_at = crate::create_timestamp();
    if let Err(e) =
        db::record_hint(student_id, &slug, revealed_count, &requested_at, &pool).await
    {
        log::error!("Failed to record hint for {slug}: {e}");
        return internal_error();
    }

    let revealed: Vec<String> = challenge.hints[..revealed_count as usize].to_vec();
    HttpResponse::Ok().json(HintResponse {
        hint: revealed.last().cloned().unwrap_or_default(),
        remaining: challenge.hints.len() - revealed_count as usize,
        revealed,
    })
}
