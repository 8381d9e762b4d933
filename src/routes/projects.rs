use actix_web::{HttpRequest, HttpResponse, Responder, get, post, web};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

use super::{bad_request, coding_error_response, current_student, internal_error, not_found};
use crate::database as db;
use crate::projects::{ValidationDetail, ValidationSchema, default_project_files, validate_project_files};
use crate::sandbox::{FileDescriptor, RawFile, resanitize, sanitize_files};

#[derive(Deserialize)]
pub struct CreateProjectPayload {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    files: Option<Vec<RawFile>>,
    #[serde(default)]
    validation_schema: Option<ValidationSchema>,
}

#[derive(Deserialize)]
pub struct ValidatePayload {
    #[serde(default)]
    files: Option<Vec<RawFile>>,
    #[serde(default)]
    validation_schema: Option<ValidationSchema>,
}

#[derive(Deserialize)]
pub struct PublishPayload {
    #[serde(default)]
    publish: Option<bool>,
}

#[derive(Serialize)]
struct ValidationResponse {
    passed: bool,
    details: Vec<ValidationDetail>,
}

#[post("/projects")]
pub async fn post_project_handler(
    req: HttpRequest,
    pool: web::Data<SqlitePool>,
    body: web::Json<CreateProjectPayload>,
) -> impl Responder {
    let student_id = match current_student(&req, &pool).await {
        Ok(id) => id,
        Err(response) => return response,
    };

    let Some(title) = body.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
        return bad_request("Title is required.");
    };

    // Projects start from the fixed HTML/CSS/JS template unless the client
    // brings its own files.
    let files: Vec<FileDescriptor> = match &body.files {
        Some(raw) if !raw.is_empty() => match sanitize_files(raw) {
            Ok(files) => files,
            Err(e) => return coding_error_response(e),
        },
        _ => default_project_files(),
    };

    let project_id = match db::create_project(
        student_id,
        title,
        body.description.as_deref().unwrap_or(""),
        &files,
        body.validation_schema.as_ref(),
        &pool,
    )
    .await
    {
        Ok(id) => {
            log::info!("Created project {id} for student {student_id}");
            id
        }
        Err(e) => {
            log::error!("Failed to create project: {e}");
            return internal_error();
        }
    };

    match db::fetch_project(student_id, project_id, &pool).await {
        Ok(Some(record)) => HttpResponse::Created().json(record),
        Ok(None) => internal_error(),
        Err(e) => {
            log::error!("Failed to fetch created project {project_id}: {e}");
            internal_error()
        }
    }
}

#[get("/projects/{id}")]
pub async fn get_project_handler(
    req: HttpRequest,
    pool: web::Data<SqlitePool>,
    path: web::Path<(u32,)>,
) -> impl Responder {
    let project_id = path.into_inner().0;
    let student_id = match current_student(&req, &pool).await {
        Ok(id) => id,
        Err(response) => return response,
    };

    match db::fetch_project(student_id, project_id, &pool).await {
        Ok(Some(record)) => HttpResponse::Ok().json(record),
        Ok(None) => not_found(format!("Project {project_id} not found.")),
        Err(e) => {
            log::error!("Failed to fetch project {project_id}: {e}");
            internal_error()
        }
    }
}

#[post("/projects/{id}/validate")]
pub async fn validate_project_handler(
    req: HttpRequest,
    pool: web::Data<SqlitePool>,
    path: web::Path<(u32,)>,
    body: web::Json<ValidatePayload>,
) -> impl Responder {
    let project_id = path.into_inner().0;
    let student_id = match current_student(&req, &pool).await {
        Ok(id) => id,
        Err(response) => return response,
    };

    let project = match db::fetch_project(student_id, project_id, &pool).await {
        Ok(Some(record)) => record,
        Ok(None) => return not_found(format!("Project {project_id} not found.")),
        Err(e) => {
            log::error!("Failed to fetch project {project_id}: {e}");
            return internal_error();
        }
    };

    let files = match &body.files {
        Some(raw) if !raw.is_empty() => sanitize_files(raw),
        _ => resanitize(&project.files),
    };
    let files = match files {
        Ok(files) => files,
        Err(e) => return coding_error_response(e),
    };

    let schema = body
        .validation_schema
        .as_ref()
        .or(project.validation_schema.as_ref());

    let (passed, details) = match validate_project_files(&files, schema) {
        Ok(outcome) => outcome,
        Err(e) => return coding_error_response(e),
    };

    let stored = serde_json::json!({ "passed": passed, "details": details });
    if let Err(e) = db::save_validation_result(student_id, project_id, &files, &stored, &pool).await
    {
        log::error!("Failed to store validation result for project {project_id}: {e}");
        return internal_error();
    }

    HttpResponse::Ok().json(ValidationResponse { passed, details })
}

#[post("/projects/{id}/publish")]
pub async fn publish_project_handler(
    req: HttpRequest,
    pool: web::Data<SqlitePool>,
    path: web::Path<(u32,)>,
    body: web::Json<PublishPayload>,
) -> impl Responder {
    let project_id = path.into_inner().0;
    let student_id = match current_student(&req, &pool).await {
        Ok(id) => id,
        Err(response) => return response,
    };

    let publish = body.publish.unwrap_or(true);
    match db::set_project_published(student_id, project_id, publish, &pool).await {
        Ok(true) => {}
        Ok(false) => return not_found(format!("Project {project_id} not found.")),
        Err(e) => {
            log::error!("Failed to update publish flag for project {project_id}: {e}");
            return internal_error();
        }
    }

    match db::fetch_project(student_id, project_id, &pool).await {
        Ok(Some(record)) => HttpResponse::Ok().json(record),
        Ok(None) => not_found(format!("Project {project_id} not found.")),
        Err(e) => {
            log::error!("Failed to fetch project {project_id}: {e}");
            internal_error()
        }
    }
}
