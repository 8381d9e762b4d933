use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};

use crate::create_timestamp;
use crate::projects::ValidationSchema;
use crate::sandbox::FileDescriptor;

const DATABASE_NAME: &str = "codelab.sqlite3";

pub fn get_db_path() -> PathBuf {
    use directories::ProjectDirs;

    let proj_dirs = ProjectDirs::from("", "", "codelab").expect("Unable to find user directory");
    let data_dir = proj_dirs.data_local_dir();

    fs::create_dir_all(data_dir).expect("Failed to create local data dir");

    data_dir.join(DATABASE_NAME)
}

pub async fn init_db(db_path: impl AsRef<Path>) -> sqlx::Result<SqlitePool> {
    let db_url = format!("sqlite://{}?mode=rwc", db_path.as_ref().display()); // rwc = read/write/create
    let db_pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect(&db_url)
        .await?;

    // PRAGMA statements cannot run inside a transaction
    for pragma_sql in &[
        "PRAGMA foreign_keys = ON;",
        "PRAGMA busy_timeout = 2000;", // 2 seconds timeout for lock contention
        "PRAGMA journal_mode = WAL;",  // Write-Ahead Logging for better concurrency
        "PRAGMA synchronous = NORMAL;",
    ] {
        sqlx::query(pragma_sql).execute(&db_pool).await?;
    }

    let mut tx = db_pool.begin().await?;

    for sql in &[
        r"
        CREATE TABLE IF NOT EXISTS students (
            id            INTEGER PRIMARY KEY,
            name          TEXT    NOT NULL UNIQUE
        );",
        r"
        CREATE TABLE IF NOT EXISTS challenge_state (
            student_id              INTEGER NOT NULL,
            challenge_slug          TEXT    NOT NULL,
            files                   TEXT    NOT NULL,
            hints_revealed          INTEGER NOT NULL DEFAULT 0,
            last_hint_requested_at  TEXT,
            last_run_result         TEXT,
            last_run_at             TEXT,
            is_completed            INTEGER NOT NULL DEFAULT 0,
            completed_at            TEXT,
            updated_at              TEXT    NOT NULL,
            PRIMARY KEY (student_id, challenge_slug),
            FOREIGN KEY (student_id) REFERENCES students (id)
        );",
        r"
        CREATE TABLE IF NOT EXISTS projects (
            id                      INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id              INTEGER NOT NULL,
            title                   TEXT    NOT NULL,
            description             TEXT    NOT NULL DEFAULT '',
            files                   TEXT    NOT NULL,
            validation_schema       TEXT,
            last_validation_result  TEXT,
            last_validated_at       TEXT,
            is_published            INTEGER NOT NULL DEFAULT 0,
            created_at              TEXT    NOT NULL,
            updated_at              TEXT    NOT NULL,
            FOREIGN KEY (student_id) REFERENCES students (id)
        );",
        "CREATE INDEX IF NOT EXISTS idx_projects_student ON projects(student_id);",
        "INSERT OR IGNORE INTO students (id, name) VALUES (0, 'root');",
    ] {
        sqlx::query(sql).execute(tx.as_mut()).await?;
    }

    tx.commit().await?;

    log::info!("Initialized database at {}", db_path.as_ref().display());

    Ok(db_pool)
}

pub fn remove_db(db_path: impl AsRef<Path>) {
    // WAL and SHM files might not exist
    let wal_path = format!("{}-wal", db_path.as_ref().display());
    let shm_path = format!("{}-shm", db_path.as_ref().display());
    let _ = fs::remove_file(wal_path);
    let _ = fs::remove_file(shm_path);

    if let Err(e) = std::fs::remove_file(&db_path) {
        log::warn!(
            "Unable to remove database at {}: {e}",
            db_path.as_ref().display()
        );
    } else {
        log::info!("Removed database at {}", db_path.as_ref().display());
    }
}

pub async fn find_student(id: u32, pool: &SqlitePool) -> sqlx::Result<bool> {
    let row = sqlx::query("SELECT 1 FROM students WHERE id = ?")
        .bind(id as i64)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

/// Per-student mutable state of one coding challenge.
#[derive(Debug, Clone, Serialize)]
pub struct ChallengeState {
    pub files: Vec<FileDescriptor>,
    pub hints_revealed: u32,
    pub last_hint_requested_at: Option<String>,
    pub last_run_result: Option<serde_json::Value>,
    pub last_run_at: Option<String>,
    pub is_completed: bool,
    pub completed_at: Option<String>,
}

fn state_from_row(row: &SqliteRow) -> Result<ChallengeState> {
    let files_json: String = row.try_get("files")?;
    let result_json: Option<String> = row.try_get("last_run_result")?;
    Ok(ChallengeState {
        files: serde_json::from_str(&files_json).context("stored files are not valid JSON")?,
        hints_revealed: row.try_get::<i64, _>("hints_revealed")? as u32,
        last_hint_requested_at: row.try_get("last_hint_requested_at")?,
        last_run_result: result_json
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .context("stored run result is not valid JSON")?,
        last_run_at: row.try_get("last_run_at")?,
        is_completed: row.try_get::<i64, _>("is_completed")? != 0,
        completed_at: row.try_get("completed_at")?,
    })
}

pub async fn fetch_state(
    student_id: u32,
    slug: &str,
    pool: &SqlitePool,
) -> Result<Option<ChallengeState>> {
    let row = sqlx::query(
        r"
        SELECT files, hints_revealed, last_hint_requested_at, last_run_result,
               last_run_at, is_completed, completed_at
        FROM challenge_state
        WHERE student_id = ? AND challenge_slug = ?
        ",
    )
    .bind(student_id as i64)
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(state_from_row).transpose()
}

/// Loads the state row, creating it lazily on first interaction with the
/// challenge. Rows whose working copy is empty are re-seeded from the starter
/// manifest.
pub async fn get_or_create_state(
    student_id: u32,
    slug: &str,
    starter: &[FileDescriptor],
    pool: &SqlitePool,
) -> Result<ChallengeState> {
    if let Some(mut state) = fetch_state(student_id, slug, pool).await? {
        if state.files.is_empty() && !starter.is_empty() {
            save_state_files(student_id, slug, starter, pool).await?;
            state.files = starter.to_vec();
        }
        return Ok(state);
    }

    let files_json = serde_json::to_string(starter)?;
    let now = create_timestamp();
    sqlx::query(
        r"
        INSERT INTO challenge_state (student_id, challenge_slug, files, updated_at)
        VALUES (?, ?, ?, ?)
        ",
    )
    .bind(student_id as i64)
    .bind(slug)
    .bind(files_json)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(ChallengeState {
        files: starter.to_vec(),
        hints_revealed: 0,
        last_hint_requested_at: None,
        last_run_result: None,
        last_run_at: None,
        is_completed: false,
        completed_at: None,
    })
}

pub async fn save_state_files(
    student_id: u32,
    slug: &str,
    files: &[FileDescriptor],
    pool: &SqlitePool,
) -> Result<()> {
    let files_json = serde_json::to_string(files)?;
    let now = create_timestamp();
    sqlx::query(
        r"
        UPDATE challenge_state SET files = ?, updated_at = ?
        WHERE student_id = ? AND challenge_slug = ?
        ",
    )
    .bind(files_json)
    .bind(now)
    .bind(student_id as i64)
    .bind(slug)
    .execute(pool)
    .await?;
    Ok(())
}

/// Persists a tagged run/submit result together with the manifest it ran.
///
/// `mark_completed` stamps `is_completed`/`completed_at`; callers only set it
/// on the first passing submit, which keeps the completion transition
/// one-shot.
pub async fn save_run_result(
    student_id: u32,
    slug: &str,
    files: &[FileDescriptor],
    result: &serde_json::Value,
    mark_completed: bool,
    pool: &SqlitePool,
) -> Result<()> {
    let files_json = serde_json::to_string(files)?;
    let result_json = serde_json::to_string(result)?;
    let now = create_timestamp();

    if mark_completed {
        sqlx::query(
            r"
            UPDATE challenge_state
            SET files = ?, last_run_result = ?, last_run_at = ?,
                is_completed = 1, completed_at = ?, updated_at = ?
            WHERE student_id = ? AND challenge_slug = ?
            ",
        )
        .bind(files_json)
        .bind(result_json)
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .bind(student_id as i64)
        .bind(slug)
        .execute(pool)
        .await?;
    } else {
        sqlx::query(
            r"
            UPDATE challenge_state
            SET files = ?, last_run_result = ?, last_run_at = ?, updated_at = ?
            WHERE student_id = ? AND challenge_slug = ?
            ",
        )
        .bind(files_json)
        .bind(result_json)
        .bind(&now)
        .bind(&now)
        .bind(student_id as i64)
        .bind(slug)
        .execute(pool)
        .await?;
    }
    Ok(())
}

pub async fn record_hint(
    student_id: u32,
    slug: &str,
    hints_revealed: u32,
    requested_at: &str,
    pool: &SqlitePool,
) -> sqlx::Result<()> {
    sqlx::query(
        r"
        UPDATE challenge_state
        SET hints_revealed = ?, last_hint_requested_at = ?, updated_at = ?
        WHERE student_id = ? AND challenge_slug = ?
        ",
    )
    .bind(hints_revealed as i64)
    .bind(requested_at)
    .bind(requested_at)
    .bind(student_id as i64)
    .bind(slug)
    .execute(pool)
    .await?;
    Ok(())
}

/// Full rollback to the initial state: starter files, no run history, no
/// hints, not completed.
pub async fn reset_state(
    student_id: u32,
    slug: &str,
    starter: &[FileDescriptor],
    pool: &SqlitePool,
) -> Result<()> {
    let files_json = serde_json::to_string(starter)?;
    let now = create_timestamp();
    sqlx::query(
        r"
        UPDATE challenge_state
        SET files = ?, hints_revealed = 0, last_hint_requested_at = NULL,
            last_run_result = NULL, last_run_at = NULL,
            is_completed = 0, completed_at = NULL, updated_at = ?
        WHERE student_id = ? AND challenge_slug = ?
        ",
    )
    .bind(files_json)
    .bind(now)
    .bind(student_id as i64)
    .bind(slug)
    .execute(pool)
    .await?;
    Ok(())
}

/// One student-owned project and its validation state.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectRecord {
    pub id: u32,
    pub title: String,
    pub description: String,
    pub files: Vec<FileDescriptor>,
    pub validation_schema: Option<ValidationSchema>,
    pub last_validation_result: Option<serde_json::Value>,
    pub last_validated_at: Option<String>,
    pub is_published: bool,
    pub created_at: String,
    pub updated_at: String,
}

fn project_from_row(row: &SqliteRow) -> Result<ProjectRecord> {
    let files_json: String = row.try_get("files")?;
    let schema_json: Option<String> = row.try_get("validation_schema")?;
    let result_json: Option<String> = row.try_get("last_validation_result")?;
    Ok(ProjectRecord {
        id: row.try_get::<i64, _>("id")? as u32,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        files: serde_json::from_str(&files_json).context("stored files are not valid JSON")?,
        validation_schema: schema_json
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .context("stored schema is not valid JSON")?,
        last_validation_result: result_json
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .context("stored validation result is not valid JSON")?,
        last_validated_at: row.try_get("last_validated_at")?,
        is_published: row.try_get::<i64, _>("is_published")? != 0,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn create_project(
    student_id: u32,
    title: &str,
    description: &str,
    files: &[FileDescriptor],
    schema: Option<&ValidationSchema>,
    pool: &SqlitePool,
) -> Result<u32> {
    let files_json = serde_json::to_string(files)?;
    let schema_json = schema.map(serde_json::to_string).transpose()?;
    let now = create_timestamp();

    let result = sqlx::query(
        r"
        INSERT INTO projects (student_id, title, description, files, validation_schema, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(student_id as i64)
    .bind(title)
    .bind(description)
    .bind(files_json)
    .bind(schema_json)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid() as u32)
}

pub async fn fetch_project(
    student_id: u32,
    project_id: u32,
    pool: &SqlitePool,
) -> Result<Option<ProjectRecord>> {
    let row = sqlx::query(
        r"
        SELECT id, title, description, files, validation_schema,
               last_validation_result, last_validated_at, is_published,
               created_at, updated_at
        FROM projects
        WHERE student_id = ? AND id = ?
        ",
    )
    .bind(student_id as i64)
    .bind(project_id as i64)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(project_from_row).transpose()
}

pub async fn save_validation_result(
    student_id: u32,
    project_id: u32,
    files: &[FileDescriptor],
    result: &serde_json::Value,
    pool: &SqlitePool,
) -> Result<()> {
    let files_json = serde_json::to_string(files)?;
    let result_json = serde_json::to_string(result)?;
    let now = create_timestamp();
    sqlx::query(
        r"
        UPDATE projects
        SET files = ?, last_validation_result = ?, last_validated_at = ?, updated_at = ?
        WHERE student_id = ? AND id = ?
        ",
    )
    .bind(files_json)
    .bind(result_json)
    .bind(&now)
    .bind(&now)
    .bind(student_id as i64)
    .bind(project_id as i64)
    .execute(pool)
    .await?;
    Ok(())
}

/// Returns false when the project does not exist for this student.
pub async fn set_project_published(
    student_id: u32,
    project_id: u32,
    published: bool,
    pool: &SqlitePool,
) -> sqlx::Result<bool> {
    let now = create_timestamp();
    let result = sqlx::query(
        r"
        UPDATE projects SET is_published = ?, updated_at = ?
        WHERE student_id = ? AND id = ?
        ",
    )
    .bind(published as i64)
    .bind(now)
    .bind(student_id as i64)
    .bind(project_id as i64)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}
