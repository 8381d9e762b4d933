use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::timeout;

use super::{FileDescriptor, Result, clean_relative_path};

const DEFAULT_ENTRYPOINT: &str = "main.py";

/// Outcome of one subprocess execution.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
    /// Wall-clock seconds, recorded regardless of outcome.
    pub duration: f64,
}

fn interpreter() -> String {
    std::env::var("CODELAB_PYTHON").unwrap_or_else(|_| "python3".to_string())
}

/// Materializes a sanitized manifest into an ephemeral directory and runs the
/// entrypoint as a subprocess with `stdin` piped in.
///
/// The time limit is a hard wall-clock kill: on expiry the process is
/// terminated, `timed_out` is set, `exit_code` is `-1`, and whatever partial
/// output the process had flushed is still returned. The directory is removed
/// on every exit path.
///
/// `files` must already have passed the sanitizer; the entrypoint is cleaned
/// here with the same rule so a misconfigured entrypoint cannot escape the
/// execution root either.
pub async fn run_files(
    files: &[FileDescriptor],
    entrypoint: &str,
    stdin: Option<&str>,
    time_limit: Duration,
) -> Result<ExecutionResult> {
    let entrypoint = if entrypoint.is_empty() {
        DEFAULT_ENTRYPOINT
    } else {
        entrypoint
    };
    let entrypoint = clean_relative_path(entrypoint)?;

    // Removed when dropped, on success, error, and timeout alike.
    let dir = tempfile::tempdir()?;
    let root = dir.path();

    for file in files {
        let path = root.join(&file.name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &file.content)?;
    }

    // Make the execution root importable for multi-file submissions.
    let python_path = match std::env::var("PYTHONPATH") {
        Ok(existing) if !existing.is_empty() => format!("{}:{existing}", root.display()),
        _ => root.display().to_string(),
    };

    let start = Instant::now();
    let mut child = Command::new(interpreter())
        .arg(&entrypoint)
        .current_dir(root)
        .env("PYTHONUNBUFFERED", "1")
        .env("PYTHONPATH", python_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    // Drain both pipes concurrently with the wait so a chatty program cannot
    // deadlock on a full pipe buffer. The readers finish once the pipes close,
    // which the kill on timeout also guarantees.
    let stdout_task = child.stdout.take().map(|mut pipe| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf).await;
            buf
        })
    });
    let stderr_task = child.stderr.take().map(|mut pipe| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf).await;
            buf
        })
    });

    // Feed stdin from its own task: a payload larger than the pipe buffer
    // must never block this future before the timeout below is armed. The
    // program may also exit without reading stdin; a broken pipe here is not
    // a sandbox failure, and the kill on timeout breaks the pipe the same way.
    if let Some(mut handle) = child.stdin.take() {
        let payload = stdin.unwrap_or_default().as_bytes().to_vec();
        tokio::spawn(async move {
            let _ = handle.write_all(&payload).await;
            let _ = handle.shutdown().await;
        });
    }

    let (timed_out, exit_code) = match timeout(time_limit, child.wait()).await {
        Ok(status) => {
            let status = status?;
            (false, status.code().unwrap_or(-1))
        }
        Err(_) => {
            let _ = child.kill().await;
            (true, -1)
        }
    };
    let duration = start.elapsed().as_secs_f64();

    let stdout = match stdout_task {
        Some(task) => task.await.unwrap_or_default(),
        None => Vec::new(),
    };
    let stderr = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => Vec::new(),
    };

    Ok(ExecutionResult {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code,
        timed_out,
        duration,
    })
}
