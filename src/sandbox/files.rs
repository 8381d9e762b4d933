use serde::{Deserialize, Serialize};

use super::{CodingError, Result};

/// Maximum number of files accepted in one manifest.
pub const MAX_FILE_COUNT: usize = 25;

/// Maximum UTF-8 byte length of a single file's content.
pub const MAX_FILE_BYTES: usize = 200_000;

/// A file entry as submitted by the client editor, before sanitization.
///
/// Clients may send either `name` or `path`; `language` is an opaque editor
/// tag and never influences how the file is executed.
#[derive(Deserialize, Debug, Clone)]
pub struct RawFile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

/// A sanitized file, safe to materialize below an execution root.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub language: String,
}

/// Normalizes a file name into a relative, traversal-free path.
///
/// Backslashes are converted to `/`, empty and `.` segments are dropped, and
/// any `..` segment or absolute path is rejected outright rather than
/// clamped. Every name accepted here resolves strictly inside whatever root
/// it is later joined to.
pub fn clean_relative_path(raw_name: &str) -> Result<String> {
    let candidate = raw_name.trim();
    if candidate.is_empty() {
        return Err(CodingError::InvalidInput(
            "File name cannot be empty.".to_string(),
        ));
    }

    // Normalize Windows-style separators before validation.
    let candidate = candidate.replace('\\', "/");
    if candidate.starts_with('/') {
        return Err(CodingError::InvalidInput(
            "File name must be relative.".to_string(),
        ));
    }

    let mut cleaned_parts = Vec::new();
    for part in candidate.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                return Err(CodingError::InvalidInput(
                    "File name cannot traverse directories.".to_string(),
                ));
            }
            part => cleaned_parts.push(part),
        }
    }

    if cleaned_parts.is_empty() {
        return Err(CodingError::InvalidInput(
            "File name must reference a valid path segment.".to_string(),
        ));
    }

    Ok(cleaned_parts.join("/"))
}

fn sanitize_entry(name: Option<&str>, content: &str, language: &str) -> Result<FileDescriptor> {
    let name = name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| CodingError::InvalidInput("Each file requires a non-empty name.".to_string()))?;
    let safe_name = clean_relative_path(name)?;

    if content.len() > MAX_FILE_BYTES {
        return Err(CodingError::InvalidInput(
            "File content exceeds the 200kB limit.".to_string(),
        ));
    }

    Ok(FileDescriptor {
        name: safe_name,
        content: content.to_string(),
        language: language.to_string(),
    })
}

fn check_manifest_bounds(files: &[FileDescriptor]) -> Result<()> {
    if files.is_empty() {
        return Err(CodingError::InvalidInput(
            "At least one file is required for execution.".to_string(),
        ));
    }
    if files.len() > MAX_FILE_COUNT {
        return Err(CodingError::InvalidInput(
            "Too many files supplied for execution.".to_string(),
        ));
    }
    Ok(())
}

/// Sanitizes a client-submitted manifest.
///
/// This is the single security-critical gate of the sandbox: every execution
/// entry point must route its files through here (or [`resanitize`]) before
/// anything touches disk.
pub fn sanitize_files(files: &[RawFile]) -> Result<Vec<FileDescriptor>> {
    let mut sanitized = Vec::with_capacity(files.len());
    for raw in files {
        // A blank `name` falls back to `path`, like the editors send it.
        let name = raw
            .name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or(raw.path.as_deref());
        sanitized.push(sanitize_entry(
            name,
            raw.content.as_deref().unwrap_or(""),
            raw.language.as_deref().unwrap_or(""),
        )?);
    }
    check_manifest_bounds(&sanitized)?;
    Ok(sanitized)
}

/// Re-applies all sanitizer rules to an already-typed manifest.
///
/// Used for manifests loaded from storage or challenge configuration, which
/// are not trusted any further than fresh client input.
pub fn resanitize(files: &[FileDescriptor]) -> Result<Vec<FileDescriptor>> {
    let mut sanitized = Vec::with_capacity(files.len());
    for file in files {
        sanitized.push(sanitize_entry(Some(&file.name), &file.content, &file.language)?);
    }
    check_manifest_bounds(&sanitized)?;
    Ok(sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn raw(name: &str, content: &str) -> RawFile {
        RawFile {
            name: Some(name.to_string()),
            path: None,
            content: Some(content.to_string()),
            language: None,
        }
    }

    #[test]
    fn cleans_redundant_segments() {
        assert_eq!(clean_relative_path("./a/./b.py").unwrap(), "a/b.py");
        assert_eq!(clean_relative_path("a//b.py").unwrap(), "a/b.py");
        assert_eq!(clean_relative_path("  main.py  ").unwrap(), "main.py");
    }

    #[test]
    fn normalizes_backslash_separators() {
        assert_eq!(clean_relative_path("pkg\\mod.py").unwrap(), "pkg/mod.py");
    }

    #[test]
    fn rejects_traversal_anywhere() {
        for name in ["../x.py", "a/../../b.py", "..", "a/..", "..\\x.py"] {
            assert!(
                matches!(clean_relative_path(name), Err(CodingError::InvalidInput(_))),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_absolute_paths() {
        for name in ["/etc/passwd", "/x.py", "\\windows\\system32"] {
            assert!(
                matches!(clean_relative_path(name), Err(CodingError::InvalidInput(_))),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_names_with_no_usable_segment() {
        for name in ["", "   ", ".", "./.", "//"] {
            assert!(clean_relative_path(name).is_err(), "{name:?} should be rejected");
        }
    }

    #[test]
    fn accepts_path_as_name_fallback() {
        let files = [RawFile {
            name: None,
            path: Some("lib/util.py".to_string()),
            content: Some("x = 1".to_string()),
            language: Some("python".to_string()),
        }];
        let sanitized = sanitize_files(&files).unwrap();
        assert_eq!(sanitized[0].name, "lib/util.py");
        assert_eq!(sanitized[0].language, "python");
    }

    #[test]
    fn rejects_entry_without_name() {
        let files = [RawFile {
            name: None,
            path: None,
            content: Some(String::new()),
            language: None,
        }];
        assert!(sanitize_files(&files).is_err());
    }

    #[test]
    fn enforces_content_size_bound() {
        let at_limit = [raw("big.py", &"a".repeat(MAX_FILE_BYTES))];
        assert!(sanitize_files(&at_limit).is_ok());

        let over_limit = [raw("big.py", &"a".repeat(MAX_FILE_BYTES + 1))];
        assert!(sanitize_files(&over_limit).is_err());
    }

    #[test]
    fn size_bound_counts_utf8_bytes() {
        // 66,667 three-byte characters: 200,001 bytes.
        let over = "\u{4e00}".repeat(MAX_FILE_BYTES / 3 + 1);
        assert!(sanitize_files(&[raw("cjk.py", &over)]).is_err());
    }

    #[test]
    fn enforces_manifest_count_bounds() {
        assert!(sanitize_files(&[]).is_err());

        let full: Vec<RawFile> = (0..MAX_FILE_COUNT)
            .map(|i| raw(&format!("f{i}.py"), &"a".repeat(MAX_FILE_BYTES)))
            .collect();
        assert_eq!(sanitize_files(&full).unwrap().len(), MAX_FILE_COUNT);

        let mut overfull = full;
        overfull.push(raw("extra.py", ""));
        assert!(sanitize_files(&overfull).is_err());
    }

    #[test]
    fn resanitize_applies_same_rules() {
        let stored = [FileDescriptor {
            name: "../escape.py".to_string(),
            content: String::new(),
            language: String::new(),
        }];
        assert!(resanitize(&stored).is_err());

        let ok = [FileDescriptor {
            name: "sub\\main.py".to_string(),
            content: "print(1)".to_string(),
            language: String::new(),
        }];
        assert_eq!(resanitize(&ok).unwrap()[0].name, "sub/main.py");
    }
}
