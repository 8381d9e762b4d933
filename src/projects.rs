use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::sandbox::{CodingError, FileDescriptor, Result};

const STARTER_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>My Project</title>
    <link rel="stylesheet" href="styles.css" />
  </head>
  <body>
    <main class="container">
      <h1>Welcome to your project!</h1>
      <button id="action-btn">Click me</button>
    </main>
    <script src="scripts.js"></script>
  </body>
</html>
"#;

const STARTER_CSS: &str = r#"body {
  font-family: 'Inter', sans-serif;
  background: #f4f4f5;
  margin: 0;
  padding: 2rem;
}

.container {
  max-width: 640px;
  margin: 0 auto;
  background: #ffffff;
  border-radius: 0.75rem;
  padding: 2rem;
  box-shadow: 0 20px 25px -15px rgba(15, 23, 42, 0.25);
}

button {
  background: #0f172a;
  color: white;
  border: none;
  padding: 0.75rem 1.5rem;
  border-radius: 9999px;
  cursor: pointer;
  font-size: 1rem;
}

button:hover {
  background: #1e293b;
}
"#;

const STARTER_JS: &str = r#"const button = document.querySelector('#action-btn');
const headline = document.querySelector('h1');

button?.addEventListener('click', () => {
  const colours = ['#ef4444', '#10b981', '#3b82f6', '#f97316'];
  const next = colours[Math.floor(Math.random() * colours.length)];
  if (headline) {
    headline.style.color = next;
  }
  console.log('Button clicked!');
});
"#;

/// The fixed three-file template a project is seeded with when the client
/// supplies no files of its own.
pub fn default_project_files() -> Vec<FileDescriptor> {
    vec![
        FileDescriptor {
            name: "index.html".to_string(),
            content: STARTER_HTML.to_string(),
            language: "html".to_string(),
        },
        FileDescriptor {
            name: "styles.css".to_string(),
            content: STARTER_CSS.to_string(),
            language: "css".to_string(),
        },
        FileDescriptor {
            name: "scripts.js".to_string(),
            content: STARTER_JS.to_string(),
            language: "javascript".to_string(),
        },
    ]
}

/// Declarative static checks for open-ended project assignments.
///
/// Deliberately separate from the dynamic test-case runner: this grades the
/// structure of a file tree, not program behavior.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ValidationSchema {
    #[serde(default)]
    pub required_files: Vec<String>,
    #[serde(default)]
    pub rules: Vec<ContainsRule>,
}

impl ValidationSchema {
    pub fn is_empty(&self) -> bool {
        self.required_files.is_empty() && self.rules.is_empty()
    }
}

/// Requires every listed substring to appear in the named file.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ContainsRule {
    pub file: String,
    #[serde(default)]
    pub contains: Vec<String>,
}

/// One record per evaluated check.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationDetail {
    RequiredFile {
        file: String,
        passed: bool,
    },
    Contains {
        file: String,
        passed: bool,
        missing: Vec<String>,
    },
}

/// Validates a sanitized manifest against a declarative schema.
///
/// An absent or empty schema passes trivially with no details. A `contains`
/// rule targeting a missing file sees empty content, so every token it lists
/// comes back as missing.
pub fn validate_project_files(
    files: &[FileDescriptor],
    schema: Option<&ValidationSchema>,
) -> Result<(bool, Vec<ValidationDetail>)> {
    let Some(schema) = schema.filter(|s| !s.is_empty()) else {
        return Ok((true, Vec::new()));
    };

    let lookup: HashMap<&str, &str> = files
        .iter()
        .map(|f| (f.name.as_str(), f.content.as_str()))
        .collect();

    let mut details = Vec::new();
    let mut passed = true;

    for filename in &schema.required_files {
        let exists = lookup.contains_key(filename.as_str());
        details.push(ValidationDetail::RequiredFile {
            file: filename.clone(),
            passed: exists,
        });
        passed &= exists;
    }

    for rule in &schema.rules {
        if rule.file.is_empty() {
            return Err(CodingError::InvalidInput(
                "Rule requires a target file.".to_string(),
            ));
        }
        let content = lookup.get(rule.file.as_str()).copied().unwrap_or("");
        let missing: Vec<String> = rule
            .contains
            .iter()
            .filter(|token| !content.contains(token.as_str()))
            .cloned()
            .collect();
        let rule_passed = missing.is_empty();
        details.push(ValidationDetail::Contains {
            file: rule.file.clone(),
            passed: rule_passed,
            missing,
        });
        passed &= rule_passed;
    }

    Ok((passed, details))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn file(name: &str, content: &str) -> FileDescriptor {
        FileDescriptor {
            name: name.to_string(),
            content: content.to_string(),
            language: String::new(),
        }
    }

    #[test]
    fn empty_schema_passes_trivially() {
        let files = [file("index.html", "<p>hi</p>")];
        let (passed, details) = validate_project_files(&files, None).unwrap();
        assert!(passed);
        assert!(details.is_empty());

        let blank = ValidationSchema::default();
        let (passed, details) = validate_project_files(&files, Some(&blank)).unwrap();
        assert!(passed);
        assert!(details.is_empty());
    }

    #[test]
    fn missing_required_file_fails_with_detail() {
        let schema = ValidationSchema {
            required_files: vec!["index.html".to_string(), "scripts.js".to_string()],
            rules: vec![ContainsRule {
                file: "index.html".to_string(),
                contains: vec!["<button".to_string()],
            }],
        };
        let files = [file("index.html", "<button id=\"b\">go</button>")];

        let (passed, details) = validate_project_files(&files, Some(&schema)).unwrap();
        assert!(!passed);
        assert_eq!(
            details,
            vec![
                ValidationDetail::RequiredFile {
                    file: "index.html".to_string(),
                    passed: true,
                },
                ValidationDetail::RequiredFile {
                    file: "scripts.js".to_string(),
                    passed: false,
                },
                ValidationDetail::Contains {
                    file: "index.html".to_string(),
                    passed: true,
                    missing: vec![],
                },
            ]
        );
    }

    #[test]
    fn contains_rule_on_missing_file_reports_all_tokens() {
        let schema = ValidationSchema {
            required_files: vec![],
            rules: vec![ContainsRule {
                file: "scripts.js".to_string(),
                contains: vec!["console.log".to_string(), "addEventListener".to_string()],
            }],
        };
        let files = [file("index.html", "<p></p>")];

        let (passed, details) = validate_project_files(&files, Some(&schema)).unwrap();
        assert!(!passed);
        assert_eq!(
            details,
            vec![ValidationDetail::Contains {
                file: "scripts.js".to_string(),
                passed: false,
                missing: vec!["console.log".to_string(), "addEventListener".to_string()],
            }]
        );
    }

    #[test]
    fn rule_without_target_file_is_invalid() {
        let schema = ValidationSchema {
            required_files: vec![],
            rules: vec![ContainsRule {
                file: String::new(),
                contains: vec![],
            }],
        };
        assert!(validate_project_files(&[], Some(&schema)).is_err());
    }

    #[test]
    fn starter_template_satisfies_its_own_schema() {
        let schema = ValidationSchema {
            required_files: vec![
                "index.html".to_string(),
                "styles.css".to_string(),
                "scripts.js".to_string(),
            ],
            rules: vec![
                ContainsRule {
                    file: "index.html".to_string(),
                    contains: vec!["<button".to_string()],
                },
                ContainsRule {
                    file: "scripts.js".to_string(),
                    contains: vec!["console.log".to_string()],
                },
            ],
        };
        let files = default_project_files();
        let (passed, _) = validate_project_files(&files, Some(&schema)).unwrap();
        assert!(passed);
    }
}
