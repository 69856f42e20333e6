//! Path screening for file actions.
//!
//! The gate inspects proposals, not the sandbox's filesystem, so checks
//! are purely lexical: traversal sequences and forbidden prefixes.

/// Why a path was flagged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathViolation {
    #[error("Path '{path}' is inside forbidden location '{pattern}'")]
    Forbidden { path: String, pattern: String },

    #[error("Path traversal detected in '{path}'")]
    Traversal { path: String },
}

/// Screen `path` against `forbidden_paths`.
///
/// Comparison is case-insensitive, `~` is expanded on both sides, and a
/// forbidden entry matches itself and anything below it (`/etc` matches
/// `/etc/passwd` but not `/etcetera`).
pub fn check_path(path: &str, forbidden_paths: &[String]) -> Result<(), PathViolation> {
    let normalized = normalize(path);
    if normalized.split('/').any(|segment| segment == "..") {
        return Err(PathViolation::Traversal { path: path.into() });
    }

    for forbidden in forbidden_paths {
        let prefix = normalize(forbidden);
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            continue;
        }
        let inside = normalized == prefix
            || normalized
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'));
        if inside {
            return Err(PathViolation::Forbidden {
                path: path.into(),
                pattern: forbidden.clone(),
            });
        }
    }
    Ok(())
}

fn normalize(path: &str) -> String {
    expand_tilde(path.trim()).replace('\\', "/").to_lowercase()
}

/// Expand ~ to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if (path.starts_with("~/") || path == "~")
        && let Some(home) = home_dir()
    {
        return path.replacen('~', &home, 1);
    }
    path.to_string()
}

fn home_dir() -> Option<String> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE").ok()
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME").ok()
    }
}
