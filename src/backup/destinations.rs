//! Backup destination resolution
//!
//! Turns the configured destination strings into absolute, normalized,
//! deduplicated directories. Order is priority: earlier entries win ties when
//! looking for the latest backup. Nothing is created here; the writer creates
//! each directory right before writing into it.

use std::path::{Component, Path, PathBuf};

use crate::config::settings::BackupSettings;

/// Resolve the configured destinations into directories, highest priority first
pub fn resolve(settings: &BackupSettings) -> Vec<PathBuf> {
    let mut resolved: Vec<PathBuf> = Vec::new();

    for raw in &settings.destinations {
        let expanded = expand_env_vars(raw.trim());
        if expanded.is_empty() {
            continue;
        }

        let path = normalize(&absolute(Path::new(&expanded)));
        if !resolved.contains(&path) {
            tracing::debug!(path = %path.display(), "backup destination");
            resolved.push(path);
        }
    }

    resolved
}

/// Expand `$VAR`, `${VAR}` and `%VAR%` placeholders
///
/// Unset variables are left exactly as written.
pub fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find(['$', '%']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        let (name, consumed) = if let Some(braced) = tail.strip_prefix("${") {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 3),
                None => ("", 0),
            }
        } else if let Some(dollar) = tail.strip_prefix('$') {
            let end = dollar
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(dollar.len());
            (&dollar[..end], end + 1)
        } else {
            let percent = &tail[1..];
            match percent.find('%') {
                Some(end) => (&percent[..end], end + 2),
                None => ("", 0),
            }
        };

        if consumed == 0 || name.is_empty() {
            out.push_str(&tail[..1]);
            rest = &tail[1..];
            continue;
        }

        match lookup(name) {
            Some(value) => out.push_str(&value),
            None => out.push_str(&tail[..consumed]),
        }
        rest = &tail[consumed..];
    }

    out.push_str(rest);
    out
}

fn lookup(name: &str) -> Option<String> {
    if name.contains(['=', '\0']) {
        return None;
    }
    std::env::var(name).ok()
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

/// Lexically normalize a path: drop `.`, fold `..`, drop trailing separators
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
