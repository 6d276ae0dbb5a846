//! Executable path expansion and resolution.

use std::path::{Path, PathBuf};

use crate::error::{SupervisorError, SupervisorResult};

/// Expand `%VAR%`, `$VAR`, `${VAR}` and a leading `~`.
///
/// Unknown variables are left in place.
pub fn expand_placeholders(input: &str) -> String {
    let percent_expanded = expand_percent_vars(input);
    shellexpand::full_with_context_no_errors(
        &percent_expanded,
        || dirs::home_dir().map(|home| home.to_string_lossy().into_owned()),
        |var| std::env::var(var).ok(),
    )
    .into_owned()
}

fn expand_percent_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(end) if is_var_name(&after[..end]) => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(value) => out.push_str(&value),
                    Err(_) => {
                        out.push('%');
                        out.push_str(name);
                        out.push('%');
                    }
                }
                rest = &after[end + 1..];
            }
            _ => {
                out.push('%');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Resolve a configured command to a runnable file.
///
/// An existing path must be executable; anything else goes through a `PATH` lookup.
pub fn resolve_executable(raw: &str) -> SupervisorResult<PathBuf> {
    let expanded = expand_placeholders(raw.trim());
    if expanded.is_empty() {
        return Err(SupervisorError::NotFound(raw.to_string()));
    }

    let path = PathBuf::from(&expanded);
    if path.exists() {
        return if is_executable(&path) {
            Ok(path)
        } else {
            Err(SupervisorError::NotExecutable(path))
        };
    }

    which::which(&expanded).map_err(|_| SupervisorError::NotFound(expanded))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
