//! Persisted session tokens
//!
//! A dotenv-style file (`export OP_SESSION_<account>="..."`) shared between
//! processes, so a sign-in in one shell is picked up by the next run.

use crate::error::{Error, Result};
use crate::files::write_atomic;
use crate::security::SecureString;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Name of the environment variable holding the session token for `account`
pub fn session_env_var(account: &str) -> String {
    let suffix: String = account
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("OP_SESSION_{}", suffix)
}

/// Read `var` from the token file. `Ok(None)` if the file has no such entry.
pub fn read_token(path: &Path, var: &str) -> Result<Option<SecureString>> {
    let entries = dotenvy::from_path_iter(path).map_err(|e| dotenv_error(path, e))?;

    for entry in entries {
        let (key, value) = entry.map_err(|e| dotenv_error(path, e))?;
        if key == var {
            let value = SecureString::from(value);
            return Ok((!value.is_empty()).then_some(value));
        }
    }
    Ok(None)
}

/// Store `token` under `var`, keeping every other line of the file.
///
/// The file is replaced atomically and is readable by the owner only.
pub fn write_token(path: &Path, var: &str, token: &str) -> Result<()> {
    let existing = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(Error::io(path, e)),
    };

    let mut content: String = existing
        .lines()
        .filter(|line| !assigns(line, var))
        .flat_map(|line| [line, "\n"])
        .collect();
    content.push_str(&format!("export {}=\"{}\"\n", var, token));

    write_atomic(path, content.as_bytes())?;

    debug!(path = %path.display(), var, "Stored session token");
    Ok(())
}

fn assigns(line: &str, var: &str) -> bool {
    let line = line.trim_start();
    let line = line.strip_prefix("export ").unwrap_or(line).trim_start();
    line.strip_prefix(var)
        .is_some_and(|rest| rest.trim_start().starts_with('='))
}

fn dotenv_error(path: &Path, e: dotenvy::Error) -> Error {
    match e {
        dotenvy::Error::Io(io) => Error::io(path, io),
        other => Error::io(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidData, other.to_string()),
        ),
    }
}
