//! Writing rendered templates to disk

use crate::error::{Error, Result};
use crate::files::write_atomic;
use chrono::{DateTime, SecondsFormat, Utc};
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Comment syntax for the generated-file banner, chosen from the destination extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentStyle {
    /// `# ...` (shell, YAML, TOML, dotenv, HCL, and the default)
    Hash,
    /// `// ...`
    Slash,
    /// `-- ...`
    Dash,
    /// `<!-- ... -->`
    Markup,
    /// The format has no comments (JSON); no banner is written
    None,
}

impl CommentStyle {
    pub fn for_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "json" => Self::None,
            "js" | "mjs" | "cjs" | "ts" | "jsonc" | "json5" | "go" | "rs" | "java" | "kt"
            | "c" | "h" | "cpp" | "cs" | "swift" | "scala" => Self::Slash,
            "sql" | "lua" | "hs" => Self::Dash,
            "xml" | "html" | "htm" | "svg" | "plist" => Self::Markup,
            _ => Self::Hash,
        }
    }

    fn wrap(self, text: &str) -> Option<String> {
        match self {
            Self::Hash => Some(format!("# {}", text)),
            Self::Slash => Some(format!("// {}", text)),
            Self::Dash => Some(format!("-- {}", text)),
            Self::Markup => Some(format!("<!-- {} -->", text)),
            Self::None => None,
        }
    }
}

/// Banner line for a file generated from `source` at `generated_at`
pub fn banner(source: &Path, destination: &Path, generated_at: DateTime<Utc>) -> Option<String> {
    let source_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.display().to_string());

    CommentStyle::for_path(destination).wrap(&format!(
        "Generated by brokkr from {} at {}. DO NOT EDIT.",
        source_name,
        generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    ))
}

/// Write `rendered` to `destination`, banner first (after a `#!` line if
/// present). The file is replaced atomically and is readable by the owner
/// only, since it holds secrets.
pub fn write_rendered(destination: &Path, banner: Option<&str>, rendered: &[u8]) -> Result<()> {
    let mut content = Vec::with_capacity(rendered.len() + 128);
    match banner {
        Some(banner) if rendered.starts_with(b"#!") => {
            let split = rendered
                .iter()
                .position(|b| *b == b'\n')
                .map_or(rendered.len(), |i| i + 1);
            content.extend_from_slice(&rendered[..split]);
            if split == rendered.len() && !rendered.ends_with(b"\n") {
                content.push(b'\n');
            }
            writeln!(content, "{}", banner).map_err(|e| Error::io(destination, e))?;
            content.extend_from_slice(&rendered[split..]);
        }
        Some(banner) => {
            writeln!(content, "{}", banner).map_err(|e| Error::io(destination, e))?;
            content.extend_from_slice(rendered);
        }
        None => content.extend_from_slice(rendered),
    }

    write_atomic(destination, &content)?;
    debug!(path = %destination.display(), bytes = content.len(), "Wrote rendered file");
    Ok(())
}
