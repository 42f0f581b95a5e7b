//! Built-in template functions

use super::{RenderContext, Value};
use crate::error::Error;
use crate::types::SecretReference;
use base64::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    /// `env(name)`: process environment variable, which must be set
    Env,
    /// `op(account, vault, item, field)`: secret lookup
    Op,
    /// `indent(spaces, text)`: prefix every line
    Indent,
    /// `quote(text)`: single-quote, doubling inner quotes
    Quote,
    /// `replace(old, new, text)`
    Replace,
    /// `base64(text)`: standard alphabet, padded
    Base64,
}

pub(crate) enum CallError {
    Message(String),
    Lookup(Error),
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "env" => Some(Self::Env),
            "op" => Some(Self::Op),
            "indent" => Some(Self::Indent),
            "quote" => Some(Self::Quote),
            "replace" => Some(Self::Replace),
            "base64" => Some(Self::Base64),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Env => "env",
            Self::Op => "op",
            Self::Indent => "indent",
            Self::Quote => "quote",
            Self::Replace => "replace",
            Self::Base64 => "base64",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Self::Env | Self::Quote | Self::Base64 => 1,
            Self::Indent => 2,
            Self::Replace => 3,
            Self::Op => 4,
        }
    }

    /// Apply the function. Arity was checked at parse time.
    pub async fn call(self, ctx: &RenderContext<'_>, args: Vec<Value>) -> Result<Value, CallError> {
        let mut args = args.into_iter().map(Value::into_string);
        let mut arg = || args.next().unwrap_or_default();

        match self {
            Self::Env => {
                let name = arg();
                match std::env::var(&name) {
                    Ok(value) if !value.is_empty() => Ok(Value::Str(value)),
                    _ => Err(CallError::Message(format!(
                        "environment variable {} is not set",
                        name
                    ))),
                }
            }
            Self::Op => {
                let reference = SecretReference::new(arg(), arg(), arg(), arg());
                tokio::select! {
                    _ = ctx.cancel.cancelled() => Err(CallError::Lookup(Error::Cancelled)),
                    result = ctx.lookup.lookup(&reference) => {
                        result.map(Value::Str).map_err(CallError::Lookup)
                    }
                }
            }
            Self::Indent => {
                let spaces = arg();
                let spaces: usize = spaces.trim().parse().map_err(|_| {
                    CallError::Message(format!("width must be a non-negative integer, got '{}'", spaces))
                })?;
                let text = arg();
                let pad = " ".repeat(spaces);
                Ok(Value::Str(format!("{}{}", pad, text.replace('\n', &format!("\n{}", pad)))))
            }
            Self::Quote => Ok(Value::Str(format!("'{}'", arg().replace('\'', "''")))),
            Self::Replace => {
                let (old, new, text) = (arg(), arg(), arg());
                if old.is_empty() {
                    return Ok(Value::Str(text));
                }
                Ok(Value::Str(text.replace(&old, &new)))
            }
            Self::Base64 => Ok(Value::Str(
                base64::engine::general_purpose::STANDARD.encode(arg().as_bytes()),
            )),
        }
    }
}
