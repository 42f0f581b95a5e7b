//! Secret-aware text templates
//!
//! Templates use `<% ... %>` for actions so they can sit inside files that
//! already use `{{ }}` (Helm charts, Go templates). A template is parsed in
//! full before anything is evaluated, so a syntax error never leaves a
//! half-rendered result or a half-finished set of vault lookups behind.
//! Variables are strict: referencing one that was not supplied is an error.

mod functions;
mod output;
mod parser;

pub use output::{banner, write_rendered, CommentStyle};

use crate::error::{Error, Result};
use crate::types::SecretReference;
use async_trait::async_trait;
use functions::{Builtin, CallError};
use parser::{Node, Pipeline, Term};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Parse or evaluation failure, with the 1-based line of the action
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct RenderError {
    pub line: usize,
    pub message: String,
}

impl RenderError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Resolves `op(...)` calls during rendering
#[async_trait]
pub trait SecretLookup: Send + Sync {
    async fn lookup(&self, reference: &SecretReference) -> Result<String>;
}

/// Everything an evaluation may touch
pub struct RenderContext<'a> {
    pub lookup: &'a dyn SecretLookup,
    pub vars: &'a HashMap<String, String>,
    pub cancel: &'a CancellationToken,
}

/// Value produced by a template expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Int(i64),
}

impl Value {
    pub fn into_string(self) -> String {
        match self {
            Value::Str(s) => s,
            Value::Int(n) => n.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(n) => write!(f, "{}", n),
        }
    }
}

/// A parsed template, ready to render any number of times
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    pub fn parse(source: &str) -> std::result::Result<Self, RenderError> {
        Ok(Self {
            nodes: parser::parse(source)?,
        })
    }

    /// Number of actions (excluding comments)
    pub fn action_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Action { .. }))
            .count()
    }

    pub async fn render(&self, ctx: &RenderContext<'_>) -> Result<Vec<u8>> {
        let mut out = String::new();
        for node in &self.nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Action { line, pipeline } => {
                    if ctx.cancel.is_cancelled() {
                        return Err(Error::Cancelled);
                    }
                    let value = eval_pipeline(pipeline, ctx, *line).await?;
                    out.push_str(&value.into_string());
                }
            }
        }
        Ok(out.into_bytes())
    }
}

/// Renders templates with a fixed set of base variables
#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer {
    vars: HashMap<String, String>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable visible to every render
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Parse `source` and render it. Per-call `vars` shadow the base ones.
    pub async fn render(
        &self,
        source: &str,
        lookup: &dyn SecretLookup,
        vars: &HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let template = Template::parse(source)?;
        debug!(actions = template.action_count(), "Parsed template");

        let merged;
        let vars = if self.vars.is_empty() {
            vars
        } else {
            merged = self
                .vars
                .iter()
                .chain(vars.iter())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<HashMap<_, _>>();
            &merged
        };

        let ctx = RenderContext {
            lookup,
            vars,
            cancel,
        };
        template.render(&ctx).await
    }
}

type EvalFuture<'a> = Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>>;

fn eval_pipeline<'a>(pipeline: &'a Pipeline, ctx: &'a RenderContext<'a>, line: usize) -> EvalFuture<'a> {
    Box::pin(async move {
        let mut value = eval_term(&pipeline.head, ctx, line).await?;
        for stage in &pipeline.stages {
            let mut args = eval_args(&stage.args, ctx, line).await?;
            args.push(value);
            value = invoke(stage.func, ctx, args, line).await?;
        }
        Ok(value)
    })
}

async fn eval_term<'a>(term: &'a Term, ctx: &'a RenderContext<'a>, line: usize) -> Result<Value> {
    match term {
        Term::Str(s) => Ok(Value::Str(s.clone())),
        Term::Int(n) => Ok(Value::Int(*n)),
        Term::Var(name) => ctx
            .vars
            .get(name)
            .map(|v| Value::Str(v.clone()))
            .ok_or_else(|| RenderError::new(line, format!("undefined variable '{}'", name)).into()),
        Term::Call(call) => {
            let args = eval_args(&call.args, ctx, line).await?;
            invoke(call.func, ctx, args, line).await
        }
        Term::Group(inner) => eval_pipeline(inner, ctx, line).await,
    }
}

async fn eval_args<'a>(
    args: &'a [Pipeline],
    ctx: &'a RenderContext<'a>,
    line: usize,
) -> Result<Vec<Value>> {
    let mut values = Vec::with_capacity(args.len() + 1);
    for arg in args {
        values.push(eval_pipeline(arg, ctx, line).await?);
    }
    Ok(values)
}

async fn invoke(
    func: Builtin,
    ctx: &RenderContext<'_>,
    args: Vec<Value>,
    line: usize,
) -> Result<Value> {
    if ctx.cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    func.call(ctx, args).await.map_err(|e| match e {
        CallError::Lookup(Error::Cancelled) => Error::Cancelled,
        CallError::Lookup(err) => RenderError::new(line, format!("{}: {}", func.name(), err)).into(),
        CallError::Message(message) => {
            RenderError::new(line, format!("{}: {}", func.name(), message)).into()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves `<vault>/<item>/<field>` from a map and counts lookups
    #[derive(Default)]
    struct MapLookup {
        values: HashMap<String, String>,
        calls: AtomicUsize,
    }

    impl MapLookup {
        fn with(pairs: &[(&str, &str)]) -> Self {
            Self {
                values: pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SecretLookup for MapLookup {
        async fn lookup(&self, reference: &SecretReference) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let key = format!("{}/{}/{}", reference.vault, reference.item, reference.field);
            self.values
                .get(&key)
                .cloned()
                .ok_or_else(|| Error::field_not_found(&reference.vault, &reference.item, &reference.field))
        }
    }

    async fn render(source: &str, lookup: &MapLookup, vars: &[(&str, &str)]) -> Result<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let bytes = TemplateRenderer::new()
            .render(source, lookup, &vars, &CancellationToken::new())
            .await?;
        Ok(String::from_utf8(bytes).unwrap())
    }

    #[tokio::test]
    async fn test_text_passes_through() {
        let lookup = MapLookup::default();
        assert_eq!(render("plain {{ helm }}", &lookup, &[]).await.unwrap(), "plain {{ helm }}");
    }

    #[tokio::test]
    async fn test_op_lookup_and_pipeline() {
        let lookup = MapLookup::with(&[("infra/db/password", "it's")]);
        let out = render(
            r#"password: <% op("", "infra", "db", "password") | quote %>"#,
            &lookup,
            &[],
        )
        .await
        .unwrap();
        assert_eq!(out, "password: 'it''s'");
    }

    #[tokio::test]
    async fn test_indent_pads_every_line() {
        let lookup = MapLookup::default();
        let out = render("key: |\n<% cert | indent(2) %>", &lookup, &[("cert", "a\nb")])
            .await
            .unwrap();
        assert_eq!(out, "key: |\n  a\n  b");
    }

    #[tokio::test]
    async fn test_replace_and_base64() {
        let lookup = MapLookup::default();
        let out = render(
            r#"<% replace("-", "_", "a-b-c") %> <% "user:pass" | base64 %>"#,
            &lookup,
            &[],
        )
        .await
        .unwrap();
        assert_eq!(out, "a_b_c dXNlcjpwYXNz");
    }

    #[tokio::test]
    #[serial]
    async fn test_env_function() {
        std::env::set_var("BROKKR_TEMPLATE_TEST", "from-env");
        let lookup = MapLookup::default();
        assert_eq!(
            render(r#"<% env("BROKKR_TEMPLATE_TEST") %>"#, &lookup, &[]).await.unwrap(),
            "from-env"
        );
        std::env::remove_var("BROKKR_TEMPLATE_TEST");

        let err = render(r#"<% env("BROKKR_TEMPLATE_TEST") %>"#, &lookup, &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("BROKKR_TEMPLATE_TEST is not set"));
    }

    #[tokio::test]
    async fn test_undefined_variable_is_error() {
        let lookup = MapLookup::default();
        let err = render("a\n<% missing %>", &lookup, &[]).await.unwrap_err();
        match err {
            Error::Render(e) => {
                assert_eq!(e.line, 2);
                assert!(e.message.contains("undefined variable 'missing'"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_parse_error_prevents_any_lookup() {
        let lookup = MapLookup::with(&[("infra/db/password", "x")]);
        let source = r#"<% op("", "infra", "db", "password") %> <% broken( %>"#;
        assert!(matches!(
            render(source, &lookup, &[]).await,
            Err(Error::Render(_))
        ));
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_lookup_error_names_field() {
        let lookup = MapLookup::default();
        let err = render(r#"<% op("", "infra", "db", "token") %>"#, &lookup, &[])
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("line 1"));
        assert!(message.contains("Field 'token' not found"));
    }

    #[tokio::test]
    async fn test_cancelled_render() {
        let lookup = MapLookup::with(&[("infra/db/password", "x")]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = TemplateRenderer::new()
            .render(
                r#"<% op("", "infra", "db", "password") %>"#,
                &lookup,
                &HashMap::new(),
                &cancel,
            )
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_base_vars_are_shadowed_by_call_vars() {
        let lookup = MapLookup::default();
        let renderer = TemplateRenderer::new()
            .with_var("env_name", "staging")
            .with_var("region", "eu");
        let vars = HashMap::from([("env_name".to_string(), "prod".to_string())]);

        let out = renderer
            .render("<% env_name %>-<% region %>", &lookup, &vars, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, b"prod-eu");
    }
}
