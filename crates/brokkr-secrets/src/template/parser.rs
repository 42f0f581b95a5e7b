//! Template lexer and parser
//!
//! Actions are delimited by `<%` and `%>`; `<%# ... %>` is a comment.
//! Inside an action:
//!
//! ```text
//! pipeline := term ( "|" stage )*
//! term     := STRING | INT | IDENT | IDENT "(" args ")" | "(" pipeline ")"
//! stage    := IDENT | IDENT "(" args ")"
//! args     := [ pipeline ( "," pipeline )* ]
//! ```
//!
//! A bare identifier at the head of a pipeline is a variable; after `|` it is
//! a function, and the piped value becomes its last argument.

use super::functions::Builtin;
use super::RenderError;
use std::fmt;

pub(crate) const OPEN: &str = "<%";
pub(crate) const CLOSE: &str = "%>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    Text(String),
    Action { line: usize, pipeline: Pipeline },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Pipeline {
    pub head: Term,
    pub stages: Vec<Call>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Term {
    Str(String),
    Int(i64),
    Var(String),
    Call(Call),
    Group(Box<Pipeline>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Call {
    pub func: Builtin,
    pub args: Vec<Pipeline>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    LParen,
    RParen,
    Comma,
    Pipe,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "'{}'", name),
            Token::Str(s) => write!(f, "string {:?}", s),
            Token::Int(n) => write!(f, "number {}", n),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::Comma => f.write_str("','"),
            Token::Pipe => f.write_str("'|'"),
        }
    }
}

/// Parse a whole template. Nothing is evaluated here.
pub(crate) fn parse(source: &str) -> Result<Vec<Node>, RenderError> {
    let mut nodes = Vec::new();
    let mut rest = source;
    let mut line = 1;

    while let Some(start) = rest.find(OPEN) {
        let text = &rest[..start];
        if !text.is_empty() {
            nodes.push(Node::Text(text.to_string()));
        }
        line += newlines(text);
        let after = &rest[start + OPEN.len()..];

        if let Some(comment) = after.strip_prefix('#') {
            let end = comment
                .find(CLOSE)
                .ok_or_else(|| RenderError::new(line, "unclosed comment"))?;
            line += newlines(&comment[..end]);
            rest = &comment[end + CLOSE.len()..];
            continue;
        }

        let (tokens, consumed) = lex(after, line)?;
        let pipeline = Parser::new(tokens, line).action()?;
        nodes.push(Node::Action { line, pipeline });
        line += newlines(&after[..consumed]);
        rest = &after[consumed..];
    }

    if !rest.is_empty() {
        nodes.push(Node::Text(rest.to_string()));
    }
    Ok(nodes)
}

fn newlines(s: &str) -> usize {
    s.bytes().filter(|b| *b == b'\n').count()
}

/// Tokenize one action body. Returns the tokens and the number of bytes
/// consumed, including the closing delimiter.
fn lex(src: &str, line: usize) -> Result<(Vec<Token>, usize), RenderError> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '%' if src[i + 1..].starts_with('>') => return Ok((tokens, i + CLOSE.len())),
            c if c.is_whitespace() => {}
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            ',' => tokens.push(Token::Comma),
            '|' => tokens.push(Token::Pipe),
            '"' => {
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some((_, '"')) => break,
                        Some((_, '\\')) => match chars.next() {
                            Some((_, 'n')) => value.push('\n'),
                            Some((_, 't')) => value.push('\t'),
                            Some((_, '"')) => value.push('"'),
                            Some((_, '\\')) => value.push('\\'),
                            Some((_, other)) => {
                                return Err(RenderError::new(
                                    line,
                                    format!("unknown escape '\\{}' in string", other),
                                ))
                            }
                            None => break,
                        },
                        Some((_, ch)) => value.push(ch),
                        None => return Err(RenderError::new(line, "unterminated string")),
                    }
                }
                tokens.push(Token::Str(value));
            }
            '`' => {
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some((_, '`')) => break,
                        Some((_, ch)) => value.push(ch),
                        None => return Err(RenderError::new(line, "unterminated raw string")),
                    }
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_ascii_digit() || (c == '-' && chars.peek().is_some_and(|(_, d)| d.is_ascii_digit())) => {
                let mut digits = c.to_string();
                while let Some((_, d)) = chars.peek().copied().filter(|(_, d)| d.is_ascii_digit()) {
                    digits.push(d);
                    chars.next();
                }
                let n = digits
                    .parse()
                    .map_err(|_| RenderError::new(line, format!("number out of range: {}", digits)))?;
                tokens.push(Token::Int(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut name = c.to_string();
                while let Some((_, ch)) = chars
                    .peek()
                    .copied()
                    .filter(|(_, ch)| ch.is_alphanumeric() || *ch == '_')
                {
                    name.push(ch);
                    chars.next();
                }
                tokens.push(Token::Ident(name));
            }
            other => {
                return Err(RenderError::new(
                    line,
                    format!("unexpected character '{}'", other),
                ))
            }
        }
    }

    Err(RenderError::new(line, format!("unclosed action, missing '{}'", CLOSE)))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    line: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>, line: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            line,
        }
    }

    fn action(mut self) -> Result<Pipeline, RenderError> {
        if self.tokens.is_empty() {
            return Err(self.error("empty action"));
        }
        let pipeline = self.pipeline()?;
        match self.peek() {
            None => Ok(pipeline),
            Some(token) => Err(self.error(format!("unexpected {}", token))),
        }
    }

    fn pipeline(&mut self) -> Result<Pipeline, RenderError> {
        let head = self.term()?;
        let mut stages = Vec::new();
        while self.eat(&Token::Pipe) {
            stages.push(self.stage()?);
        }
        Ok(Pipeline { head, stages })
    }

    fn term(&mut self) -> Result<Term, RenderError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Term::Str(s)),
            Some(Token::Int(n)) => Ok(Term::Int(n)),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    let func = self.builtin(&name)?;
                    let args = self.args()?;
                    self.check_arity(func, args.len())?;
                    Ok(Term::Call(Call { func, args }))
                } else {
                    Ok(Term::Var(name))
                }
            }
            Some(Token::LParen) => {
                let inner = self.pipeline()?;
                self.expect(&Token::RParen)?;
                Ok(Term::Group(Box::new(inner)))
            }
            Some(token) => Err(self.error(format!("unexpected {}", token))),
            None => Err(self.error("unexpected end of action")),
        }
    }

    fn stage(&mut self) -> Result<Call, RenderError> {
        let name = match self.next() {
            Some(Token::Ident(name)) => name,
            Some(token) => return Err(self.error(format!("expected function after '|', found {}", token))),
            None => return Err(self.error("expected function after '|'")),
        };
        let func = self.builtin(&name)?;
        let args = if self.peek() == Some(&Token::LParen) {
            self.args()?
        } else {
            Vec::new()
        };
        self.check_arity(func, args.len() + 1)?;
        Ok(Call { func, args })
    }

    fn args(&mut self) -> Result<Vec<Pipeline>, RenderError> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.pipeline()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(&Token::RParen)?;
            return Ok(args);
        }
    }

    fn builtin(&self, name: &str) -> Result<Builtin, RenderError> {
        Builtin::from_name(name).ok_or_else(|| self.error(format!("unknown function '{}'", name)))
    }

    fn check_arity(&self, func: Builtin, given: usize) -> Result<(), RenderError> {
        if given == func.arity() {
            Ok(())
        } else {
            Err(self.error(format!(
                "{} takes {} argument{}, got {}",
                func.name(),
                func.arity(),
                if func.arity() == 1 { "" } else { "s" },
                given
            )))
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), RenderError> {
        if self.eat(expected) {
            return Ok(());
        }
        match self.peek() {
            Some(found) => Err(self.error(format!("expected {}, found {}", expected, found))),
            None => Err(self.error(format!("expected {}", expected))),
        }
    }

    fn error(&self, message: impl Into<String>) -> RenderError {
        RenderError::new(self.line, message)
    }
}
