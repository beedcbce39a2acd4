//! Template expressions in configuration values
//!
//! String values may embed `{{ function args }}` expressions, for example
//! `{{user `upcloud_password`}}` or `ubuntu-{{timestamp}}`. Expressions are
//! rendered before values are decoded into [`crate::Config`].

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Interpolation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterpolateError {
    #[error("unterminated expression starting at byte {0}")]
    Unterminated(usize),

    #[error("empty expression")]
    Empty,

    #[error("function {0:?} not defined")]
    UnknownFunction(String),

    #[error("variable {0:?} not set")]
    MissingVariable(String),

    #[error("wrong number of args for {function}: want {expected} got {got}")]
    Arity {
        function: String,
        expected: String,
        got: usize,
    },

    #[error("bad argument: {0}")]
    BadArgument(String),
}

/// Values available to template expressions during a single load
#[derive(Debug, Clone)]
pub struct InterpolateContext {
    /// Variables resolved by `{{user `name`}}`
    pub user_variables: BTreeMap<String, String>,
    /// Value of `{{build_name}}`
    pub build_name: String,
    /// Value of `{{build_type}}`
    pub build_type: String,
    /// Instant used by `{{timestamp}}` and `{{isotime}}`, fixed so every
    /// value in one load sees the same time
    pub now: DateTime<Utc>,
}

impl Default for InterpolateContext {
    fn default() -> Self {
        Self::new()
    }
}

impl InterpolateContext {
    pub fn new() -> Self {
        Self {
            user_variables: BTreeMap::new(),
            build_name: String::new(),
            build_type: String::new(),
            now: Utc::now(),
        }
    }

    /// Render every expression in `template`
    pub fn render(&self, template: &str) -> Result<String, InterpolateError> {
        let mut output = String::with_capacity(template.len());
        let mut rest = template;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            output.push_str(&rest[..start]);
            let after_open = &rest[start + 2..];
            let end = after_open
                .find("}}")
                .ok_or(InterpolateError::Unterminated(offset + start))?;

            output.push_str(&self.evaluate(&after_open[..end])?);

            let consumed = start + 2 + end + 2;
            rest = &rest[consumed..];
            offset += consumed;
        }

        output.push_str(rest);
        Ok(output)
    }

    /// Render every string inside `value`, recursing into arrays and maps.
    /// `path` names the value in error messages.
    pub fn render_value(&self, path: &str, value: &mut Value) -> Result<(), (String, InterpolateError)> {
        match value {
            Value::String(s) => {
                if s.contains("{{") {
                    *s = self.render(s).map_err(|e| (path.to_string(), e))?;
                }
            }
            Value::Array(items) => {
                for (i, item) in items.iter_mut().enumerate() {
                    self.render_value(&format!("{}[{}]", path, i), item)?;
                }
            }
            Value::Object(map) => {
                for (key, item) in map.iter_mut() {
                    self.render_value(&format!("{}.{}", path, key), item)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn evaluate(&self, expression: &str) -> Result<String, InterpolateError> {
        let tokens = tokenize(expression)?;
        let (function, args) = tokens.split_first().ok_or(InterpolateError::Empty)?;

        match function.as_str() {
            "user" => {
                let name = single_arg(function, args)?;
                self.user_variables
                    .get(name)
                    .cloned()
                    .ok_or_else(|| InterpolateError::MissingVariable(name.to_string()))
            }
            "env" => {
                let name = single_arg(function, args)?;
                Ok(std::env::var(name).unwrap_or_default())
            }
            "upper" => Ok(single_arg(function, args)?.to_uppercase()),
            "lower" => Ok(single_arg(function, args)?.to_lowercase()),
            "timestamp" => {
                no_args(function, args)?;
                Ok(self.now.timestamp().to_string())
            }
            "isotime" => match args {
                [] => Ok(self.now.to_rfc3339_opts(SecondsFormat::Secs, true)),
                [format] => format_time(self.now, format),
                _ => Err(InterpolateError::Arity {
                    function: function.clone(),
                    expected: "0 or 1".to_string(),
                    got: args.len(),
                }),
            },
            "uuid" => {
                no_args(function, args)?;
                Ok(uuid::Uuid::new_v4().to_string())
            }
            "build_name" => {
                no_args(function, args)?;
                Ok(self.build_name.clone())
            }
            "build_type" => {
                no_args(function, args)?;
                Ok(self.build_type.clone())
            }
            "pwd" => {
                no_args(function, args)?;
                std::env::current_dir()
                    .map(|dir| dir.display().to_string())
                    .map_err(|e| InterpolateError::BadArgument(format!("cannot read working directory: {}", e)))
            }
            other => Err(InterpolateError::UnknownFunction(other.to_string())),
        }
    }
}

/// Split an expression into a function name followed by quoted arguments
fn tokenize(expression: &str) -> Result<Vec<String>, InterpolateError> {
    let mut tokens = Vec::new();
    let mut chars = expression.trim().chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '`' => {
                chars.next();
                let mut token = String::new();
                loop {
                    match chars.next() {
                        Some('`') => break,
                        Some(ch) => token.push(ch),
                        None => {
                            return Err(InterpolateError::BadArgument(
                                "unterminated raw string".to_string(),
                            ))
                        }
                    }
                }
                tokens.push(token);
            }
            '"' => {
                chars.next();
                let mut token = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(ch) => token.push(ch),
                            None => {
                                return Err(InterpolateError::BadArgument(
                                    "unterminated quoted string".to_string(),
                                ))
                            }
                        },
                        Some(ch) => token.push(ch),
                        None => {
                            return Err(InterpolateError::BadArgument(
                                "unterminated quoted string".to_string(),
                            ))
                        }
                    }
                }
                tokens.push(token);
            }
            _ => {
                let mut token = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || ch == '`' || ch == '"' {
                        break;
                    }
                    token.push(ch);
                    chars.next();
                }
                tokens.push(token);
            }
        }
    }

    Ok(tokens)
}

fn single_arg<'a>(function: &str, args: &'a [String]) -> Result<&'a str, InterpolateError> {
    match args {
        [arg] => Ok(arg),
        _ => Err(InterpolateError::Arity {
            function: function.to_string(),
            expected: "1".to_string(),
            got: args.len(),
        }),
    }
}

fn no_args(function: &str, args: &[String]) -> Result<(), InterpolateError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(InterpolateError::Arity {
            function: function.to_string(),
            expected: "0".to_string(),
            got: args.len(),
        })
    }
}

fn format_time(now: DateTime<Utc>, format: &str) -> Result<String, InterpolateError> {
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(InterpolateError::BadArgument(format!("invalid time format {:?}", format)));
    }
    Ok(now.format_with_items(items.into_iter()).to_string())
}
