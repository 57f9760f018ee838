//! Template rendering on minijinja.
//!
//! One [`TemplateEngine`] holds every template of a job, compiled up front
//! under its location name (`subject`, `to[0].email`, ...). Rendering is
//! strict: an undefined name is an error, never an empty string.
//!
//! Besides the builtin Jinja filters the engine provides
//! `format_timestamp` and `format_date_timestamp`, and, once a data source
//! is attached, the `q(sql)` global returning rows as attribute objects.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::{Arc, LazyLock};

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, Utc};
use chrono_tz::Tz;
use minijinja::value::ValueKind;
use minijinja::{AutoEscape, Environment, ErrorKind, UndefinedBehavior};
use regex::Regex;
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::error::{DatabaseError, TemplateError};
use crate::expr::Value;
use crate::merge::context::Context;
use crate::store::{DataSource, Record, Row};

/// Globals minijinja provides itself, plus `q`.
const KNOWN_GLOBALS: &[&str] = &["range", "dict", "debug", "namespace", "loop", "q"];

// ── Engine ──────────────────────────────────────────────────────────

/// The template environment of one job.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl std::fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateEngine").finish_non_exhaustive()
    }
}

impl TemplateEngine {
    /// Strict environment with the timestamp filters. `timezone` controls
    /// `format_timestamp`; without it timestamps use the system's local time.
    pub fn new(timezone: Option<Tz>) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_formatter(|out, state, value| {
            // Python spelling for the scalars row data most often carries.
            let spelled = match value.kind() {
                ValueKind::Bool if value.is_true() => minijinja::Value::from("True"),
                ValueKind::Bool => minijinja::Value::from("False"),
                ValueKind::None => minijinja::Value::from("None"),
                _ => return minijinja::escape_formatter(out, state, value),
            };
            minijinja::escape_formatter(out, state, &spelled)
        });

        env.add_filter(
            "format_timestamp",
            move |ts: f64, format: Option<String>| -> Result<String, minijinja::Error> {
                let fmt = format.as_deref().unwrap_or("%c");
                let dt = epoch_to_utc(ts)?;
                match timezone {
                    Some(tz) => strftime(&dt.with_timezone(&tz), fmt),
                    None => strftime(&dt.with_timezone(&Local), fmt),
                }
            },
        );
        env.add_filter(
            "format_date_timestamp",
            |ts: f64, format: Option<String>| -> Result<String, minijinja::Error> {
                let fmt = format.as_deref().unwrap_or("%Y-%m-%d");
                let date = epoch_to_utc(ts)?.date_naive();
                match date.and_hms_opt(0, 0, 0) {
                    Some(midnight) => strftime(&midnight.and_utc(), fmt),
                    None => Err(filter_error(format!("no midnight on {date}"))),
                }
            },
        );

        Self { env }
    }

    /// Make `q(sql)` available to templates. Each call runs `sql` against
    /// `source` and returns the rows, fields readable as `row.field`.
    ///
    /// Rendering is synchronous, so the query blocks the current worker of a
    /// multi-threaded runtime until it completes.
    pub fn register_query(&mut self, source: Arc<dyn DataSource>) {
        self.env.add_function(
            "q",
            move |sql: String| -> Result<minijinja::Value, minijinja::Error> {
                let rows = query_blocking(source.as_ref(), &sql).map_err(|e| {
                    minijinja::Error::new(ErrorKind::InvalidOperation, format!("q() failed: {e}"))
                })?;
                Ok(minijinja::Value::from(
                    rows.iter().map(record_value).collect::<Vec<_>>(),
                ))
            },
        );
    }
}

fn query_blocking(source: &dyn DataSource, sql: &str) -> Result<Vec<Row>, DatabaseError> {
    let handle = Handle::try_current()
        .map_err(|_| DatabaseError::Query("no tokio runtime available".into()))?;
    if handle.runtime_flavor() == RuntimeFlavor::CurrentThread {
        return Err(DatabaseError::Query(
            "queries from templates need the multi-threaded runtime".into(),
        ));
    }
    tokio::task::block_in_place(|| handle.block_on(source.execute_query(sql)))
}

// ── Values ──────────────────────────────────────────────────────────

fn jinja_value(value: &Value) -> minijinja::Value {
    match value {
        Value::None => minijinja::Value::from(()),
        Value::Bool(b) => minijinja::Value::from(*b),
        Value::Int(n) => minijinja::Value::from(*n),
        Value::Float(x) => minijinja::Value::from(*x),
        Value::Str(s) => minijinja::Value::from(s.as_str()),
        Value::List(items) => {
            minijinja::Value::from(items.iter().map(jinja_value).collect::<Vec<_>>())
        }
    }
}

fn record_value(record: &Record) -> minijinja::Value {
    let fields: BTreeMap<&str, minijinja::Value> =
        record.iter().map(|(k, v)| (k, jinja_value(v))).collect();
    minijinja::Value::from_serialize(&fields)
}

// ── Timestamp filters ───────────────────────────────────────────────

fn filter_error(message: String) -> minijinja::Error {
    minijinja::Error::new(ErrorKind::InvalidOperation, message)
}

fn epoch_to_utc(secs: f64) -> Result<DateTime<Utc>, minijinja::Error> {
    if !secs.is_finite() {
        return Err(filter_error(format!("timestamp {secs} is not a finite number")));
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
        .ok_or_else(|| filter_error(format!("timestamp {secs} is out of range")))
}

fn strftime<T>(dt: &DateTime<T>, fmt: &str) -> Result<String, minijinja::Error>
where
    T: chrono::TimeZone,
    T::Offset: std::fmt::Display,
{
    let items: Vec<Item<'_>> = StrftimeItems::new(fmt).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(filter_error(format!("invalid format string '{fmt}'")));
    }
    let mut out = String::new();
    write!(out, "{}", dt.format_with_items(items.into_iter()))
        .map_err(|_| filter_error(format!("cannot apply '{fmt}' to this timestamp")))?;
    Ok(out)
}

// ── Templates ───────────────────────────────────────────────────────

/// Handle to a template compiled into a [`TemplateEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    name: String,
}

impl Template {
    /// Compile `source` under `name`. Syntax errors surface here.
    pub fn compile(
        engine: &mut TemplateEngine,
        name: impl Into<String>,
        source: &str,
    ) -> Result<Self, TemplateError> {
        let name = name.into();
        engine
            .env
            .add_template_owned(name.clone(), source.to_string())
            .map_err(|e| TemplateError::Syntax(e.to_string()))?;
        Ok(Self { name })
    }

    /// Render against `context`. Rendering never mutates the template.
    pub fn render(&self, context: &Context, engine: &TemplateEngine) -> Result<String, TemplateError> {
        let template = engine
            .env
            .get_template(&self.name)
            .map_err(|e| TemplateError::Render(e.to_string()))?;
        let values: BTreeMap<&str, minijinja::Value> =
            context.iter().map(|(k, v)| (k, jinja_value(v))).collect();

        template.render(&values).map_err(|e| match e.kind() {
            ErrorKind::UndefinedError => {
                let missing = template
                    .undeclared_variables(false)
                    .into_iter()
                    .filter(|name| !context.contains(name) && !KNOWN_GLOBALS.contains(&name.as_str()))
                    .collect::<BTreeSet<_>>();
                match missing.into_iter().next() {
                    Some(name) => TemplateError::Undefined(name),
                    None => TemplateError::Undefined(e.detail().unwrap_or("value").to_string()),
                }
            }
            _ => TemplateError::Render(e.to_string()),
        })
    }
}

// ── Subject / body conventions ──────────────────────────────────────

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static pattern"));

/// Render a subject line: every run of whitespace becomes one space.
pub fn render_subject(
    template: &Template,
    context: &Context,
    engine: &TemplateEngine,
) -> Result<String, TemplateError> {
    let text = template.render(context, engine)?;
    Ok(WHITESPACE_RUN.replace_all(&text, " ").into_owned())
}

/// Render a message body with surrounding whitespace removed.
pub fn render_body(
    template: &Template,
    context: &Context,
    engine: &TemplateEngine,
) -> Result<String, TemplateError> {
    Ok(template.render(context, engine)?.trim().to_string())
}
