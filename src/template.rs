//! Pattern templating for time-based file patterns.
//!
//! A tree root or glob pattern may embed `{{ ... }}` placeholders that are
//! resolved against the current UTC time on every scrape, so a pattern like
//! "current day's log file" never needs reconfiguring:
//!
//! | Expression | Example | Result |
//! |------------|---------|--------|
//! | `now` | `{{now}}` | Unix timestamp in seconds |
//! | `now "<fmt>"` | `{{now "%Y-%m-%d"}}` | strftime-formatted current time |
//! | component | `{{year}}`, `{{month}}`, `{{day}}`, `{{hour}}`, `{{minute}}`, `{{second}}` | zero-padded component of now |
//! | `add A B` / `sub A B` | `{{sub day 1}}` | integer arithmetic, unpadded |
//! | `addmonth N` / `submonth N` | `{{submonth 1}}` | month number shifted by N, unpadded |
//!
//! Month arithmetic is plain integer arithmetic on the month number: it does
//! not wrap around the year boundary. Expansion is a pure function of the
//! template and the clock; nothing is cached between scrapes.

use std::fmt::Write as _;

use chrono::{DateTime, Datelike, Timelike, Utc};

/// Error type for template expansion failures.
#[derive(Debug, Clone)]
pub struct TemplateError {
    pub template: String,
    pub message: String,
}

impl std::fmt::Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Failed to expand template '{}': {}",
            self.template, self.message
        )
    }
}

impl std::error::Error for TemplateError {}

/// Expands all `{{ ... }}` placeholders in `template` against the current
/// UTC time.
pub fn expand(template: &str) -> Result<String, TemplateError> {
    expand_at(template, Utc::now())
}

/// Expands all `{{ ... }}` placeholders against an explicit instant.
///
/// Deterministic for a fixed `now`, which is what makes time-based patterns
/// testable.
pub fn expand_at(template: &str, now: DateTime<Utc>) -> Result<String, TemplateError> {
    let error = |message: String| TemplateError {
        template: template.to_string(),
        message,
    };

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| error("unterminated '{{' placeholder".to_string()))?;
        out.push_str(&eval(after[..end].trim(), now).map_err(error)?);
        rest = &after[end + 2..];
    }
    if rest.contains("}}") {
        return Err(error("'}}' without matching '{{'".to_string()));
    }
    out.push_str(rest);
    Ok(out)
}

/// Evaluates one placeholder expression.
fn eval(expr: &str, now: DateTime<Utc>) -> Result<String, String> {
    let mut words = expr.splitn(2, char::is_whitespace);
    let head = words.next().unwrap_or("");
    let rest = words.next().unwrap_or("").trim();

    match head {
        "" => Err("empty placeholder".to_string()),
        "now" if !rest.is_empty() => format_now(rest, now),
        "add" | "sub" => {
            let (a, b) = two_int_args(rest, now)
                .ok_or_else(|| format!("'{}' expects two integer arguments", head))?;
            let value = if head == "add" {
                a.checked_add(b)
            } else {
                a.checked_sub(b)
            };
            value
                .map(|v| v.to_string())
                .ok_or_else(|| format!("'{}' overflows on {} and {}", head, a, b))
        }
        "addmonth" | "submonth" => {
            let n = one_int_arg(rest, now)
                .ok_or_else(|| format!("'{}' expects one integer argument", head))?;
            let month = i64::from(now.month());
            let value = if head == "addmonth" {
                month.checked_add(n)
            } else {
                month.checked_sub(n)
            };
            value
                .map(|v| v.to_string())
                .ok_or_else(|| format!("'{}' overflows on {}", head, n))
        }
        _ if rest.is_empty() => {
            component(head, now).ok_or_else(|| format!("unknown function '{}'", head))
        }
        _ => Err(format!("unknown function '{}'", head)),
    }
}

/// Formats `now` with a quoted strftime string, e.g. `now "%Y-%m-%d"`.
fn format_now(arg: &str, now: DateTime<Utc>) -> Result<String, String> {
    let fmt = arg
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| "'now' format must be a quoted string".to_string())?;

    // chrono reports a bad specifier as a fmt::Error while rendering; write
    // into a String so the failure surfaces as an expansion error.
    let mut out = String::new();
    write!(out, "{}", now.format(fmt)).map_err(|_| format!("invalid time format '{}'", fmt))?;
    Ok(out)
}

/// Resolves a single atom: an integer literal, `now`, or a time component.
fn atom(word: &str, now: DateTime<Utc>) -> Option<i64> {
    if let Ok(n) = word.parse::<i64>() {
        return Some(n);
    }
    match word {
        "now" => Some(now.timestamp()),
        "year" => Some(i64::from(now.year())),
        "month" => Some(i64::from(now.month())),
        "day" => Some(i64::from(now.day())),
        "hour" => Some(i64::from(now.hour())),
        "minute" => Some(i64::from(now.minute())),
        "second" => Some(i64::from(now.second())),
        _ => None,
    }
}

/// A bare component placeholder, zero-padded for use inside file names.
fn component(word: &str, now: DateTime<Utc>) -> Option<String> {
    match word {
        "now" => Some(now.timestamp().to_string()),
        "year" => Some(format!("{:04}", now.year())),
        "month" => Some(format!("{:02}", now.month())),
        "day" => Some(format!("{:02}", now.day())),
        "hour" => Some(format!("{:02}", now.hour())),
        "minute" => Some(format!("{:02}", now.minute())),
        "second" => Some(format!("{:02}", now.second())),
        _ => None,
    }
}

fn one_int_arg(rest: &str, now: DateTime<Utc>) -> Option<i64> {
    let mut words = rest.split_whitespace();
    let value = atom(words.next()?, now)?;
    if words.next().is_some() {
        return None;
    }
    Some(value)
}

fn two_int_args(rest: &str, now: DateTime<Utc>) -> Option<(i64, i64)> {
    let mut words = rest.split_whitespace();
    let a = atom(words.next()?, now)?;
    let b = atom(words.next()?, now)?;
    if words.next().is_some() {
        return None;
    }
    Some((a, b))
}
