//! Shape checks for untrusted JSON bodies.
//!
//! Each form validator walks a `serde_json::Value`, collects every failure as a
//! [`FieldError`] (dot-joined path + Arabic message) and only returns a typed
//! form when nothing failed. Expected bad input never panics and never
//! short-circuits on the first error.

pub mod family;
pub mod member;
pub mod project;
pub mod subject;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::error::{AppError, AppResult, FieldError};

lazy_static! {
    static ref CIN_RE: Regex = Regex::new(r"(?i)^[A-Z]{1,2}[0-9]+$").unwrap();
    static ref EMAIL_RE: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
    pub(crate) static ref PHONE_RE: Regex = Regex::new(r"^[0-9]{10}$").unwrap();
    pub(crate) static ref TIME_RE: Regex = Regex::new(r"^([0-1][0-9]|2[0-3]):[0-5][0-9]$").unwrap();
}

/// National id: one or two letters followed by digits (`AB123456`).
pub fn is_valid_cin(cin: &str) -> bool {
    CIN_RE.is_match(cin)
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Join a field key onto a parent path.
pub fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps and naive `YYYY-MM-DDTHH:MM:SS[.fff]`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.date())
}

/// Integer identifiers arrive either as JSON numbers or as numeric strings.
pub fn coerce_id(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .and_then(|n| i32::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<i32>().ok(),
        _ => None,
    }
}

pub fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !s.trim().is_empty() => {
            s.trim().parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}

/// Length bounds and messages for a text field. Lengths count characters.
#[derive(Debug, Clone, Copy)]
pub struct Text<'m> {
    pub min: usize,
    pub max: Option<usize>,
    pub min_msg: &'m str,
    pub max_msg: &'m str,
}

impl<'m> Text<'m> {
    pub const fn non_empty(msg: &'m str) -> Self {
        Self { min: 1, max: None, min_msg: msg, max_msg: msg }
    }

    pub const fn at_least(min: usize, msg: &'m str) -> Self {
        Self { min, max: None, min_msg: msg, max_msg: msg }
    }

    pub const fn between(min: usize, max: usize, min_msg: &'m str, max_msg: &'m str) -> Self {
        Self { min, max: Some(max), min_msg, max_msg }
    }
}

fn is_absent(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

/// Error accumulator shared by all form validators.
#[derive(Debug, Default)]
pub struct Checker {
    errors: Vec<FieldError>,
}

impl Checker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError::new(path, message));
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Turn the collected errors into a result; `build` assembles the form
    /// from the per-field options once every field passed.
    pub fn finish<T>(self, build: impl FnOnce() -> Option<T>) -> AppResult<T> {
        if !self.errors.is_empty() {
            return Err(AppError::Validation(self.errors));
        }
        build().ok_or_else(|| AppError::field("", "بيانات غير صالحة"))
    }

    pub fn text(&mut self, obj: &Value, prefix: &str, key: &str, rule: Text) -> Option<String> {
        let path = join(prefix, key);
        match obj.get(key) {
            Some(Value::String(s)) => {
                let len = s.chars().count();
                if len < rule.min {
                    self.fail(path, rule.min_msg);
                    None
                } else if rule.max.is_some_and(|max| len > max) {
                    self.fail(path, rule.max_msg);
                    None
                } else {
                    Some(s.clone())
                }
            }
            _ => {
                self.fail(path, rule.min_msg);
                None
            }
        }
    }

    /// `Some(None)` when the field is missing or null, `None` on a failed check.
    pub fn optional_text(
        &mut self,
        obj: &Value,
        prefix: &str,
        key: &str,
        rule: Text,
    ) -> Option<Option<String>> {
        if is_absent(obj.get(key)) {
            return Some(None);
        }
        self.text(obj, prefix, key, rule).map(Some)
    }

    pub fn matching(
        &mut self,
        obj: &Value,
        prefix: &str,
        key: &str,
        re: &Regex,
        msg: &str,
    ) -> Option<String> {
        match obj.get(key).and_then(Value::as_str) {
            Some(s) if re.is_match(s) => Some(s.to_string()),
            _ => {
                self.fail(join(prefix, key), msg);
                None
            }
        }
    }

    pub fn choice(
        &mut self,
        obj: &Value,
        prefix: &str,
        key: &str,
        options: &[&str],
        msg: &str,
    ) -> Option<String> {
        match obj.get(key).and_then(Value::as_str) {
            Some(s) if options.contains(&s) => Some(s.to_string()),
            _ => {
                self.fail(join(prefix, key), msg);
                None
            }
        }
    }

    pub fn date(&mut self, obj: &Value, prefix: &str, key: &str, msg: &str) -> Option<NaiveDate> {
        match obj.get(key).and_then(Value::as_str).and_then(parse_date) {
            Some(d) => Some(d),
            None => {
                self.fail(join(prefix, key), msg);
                None
            }
        }
    }

    pub fn id(&mut self, obj: &Value, prefix: &str, key: &str, msg: &str) -> Option<i32> {
        match obj.get(key).and_then(coerce_id) {
            Some(id) => Some(id),
            None => {
                self.fail(join(prefix, key), msg);
                None
            }
        }
    }

    pub fn number(&mut self, obj: &Value, prefix: &str, key: &str, msg: &str) -> Option<f64> {
        match obj.get(key).and_then(coerce_number) {
            Some(n) => Some(n),
            None => {
                self.fail(join(prefix, key), msg);
                None
            }
        }
    }

    pub fn boolean(&mut self, obj: &Value, prefix: &str, key: &str, msg: &str) -> Option<bool> {
        match obj.get(key) {
            Some(Value::Bool(b)) => Some(*b),
            _ => {
                self.fail(join(prefix, key), msg);
                None
            }
        }
    }

    /// Required array; `missing_msg` when absent, `type_msg` when not an array.
    pub fn array<'v>(
        &mut self,
        obj: &'v Value,
        prefix: &str,
        key: &str,
        missing_msg: &str,
        type_msg: &str,
    ) -> Option<&'v Vec<Value>> {
        match obj.get(key) {
            Some(Value::Array(items)) => Some(items),
            None | Some(Value::Null) => {
                self.fail(join(prefix, key), missing_msg);
                None
            }
            Some(_) => {
                self.fail(join(prefix, key), type_msg);
                None
            }
        }
    }

    /// Sub-object; missing or non-object values fail with `msg`.
    pub fn object<'v>(&mut self, obj: &'v Value, prefix: &str, key: &str, msg: &str) -> Option<&'v Value> {
        match obj.get(key) {
            Some(v @ Value::Object(_)) => Some(v),
            _ => {
                self.fail(join(prefix, key), msg);
                None
            }
        }
    }
}

/// Top-level bodies must be JSON objects.
pub fn require_object(input: &Value) -> AppResult<()> {
    if input.is_object() {
        Ok(())
    } else {
        Err(AppError::field("", "تنسيق البيانات غير صحيح"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cin_pattern_is_case_insensitive() {
        assert!(is_valid_cin("AB123456"));
        assert!(is_valid_cin("k45"));
        assert!(!is_valid_cin("ABC123"));
        assert!(!is_valid_cin("123"));
        assert!(!is_valid_cin("AB"));
    }

    #[test]
    fn email_needs_at_and_dot() {
        assert!(is_valid_email("someone@example.org"));
        assert!(!is_valid_email("someone@example"));
        assert!(!is_valid_email("some one@example.org"));
    }

    #[test]
    fn dates_accept_plain_and_iso_forms() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(parse_date("2024-01-01"), Some(expected));
        assert_eq!(parse_date("2024-01-01T10:00:00.000Z"), Some(expected));
        assert_eq!(parse_date("2024-01-01T10:00:00"), Some(expected));
        assert_eq!(parse_date("2024-13-01"), None);
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn ids_coerce_from_numbers_and_numeric_strings() {
        assert_eq!(coerce_id(&json!(7)), Some(7));
        assert_eq!(coerce_id(&json!("42")), Some(42));
        assert_eq!(coerce_id(&json!(3.0)), Some(3));
        assert_eq!(coerce_id(&json!(3.5)), None);
        assert_eq!(coerce_id(&json!("x1")), None);
        assert_eq!(coerce_id(&json!(null)), None);
    }

    #[test]
    fn empty_and_missing_required_text_both_fail() {
        let body = json!({ "name": "" });
        let mut c = Checker::new();
        let rule = Text::non_empty("required");
        assert!(c.text(&body, "", "name", rule).is_none());
        assert!(c.text(&body, "", "other", rule).is_none());
        let paths: Vec<_> = c.errors().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["name", "other"]);
    }

    #[test]
    fn optional_text_accepts_null() {
        let body = json!({ "diplome": null });
        let mut c = Checker::new();
        let rule = Text::at_least(3, "short");
        assert_eq!(c.optional_text(&body, "", "diplome", rule), Some(None));
        assert_eq!(c.optional_text(&body, "", "missing", rule), Some(None));
        assert!(c.is_clean());
    }

    #[test]
    fn finish_reports_every_collected_error() {
        let mut c = Checker::new();
        c.fail("a", "one");
        c.fail("b.0", "two");
        match c.finish(|| Some(())) {
            Err(AppError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
