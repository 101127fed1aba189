use chrono::{NaiveDate, Utc};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;

// used to remove cred info from proxy url before printing
static AUTH_REGEX: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"//[^:/@]+(:[^@]+)?@").unwrap());

pub fn redact_proxy(proxy: &str) -> String {
  AUTH_REGEX.replace(proxy, "//<REDACTED>@").into_owned()
}

/// Formats seconds as `m:ss` or `h:mm:ss`.
pub fn format_duration(secs: f64) -> String {
  if !secs.is_finite() || secs < 0.0 {
    return String::new();
  }

  let total = secs.round() as u64;
  let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
  if h > 0 {
    format!("{h}:{m:02}:{s:02}")
  } else {
    format!("{m}:{s:02}")
  }
}

/// `1234567` -> `1,234,567 views`
pub fn format_views(views: u64) -> String {
  let digits = views.to_string();
  let grouped = digits
    .as_bytes()
    .rchunks(3)
    .rev()
    .map(|chunk| std::str::from_utf8(chunk).unwrap_or_default())
    .join(",");

  let unit = if views == 1 { "view" } else { "views" };
  format!("{grouped} {unit}")
}

/// Turns an extractor upload date (`YYYYMMDD`) into "3 days ago" style
/// recency text.
pub fn upload_recency(upload_date: &str, today: NaiveDate) -> Option<String> {
  let date = NaiveDate::parse_from_str(upload_date, "%Y%m%d").ok()?;
  let days = (today - date).num_days();

  let (n, unit) = match days {
    d if d < 0 => return None,
    0 => return Some("today".to_string()),
    d if d < 7 => (d, "day"),
    d if d < 30 => (d / 7, "week"),
    d if d < 365 => (d / 30, "month"),
    d => (d / 365, "year"),
  };

  let plural = if n == 1 { "" } else { "s" };
  Some(format!("{n} {unit}{plural} ago"))
}

pub fn today() -> NaiveDate {
  Utc::now().date_naive()
}

// the last `n` non-empty lines, for error reporting
pub fn tail_lines(text: &str, n: usize) -> String {
  let lines: Vec<_> = text.lines().filter(|l| !l.trim().is_empty()).collect();
  lines[lines.len().saturating_sub(n)..].join("\n")
}
