// SPDX-License-Identifier: PMPL-1.0-or-later
//! CSV rendering and export query parsing.

use super::{DownloadLogRow, TimeRange};
use crate::validator::ValidationError;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

pub const CSV_HEADER: &str = "id,ts,iso,email,path,title,ua,ip,referer";

/// Quote a field when it contains a delimiter, quote or line break.
pub fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// RFC 3339 UTC with millisecond precision; empty when out of range.
pub fn iso_timestamp(ts_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ts_ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

pub fn render_csv(rows: &[DownloadLogRow]) -> String {
    let opt = |value: &Option<String>| csv_field(value.as_deref().unwrap_or_default());

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(CSV_HEADER.to_string());
    for row in rows {
        lines.push(
            [
                csv_field(&row.id),
                row.ts.to_string(),
                iso_timestamp(row.ts),
                csv_field(&row.email),
                csv_field(&row.path),
                opt(&row.title),
                opt(&row.ua),
                opt(&row.ip),
                opt(&row.referer),
            ]
            .join(","),
        );
    }
    lines.join("\n")
}

/// Parse a range bound: epoch milliseconds, `YYYY-MM-DD` (midnight UTC) or RFC 3339.
pub fn parse_bound(field: &'static str, raw: Option<&str>) -> Result<Option<i64>, ValidationError> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };

    if let Ok(ms) = raw.parse::<i64>() {
        return Ok(Some(ms));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(Some(midnight.and_utc().timestamp_millis()));
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(dt.timestamp_millis()));
    }
    Err(ValidationError::InvalidField(field))
}

pub fn parse_limit(raw: Option<&str>) -> Result<Option<usize>, ValidationError> {
    match raw.map(str::trim).filter(|r| !r.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<usize>()
            .map(Some)
            .map_err(|_| ValidationError::InvalidField("limit")),
    }
}

pub fn parse_range(from: Option<&str>, to: Option<&str>) -> Result<TimeRange, ValidationError> {
    Ok(TimeRange {
        from: parse_bound("from", from)?,
        to: parse_bound("to", to)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal RFC 4180 reader for checking the writer.
    fn read_csv_record(line: &str) -> Vec<String> {
        let mut fields = Vec::new();
        let mut current = String::new();
        let mut quoted = false;
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            match (c, quoted) {
                ('"', true) if chars.peek() == Some(&'"') => {
                    current.push('"');
                    chars.next();
                }
                ('"', true) => quoted = false,
                ('"', false) if current.is_empty() => quoted = true,
                (',', false) => fields.push(std::mem::take(&mut current)),
                (c, _) => current.push(c),
            }
        }
        fields.push(current);
        fields
    }

    fn row(title: Option<&str>) -> DownloadLogRow {
        DownloadLogRow {
            id: "r1".into(),
            ts: 1_704_067_200_123,
            email: "a@b.com".into(),
            path: "/assets/cv.pdf".into(),
            title: title.map(Into::into),
            ua: None,
            ip: None,
            referer: None,
        }
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("line\nbreak"), "\"line\nbreak\"");
    }

    #[test]
    fn test_title_with_comma_and_quote_reads_back() {
        let title = "CV, \"final\" version";
        let csv = render_csv(&[row(Some(title))]);
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some(CSV_HEADER));

        let fields = read_csv_record(lines.next().unwrap());
        assert_eq!(fields.len(), 9);
        assert_eq!(fields[5], title);
        assert_eq!(fields[2], "2024-01-01T00:00:00.123Z");
    }

    #[test]
    fn test_empty_export_is_header_only() {
        assert_eq!(render_csv(&[]), CSV_HEADER);
    }

    #[test]
    fn test_parse_bound_formats() {
        assert_eq!(parse_bound("from", None).unwrap(), None);
        assert_eq!(parse_bound("from", Some("")).unwrap(), None);
        assert_eq!(parse_bound("from", Some("1704067200000")).unwrap(), Some(1_704_067_200_000));
        assert_eq!(parse_bound("from", Some("2024-01-01")).unwrap(), Some(1_704_067_200_000));
        assert_eq!(
            parse_bound("to", Some("2024-01-01T01:00:00+01:00")).unwrap(),
            Some(1_704_067_200_000)
        );
        assert_eq!(
            parse_bound("to", Some("yesterday")).unwrap_err(),
            ValidationError::InvalidField("to")
        );
    }

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit(None).unwrap(), None);
        assert_eq!(parse_limit(Some("25")).unwrap(), Some(25));
        assert!(parse_limit(Some("-1")).is_err());
        assert!(parse_limit(Some("many")).is_err());
    }
}
