//! Time-series writer backed by the InfluxDB v2 HTTP write API
//!
//! Points are encoded as line protocol with second precision and written
//! synchronously in one request per call.

use crate::config::InfluxConfig;
use crate::error::EtlError;
use crate::models::{FieldValue, TimeSeriesPoint};
use crate::Result;
use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use std::time::Duration;
use tracing::debug;

/// Storage collaborator for time-series points
pub trait TimeSeriesWriter {
    /// Persist `points`, returning how many were written
    fn write(&mut self, points: &[TimeSeriesPoint]) -> Result<usize>;
}

/// InfluxDB v2 writer
pub struct InfluxWriter {
    client: Client,
    write_url: Url,
    token: String,
    timeout: Duration,
}

impl InfluxWriter {
    /// Create a writer; missing credentials fail here, before any write
    pub fn new(config: &InfluxConfig) -> Result<Self> {
        let token = config
            .token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| EtlError::config("Missing INFLUX_TOKEN"))?;
        if config.org.trim().is_empty() {
            return Err(EtlError::config("Missing INFLUX_ORG"));
        }
        if config.bucket.trim().is_empty() {
            return Err(EtlError::config("Missing INFLUX_BUCKET"));
        }

        let endpoint = format!("{}/api/v2/write", config.url.trim_end_matches('/'));
        let write_url = Url::parse_with_params(
            &endpoint,
            [
                ("org", config.org.as_str()),
                ("bucket", config.bucket.as_str()),
                ("precision", "s"),
            ],
        )
        .map_err(|e| EtlError::config(format!("Invalid INFLUX_URL '{}': {e}", config.url)))?;

        let client = Client::builder()
            .build()
            .map_err(|e| EtlError::http("building the Influx client", e))?;

        Ok(Self {
            client,
            write_url,
            token: token.to_string(),
            timeout: Duration::from_secs(config.timeout_seconds),
        })
    }
}

impl TimeSeriesWriter for InfluxWriter {
    fn write(&mut self, points: &[TimeSeriesPoint]) -> Result<usize> {
        if points.is_empty() {
            return Ok(0);
        }

        let body = points
            .iter()
            .map(to_line_protocol)
            .collect::<Vec<_>>()
            .join("\n");

        debug!("Writing {} points to {}", points.len(), self.write_url.path());
        let response = self
            .client
            .post(self.write_url.clone())
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .timeout(self.timeout)
            .body(body)
            .send()
            .map_err(|e| EtlError::http("InfluxDB write", e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(EtlError::write(format!("{status}: {}", detail.trim())));
        }
        Ok(points.len())
    }
}

/// Encode one point as an InfluxDB line-protocol line.
///
/// Tags with empty values are left out of the line, as the protocol has no
/// way to express them.
#[must_use]
pub fn to_line_protocol(point: &TimeSeriesPoint) -> String {
    let mut line = escape_name(point.measurement(), MEASUREMENT_SPECIAL);

    for (key, value) in point.tags() {
        if value.is_empty() {
            continue;
        }
        line.push(',');
        line.push_str(&escape_name(key, KEY_SPECIAL));
        line.push('=');
        line.push_str(&escape_name(value, KEY_SPECIAL));
    }

    let fields: Vec<String> = point
        .fields()
        .iter()
        .map(|(key, value)| {
            let value = match value {
                FieldValue::Float(n) => n.to_string(),
                FieldValue::Text(s) => format!("\"{}\"", escape_string(s)),
            };
            format!("{}={}", escape_name(key, KEY_SPECIAL), value)
        })
        .collect();

    line.push(' ');
    line.push_str(&fields.join(","));
    line.push(' ');
    line.push_str(&point.timestamp().timestamp().to_string());
    line
}

const MEASUREMENT_SPECIAL: &[char] = &[',', ' '];
const KEY_SPECIAL: &[char] = &[',', '=', ' '];

/// Escape a measurement, tag key, tag value or field key.
///
/// Line breaks and tabs are written as `\n`, `\r` and `\t` so a point never
/// spans more than one line. A backslash that would otherwise escape the
/// next separator (or the one after the name) is doubled.
fn escape_name(raw: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\\' if chars.peek().is_none_or(|next| special.contains(next)) => {
                out.push_str("\\\\");
            }
            c if special.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

fn escape_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use rstest::rstest;
    use std::collections::BTreeMap;

    fn point(tags: &[(&str, &str)], fields: &[(&str, FieldValue)]) -> TimeSeriesPoint {
        TimeSeriesPoint::new(
            "forecast_hourly",
            DateTime::parse_from_rfc3339("2024-03-01T10:00:00+01:00").unwrap(),
            tags.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            fields.iter().map(|(k, v)| (k.to_string(), v.clone())).collect::<BTreeMap<_, _>>(),
        )
        .unwrap()
    }

    #[test]
    fn test_line_protocol_basic() {
        let p = point(
            &[("variable", "temperature"), ("place_id", "36057")],
            &[("value", FieldValue::Float(18.5))],
        );
        assert_eq!(
            to_line_protocol(&p),
            "forecast_hourly,place_id=36057,variable=temperature value=18.5 1709283600"
        );
    }

    #[test]
    fn test_line_protocol_escaping_and_empty_tags() {
        let p = point(
            &[("place_name", "A Coruña, Centro"), ("municipality", "")],
            &[
                ("value_str", FieldValue::Text("say \"hi\"".into())),
                ("wind_direction", FieldValue::Float(270.0)),
            ],
        );
        assert_eq!(
            to_line_protocol(&p),
            r#"forecast_hourly,place_name=A\ Coruña\,\ Centro value_str="say \"hi\"",wind_direction=270 1709283600"#
        );

        // provider strings with control characters or stray backslashes
        let p = point(
            &[("grid", "a\\"), ("units", "m\ns"), ("model", "x\\,y\tz")],
            &[("value", FieldValue::Float(1.0))],
        );
        let line = to_line_protocol(&p);
        assert_eq!(
            line,
            r#"forecast_hourly,grid=a\\,model=x\\\,y\tz,units=m\ns value=1 1709283600"#
        );
        assert_eq!(line.lines().count(), 1);
    }

    #[rstest]
    #[case("plain", "plain")]
    #[case("trailing\\", r"trailing\\")]
    #[case("mid\\dle", r"mid\dle")]
    #[case("tab\there", r"tab\there")]
    #[case("cr\rlf\n", r"cr\rlf\n")]
    #[case("a=b c", r"a\=b\ c")]
    fn test_escape_name(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(escape_name(raw, KEY_SPECIAL), expected);
    }

    #[test]
    fn test_writer_requires_credentials() {
        let mut config = InfluxConfig::default();
        assert!(matches!(InfluxWriter::new(&config), Err(EtlError::Config { .. })));

        config.token = Some("token".into());
        config.bucket = String::new();
        let err = InfluxWriter::new(&config).err().unwrap();
        assert!(err.to_string().contains("INFLUX_BUCKET"));

        config.bucket = "meteosix".into();
        let writer = InfluxWriter::new(&config).unwrap();
        assert_eq!(
            writer.write_url.as_str(),
            "http://localhost:8086/api/v2/write?org=hackudc&bucket=meteosix&precision=s"
        );
    }

    #[test]
    fn test_empty_write_is_a_no_op() {
        let mut config = InfluxConfig::default();
        config.token = Some("token".into());
        // unroutable port: a network call would fail
        config.url = "http://127.0.0.1:9".into();
        let mut writer = InfluxWriter::new(&config).unwrap();
        assert_eq!(writer.write(&[]).unwrap(), 0);
    }
}
