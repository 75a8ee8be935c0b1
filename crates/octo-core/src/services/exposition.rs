//! Parser for the Prometheus text exposition format.
//!
//! Enough of the format to read the proxy's `/metrics` page: `# TYPE`
//! declarations, labelled samples, and the special float values. Histogram
//! and summary series (`_bucket`, `_sum`, `_count`) and counter suffixes are
//! grouped under their declared family.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{OrchestratorError, Result};
use crate::models::HealthSample;

static SAMPLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-zA-Z_:][a-zA-Z0-9_:]*)(?:\{(.*)\})?\s+(\S+)(?:\s+-?\d+)?$").unwrap()
});

static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\s*([a-zA-Z_][a-zA-Z0-9_]*)\s*=\s*"((?:[^"\\]|\\.)*)"\s*,?"#).unwrap()
});

const FAMILY_SUFFIXES: &[&str] = &["_bucket", "_sum", "_count", "_total", "_created"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Summary,
    Untyped,
}

impl MetricKind {
    fn parse(kind: &str) -> Self {
        match kind {
            "counter" => MetricKind::Counter,
            "gauge" => MetricKind::Gauge,
            "histogram" => MetricKind::Histogram,
            "summary" => MetricKind::Summary,
            _ => MetricKind::Untyped,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub kind: MetricKind,
    pub samples: Vec<Sample>,
}

/// Parse an exposition payload into metric families, in order of first
/// appearance.
pub fn parse(text: &str) -> Result<Vec<MetricFamily>> {
    let mut families: Vec<MetricFamily> = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line_number = index + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(comment) = line.strip_prefix('#') {
            let mut parts = comment.split_whitespace();
            if parts.next() == Some("TYPE") {
                let (Some(name), Some(kind)) = (parts.next(), parts.next()) else {
                    return Err(malformed(line_number, "incomplete TYPE line"));
                };
                let kind = MetricKind::parse(kind);
                match families.iter_mut().find(|f| f.name == name) {
                    Some(family) => family.kind = kind,
                    None => families.push(MetricFamily {
                        name: name.to_string(),
                        kind,
                        samples: Vec::new(),
                    }),
                }
            }
            continue;
        }

        let sample = parse_sample(line).map_err(|reason| malformed(line_number, &reason))?;
        let family_name = family_for(&families, &sample.name);
        match families.iter_mut().find(|f| f.name == family_name) {
            Some(family) => family.samples.push(sample),
            None => families.push(MetricFamily {
                name: family_name,
                kind: MetricKind::Untyped,
                samples: vec![sample],
            }),
        }
    }

    Ok(families)
}

/// Pick the declared family a sample belongs to, falling back to its own name.
fn family_for(families: &[MetricFamily], sample_name: &str) -> String {
    if families.iter().any(|f| f.name == sample_name) {
        return sample_name.to_string();
    }
    FAMILY_SUFFIXES
        .iter()
        .filter_map(|suffix| sample_name.strip_suffix(suffix))
        .find(|base| families.iter().any(|f| f.name == *base))
        .unwrap_or(sample_name)
        .to_string()
}

fn parse_sample(line: &str) -> std::result::Result<Sample, String> {
    let caps = SAMPLE_RE
        .captures(line)
        .ok_or_else(|| "not a sample line".to_string())?;

    let labels = match caps.get(2) {
        Some(body) => parse_labels(body.as_str())?,
        None => BTreeMap::new(),
    };

    Ok(Sample {
        name: caps[1].to_string(),
        labels,
        value: parse_value(&caps[3])?,
    })
}

fn parse_labels(body: &str) -> std::result::Result<BTreeMap<String, String>, String> {
    let mut labels = BTreeMap::new();
    let mut consumed = 0;
    for caps in LABEL_RE.captures_iter(body) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        if whole.start != consumed {
            return Err(format!("unexpected text in labels: {body}"));
        }
        consumed = whole.end;
        labels.insert(caps[1].to_string(), unescape(&caps[2]));
    }
    if !body[consumed..].trim().is_empty() {
        return Err(format!("unexpected text in labels: {body}"));
    }
    Ok(labels)
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn parse_value(raw: &str) -> std::result::Result<f64, String> {
    match raw {
        "NaN" => Ok(f64::NAN),
        "+Inf" | "Inf" => Ok(f64::INFINITY),
        "-Inf" => Ok(f64::NEG_INFINITY),
        _ => raw
            .parse::<f64>()
            .map_err(|e| format!("invalid value {raw:?}: {e}")),
    }
}

fn malformed(line: usize, reason: &str) -> OrchestratorError {
    OrchestratorError::MetricsParse {
        line,
        reason: reason.to_string(),
    }
}

impl HealthSample {
    /// Collect per-upstream health from the samples of `metric`. An upstream is
    /// healthy only when its sample is exactly 1.
    pub fn from_families(families: &[MetricFamily], metric: &str) -> Self {
        let mut sample = HealthSample::default();
        for family in families.iter().filter(|f| f.name == metric) {
            for s in &family.samples {
                sample.insert(upstream_key(&s.labels), s.value == 1.0);
            }
        }
        sample
    }
}

fn upstream_key(labels: &BTreeMap<String, String>) -> String {
    if let Some(upstream) = labels.get("upstream") {
        return upstream.clone();
    }
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}
