use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::claudit::util::parse_timestamp;

const KEPT_FIELDS: [&str; 6] = [
    "message",
    "timestamp",
    "children",
    "type",
    "toolUseResult",
    "toolResult",
];

const VERBATIM_FIELDS: [&str; 2] = ["timestamp", "type"];

const CONTENT_FIELDS: [&str; 2] = ["message", "type"];

const DATA_IMAGE_PREFIX: &str = "data:image/";
const BASE64_MARKER: &str = ";base64,";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub accepted: usize,
    pub malformed: usize,
    pub irrelevant: usize,
}

impl FilterStats {
    pub fn absorb(&mut self, other: FilterStats) {
        self.accepted += other.accepted;
        self.malformed += other.malformed;
        self.irrelevant += other.irrelevant;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineVerdict {
    Accepted(FilteredRecord),
    Malformed,
    Irrelevant,
    Blank,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilteredRecord {
    pub json: String,
    pub timestamp: Option<DateTime<Utc>>,
}

fn image_placeholder(raw: &str) -> Option<String> {
    let rest = raw.strip_prefix(DATA_IMAGE_PREFIX)?;
    let (params, _) = rest.split_once(BASE64_MARKER)?;
    // `data:image/png;name=x;base64,` keeps only the subtype
    let subtype = params.split(';').next().unwrap_or(params);
    Some(format!("[IMAGE: {subtype} removed]"))
}

pub fn strip_base64_images(value: Value) -> Value {
    match value {
        Value::String(s) => match image_placeholder(&s) {
            Some(placeholder) => Value::String(placeholder),
            None => Value::String(s),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(strip_base64_images).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, strip_base64_images(v)))
                .collect(),
        ),
        other => other,
    }
}

fn filter_object(mut raw: Map<String, Value>) -> Option<Map<String, Value>> {
    let mut out = Map::new();
    for field in KEPT_FIELDS {
        let Some(value) = raw.remove(field) else {
            continue;
        };
        let value = if VERBATIM_FIELDS.contains(&field) {
            value
        } else {
            strip_base64_images(value)
        };
        out.insert(field.to_string(), value);
    }

    if CONTENT_FIELDS.iter().any(|f| out.contains_key(*f)) {
        Some(out)
    } else {
        None
    }
}

pub fn filter_line(line: &str) -> LineVerdict {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineVerdict::Blank;
    }
    let Ok(parsed) = serde_json::from_str::<Value>(trimmed) else {
        return LineVerdict::Malformed;
    };
    let Value::Object(map) = parsed else {
        return LineVerdict::Irrelevant;
    };
    let Some(filtered) = filter_object(map) else {
        return LineVerdict::Irrelevant;
    };

    let timestamp = filtered
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(parse_timestamp);
    match serde_json::to_string(&Value::Object(filtered)) {
        Ok(json) => LineVerdict::Accepted(FilteredRecord { json, timestamp }),
        Err(_) => LineVerdict::Malformed,
    }
}

pub fn filter_lines<'a, I>(lines: I) -> (Vec<FilteredRecord>, FilterStats)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut stats = FilterStats::default();
    let mut out = Vec::new();
    for line in lines {
        match filter_line(line) {
            LineVerdict::Accepted(record) => {
                stats.accepted += 1;
                out.push(record);
            }
            LineVerdict::Malformed => stats.malformed += 1,
            LineVerdict::Irrelevant => stats.irrelevant += 1,
            LineVerdict::Blank => {}
        }
    }
    (out, stats)
}

#[cfg(test)]
mod tests {
    use super::{LineVerdict, filter_line, filter_lines, strip_base64_images};
    use serde_json::{Value, json};

    fn accepted_json(line: &str) -> Value {
        match filter_line(line) {
            LineVerdict::Accepted(record) => serde_json::from_str(&record.json).expect("json"),
            other => panic!("expected accepted, got {other:?}"),
        }
    }

    #[test]
    fn keeps_only_whitelisted_fields() {
        let line = r#"{"type":"user","uuid":"abc","cwd":"/x","message":{"role":"user","content":"hi"},"timestamp":"2025-07-14T10:00:00Z","costUSD":0.1}"#;
        let got = accepted_json(line);
        let obj = got.as_object().expect("object");
        let mut keys: Vec<_> = obj.keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["message", "timestamp", "type"]);
    }

    #[test]
    fn tool_results_are_retained() {
        let line = r#"{"type":"user","toolUseResult":{"stdout":"ok"},"toolResult":"done"}"#;
        let got = accepted_json(line);
        assert_eq!(got["toolUseResult"]["stdout"], "ok");
        assert_eq!(got["toolResult"], "done");
    }

    #[test]
    fn malformed_and_irrelevant_lines_are_dropped() {
        assert_eq!(filter_line("{not json"), LineVerdict::Malformed);
        assert_eq!(filter_line(r#"{"uuid":"only"}"#), LineVerdict::Irrelevant);
        assert_eq!(
            filter_line(r#"{"timestamp":"2025-01-01T00:00:00Z"}"#),
            LineVerdict::Irrelevant
        );
        assert_eq!(filter_line("[1,2,3]"), LineVerdict::Irrelevant);
        assert_eq!(filter_line("   "), LineVerdict::Blank);
    }

    #[test]
    fn nested_images_are_redacted_with_subtype() {
        let line = json!({
            "type": "user",
            "message": {
                "content": [
                    {"type": "image", "source": {"data": "data:image/png;base64,iVBORw0KGgoAAAANSUhEUg=="}},
                    {"type": "text", "text": "see screenshot"}
                ]
            },
            "toolUseResult": ["data:image/jpeg;base64,/9j/4AAQSkZJRg=="]
        })
        .to_string();

        let got = accepted_json(&line);
        let rendered = got.to_string();
        assert!(rendered.contains("[IMAGE: png removed]"));
        assert!(rendered.contains("[IMAGE: jpeg removed]"));
        assert!(!rendered.contains("iVBORw0KGgo"));
        assert!(!rendered.contains("/9j/4AAQ"));
        assert!(!rendered.contains(";base64,"));
        assert_eq!(got["message"]["content"][1]["text"], "see screenshot");
    }

    #[test]
    fn non_image_data_uris_are_untouched() {
        let value = json!({"a": "data:text/plain;base64,aGVsbG8=", "b": "data:image/png"});
        assert_eq!(strip_base64_images(value.clone()), value);
    }

    #[test]
    fn filtering_is_idempotent() {
        let lines = [
            r#"{"type":"assistant","message":{"content":"data:image/gif;base64,R0lGOD"},"extra":1}"#,
            r#"{"type":"summary","timestamp":"2025-07-14T10:00:00Z","children":[{"x":1}]}"#,
            r#"{"message":"plain"}"#,
        ];
        let (first, first_stats) = filter_lines(lines);
        let again: Vec<&str> = first.iter().map(|r| r.json.as_str()).collect();
        let (second, second_stats) = filter_lines(again);

        assert_eq!(first_stats.accepted, 3);
        assert_eq!(second_stats.accepted, 3);
        let first_json: Vec<_> = first.iter().map(|r| r.json.clone()).collect();
        let second_json: Vec<_> = second.iter().map(|r| r.json.clone()).collect();
        assert_eq!(first_json, second_json);
    }

    #[test]
    fn record_timestamp_is_parsed() {
        match filter_line(r#"{"type":"user","timestamp":"2025-07-14T10:00:00Z"}"#) {
            LineVerdict::Accepted(record) => assert!(record.timestamp.is_some()),
            other => panic!("unexpected {other:?}"),
        }
        match filter_line(r#"{"type":"user","timestamp":"yesterday"}"#) {
            LineVerdict::Accepted(record) => assert!(record.timestamp.is_none()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn stats_count_each_outcome() {
        let (records, stats) = filter_lines([
            r#"{"type":"user"}"#,
            "garbage",
            "",
            r#"{"uuid":"x"}"#,
        ]);
        assert_eq!(records.len(), 1);
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.irrelevant, 1);
    }
}
