//! Turns retrieval payloads into canonical, deduplicated business records
//!
//! Three payload shapes are understood, tried in this order:
//! 1. JSON: a single object or an array of objects
//! 2. `key: value` blocks separated by blank lines
//! 3. comma-delimited rows `owner,business_name,lat,lon,category,tag1,tag2,...`
//!
//! A later shape is only tried when the earlier one produced no valid record.
//! Malformed entries are skipped and counted, never raised.

use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use tracing::debug;

use crate::geo;
use crate::models::derive_business_id;
use crate::models::BusinessRecord;
use crate::retrieval::RetrievedChunk;

/// Payload shape that produced the records of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    Json,
    KeyValue,
    Delimited,
}

/// Records parsed from one payload
#[derive(Debug, Clone, Default)]
pub struct ParsedPayload {
    pub records: Vec<BusinessRecord>,
    pub format: Option<PayloadFormat>,
    /// Entries recognised as candidates but rejected by validation
    pub skipped: usize,
}

/// Counters for a normalization pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseReport {
    pub chunks: usize,
    /// Chunks from which no valid record could be parsed
    pub unparsed_chunks: usize,
    pub records: usize,
    pub skipped_entries: usize,
    pub duplicates: usize,
}

/// Stateless payload normalizer
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordNormalizer;

impl RecordNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Parses every chunk, attaches its relevance, and deduplicates.
    ///
    /// Duplicates share `business_name + "lat,lon"`; the lower relevance wins.
    /// Output keeps first-seen order.
    pub fn normalize(&self, chunks: &[RetrievedChunk]) -> (Vec<BusinessRecord>, ParseReport) {
        let mut report = ParseReport {
            chunks: chunks.len(),
            ..ParseReport::default()
        };
        let mut unique: Vec<BusinessRecord> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for chunk in chunks {
            let parsed = self.parse_payload(&chunk.text);
            report.skipped_entries += parsed.skipped;
            if parsed.records.is_empty() {
                report.unparsed_chunks += 1;
                continue;
            }

            for record in parsed.records {
                let record = record
                    .with_relevance(chunk.relevance)
                    .with_source(chunk.source_ref.clone());
                let key = record.dedup_key();

                match index.get(&key) {
                    Some(&pos) => {
                        report.duplicates += 1;
                        if record.relevance_score < unique[pos].relevance_score {
                            unique[pos] = record;
                        }
                    }
                    None => {
                        index.insert(key, unique.len());
                        unique.push(record);
                    }
                }
            }
        }

        report.records = unique.len();
        debug!(
            "Normalized {} chunks into {} records ({} skipped entries, {} duplicates, {} unparsed chunks)",
            report.chunks, report.records, report.skipped_entries, report.duplicates, report.unparsed_chunks
        );

        (unique, report)
    }

    /// Parses a single blob, trying each supported shape in order
    pub fn parse_payload(&self, text: &str) -> ParsedPayload {
        let mut skipped = 0;

        let attempts: [(PayloadFormat, fn(&str) -> (Vec<BusinessRecord>, usize)); 3] = [
            (PayloadFormat::Json, parse_json),
            (PayloadFormat::KeyValue, parse_key_value),
            (PayloadFormat::Delimited, parse_delimited),
        ];

        for (format, parse) in attempts {
            let (records, rejected) = parse(text);
            if !records.is_empty() {
                return ParsedPayload {
                    records,
                    format: Some(format),
                    skipped: rejected,
                };
            }
            skipped = skipped.max(rejected);
        }

        ParsedPayload {
            records: Vec::new(),
            format: None,
            skipped,
        }
    }
}

fn parse_json(text: &str) -> (Vec<BusinessRecord>, usize) {
    let Ok(value) = serde_json::from_str::<Value>(text.trim()) else {
        return (Vec::new(), 0);
    };

    let objects: Vec<&Map<String, Value>> = match &value {
        Value::Object(map) => vec![map],
        Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
        _ => return (Vec::new(), 0),
    };

    let mut records = Vec::new();
    let mut rejected = 0;
    for object in objects {
        let fields: HashMap<String, Value> = object
            .iter()
            .map(|(k, v)| (normalize_key(k), v.clone()))
            .collect();
        match record_from_fields(&fields) {
            Some(record) => records.push(record),
            None => rejected += 1,
        }
    }
    (records, rejected)
}

fn parse_key_value(text: &str) -> (Vec<BusinessRecord>, usize) {
    let mut blocks: Vec<HashMap<String, Value>> = Vec::new();
    let mut current: HashMap<String, Value> = HashMap::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = normalize_key(key);
        if key.is_empty() {
            continue;
        }
        // A repeated key starts the next record when blocks are not blank-line separated
        if current.contains_key(&key) {
            blocks.push(std::mem::take(&mut current));
        }
        current.insert(key, Value::String(value.trim().to_string()));
    }
    if !current.is_empty() {
        blocks.push(current);
    }

    let mut records = Vec::new();
    let mut rejected = 0;
    for block in blocks.iter().filter(|b| looks_like_business(b)) {
        match record_from_fields(block) {
            Some(record) => records.push(record),
            None => rejected += 1,
        }
    }
    (records, rejected)
}

fn parse_delimited(text: &str) -> (Vec<BusinessRecord>, usize) {
    let mut records = Vec::new();
    let mut rejected = 0;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.to_lowercase().starts_with("name,business_name") {
            continue;
        }

        let parts: Vec<&str> = line
            .split(',')
            .map(|p| p.trim().trim_matches('"').trim())
            .collect();
        if parts.len() < 5 {
            rejected += 1;
            continue;
        }

        let (Ok(latitude), Ok(longitude)) = (parts[2].parse::<f64>(), parts[3].parse::<f64>()) else {
            rejected += 1;
            continue;
        };

        let tags = parts[5..]
            .iter()
            .filter(|t| !t.is_empty())
            .map(|t| (*t).to_string())
            .collect();

        let record = BusinessRecord::new(parts[1], parts[0], parts[4], tags, latitude, longitude);
        if record.is_valid() {
            records.push(record);
        } else {
            rejected += 1;
        }
    }

    (records, rejected)
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace([' ', '-'], "_")
}

fn looks_like_business(fields: &HashMap<String, Value>) -> bool {
    ["business_name", "business_category", "category", "latitude", "lat_long"]
        .iter()
        .any(|k| fields.contains_key(*k))
}

fn field_str<'a>(fields: &'a HashMap<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| fields.get(*k))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
}

fn field_f64(fields: &HashMap<String, Value>, key: &str) -> Option<f64> {
    match fields.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn field_tags(fields: &HashMap<String, Value>) -> Vec<String> {
    let value = fields.get("business_tags").or_else(|| fields.get("tags"));
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => split_tags(s),
        _ => Vec::new(),
    }
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn field_coordinates(fields: &HashMap<String, Value>) -> Option<(f64, f64)> {
    if let (Some(lat), Some(lon)) = (field_f64(fields, "latitude"), field_f64(fields, "longitude")) {
        return Some((lat, lon));
    }
    let lat_long = field_str(fields, &["lat_long"])?;
    let (lat, lon) = lat_long.split_once(',')?;
    Some((lat.trim().parse().ok()?, lon.trim().parse().ok()?))
}

fn record_from_fields(fields: &HashMap<String, Value>) -> Option<BusinessRecord> {
    let name = field_str(fields, &["business_name"])?;
    let category = field_str(fields, &["business_category", "category"])?;
    let (latitude, longitude) = field_coordinates(fields)?;
    if !geo::validate_coordinates(latitude, longitude) {
        return None;
    }

    let owner = field_str(fields, &["owner_name", "name"]).unwrap_or_default();
    let mut record = BusinessRecord::new(name, owner, category, field_tags(fields), latitude, longitude);
    if let Some(id) = field_str(fields, &["business_id"]) {
        record.business_id = id.to_string();
    } else {
        record.business_id = derive_business_id(name, latitude, longitude);
    }

    record.is_valid().then_some(record)
}
