use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Value};

use crate::candidate::RawCandidate;

/// Reads raw candidate records from a `.csv` file or a JSON document (either
/// an array of records or an object with a `candidates` array).
pub fn load_raw_candidates(path: &Path) -> Result<Vec<RawCandidate>> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed reading candidates: {}", path.display()))?;
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    if is_csv {
        parse_raw_csv(&data).with_context(|| format!("failed parsing CSV: {}", path.display()))
    } else {
        parse_raw_json(&data).with_context(|| format!("failed parsing JSON: {}", path.display()))
    }
}

pub fn parse_raw_json(data: &str) -> Result<Vec<RawCandidate>> {
    let document: Value = serde_json::from_str(data)?;
    raw_candidates_from_value(document)
}

pub fn raw_candidates_from_value(document: Value) -> Result<Vec<RawCandidate>> {
    let items = match document {
        Value::Array(items) => items,
        Value::Object(mut object) => match object.remove("candidates") {
            Some(Value::Array(items)) => items,
            _ => return Err(anyhow!("expected a `candidates` array")),
        },
        other => return Err(anyhow!("expected an array of candidates, found {other}")),
    };
    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| {
            serde_json::from_value(item).with_context(|| format!("record #{idx} is not an object"))
        })
        .collect()
}

/// CSV cells arrive as text; empty cells become nulls so optional fields
/// stay optional.
pub fn parse_raw_csv(data: &str) -> Result<Vec<RawCandidate>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(data.as_bytes());
    let headers = reader.headers()?.clone();
    let mut out = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("CSV row {}", idx + 1))?;
        let mut object = Map::new();
        for (header, cell) in headers.iter().zip(record.iter()) {
            let value = if cell.is_empty() {
                Value::Null
            } else {
                Value::String(cell.to_string())
            };
            object.insert(header.to_string(), value);
        }
        out.push(serde_json::from_value(Value::Object(object))?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;
    use crate::candidate::normalize;

    #[test]
    fn parses_csv_rows_into_candidates() {
        let data = "id,cost,expected_benefit,depends_on,period,mandatory\n\
                    roof,\"12,000\",30,,2026,false\n\
                    hvac,8000,22,roof;controls,2027,\n\
                    controls,1500,5,,,true\n";
        let raw = parse_raw_csv(data).expect("csv parses");
        assert_eq!(raw.len(), 3);
        assert_eq!(raw[1].mandatory, Value::Null);
        let candidates = normalize(&raw).expect("valid candidates");
        assert_eq!(candidates[0].cost, dec!(12000));
        assert_eq!(candidates[1].depends_on.len(), 2);
        assert!(candidates[2].mandatory);
    }

    #[test]
    fn accepts_wrapped_json_document() {
        let doc = json!({"candidates": [{"id": "a", "cost": 10, "expected_benefit": 1}]});
        let raw = raw_candidates_from_value(doc).expect("wrapped document");
        assert_eq!(raw.len(), 1);
        assert!(raw_candidates_from_value(json!({"items": []})).is_err());
        assert!(parse_raw_json("[1, 2]").is_err());
    }
}
