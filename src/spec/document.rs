use serde_json::{Map, Value};

use super::SpecError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Serialization {
    Json,
    Yaml,
}

/// Picks the first parser to try. The extension decides when it says
/// anything; otherwise a document not opening with `{` or `[` is YAML.
pub fn choose_serialization(extension: Option<&str>, first_byte: Option<u8>) -> Serialization {
    match extension.map(|e| e.trim_start_matches('.').to_ascii_lowercase()) {
        Some(ext) if ext == "yaml" || ext == "yml" => Serialization::Yaml,
        Some(ext) if ext == "json" => Serialization::Json,
        _ => match first_byte {
            Some(b'{') | Some(b'[') | None => Serialization::Json,
            Some(_) => Serialization::Yaml,
        },
    }
}

pub fn first_significant_byte(data: &[u8]) -> Option<u8> {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    data.iter().copied().find(|b| !b.is_ascii_whitespace())
}

/// Parses raw document bytes. A failed YAML attempt is retried as JSON
/// before giving up.
pub fn parse_document(data: &[u8], serialization: Serialization) -> Result<Value, SpecError> {
    match serialization {
        Serialization::Json => {
            serde_json::from_slice(data).map_err(|e| SpecError::Json { source: e })
        }
        Serialization::Yaml => match serde_yaml::from_slice::<serde_yaml::Value>(data) {
            Ok(v) => Ok(yaml_to_json(v)),
            Err(yaml_err) => serde_json::from_slice(data).map_err(|json_err| SpecError::Yaml {
                yaml: yaml_err.to_string(),
                json: json_err.to_string(),
            }),
        },
    }
}

// YAML allows non-string keys (`200:` under responses); they become strings.
fn yaml_to_json(v: serde_yaml::Value) -> Value {
    match v {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(seq) => Value::Array(seq.into_iter().map(yaml_to_json).collect()),
        serde_yaml::Value::Mapping(mapping) => {
            let mut out = Map::with_capacity(mapping.len());
            for (k, v) in mapping {
                let key = match k {
                    serde_yaml::Value::String(s) => s,
                    serde_yaml::Value::Number(n) => n.to_string(),
                    serde_yaml::Value::Bool(b) => b.to_string(),
                    serde_yaml::Value::Null => "null".to_string(),
                    _ => continue,
                };
                out.insert(key, yaml_to_json(v));
            }
            Value::Object(out)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

fn shape_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Wraps a single API object into a one-element list; lists pass through.
pub fn normalize(doc: Value) -> Result<Vec<Value>, SpecError> {
    match doc {
        Value::Object(_) => Ok(vec![doc]),
        Value::Array(items) => Ok(items),
        other => Err(SpecError::UnexpectedShape {
            found: shape_name(&other),
        }),
    }
}

/// Synthesizes `url` from Swagger 2 `schemes`/`host`/`basePath` when absent.
pub fn repair_swagger_url(api: &mut Map<String, Value>) {
    if api.contains_key("url") {
        return;
    }
    let scheme = api
        .get("schemes")
        .and_then(Value::as_array)
        .and_then(|s| s.first())
        .and_then(Value::as_str)
        .unwrap_or("https")
        .to_string();
    let host = api.get("host").and_then(Value::as_str).unwrap_or_default();
    if host.is_empty() {
        return;
    }
    let base_path = api
        .get("basePath")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let url = format!("{scheme}://{host}{base_path}");
    api.insert("url".to_string(), Value::String(url));
}

/// Normalizes a parsed document into canonical JSON bytes for the parser.
pub fn canonicalize(doc: Value) -> Result<Vec<u8>, SpecError> {
    let mut apis = normalize(doc)?;
    for api in apis.iter_mut() {
        if let Value::Object(m) = api {
            repair_swagger_url(m);
        }
    }
    serde_json::to_vec(&apis).map_err(|e| SpecError::Encode { source: e })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serialization_follows_extension_then_content() {
        assert_eq!(choose_serialization(Some("yaml"), Some(b'{')), Serialization::Yaml);
        assert_eq!(choose_serialization(Some("YML"), None), Serialization::Yaml);
        assert_eq!(choose_serialization(Some("json"), Some(b'o')), Serialization::Json);
        assert_eq!(choose_serialization(None, Some(b'{')), Serialization::Json);
        assert_eq!(choose_serialization(None, Some(b'[')), Serialization::Json);
        assert_eq!(choose_serialization(None, Some(b's')), Serialization::Yaml);
        assert_eq!(choose_serialization(Some("php"), Some(b'o')), Serialization::Yaml);
        assert_eq!(choose_serialization(None, None), Serialization::Json);
    }

    #[test]
    fn first_significant_byte_skips_whitespace_and_bom() {
        assert_eq!(first_significant_byte(b"  \n\t{}"), Some(b'{'));
        assert_eq!(first_significant_byte(b"\xEF\xBB\xBFswagger: '2.0'"), Some(b's'));
        assert_eq!(first_significant_byte(b"   "), None);
    }

    #[test]
    fn yaml_guess_falls_back_to_json() {
        // duplicate keys are rejected by the YAML mapping, JSON keeps the last
        let data = br#"{"host": "a", "host": "b"}"#;
        let v = parse_document(data, Serialization::Yaml).unwrap();
        assert_eq!(v["host"], "b");
    }

    #[test]
    fn yaml_and_json_failure_reports_both() {
        let err = parse_document(b"{: [", Serialization::Yaml).unwrap_err();
        assert!(matches!(err, SpecError::Yaml { .. }));
    }

    #[test]
    fn yaml_numeric_keys_become_strings() {
        let v = parse_document(b"responses:\n  200:\n    description: ok\n", Serialization::Yaml)
            .unwrap();
        assert_eq!(v["responses"]["200"]["description"], "ok");
    }

    #[test]
    fn normalize_wraps_objects_and_rejects_scalars() {
        assert_eq!(normalize(json!({"a": 1})).unwrap().len(), 1);
        assert_eq!(normalize(json!([{"a": 1}, {"b": 2}])).unwrap().len(), 2);
        assert!(matches!(
            normalize(json!("nope")),
            Err(SpecError::UnexpectedShape { found: "string" })
        ));
    }

    #[test]
    fn swagger_url_is_synthesized() {
        let mut m = json!({"host": "api.example.com", "basePath": "/v1", "schemes": ["http"]})
            .as_object()
            .cloned()
            .unwrap();
        repair_swagger_url(&mut m);
        assert_eq!(m["url"], "http://api.example.com/v1");

        let mut m = json!({"host": "api.example.com"}).as_object().cloned().unwrap();
        repair_swagger_url(&mut m);
        assert_eq!(m["url"], "https://api.example.com");

        let mut m = json!({"basePath": "/v1"}).as_object().cloned().unwrap();
        repair_swagger_url(&mut m);
        assert!(!m.contains_key("url"));

        let mut m = json!({"url": "http://keep.me", "host": "x"}).as_object().cloned().unwrap();
        repair_swagger_url(&mut m);
        assert_eq!(m["url"], "http://keep.me");
    }
}
