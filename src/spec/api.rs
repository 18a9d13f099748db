use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::SpecError;
use crate::diagnostics::{Diagnostic, Partial};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Cookie,
    Body,
    FormData,
}

impl ParamLocation {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "cookie" => Some(Self::Cookie),
            "body" => Some(Self::Body),
            "formData" => Some(Self::FormData),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub location: ParamLocation,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiRecord {
    pub id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub operations: Vec<Operation>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Apis(pub Vec<ApiRecord>);

impl Apis {
    /// The first `n` APIs; `0` keeps all of them.
    pub fn first(mut self, n: usize) -> Self {
        if n > 0 {
            self.0.truncate(n);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ApiRecord> {
        self.0.iter()
    }

    pub fn extend(&mut self, other: Apis) {
        self.0.extend(other.0);
    }
}

/// Turns a canonical JSON array of API objects into structured records.
pub trait SpecParser: Send + Sync {
    fn parse_document(&self, data: &[u8]) -> Result<Partial<Apis>, SpecError>;
}

/// Parser for OpenAPI 3 and Swagger 2 documents (after url repair).
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenApiParser;

const NON_OPERATION_KEYS: [&str; 5] = ["parameters", "summary", "description", "servers", "$ref"];

impl SpecParser for OpenApiParser {
    fn parse_document(&self, data: &[u8]) -> Result<Partial<Apis>, SpecError> {
        let doc: Value = serde_json::from_slice(data).map_err(|e| SpecError::Json { source: e })?;
        let items = match doc {
            Value::Array(items) => items,
            Value::Object(_) => vec![doc],
            _ => return Err(SpecError::UnexpectedShape { found: "scalar" }),
        };

        let mut apis = Vec::with_capacity(items.len());
        let mut diagnostics = Vec::new();
        for (idx, item) in items.iter().enumerate() {
            match parse_api(idx, item, &mut diagnostics) {
                Ok(api) => apis.push(api),
                Err(d) => diagnostics.push(d),
            }
        }
        Ok(Partial::new(Apis(apis), diagnostics))
    }
}

fn str_field<'a>(m: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    m.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn api_id(idx: usize, m: &Map<String, Value>) -> String {
    str_field(m, "id")
        .or_else(|| m.get("info").and_then(Value::as_object).and_then(|i| str_field(i, "title")))
        .or_else(|| str_field(m, "url"))
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("api-{idx}"))
}

fn api_url(m: &Map<String, Value>) -> String {
    if let Some(url) = str_field(m, "url") {
        return url.to_string();
    }
    m.get("servers")
        .and_then(Value::as_array)
        .and_then(|s| s.first())
        .and_then(Value::as_object)
        .and_then(|s| str_field(s, "url"))
        .unwrap_or_default()
        .to_string()
}

fn parse_api(
    idx: usize,
    item: &Value,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<ApiRecord, Diagnostic> {
    let m = item
        .as_object()
        .ok_or_else(|| Diagnostic::new(format!("api[{idx}]"), "api entry is not an object"))?;
    let id = api_id(idx, m);
    let paths = m
        .get("paths")
        .and_then(Value::as_object)
        .ok_or_else(|| Diagnostic::new(&id, "missing paths object"))?;

    let mut operations = Vec::new();
    for (path, path_item) in paths {
        let Some(path_item) = path_item.as_object() else {
            diagnostics.push(Diagnostic::new(
                &id,
                format!("path {path}: path item is not an object"),
            ));
            continue;
        };
        let shared = path_item
            .get("parameters")
            .map(parse_parameters)
            .unwrap_or_default();

        for (key, op) in path_item {
            if NON_OPERATION_KEYS.contains(&key.as_str()) || key.starts_with("x-") {
                continue;
            }
            let Some(op) = op.as_object() else {
                diagnostics.push(Diagnostic::new(
                    &id,
                    format!("path {path}: operation {key} is not an object"),
                ));
                continue;
            };
            let own = op.get("parameters").map(parse_parameters).unwrap_or_default();
            operations.push(Operation {
                method: key.to_ascii_uppercase(),
                path: path.clone(),
                parameters: merge_parameters(&shared, own),
            });
        }
    }

    Ok(ApiRecord {
        id,
        url: api_url(m),
        operations,
    })
}

// Operation-level parameters override path-level ones with the same name and location.
fn merge_parameters(shared: &[Parameter], own: Vec<Parameter>) -> Vec<Parameter> {
    let mut out: Vec<Parameter> = shared
        .iter()
        .filter(|s| {
            !own
                .iter()
                .any(|o| o.name == s.name && o.location == s.location)
        })
        .cloned()
        .collect();
    out.extend(own);
    out
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_parameters(v: &Value) -> Vec<Parameter> {
    let Some(items) = v.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|p| {
            let name = str_field(p, "name")?;
            let location = ParamLocation::parse(str_field(p, "in")?)?;
            let schema = p.get("schema").and_then(Value::as_object);
            let example = ["example", "default"]
                .iter()
                .find_map(|k| p.get(*k).and_then(scalar_string))
                .or_else(|| {
                    let schema = schema?;
                    ["example", "default"]
                        .iter()
                        .find_map(|k| schema.get(*k).and_then(scalar_string))
                        .or_else(|| {
                            schema
                                .get("enum")
                                .and_then(Value::as_array)
                                .and_then(|e| e.first())
                                .and_then(scalar_string)
                        })
                });
            let kind = str_field(p, "type")
                .or_else(|| schema.and_then(|s| str_field(s, "type")))
                .map(|s| s.to_string());
            let required = location == ParamLocation::Path
                || p.get("required").and_then(Value::as_bool).unwrap_or(false);
            Some(Parameter {
                name: name.to_string(),
                location,
                required,
                example,
                kind,
            })
        })
        .collect()
}
