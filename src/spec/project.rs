use serde_json::Value;

use super::api::{ApiRecord, Apis, Operation, ParamLocation, Parameter};
use super::SpecError;
use crate::diagnostics::{Diagnostic, Partial};
use crate::route::{Header, Method, Route};

/// Turns one API record into routes.
pub trait RouteProjector: Send + Sync {
    fn project(&self, api: &ApiRecord) -> Result<Partial<Vec<Route>>, SpecError>;
}

/// Decodes a precompiled route file into API records.
pub trait ApiDecoder: Send + Sync {
    fn decode(&self, data: &[u8]) -> Result<Partial<Apis>, SpecError>;
}

/// Projects every API, concatenating routes and per-item diagnostics. Stops
/// at the first whole-API failure.
pub fn project_apis(
    projector: &dyn RouteProjector,
    apis: &Apis,
) -> Result<Partial<Vec<Route>>, SpecError> {
    let mut routes = Vec::new();
    let mut diagnostics = Vec::new();
    for api in apis.iter() {
        let projected = projector.project(api)?;
        routes.extend(projected.value);
        diagnostics.extend(projected.diagnostics);
    }
    Ok(Partial::new(routes, diagnostics))
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultProjector;

impl RouteProjector for DefaultProjector {
    fn project(&self, api: &ApiRecord) -> Result<Partial<Vec<Route>>, SpecError> {
        let base = match base_path(&api.url) {
            Some(base) => base,
            None => {
                return Ok(Partial::new(
                    Vec::new(),
                    vec![Diagnostic::new(&api.id, format!("invalid api url '{}'", api.url))],
                ))
            }
        };

        let mut routes = Vec::with_capacity(api.operations.len());
        let mut diagnostics = Vec::new();
        for op in api.operations.iter() {
            match op.method.parse::<Method>() {
                Ok(method) => routes.push(build_route(&api.id, &base, method, op)),
                Err(e) => diagnostics.push(Diagnostic::new(
                    &api.id,
                    format!("{} {}: {e}", op.method, op.path),
                )),
            }
        }
        Ok(Partial::new(routes, diagnostics))
    }
}

// Path component of the API url without a trailing slash. None when the url
// is present but unusable.
fn base_path(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return Some(String::new());
    }
    if url.starts_with('/') {
        return Some(url.trim_end_matches('/').to_string());
    }
    let parsed = url::Url::parse(url).ok()?;
    Some(parsed.path().trim_end_matches('/').to_string())
}

fn placeholder(param: Option<&Parameter>) -> String {
    if let Some(example) = param.and_then(|p| p.example.as_ref()) {
        return example.clone();
    }
    match param.and_then(|p| p.kind.as_deref()) {
        Some("integer") | Some("number") => "1".to_string(),
        Some("boolean") => "true".to_string(),
        _ => "test".to_string(),
    }
}

fn fill_path_template(template: &str, params: &[Parameter]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        let name = &rest[open + 1..open + close];
        out.push_str(&rest[..open]);
        let param = params
            .iter()
            .find(|p| p.location == ParamLocation::Path && p.name == name);
        out.push_str(&placeholder(param));
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    out
}

fn build_route(source: &str, base: &str, method: Method, op: &Operation) -> Route {
    let mut path = String::with_capacity(base.len() + op.path.len());
    path.push_str(base);
    if !op.path.starts_with('/') {
        path.push('/');
    }
    path.push_str(&fill_path_template(&op.path, &op.parameters));

    let mut query = url::form_urlencoded::Serializer::new(String::new());
    let mut has_query = false;
    let mut headers = Vec::new();
    for p in op.parameters.iter().filter(|p| p.required) {
        match p.location {
            ParamLocation::Query => {
                query.append_pair(&p.name, &placeholder(Some(p)));
                has_query = true;
            }
            ParamLocation::Header => headers.push(Header::new(&p.name, placeholder(Some(p)))),
            _ => {}
        }
    }
    if has_query {
        path.push('?');
        path.push_str(&query.finish());
    }

    Route::new(method, &path, source).with_headers(headers)
}

/// Decoder for route files: a JSON array of API records.
#[derive(Clone, Copy, Debug, Default)]
pub struct RouteFileDecoder;

impl ApiDecoder for RouteFileDecoder {
    fn decode(&self, data: &[u8]) -> Result<Partial<Apis>, SpecError> {
        let doc: Value = serde_json::from_slice(data).map_err(|e| SpecError::Json { source: e })?;
        let Value::Array(items) = doc else {
            return Err(SpecError::UnexpectedShape { found: "non-array route file" });
        };

        let mut apis = Vec::with_capacity(items.len());
        let mut diagnostics = Vec::new();
        for (idx, item) in items.into_iter().enumerate() {
            let item_id = item
                .get("id")
                .and_then(Value::as_str)
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("api[{idx}]"));
            match serde_json::from_value::<ApiRecord>(item) {
                Ok(api) => apis.push(api),
                Err(e) => diagnostics.push(Diagnostic::new(item_id, e.to_string())),
            }
        }
        Ok(Partial::new(Apis(apis), diagnostics))
    }
}

pub fn encode_route_file(apis: &Apis) -> Result<Vec<u8>, SpecError> {
    serde_json::to_vec_pretty(apis).map_err(|e| SpecError::Encode { source: e })
}
