use serde::Serialize;

use crate::diagnostics::DiagnosticSet;
use crate::route::{Header, Route};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "text" | "txt" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

pub fn parse_format(value: &str) -> Result<OutputFormat, String> {
    OutputFormat::parse(value)
        .ok_or_else(|| format!("invalid output format '{value}', expected text or json"))
}

pub fn infer_format_from_path(path: &str) -> Option<OutputFormat> {
    let lower = path.trim().to_lowercase();
    if lower.ends_with(".json") {
        return Some(OutputFormat::Json);
    }
    if lower.ends_with(".txt") {
        return Some(OutputFormat::Text);
    }
    None
}

#[derive(Clone, Debug, Serialize)]
pub struct RouteListing<'a> {
    pub routes: &'a [Route],
    pub diagnostics: Vec<String>,
}

fn render_headers(headers: &[Header]) -> String {
    headers
        .iter()
        .map(|h| format!("{}: {}", h.key, h.value))
        .collect::<Vec<_>>()
        .join("; ")
}

/// One route per line: `METHOD PATH [headers]`.
pub fn render_text(routes: &[Route]) -> Vec<u8> {
    let mut out = String::new();
    for r in routes {
        out.push_str(r.method.as_str());
        out.push(' ');
        out.push_str(&r.path);
        if !r.headers.is_empty() {
            out.push_str(" [");
            out.push_str(&render_headers(&r.headers));
            out.push(']');
        }
        out.push('\n');
    }
    out.into_bytes()
}

pub fn render_json(routes: &[Route], diagnostics: &DiagnosticSet) -> Vec<u8> {
    let listing = RouteListing {
        routes,
        diagnostics: diagnostics.iter().map(|d| d.to_string()).collect(),
    };
    serde_json::to_vec_pretty(&listing).unwrap_or_else(|_| b"{}\n".to_vec())
}

pub fn render(format: OutputFormat, routes: &[Route], diagnostics: &DiagnosticSet) -> Vec<u8> {
    match format {
        OutputFormat::Text => render_text(routes),
        OutputFormat::Json => render_json(routes, diagnostics),
    }
}
