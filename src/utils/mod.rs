use std::collections::HashSet;

use crate::route::Method;

pub fn parse_extensions_csv(value: &str) -> Result<Vec<String>, String> {
    let raw = value.trim();
    if raw.is_empty() {
        return Err("extensions list is empty".to_string());
    }
    let mut out: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for part in raw.split(',') {
        let item = part.trim();
        if item.is_empty() {
            continue;
        }
        let cleaned = item.trim_start_matches('.');
        if cleaned.is_empty() {
            continue;
        }
        // Case matters: `PHP` and `php` are distinct routes.
        if seen.insert(cleaned.to_string()) {
            out.push(cleaned.to_string());
        }
    }
    if out.is_empty() {
        return Err("extensions list is empty".to_string());
    }
    Ok(out)
}

/// Splits a comma separated list of names, keeping first occurrences in order.
pub fn parse_names_csv(value: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for part in value.split(',') {
        let item = part.trim();
        if !item.is_empty() && !out.iter().any(|o| o == item) {
            out.push(item.to_string());
        }
    }
    out
}

pub fn parse_method(value: &str) -> Result<Method, String> {
    value
        .parse::<Method>()
        .map_err(|_| format!("invalid method '{}'", value.trim()))
}

/// Merges CLI values over config values: CLI wins when it has any entries.
pub fn cli_or_config(cli: Vec<String>, cfg: Option<Vec<String>>) -> Vec<String> {
    if !cli.is_empty() {
        return cli;
    }
    cfg.unwrap_or_default()
}
