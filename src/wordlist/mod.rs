pub mod registry;

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tracing::{debug, info};

use crate::diagnostics::DiagnosticSet;
use crate::route::Route;
use crate::spec::project::{project_apis, ApiDecoder, RouteProjector};
use crate::spec::SpecError;

pub use registry::{DirectoryRegistry, HostedWordlist, WordlistRegistry};

pub const DIRSEARCH_PLACEHOLDER: &str = "%EXT%";

#[derive(Debug, Error)]
pub enum WordlistError {
    #[error("attempted to load {kind} as plain text wordlist: {path}. Please provide a plain wordlist")]
    WrongLoader { kind: &'static str, path: String },

    #[error("failed to open wordlist: {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read wordlist: {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid wordlist reference '{reference}': expected NAME or NAME;MAXLEN")]
    InvalidReference { reference: String },

    #[error("unknown wordlist '{name}' (searched {root})")]
    UnknownWordlist { name: String, root: String },

    #[error("failed to load apis from wordlist {name}: {source}")]
    Apis {
        name: String,
        #[source]
        source: SpecError,
    },
}

/// A hosted wordlist named on the command line, optionally bounded to its
/// first `max_length` words.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WordlistReference {
    pub filename: String,
    pub short_name: String,
    pub max_length: Option<usize>,
}

impl WordlistReference {
    pub fn parse(raw: &str) -> Result<Self, WordlistError> {
        let raw = raw.trim();
        let invalid = || WordlistError::InvalidReference {
            reference: raw.to_string(),
        };
        let (name, max_length) = match raw.split_once(';') {
            Some((name, len)) => {
                let len: usize = len.trim().parse().map_err(|_| invalid())?;
                (name.trim(), (len > 0).then_some(len))
            }
            None => (raw, None),
        };
        if name.is_empty() {
            return Err(invalid());
        }
        let short_name = Path::new(name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| name.to_string());
        Ok(Self {
            filename: name.to_string(),
            short_name,
            max_length,
        })
    }
}

/// Length bounds keyed by the names the user typed.
#[derive(Clone, Debug, Default)]
pub struct LengthBounds {
    bounds: HashMap<String, usize>,
}

impl LengthBounds {
    pub fn from_references(references: &[WordlistReference]) -> Self {
        let mut out = Self::default();
        for r in references {
            out.insert(r);
        }
        out
    }

    /// A positive bound is never replaced by a later unbounded reference.
    pub fn insert(&mut self, reference: &WordlistReference) {
        match reference.max_length {
            Some(n) => {
                self.bounds.insert(reference.filename.clone(), n);
            }
            None => {
                self.bounds.entry(reference.filename.clone()).or_insert(0);
            }
        }
    }

    /// The filename-specific bound wins when positive, otherwise the
    /// short-name bound applies.
    pub fn effective(&self, list: &HostedWordlist) -> Option<usize> {
        let by_filename = self.bounds.get(&list.filename).copied().unwrap_or(0);
        if by_filename > 0 {
            return Some(by_filename);
        }
        self.bounds
            .get(&list.short_name)
            .copied()
            .filter(|n| *n > 0)
    }
}

/// Expands one candidate into the original route plus one route per extension.
pub fn expand_word(
    word: &str,
    extensions: &[String],
    dirsearch_compat: bool,
    source: &str,
) -> Vec<Route> {
    let base = Route::get(word, source);
    let original = base.path.clone();
    let mut out = Vec::with_capacity(extensions.len() + 1);
    out.push(base);
    for ext in extensions {
        let path = if dirsearch_compat {
            original.replace(DIRSEARCH_PLACEHOLDER, ext)
        } else {
            format!("{original}.{ext}")
        };
        out.push(Route::get(&path, source));
    }
    out
}

fn check_plain_wordlist(filename: &str) -> Result<(), WordlistError> {
    if filename.ends_with(".kite") {
        return Err(WordlistError::WrongLoader {
            kind: "kitefile",
            path: filename.to_string(),
        });
    }
    if filename.ends_with(".json") {
        return Err(WordlistError::WrongLoader {
            kind: "json",
            path: filename.to_string(),
        });
    }
    Ok(())
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Appends routes for every line of every plain text wordlist. An empty
/// filename ends the batch early. On error, routes from earlier files stay
/// in `routes`.
pub async fn load_text_wordlists(
    filenames: &[String],
    extensions: &[String],
    dirsearch_compat: bool,
    routes: &mut Vec<Route>,
) -> Result<(), WordlistError> {
    for filename in filenames {
        if filename.is_empty() {
            return Ok(());
        }
        check_plain_wordlist(filename)?;

        let path = crate::config::expand_tilde_string(filename);
        let handle = File::open(&path).await.map_err(|e| WordlistError::Open {
            path: path.clone(),
            source: e,
        })?;
        let before = routes.len();
        let mut reader = BufReader::new(handle);
        let mut buf: Vec<u8> = Vec::new();
        loop {
            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .await
                .map_err(|e| WordlistError::Read {
                    path: path.clone(),
                    source: e,
                })?;
            if n == 0 {
                break;
            }
            // Lines are bytes; non UTF-8 input is decoded lossily instead of failing.
            let line = String::from_utf8_lossy(trim_line_ending(&buf));
            if line.trim().is_empty() {
                continue;
            }
            routes.extend(expand_word(&line, extensions, dirsearch_compat, filename));
        }
        info!(
            wordlist = %filename,
            routes = routes.len() - before,
            "loaded text wordlist"
        );
    }
    Ok(())
}

fn parse_references(
    raw: &[String],
) -> Result<(Vec<String>, LengthBounds), WordlistError> {
    let mut references = Vec::with_capacity(raw.len());
    for v in raw {
        references.push(WordlistReference::parse(v)?);
    }
    let bounds = LengthBounds::from_references(&references);
    let mut names: Vec<String> = Vec::with_capacity(references.len());
    for r in references {
        if !names.contains(&r.filename) {
            names.push(r.filename);
        }
    }
    Ok((names, bounds))
}

/// Expands hosted wordlists named as `NAME` or `NAME;MAXLEN`.
pub async fn load_hosted_wordlists(
    registry: &dyn WordlistRegistry,
    references: &[String],
    extensions: &[String],
    dirsearch_compat: bool,
    routes: &mut Vec<Route>,
) -> Result<(), WordlistError> {
    let (names, bounds) = parse_references(references)?;
    let lists = registry.get(&names).await?;

    for list in lists {
        let max_len = bounds.effective(&list);
        let content = registry.read(&list).await?;
        let content = String::from_utf8_lossy(&content);
        let mut words: Vec<&str> = content.lines().collect();
        if let Some(n) = max_len {
            words.truncate(n);
        }
        debug!(name = %list.short_name, max = max_len.unwrap_or(0), words = words.len(), "expanding hosted wordlist");
        for word in words {
            if word.trim().is_empty() {
                continue;
            }
            routes.extend(expand_word(
                word,
                extensions,
                dirsearch_compat,
                &list.short_name,
            ));
        }
    }
    Ok(())
}

/// Loads route files from the registry, keeping the first `MAXLEN` APIs of
/// each. Returns the number of APIs projected.
pub async fn load_hosted_apis(
    registry: &dyn WordlistRegistry,
    references: &[String],
    decoder: &dyn ApiDecoder,
    projector: &dyn RouteProjector,
    routes: &mut Vec<Route>,
    diagnostics: &mut DiagnosticSet,
) -> Result<usize, WordlistError> {
    let (names, bounds) = parse_references(references)?;
    let lists = registry.get(&names).await?;

    let mut loaded = 0usize;
    for list in lists {
        let max_len = bounds.effective(&list).unwrap_or(0);
        debug!(max = max_len, name = %list.short_name, "parsing kite input");

        let content = registry.read(&list).await?;
        let decoded = decoder
            .decode(&content)
            .map_err(|e| WordlistError::Apis {
                name: list.filename.clone(),
                source: e,
            })?;
        diagnostics.record(&list.filename, decoded.diagnostics);
        let apis = decoded.value.first(max_len);
        loaded += apis.len();

        let projected = project_apis(projector, &apis).map_err(|e| WordlistError::Apis {
            name: list.filename.clone(),
            source: e,
        })?;
        diagnostics.record(&list.filename, projected.diagnostics);
        routes.extend(projected.value);
    }
    Ok(loaded)
}
