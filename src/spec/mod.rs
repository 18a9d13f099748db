pub mod api;
pub mod document;
pub mod project;

use std::path::Path;
use std::time::Duration;

use reqwest::{redirect, StatusCode};
use thiserror::Error;
use tracing::{debug, info};

use crate::diagnostics::DiagnosticSet;
use crate::route::Route;
use api::{Apis, OpenApiParser, SpecParser};
use document::{canonicalize, choose_serialization, first_significant_byte, parse_document};
use project::{project_apis, ApiDecoder, DefaultProjector, RouteFileDecoder, RouteProjector};

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status fetching {url}: {status}")]
    Status { url: String, status: u16 },

    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid json: {source}")]
    Json {
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse as yaml ({yaml}) or json ({json})")]
    Yaml { yaml: String, json: String },

    #[error("expected an api object or a list of api objects, found {found}")]
    UnexpectedShape { found: &'static str },

    #[error("failed to encode document: {source}")]
    Encode {
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to build http client: {source}")]
    Client {
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to load {source_name}: {cause}")]
    Source {
        source_name: String,
        #[source]
        cause: Box<SpecError>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    /// An OpenAPI/Swagger document in JSON or YAML.
    RawSpec,
    /// A precompiled route file.
    RouteFile,
}

fn is_url(src: &str) -> bool {
    let lower = src.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

// Extension of a file path, or of the path component of a URL.
fn source_extension(src: &str) -> Option<String> {
    let path = if is_url(src) {
        url::Url::parse(src).ok()?.path().to_string()
    } else {
        src.to_string()
    };
    Path::new(&path)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

pub fn classify_source(src: &str) -> SourceKind {
    if is_url(src) {
        return SourceKind::RawSpec;
    }
    match source_extension(src).as_deref() {
        Some("json") | Some("yaml") | Some("yml") => SourceKind::RawSpec,
        _ => SourceKind::RouteFile,
    }
}

/// Compiles spec sources into routes. The parser, projector and decoder are
/// replaceable.
pub struct SpecCompiler {
    client: reqwest::Client,
    insecure: bool,
    parser: Box<dyn SpecParser>,
    projector: Box<dyn RouteProjector>,
    decoder: Box<dyn ApiDecoder>,
}

impl SpecCompiler {
    /// Builds a compiler whose fetch client verifies TLS certificates unless
    /// `insecure` is set.
    pub fn new(timeout: Duration, insecure: bool) -> Result<Self, SpecError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("routebuster/", env!("CARGO_PKG_VERSION")))
            .redirect(redirect::Policy::limited(10))
            .timeout(timeout)
            .danger_accept_invalid_hostnames(insecure)
            .danger_accept_invalid_certs(insecure)
            .build()
            .map_err(|e| SpecError::Client { source: e })?;
        if insecure {
            debug!("spec fetches skip TLS certificate verification");
        }
        Ok(Self {
            client,
            insecure,
            parser: Box::new(OpenApiParser),
            projector: Box::new(DefaultProjector),
            decoder: Box::new(RouteFileDecoder),
        })
    }

    /// Replaces the client used to fetch documents by URL.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_parser(mut self, parser: Box<dyn SpecParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_projector(mut self, projector: Box<dyn RouteProjector>) -> Self {
        self.projector = projector;
        self
    }

    pub fn with_decoder(mut self, decoder: Box<dyn ApiDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn is_insecure(&self) -> bool {
        self.insecure
    }

    pub fn projector(&self) -> &dyn RouteProjector {
        self.projector.as_ref()
    }

    pub fn decoder(&self) -> &dyn ApiDecoder {
        self.decoder.as_ref()
    }

    /// Compiles each source in order, appending routes and recording per-item
    /// diagnostics. An empty source name ends the batch. The first fatal
    /// error stops the batch; routes from earlier sources stay appended.
    /// Returns every API record that was loaded.
    pub async fn compile_sources(
        &self,
        sources: &[String],
        routes: &mut Vec<Route>,
        diagnostics: &mut DiagnosticSet,
    ) -> Result<Apis, SpecError> {
        let mut loaded = Apis::default();
        for src in sources {
            if src.is_empty() {
                break;
            }
            let apis = self
                .compile_source(src, routes, diagnostics)
                .await
                .map_err(|e| SpecError::Source {
                    source_name: src.clone(),
                    cause: Box::new(e),
                })?;
            loaded.extend(apis);
        }
        Ok(loaded)
    }

    async fn compile_source(
        &self,
        src: &str,
        routes: &mut Vec<Route>,
        diagnostics: &mut DiagnosticSet,
    ) -> Result<Apis, SpecError> {
        let before = routes.len();
        let apis = match classify_source(src) {
            SourceKind::RawSpec => {
                info!(source = %src, "detected raw OpenAPI/Swagger spec, compiling in-memory");
                let data = self.acquire(src).await?;
                let serialization = choose_serialization(
                    source_extension(src).as_deref(),
                    first_significant_byte(&data),
                );
                debug!(source = %src, ?serialization, bytes = data.len(), "parsing spec document");
                let doc = parse_document(&data, serialization)?;
                let canonical = canonicalize(doc)?;
                let parsed = self.parser.parse_document(&canonical)?;
                diagnostics.record(src, parsed.diagnostics);
                parsed.value
            }
            SourceKind::RouteFile => {
                let data = read_file(src).await?;
                let decoded = self.decoder.decode(&data)?;
                diagnostics.record(src, decoded.diagnostics);
                decoded.value
            }
        };

        let projected = project_apis(self.projector.as_ref(), &apis)?;
        diagnostics.record(src, projected.diagnostics);
        routes.extend(projected.value);
        info!(
            source = %src,
            apis = apis.len(),
            routes = routes.len() - before,
            "compiled spec source"
        );
        Ok(apis)
    }

    async fn acquire(&self, src: &str) -> Result<Vec<u8>, SpecError> {
        if !is_url(src) {
            return read_file(src).await;
        }
        let fetch_err = |e| SpecError::Fetch {
            url: src.to_string(),
            source: e,
        };
        let resp = self.client.get(src).send().await.map_err(fetch_err)?;
        if resp.status() != StatusCode::OK {
            return Err(SpecError::Status {
                url: src.to_string(),
                status: resp.status().as_u16(),
            });
        }
        let body = resp.bytes().await.map_err(fetch_err)?;
        Ok(body.to_vec())
    }
}

async fn read_file(src: &str) -> Result<Vec<u8>, SpecError> {
    let path = crate::config::expand_tilde_string(src);
    tokio::fs::read(&path)
        .await
        .map_err(|e| SpecError::ReadFile { path, source: e })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_sources() {
        assert_eq!(classify_source("HTTPS://api.example.com/spec"), SourceKind::RawSpec);
        assert_eq!(classify_source("http://x/routes.kite"), SourceKind::RawSpec);
        assert_eq!(classify_source("swagger.json"), SourceKind::RawSpec);
        assert_eq!(classify_source("/tmp/openapi.YAML"), SourceKind::RawSpec);
        assert_eq!(classify_source("openapi.yml"), SourceKind::RawSpec);
        assert_eq!(classify_source("routes.kite"), SourceKind::RouteFile);
        assert_eq!(classify_source("routes"), SourceKind::RouteFile);
    }

    #[test]
    fn url_extension_ignores_query() {
        assert_eq!(
            source_extension("https://x/api/openapi.yaml?v=2").as_deref(),
            Some("yaml")
        );
        assert_eq!(source_extension("https://x/api/docs"), None);
    }

    #[test]
    fn certificate_checks_stay_on_by_default() {
        assert!(!SpecCompiler::new(Duration::from_secs(2), false).unwrap().is_insecure());
        assert!(SpecCompiler::new(Duration::from_secs(2), true).unwrap().is_insecure());
    }

    #[tokio::test]
    async fn missing_file_is_wrapped_with_source() {
        let compiler = SpecCompiler::new(Duration::from_secs(2), false).unwrap();
        let mut routes = Vec::new();
        let mut diagnostics = DiagnosticSet::new();
        let err = compiler
            .compile_sources(
                &["/definitely/missing/openapi.json".to_string()],
                &mut routes,
                &mut diagnostics,
            )
            .await
            .unwrap_err();
        match err {
            SpecError::Source { source_name, cause } => {
                assert_eq!(source_name, "/definitely/missing/openapi.json");
                assert!(matches!(*cause, SpecError::ReadFile { .. }));
            }
            other => panic!("unexpected error {other}"),
        }
    }
}
