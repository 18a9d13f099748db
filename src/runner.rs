use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::diagnostics::DiagnosticSet;
use crate::route::{self, Method, Route};
use crate::spec::api::Apis;
use crate::spec::{SpecCompiler, SpecError};
use crate::wordlist::{self, DirectoryRegistry, WordlistError, WordlistRegistry};

#[derive(Clone, Debug, Default)]
pub struct Options {
    pub wordlists: Vec<String>,
    pub hosted_wordlists: Vec<String>,
    pub hosted_api_wordlists: Vec<String>,
    pub spec_sources: Vec<String>,
    pub extensions: Vec<String>,
    pub dirsearch_compat: bool,
    pub wordlist_dir: Option<String>,
    pub force_method: Option<String>,
    pub filter_apis: Vec<String>,
    pub timeout_seconds: usize,
    /// Skip TLS certificate verification when fetching specs by URL.
    pub insecure: bool,
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("no route sources provided (wordlists, hosted wordlists and specs are all empty)")]
    NoSources,

    #[error("dirsearch compatibility mode requires extensions")]
    DirsearchRequiresExtensions,

    #[error("hosted wordlists need a wordlist directory")]
    MissingWordlistDir,

    #[error("invalid force method '{method}'")]
    InvalidMethod { method: String },

    #[error("no routes were compiled from the configured sources")]
    NoRoutes,

    #[error(transparent)]
    Wordlist(#[from] WordlistError),

    #[error(transparent)]
    Spec(#[from] SpecError),
}

#[derive(Clone, Debug)]
pub struct CompileResult {
    pub routes: Vec<Route>,
    pub diagnostics: DiagnosticSet,
    /// Every source that contributed, in load order.
    pub sources: Vec<String>,
    /// API records loaded from spec sources.
    pub apis: Apis,
    pub elapsed: Duration,
}

pub struct Runner {
    options: Options,
    force_method: Option<Method>,
    registry: Option<Box<dyn WordlistRegistry>>,
    compiler: SpecCompiler,
}

impl Runner {
    pub fn new(options: Options) -> Result<Self, RunnerError> {
        if options.wordlists.is_empty()
            && options.hosted_wordlists.is_empty()
            && options.hosted_api_wordlists.is_empty()
            && options.spec_sources.is_empty()
        {
            return Err(RunnerError::NoSources);
        }
        if options.dirsearch_compat && options.extensions.is_empty() {
            return Err(RunnerError::DirsearchRequiresExtensions);
        }
        let force_method = match options.force_method.as_deref() {
            Some(m) if !m.trim().is_empty() => {
                Some(m.parse::<Method>().map_err(|_| RunnerError::InvalidMethod {
                    method: m.to_string(),
                })?)
            }
            _ => None,
        };

        let needs_registry =
            !options.hosted_wordlists.is_empty() || !options.hosted_api_wordlists.is_empty();
        let registry: Option<Box<dyn WordlistRegistry>> = if needs_registry {
            let root = match options.wordlist_dir.as_deref() {
                Some(dir) => crate::config::expand_tilde(dir),
                None => crate::config::default_wordlist_dir().ok_or(RunnerError::MissingWordlistDir)?,
            };
            Some(Box::new(DirectoryRegistry::new(root)))
        } else {
            None
        };

        let timeout = Duration::from_secs(options.timeout_seconds.max(1) as u64);
        let compiler = SpecCompiler::new(timeout, options.insecure)?;
        Ok(Self {
            options,
            force_method,
            registry,
            compiler,
        })
    }

    /// Replaces the hosted wordlist registry.
    pub fn with_registry(mut self, registry: Box<dyn WordlistRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_compiler(mut self, compiler: SpecCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn wordlist_dir(&self) -> Option<PathBuf> {
        self.options
            .wordlist_dir
            .as_deref()
            .map(crate::config::expand_tilde)
    }

    /// Compiles every configured source into one route list. Sources load in
    /// order: text wordlists, hosted wordlists, hosted API wordlists, specs.
    /// The first fatal error ends the run.
    pub async fn run(&self) -> Result<CompileResult, RunnerError> {
        let started_at = Instant::now();
        let opts = &self.options;
        let mut routes: Vec<Route> = Vec::new();
        let mut diagnostics = DiagnosticSet::new();
        let mut sources: Vec<String> = Vec::new();

        if !opts.wordlists.is_empty() {
            wordlist::load_text_wordlists(
                &opts.wordlists,
                &opts.extensions,
                opts.dirsearch_compat,
                &mut routes,
            )
            .await?;
            sources.extend(opts.wordlists.iter().cloned());
        }

        if let Some(registry) = self.registry.as_deref() {
            if !opts.hosted_wordlists.is_empty() {
                wordlist::load_hosted_wordlists(
                    registry,
                    &opts.hosted_wordlists,
                    &opts.extensions,
                    opts.dirsearch_compat,
                    &mut routes,
                )
                .await?;
                sources.extend(opts.hosted_wordlists.iter().cloned());
            }
            if !opts.hosted_api_wordlists.is_empty() {
                let loaded = wordlist::load_hosted_apis(
                    registry,
                    &opts.hosted_api_wordlists,
                    self.compiler.decoder(),
                    self.compiler.projector(),
                    &mut routes,
                    &mut diagnostics,
                )
                .await?;
                debug!(apis = loaded, "loaded hosted api wordlists");
                sources.extend(opts.hosted_api_wordlists.iter().cloned());
            }
        }

        let mut apis = Apis::default();
        if !opts.spec_sources.is_empty() {
            apis = self
                .compiler
                .compile_sources(&opts.spec_sources, &mut routes, &mut diagnostics)
                .await?;
            sources.extend(opts.spec_sources.iter().cloned());
        }

        let filter: HashSet<String> = opts
            .filter_apis
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let mut routes = route::filter_by_source(routes, &filter);
        if let Some(method) = self.force_method {
            route::force_method(&mut routes, method);
        }

        if routes.is_empty() {
            return Err(RunnerError::NoRoutes);
        }

        let elapsed = started_at.elapsed();
        info!(
            routes = routes.len(),
            diagnostics = diagnostics.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "route compilation finished"
        );
        Ok(CompileResult {
            routes,
            diagnostics,
            sources,
            apis,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> Options {
        Options {
            timeout_seconds: 5,
            ..Options::default()
        }
    }

    #[test]
    fn rejects_empty_sources() {
        assert!(matches!(Runner::new(opts()), Err(RunnerError::NoSources)));
    }

    #[test]
    fn dirsearch_needs_extensions() {
        let o = Options {
            wordlists: vec!["words.txt".into()],
            dirsearch_compat: true,
            ..opts()
        };
        assert!(matches!(
            Runner::new(o),
            Err(RunnerError::DirsearchRequiresExtensions)
        ));
    }

    #[test]
    fn rejects_unknown_force_method() {
        let o = Options {
            wordlists: vec!["words.txt".into()],
            force_method: Some("FETCH".into()),
            ..opts()
        };
        assert!(matches!(
            Runner::new(o),
            Err(RunnerError::InvalidMethod { .. })
        ));
    }

    #[test]
    fn blank_force_method_is_ignored() {
        let o = Options {
            wordlists: vec!["words.txt".into()],
            force_method: Some("  ".into()),
            ..opts()
        };
        assert!(Runner::new(o).unwrap().force_method.is_none());
    }
}
