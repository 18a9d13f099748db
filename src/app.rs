use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{error::ErrorKind, Parser};
use colored::Colorize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

use crate::cli::args::CliArgs;
use crate::cli::validation;
use crate::config::{self, ConfigFile};
use crate::output::{self, OutputFormat};
use crate::proxy::{self, Dialer, ProxyPool};
use crate::replay::Replayer;
use crate::route::{self, Target};
use crate::runner::{CompileResult, Options, Runner};

// Replays in flight at once when mirroring a route list.
const REPLAY_BATCH: usize = 64;

fn format_kv_line(label: &str, value: &str) {
    eprintln!(":: {:<10}: {}", label, value);
}

fn info_line(msg: &str) {
    eprintln!("{} {}", "[INF]".blue().bold(), msg);
}

fn warn_line(msg: &str) {
    eprintln!("{} {}", "[WRN]".yellow().bold(), msg);
}

fn init_logging(verbose: u8, no_color: bool) {
    let crate_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let filter_str = format!("routebuster={crate_level},reqwest=warn,hyper=warn");
        EnvFilter::try_new(&filter_str).unwrap_or_else(|_| EnvFilter::new(crate_level))
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(!no_color)
        .with_target(false)
        .try_init();
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Mode {
    Compile,
    Probe { addr: String, tls: bool },
}

#[derive(Clone, Debug)]
struct ReplayConfig {
    target: Target,
    proxy_url: String,
}

#[derive(Clone, Debug)]
struct RunConfig {
    mode: Mode,
    verbose: u8,
    no_color: bool,
    options: Options,
    proxies: Vec<String>,
    proxy_file: Option<String>,
    output: Option<String>,
    output_format: OutputFormat,
    compile_out: Option<String>,
    replay: Option<ReplayConfig>,
}

fn build_run_config(args: CliArgs, cfg: ConfigFile) -> Result<RunConfig, String> {
    validation::validate(&args)?;

    let no_color = if args.color {
        false
    } else {
        args.no_color || cfg.no_color.unwrap_or(false)
    };

    let timeout = args.timeout.or(cfg.timeout).unwrap_or(10);
    let extensions = match args.extensions.or(cfg.extensions) {
        Some(raw) => crate::utils::parse_extensions_csv(&raw)
            .map_err(|e| format!("invalid --extensions '{raw}': {e}"))?,
        None => Vec::new(),
    };
    let force_method = args.force_method.or(cfg.force_method);
    if let Some(m) = force_method.as_deref() {
        crate::utils::parse_method(m).map_err(|e| format!("invalid --force-method: {e}"))?;
    }
    let filter_apis = args
        .filter_apis
        .or(cfg.filter_apis)
        .map(|raw| crate::utils::parse_names_csv(&raw))
        .unwrap_or_default();

    let options = Options {
        wordlists: crate::utils::cli_or_config(args.wordlist, cfg.wordlists),
        hosted_wordlists: crate::utils::cli_or_config(args.hosted_wordlist, cfg.hosted_wordlists),
        hosted_api_wordlists: crate::utils::cli_or_config(
            args.hosted_api_wordlist,
            cfg.hosted_api_wordlists,
        ),
        spec_sources: crate::utils::cli_or_config(args.spec, cfg.specs),
        extensions,
        dirsearch_compat: args.dirsearch_compat || cfg.dirsearch_compat.unwrap_or(false),
        wordlist_dir: args.wordlist_dir.or(cfg.wordlist_dir),
        force_method,
        filter_apis,
        timeout_seconds: timeout,
        insecure: args.insecure || cfg.insecure.unwrap_or(false),
    };

    let output = args.output.or(cfg.output);
    let output_format = match args.output_format.or(cfg.output_format) {
        Some(raw) => output::parse_format(&raw)?,
        None => output
            .as_deref()
            .and_then(output::infer_format_from_path)
            .unwrap_or(OutputFormat::Text),
    };

    let replay = match args.replay {
        Some(url) => {
            let proxy_url = args
                .replay_proxy
                .or(cfg.replay_proxy)
                .ok_or_else(|| "--replay needs --replay-proxy".to_string())?;
            let mut target = Target::parse(&url).map_err(|e| e.to_string())?;
            for raw in args.header.iter() {
                target
                    .headers
                    .push(route::parse_header(raw).map_err(|e| e.to_string())?);
            }
            Some(ReplayConfig { target, proxy_url })
        }
        None => None,
    };

    let mode = match args.probe {
        Some(addr) => Mode::Probe {
            addr,
            tls: args.tls,
        },
        None => Mode::Compile,
    };

    Ok(RunConfig {
        mode,
        verbose: args.verbose,
        no_color,
        options,
        proxies: crate::utils::cli_or_config(args.proxy, cfg.proxies),
        proxy_file: args.proxy_file.or(cfg.proxy_file),
        output,
        output_format,
        compile_out: args.compile_out,
        replay,
    })
}

async fn load_proxies(run: &RunConfig) -> Result<Vec<String>, String> {
    let mut proxies = run.proxies.clone();
    if let Some(path) = run.proxy_file.as_deref() {
        let loaded = proxy::load_proxy_file(path)
            .await
            .map_err(|e| format!("failed to read proxy file {path}: {e}"))?;
        proxies.extend(loaded);
    }
    Ok(proxies)
}

async fn run_probe(run: &RunConfig, addr: &str, tls: bool) -> Result<(), String> {
    let proxies = load_proxies(run).await?;
    let timeout = Duration::from_secs(run.options.timeout_seconds.max(1) as u64);
    let pool = Arc::new(ProxyPool::new(proxies));
    format_kv_line("Address", addr);
    format_kv_line("Proxies", &pool.len().to_string());
    format_kv_line("Tunnel", if tls { "CONNECT" } else { "none" });

    let dialer = Dialer::new(pool, timeout);
    let started = Instant::now();
    let conn = dialer.dial(addr, tls).await.map_err(|e| e.to_string())?;
    let peer = conn
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    info_line(&format!(
        "dial to {} succeeded via {} in {}ms",
        addr.bold(),
        peer,
        started.elapsed().as_millis()
    ));
    if !conn.buffered().is_empty() {
        warn_line(&format!(
            "proxy sent {} bytes past the end of the tunnel handshake",
            conn.buffered().len()
        ));
    }
    Ok(())
}

async fn write_file(path: &str, data: &[u8]) -> Result<(), String> {
    let path = config::expand_tilde_string(path);
    let mut outfile = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)
        .await
        .map_err(|e| format!("failed to open output file {path}: {e}"))?;
    outfile
        .write_all(data)
        .await
        .map_err(|e| format!("failed to write output file {path}: {e}"))
}

async fn await_replays(handles: Vec<tokio::task::JoinHandle<()>>) -> usize {
    let mut failed = 0;
    for h in handles {
        if let Err(e) = h.await {
            tracing::debug!(error = %e, "replay task failed");
            failed += 1;
        }
    }
    failed
}

async fn run_replay(replay: &ReplayConfig, result: &CompileResult) -> Result<(), String> {
    let replayer = Replayer::new(&replay.proxy_url).map_err(|e| e.to_string())?;
    info_line(&format!(
        "replaying {} routes against {} through {}",
        result.routes.len(),
        replay.target.host,
        replayer.proxy()
    ));
    for chunk in result.routes.chunks(REPLAY_BATCH) {
        let handles: Vec<_> = chunk
            .iter()
            .map(|r| replayer.replay(&replay.target, r))
            .collect();
        await_replays(handles).await;
    }
    Ok(())
}

async fn run_compile(run: &RunConfig) -> Result<(), String> {
    let runner = Runner::new(run.options.clone()).map_err(|e| e.to_string())?;
    let result = runner.run().await.map_err(|e| e.to_string())?;

    format_kv_line("Sources", &result.sources.len().to_string());
    format_kv_line("Routes", &result.routes.len().to_string());
    if !result.apis.is_empty() {
        format_kv_line("APIs", &result.apis.len().to_string());
    }
    if !result.diagnostics.is_empty() {
        warn_line(&format!(
            "{} entries could not be compiled and were skipped",
            result.diagnostics.len()
        ));
    }

    let rendered = output::render(run.output_format, &result.routes, &result.diagnostics);
    match run.output.as_deref() {
        Some(path) => {
            write_file(path, &rendered).await?;
            info_line(&format!("wrote route listing to {}", path.bold()));
        }
        None => print!("{}", String::from_utf8_lossy(&rendered)),
    }

    if let Some(path) = run.compile_out.as_deref() {
        let encoded = crate::spec::project::encode_route_file(&result.apis)
            .map_err(|e| e.to_string())?;
        write_file(path, &encoded).await?;
        info_line(&format!(
            "wrote {} APIs to route file {}",
            result.apis.len(),
            path.bold()
        ));
    }

    if let Some(replay) = run.replay.as_ref() {
        run_replay(replay, &result).await?;
    }

    info_line(&format!(
        "compiled {} routes in {}ms",
        result.routes.len(),
        result.elapsed.as_millis()
    ));
    Ok(())
}

async fn run_async(run: RunConfig) -> Result<(), String> {
    if run.no_color {
        colored::control::set_override(false);
    }
    match &run.mode {
        Mode::Probe { addr, tls } => run_probe(&run, addr, *tls).await,
        Mode::Compile => run_compile(&run).await,
    }
}

fn config_path(args: &CliArgs) -> (Option<PathBuf>, bool) {
    match args.config.as_deref() {
        Some(p) => (Some(config::expand_tilde(p)), false),
        None => (config::default_config_path(), true),
    }
}

pub fn run_cli() -> Result<(), String> {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{e}");
                return Ok(());
            }
            _ => return Err(e.to_string()),
        },
    };

    let (path, allow_missing) = config_path(&args);
    if args.init_config {
        let path = path.ok_or_else(|| "could not determine config path".to_string())?;
        config::ensure_default_config_file(&path)?;
        println!("config: {}", path.display());
        return Ok(());
    }
    let cfg = match path.as_ref() {
        Some(path) => config::load_config(path, allow_missing)?,
        None => ConfigFile::default(),
    };

    let run = build_run_config(args, cfg)?;
    init_logging(run.verbose, run.no_color);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to build runtime: {e}"))?;

    rt.block_on(run_async(run))
}
