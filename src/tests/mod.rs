use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::diagnostics::DiagnosticSet;
use crate::proxy::ProxyPool;
use crate::route::{Method, Route};
use crate::runner::{Options, Runner, RunnerError};
use crate::spec::api::{ApiRecord, Apis, Operation};
use crate::spec::project::encode_route_file;
use crate::spec::{SpecCompiler, SpecError};
use crate::wordlist::{self, DirectoryRegistry, WordlistError};

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("routebuster-{}-{name}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write(dir: &PathBuf, file: &str, contents: &[u8]) -> String {
    let path = dir.join(file);
    std::fs::write(&path, contents).unwrap();
    path.to_string_lossy().to_string()
}

fn paths(routes: &[Route]) -> Vec<&str> {
    routes.iter().map(|r| r.path.as_str()).collect()
}

// Serves one HTTP response to the first connection.
async fn serve_once(status: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 2048];
        let _ = socket.read(&mut buf).await;
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = socket.write_all(response.as_bytes()).await;
    });
    format!("http://{addr}")
}

// Ignores proxy settings from the environment so fetches hit the local server.
fn compiler() -> SpecCompiler {
    let client = reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    SpecCompiler::new(Duration::from_secs(5), false)
        .unwrap()
        .with_client(client)
}

#[tokio::test]
async fn raw_spec_partial_failures_are_diagnostics() {
    let dir = temp_dir("partial");
    let spec = write(
        &dir,
        "openapi.json",
        br#"[{
            "id": "shop",
            "url": "https://shop.example.com/api",
            "paths": {
                "/a": {"get": {}, "post": {}},
                "/b": {"put": {}, "fetch": {}},
                "/c": {"delete": "broken"}
            }
        }]"#,
    );

    let mut routes = Vec::new();
    let mut diagnostics = DiagnosticSet::new();
    let apis = compiler()
        .compile_sources(&[spec.clone()], &mut routes, &mut diagnostics)
        .await
        .unwrap();

    assert_eq!(apis.len(), 1);
    assert_eq!(paths(&routes), vec!["/api/a", "/api/a", "/api/b"]);
    assert_eq!(diagnostics.len(), 2);
    assert!(diagnostics.iter().all(|d| d.source == spec && d.item == "shop"));
}

#[tokio::test]
async fn swagger_yaml_fetched_from_url() {
    let base = serve_once(
        "200 OK",
        "swagger: '2.0'\nhost: api.example.com\nbasePath: /v1\nschemes: [http]\npaths:\n  /pets/{petId}:\n    get:\n      parameters:\n        - name: petId\n          in: path\n          type: integer\n",
    )
    .await;

    let mut routes = Vec::new();
    let mut diagnostics = DiagnosticSet::new();
    let apis = compiler()
        .compile_sources(&[format!("{base}/docs")], &mut routes, &mut diagnostics)
        .await
        .unwrap();

    assert!(diagnostics.is_empty());
    assert_eq!(apis.iter().next().unwrap().url, "http://api.example.com/v1");
    assert_eq!(paths(&routes), vec!["/v1/pets/1"]);
    assert_eq!(routes[0].method, Method::Get);
}

#[tokio::test]
async fn non_200_fetch_fails_the_source() {
    let base = serve_once("404 Not Found", "missing").await;
    let url = format!("{base}/openapi.json");

    let mut routes = Vec::new();
    let mut diagnostics = DiagnosticSet::new();
    let err = compiler()
        .compile_sources(&[url.clone()], &mut routes, &mut diagnostics)
        .await
        .unwrap_err();
    match err {
        SpecError::Source { source_name, cause } => {
            assert_eq!(source_name, url);
            assert!(matches!(*cause, SpecError::Status { status: 404, .. }));
        }
        other => panic!("unexpected error {other}"),
    }
}

#[tokio::test]
async fn scalar_document_is_fatal_and_keeps_earlier_routes() {
    let dir = temp_dir("scalar");
    let good = write(
        &dir,
        "good.yaml",
        b"url: http://x\npaths:\n  /ok:\n    get: {}\n",
    );
    let bad = write(&dir, "bad.json", b"\"just a string\"");
    let never = write(&dir, "never.yaml", b"url: http://x\npaths:\n  /never:\n    get: {}\n");

    let mut routes = Vec::new();
    let mut diagnostics = DiagnosticSet::new();
    let err = compiler()
        .compile_sources(&[good, bad, never], &mut routes, &mut diagnostics)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("bad.json"));
    assert_eq!(paths(&routes), vec!["/ok"]);
}

#[tokio::test]
async fn empty_source_name_ends_the_batch() {
    let mut routes = Vec::new();
    let mut diagnostics = DiagnosticSet::new();
    let apis = compiler()
        .compile_sources(
            &["".to_string(), "/definitely/missing/openapi.json".to_string()],
            &mut routes,
            &mut diagnostics,
        )
        .await
        .unwrap();

    assert!(apis.is_empty());
    assert!(routes.is_empty());
    assert!(diagnostics.is_empty());
}

#[tokio::test]
async fn unreachable_url_fails_the_source() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let url = format!("http://{addr}/openapi.json");

    let mut routes = Vec::new();
    let mut diagnostics = DiagnosticSet::new();
    let err = compiler()
        .compile_sources(&[url.clone()], &mut routes, &mut diagnostics)
        .await
        .unwrap_err();
    match err {
        SpecError::Source { source_name, cause } => {
            assert_eq!(source_name, url);
            assert!(matches!(*cause, SpecError::Fetch { .. }));
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(routes.is_empty());
}

#[tokio::test]
async fn undecodable_route_file_fails_the_source() {
    let dir = temp_dir("bad-kite");
    let good = write(&dir, "good.kite", &encode_route_file(&sample_apis()).unwrap());
    let bad = write(&dir, "bad.kite", br#"{"id": "not-a-list"}"#);
    let garbage = write(&dir, "garbage.kite", b"\x00\x01 not json");

    let mut routes = Vec::new();
    let mut diagnostics = DiagnosticSet::new();
    let err = compiler()
        .compile_sources(&[good, bad.clone()], &mut routes, &mut diagnostics)
        .await
        .unwrap_err();
    match err {
        SpecError::Source { source_name, cause } => {
            assert_eq!(source_name, bad);
            assert!(matches!(*cause, SpecError::UnexpectedShape { .. }));
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(paths(&routes), vec!["/v1/users", "/v1/users/me", "/invoices"]);

    let err = compiler()
        .compile_sources(&[garbage], &mut routes, &mut diagnostics)
        .await
        .unwrap_err();
    assert!(matches!(err, SpecError::Source { ref cause, .. } if matches!(**cause, SpecError::Json { .. })));
}

#[tokio::test]
async fn text_wordlists_keep_routes_loaded_before_a_failure() {
    let dir = temp_dir("text");
    let first = write(&dir, "first.txt", b"admin\n\n/api/v1\n   \n");
    let missing = dir.join("missing.txt").to_string_lossy().to_string();

    let mut routes = Vec::new();
    let err = wordlist::load_text_wordlists(
        &[first.clone(), missing, first],
        &["json".to_string()],
        false,
        &mut routes,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, WordlistError::Open { .. }));
    assert_eq!(
        paths(&routes),
        vec!["/admin", "/admin.json", "/api/v1", "/api/v1.json"]
    );
}

#[tokio::test]
async fn hosted_wordlists_truncate_to_effective_bound() {
    let dir = temp_dir("hosted");
    write(&dir, "raft.txt", b"one\ntwo\nthree\nfour\nfive\n");
    let registry = DirectoryRegistry::new(&dir);

    let mut routes = Vec::new();
    wordlist::load_hosted_wordlists(
        &registry,
        &["raft;3".to_string(), "raft".to_string()],
        &[],
        false,
        &mut routes,
    )
    .await
    .unwrap();

    assert_eq!(paths(&routes), vec!["/one", "/two", "/three"]);
    assert!(routes.iter().all(|r| r.source == "raft"));

    let err = wordlist::load_hosted_wordlists(&registry, &["nope".to_string()], &[], false, &mut routes)
        .await
        .unwrap_err();
    assert!(matches!(err, WordlistError::UnknownWordlist { .. }));
}

fn sample_apis() -> Apis {
    let op = |path: &str| Operation {
        method: "GET".to_string(),
        path: path.to_string(),
        parameters: Vec::new(),
    };
    Apis(vec![
        ApiRecord {
            id: "users".to_string(),
            url: "https://users.example.com/v1".to_string(),
            operations: vec![op("/users"), op("/users/me")],
        },
        ApiRecord {
            id: "billing".to_string(),
            url: "https://billing.example.com".to_string(),
            operations: vec![op("/invoices")],
        },
    ])
}

#[tokio::test]
async fn hosted_api_wordlists_keep_first_apis() {
    let dir = temp_dir("hosted-apis");
    write(&dir, "routes.kite", &encode_route_file(&sample_apis()).unwrap());
    let registry = DirectoryRegistry::new(&dir);
    let compiler = compiler();

    let mut routes = Vec::new();
    let mut diagnostics = DiagnosticSet::new();
    let loaded = wordlist::load_hosted_apis(
        &registry,
        &["routes;1".to_string()],
        compiler.decoder(),
        compiler.projector(),
        &mut routes,
        &mut diagnostics,
    )
    .await
    .unwrap();

    assert_eq!(loaded, 1);
    assert_eq!(paths(&routes), vec!["/v1/users", "/v1/users/me"]);
    assert!(diagnostics.is_empty());
}

#[tokio::test]
async fn runner_compiles_filters_and_forces_method() {
    let dir = temp_dir("runner");
    let words = write(&dir, "words.txt", b"admin\n");
    let kite = write(&dir, "apis.kite", &encode_route_file(&sample_apis()).unwrap());

    let runner = Runner::new(Options {
        wordlists: vec![words],
        spec_sources: vec![kite],
        filter_apis: vec!["users".to_string()],
        force_method: Some("post".to_string()),
        timeout_seconds: 5,
        ..Options::default()
    })
    .unwrap();
    let result = runner.run().await.unwrap();

    assert_eq!(paths(&result.routes), vec!["/v1/users", "/v1/users/me"]);
    assert!(result.routes.iter().all(|r| r.method == Method::Post));
    assert_eq!(result.apis.len(), 2);
    assert_eq!(result.sources.len(), 2);

    let runner = Runner::new(Options {
        wordlists: vec![dir.join("words.txt").to_string_lossy().to_string()],
        filter_apis: vec!["nothing-matches".to_string()],
        timeout_seconds: 5,
        ..Options::default()
    })
    .unwrap();
    assert!(matches!(runner.run().await, Err(RunnerError::NoRoutes)));
}

#[test]
fn proxy_pool_is_fair_under_contention() {
    let proxies: Vec<String> = (0..4).map(|i| format!("10.0.0.{i}:8080")).collect();
    let pool = Arc::new(ProxyPool::new(proxies.clone()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pool = pool.clone();
            std::thread::spawn(move || {
                let mut seen: HashMap<String, usize> = HashMap::new();
                for _ in 0..1000 {
                    *seen.entry(pool.next_proxy().to_string()).or_default() += 1;
                }
                seen
            })
        })
        .collect();

    let mut totals: HashMap<String, usize> = HashMap::new();
    for h in handles {
        for (proxy, n) in h.join().unwrap() {
            *totals.entry(proxy).or_default() += n;
        }
    }
    for p in proxies.iter() {
        assert_eq!(totals[p], 2000);
    }

    // the counter keeps going from where the threads left it
    assert_eq!(pool.next_proxy(), proxies[0]);
}
