pub mod dialer;

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

pub use dialer::{Connection, DialError, Dialer};

/// Round-robin over a fixed list of upstream proxies. Selection is a single
/// atomic increment, so the pool can be shared freely between tasks.
#[derive(Debug, Default)]
pub struct ProxyPool {
    proxies: Vec<String>,
    current: AtomicU64,
}

impl ProxyPool {
    pub fn new(proxies: Vec<String>) -> Self {
        Self {
            proxies,
            current: AtomicU64::new(0),
        }
    }

    /// Returns the next proxy in round-robin order.
    ///
    /// # Panics
    ///
    /// Panics when the pool is empty. Check [`ProxyPool::is_empty`] first.
    pub fn next_proxy(&self) -> &str {
        let idx = self.current.fetch_add(1, Ordering::Relaxed);
        &self.proxies[(idx % self.proxies.len() as u64) as usize]
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn proxies(&self) -> &[String] {
        &self.proxies
    }
}

/// `host:port` for a proxy given as `host:port` or `http://host:port/`.
pub fn proxy_address(proxy: &str) -> &str {
    let proxy = proxy.trim();
    let without_scheme = match proxy.find("://") {
        Some(i) => &proxy[i + 3..],
        None => proxy,
    };
    without_scheme.trim_end_matches('/')
}

/// Reads one proxy per line, skipping blank lines.
pub async fn load_proxy_file(path: &str) -> std::io::Result<Vec<String>> {
    let path = crate::config::expand_tilde_string(path);
    let file = File::open(&path).await?;
    let mut lines = BufReader::new(file).lines();
    let mut proxies = Vec::new();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if !line.is_empty() {
            proxies.push(line.to_string());
        }
    }
    Ok(proxies)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_proxy_cycles_in_order() {
        let pool = ProxyPool::new(vec!["a:1".into(), "b:2".into(), "c:3".into()]);
        let picked: Vec<_> = (0..7).map(|_| pool.next_proxy().to_string()).collect();
        assert_eq!(picked, vec!["a:1", "b:2", "c:3", "a:1", "b:2", "c:3", "a:1"]);
    }

    #[test]
    #[should_panic]
    fn empty_pool_panics() {
        ProxyPool::new(Vec::new()).next_proxy();
    }

    #[test]
    fn proxy_address_strips_scheme() {
        assert_eq!(proxy_address("http://127.0.0.1:8080/"), "127.0.0.1:8080");
        assert_eq!(proxy_address(" proxy.local:3128 "), "proxy.local:3128");
    }

    #[tokio::test]
    async fn proxy_file_skips_blank_lines() {
        let path = std::env::temp_dir().join(format!("routebuster-proxies-{}.txt", std::process::id()));
        tokio::fs::write(&path, "127.0.0.1:8080\n\n  http://10.0.0.1:3128  \n")
            .await
            .unwrap();
        let proxies = load_proxy_file(path.to_str().unwrap()).await.unwrap();
        let _ = tokio::fs::remove_file(&path).await;
        assert_eq!(proxies, vec!["127.0.0.1:8080", "http://10.0.0.1:3128"]);
    }
}
