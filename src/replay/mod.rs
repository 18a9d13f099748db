use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{redirect, Proxy, StatusCode};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::route::{Header, Route, Target};

pub const REPLAY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to parse replay proxy url '{url}': {source}")]
    ProxyUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build replay client: {source}")]
    Client {
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid replay header '{key}'")]
    Header { key: String },

    #[error("failed to replay {url}: {source}")]
    Send {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Mirrors requests to an inspection proxy. Owns one client that goes
/// through the proxy, accepts any certificate and keeps no idle connections.
#[derive(Clone, Debug)]
pub struct Replayer {
    client: reqwest::Client,
    proxy: String,
}

impl Replayer {
    pub fn new(proxy_url: &str) -> Result<Self, ReplayError> {
        let parsed = url::Url::parse(proxy_url).map_err(|e| ReplayError::ProxyUrl {
            url: proxy_url.to_string(),
            source: e,
        })?;
        let proxy = Proxy::all(parsed.as_str()).map_err(|e| ReplayError::Client { source: e })?;
        let client = reqwest::Client::builder()
            .proxy(proxy)
            .redirect(redirect::Policy::none())
            .timeout(REPLAY_TIMEOUT)
            .pool_max_idle_per_host(0)
            .danger_accept_invalid_hostnames(true)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| ReplayError::Client { source: e })?;
        Ok(Self {
            client,
            proxy: proxy_url.to_string(),
        })
    }

    pub fn proxy(&self) -> &str {
        &self.proxy
    }

    /// Sends one copy of the request. Target headers are applied first and
    /// route headers override them.
    pub async fn send(&self, target: &Target, route: &Route) -> Result<StatusCode, ReplayError> {
        let url = target.url_for(route);
        let mut headers = HeaderMap::new();
        for h in target.headers.iter().chain(route.headers.iter()) {
            let (name, value) = header_pair(h)?;
            headers.insert(name, value);
        }
        let resp = self
            .client
            .request(route.method.into(), &url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| ReplayError::Send {
                url: url.clone(),
                source: e,
            })?;
        Ok(resp.status())
    }

    /// Fire-and-forget replay; failures are only logged.
    pub fn replay(&self, target: &Target, route: &Route) -> JoinHandle<()> {
        let replayer = self.clone();
        let target = target.clone();
        let route = route.clone();
        tokio::spawn(async move {
            match replayer.send(&target, &route).await {
                Ok(status) => debug!(
                    url = %target.url_for(&route),
                    status = status.as_u16(),
                    "replayed request to proxy"
                ),
                Err(e) => debug!(error = %e, "failed to replay request to proxy"),
            }
        })
    }
}

fn header_pair(h: &Header) -> Result<(HeaderName, HeaderValue), ReplayError> {
    let invalid = || ReplayError::Header { key: h.key.clone() };
    let name = HeaderName::from_bytes(h.key.as_bytes()).map_err(|_| invalid())?;
    let value = HeaderValue::from_str(&h.value).map_err(|_| invalid())?;
    Ok((name, value))
}

/// One-shot replay through `proxy_url`. A bad proxy url is logged and
/// nothing is sent.
pub fn replay_request(target: &Target, route: &Route, proxy_url: &str) -> Option<JoinHandle<()>> {
    match Replayer::new(proxy_url) {
        Ok(replayer) => Some(replayer.replay(target, route)),
        Err(e) => {
            error!(proxy = %proxy_url, "{e}");
            None
        }
    }
}
