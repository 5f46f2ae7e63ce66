//! Proxy rotation collaborator.
//!
//! Every evidence request asks for a fresh random proxy before it is sent, so
//! request volume is spread over the pool instead of one source address.

use rand::seq::SliceRandom;
use tracing::debug;

/// Source of proxy assignments. `None` means "connect directly".
pub trait ProxyRotation: Send + Sync {
    fn random_proxy(&self) -> Option<String>;
}

/// Fixed list of proxy URLs picked from uniformly at random.
#[derive(Debug, Clone, Default)]
pub struct ProxyPool {
    proxies: Vec<String>,
}

impl ProxyPool {
    pub fn new(proxies: Vec<String>) -> Self {
        let proxies = proxies
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Self { proxies }
    }

    /// A pool that never assigns a proxy.
    pub fn direct() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

impl ProxyRotation for ProxyPool {
    fn random_proxy(&self) -> Option<String> {
        let choice = self.proxies.choose(&mut rand::thread_rng()).cloned();
        if let Some(ref proxy) = choice {
            debug!("Using proxy {}", proxy);
        }
        choice
    }
}

/// Build an HTTP client for one request, routed through `proxy` when given.
/// An unusable proxy URL falls back to a direct connection.
pub fn build_client(
    proxy: Option<&str>,
    user_agent: &str,
    timeout: std::time::Duration,
) -> anyhow::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .redirect(reqwest::redirect::Policy::limited(5));

    if let Some(proxy) = proxy {
        match reqwest::Proxy::all(proxy) {
            Ok(p) => builder = builder.proxy(p),
            Err(e) => debug!("Ignoring invalid proxy {}: {}", proxy, e),
        }
    }

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_pool_assigns_nothing() {
        let pool = ProxyPool::direct();
        assert!(pool.is_empty());
        assert!(pool.random_proxy().is_none());
    }

    #[test]
    fn test_pool_picks_from_list() {
        let proxies = vec![
            "http://10.0.0.1:8080".to_string(),
            "  ".to_string(),
            "http://10.0.0.2:8080".to_string(),
        ];
        let pool = ProxyPool::new(proxies);
        assert_eq!(pool.len(), 2);
        for _ in 0..20 {
            let p = pool.random_proxy().unwrap();
            assert!(p == "http://10.0.0.1:8080" || p == "http://10.0.0.2:8080");
        }
    }

    #[test]
    fn test_build_client_with_bad_proxy_still_builds() {
        let client = build_client(Some("::not a proxy::"), "test/1.0", std::time::Duration::from_secs(1));
        assert!(client.is_ok());
    }
}
