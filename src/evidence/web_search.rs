//! General web search through a search engine's HTML results page.
//!
//! Pages are fetched sequentially (each page offset depends on the previous
//! one), links are filtered against built-in and user avoid lists, and three
//! page kinds are told apart: a captcha challenge (blocked), an explicit
//! "did not match any" page (the `NoResults` sentinel) and a normal page.

use async_trait::async_trait;
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use super::{EvidenceSource, FetchConstraints, Fetched, SourceKind};
use crate::config::AppConfig;
use crate::domain_utils::{domain_matches_list, get_domain_name};
use crate::proxy::{build_client, ProxyRotation};
use crate::rate_limit::SharedRateLimiter;

/// Hard cap on result pages fetched for one query.
pub const MAX_PAGES: usize = 1000;

const RESULTS_PER_PAGE: usize = 10;

const CAPTCHA_MARKER: &str = "detected unusual traffic from your computer network.";
const NO_RESULTS_MARKER: &str = "did not match any ";

/// Links containing these are the search engine's own pages or caches.
const BUILTIN_AVOID_PATTERNS: &[&str] = &["webcache.googleusercontent.com", "google."];

/// One item of a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchHit {
    Link(String),
    /// The engine said nothing matched. Returned alone, never mixed with links.
    NoResults,
}

impl SearchHit {
    pub fn as_link(&self) -> Option<&str> {
        match self {
            SearchHit::Link(url) => Some(url),
            SearchHit::NoResults => None,
        }
    }
}

/// Classification of one results page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Blocked,
    NoResults,
    Links(Vec<String>),
}

pub struct WebSearch {
    search_url: String,
    /// Upper bound on links collected for any query
    maximum_results: usize,
    user_agent: String,
    timeout: Duration,
    user_avoid_patterns: Vec<String>,
    /// User avoid domains plus the search engine's own host
    avoid_domains: Vec<String>,
    proxies: Arc<dyn ProxyRotation>,
    limiter: SharedRateLimiter,
}

impl WebSearch {
    pub fn new(config: &AppConfig, proxies: Arc<dyn ProxyRotation>) -> Self {
        let search_url = config.search.search_url.trim_end_matches('/').to_string();

        let mut avoid_domains = config.search.user_avoid_domains.clone();
        let engine_host = get_domain_name(&search_url);
        if !engine_host.is_empty() {
            avoid_domains.push(engine_host);
        }

        Self {
            search_url,
            maximum_results: config.search.maximum_search_results,
            user_agent: config.http.user_agent.clone(),
            timeout: config.http.timeout(),
            user_avoid_patterns: config.search.user_avoid_patterns.clone(),
            avoid_domains,
            proxies,
            limiter: SharedRateLimiter::per_minute(config.search.requests_per_minute),
        }
    }

    /// Whether a result link must be dropped.
    pub fn should_avoid(&self, url: &str, accept_all: bool) -> bool {
        if url.is_empty() {
            return true;
        }

        // internal links
        if !url.starts_with("http:") && !url.starts_with("https:") {
            return true;
        }

        if BUILTIN_AVOID_PATTERNS.iter().any(|p| url.contains(p)) {
            return true;
        }

        if !accept_all {
            if self.user_avoid_patterns.iter().any(|p| !p.is_empty() && url.contains(p.as_str())) {
                debug!("Skipping {}: matches an avoid pattern", url);
                return true;
            }

            if domain_matches_list(url, &self.avoid_domains) {
                debug!("Skipping {}: avoided domain", url);
                return true;
            }
        }

        false
    }

    /// Classify one results page and pull out its acceptable links in order.
    pub fn parse_results_page(&self, page: &str, accept_all: bool) -> PageOutcome {
        if page.contains(CAPTCHA_MARKER) {
            return PageOutcome::Blocked;
        }

        if page.contains("google.") && page.contains(NO_RESULTS_MARKER) {
            return PageOutcome::NoResults;
        }

        let document = Html::parse_document(page);
        let Ok(selector) = Selector::parse("a[href]") else {
            return PageOutcome::Links(Vec::new());
        };

        let mut links: Vec<String> = Vec::new();
        for element in document.select(&selector) {
            let href = element.value().attr("href").unwrap_or_default();
            let ping = element.value().attr("ping").unwrap_or_default();

            // result links go through the engine's redirector
            if !href.contains("/url?") && !ping.contains("/url?") {
                continue;
            }

            let target = decode_redirect(href);
            if self.should_avoid(&target, accept_all) {
                continue;
            }
            if !links.contains(&target) {
                links.push(target);
            }
        }

        PageOutcome::Links(links)
    }

    async fn get_page(&self, client: &reqwest::Client, query: &str, page_index: usize) -> anyhow::Result<(u16, String)> {
        let mut params: Vec<(&str, String)> = vec![("q", query.to_string()), ("hl", "en".to_string())];
        if page_index > 0 {
            params.push(("start", (page_index * RESULTS_PER_PAGE).to_string()));
        }

        self.limiter.acquire().await;

        let response = client
            .get(format!("{}/search", self.search_url))
            .query(&params)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok((status, body))
    }
}

#[async_trait]
impl EvidenceSource for WebSearch {
    type Item = SearchHit;

    fn kind(&self) -> SourceKind {
        SourceKind::WebSearch
    }

    async fn fetch(&self, query: &str, constraints: &FetchConstraints) -> anyhow::Result<Fetched<SearchHit>> {
        let proxy = self.proxies.random_proxy();
        let client = build_client(proxy.as_deref(), &self.user_agent, self.timeout)?;

        let max_results = if constraints.uncapped {
            constraints.max_results
        } else {
            constraints.max_results.min(self.maximum_results).max(1)
        };
        let pages = max_results.div_ceil(RESULTS_PER_PAGE).clamp(1, MAX_PAGES);
        let mut results: Vec<String> = Vec::new();

        for page_index in 0..pages {
            let (status, page) = match self.get_page(&client, query, page_index).await {
                Ok(page) => page,
                Err(e) => {
                    warn!("Search request failed for '{}' (page {}): {}", query, page_index + 1, e);
                    break;
                }
            };

            if status == 429 {
                error!("Search engine rate-limited the request for '{}' (HTTP 429)", query);
                return Ok(Fetched::blocked(into_hits(results)));
            }

            match self.parse_results_page(&page, constraints.accept_all) {
                PageOutcome::Blocked => {
                    error!("There is a captcha on the search results for '{}'", query);
                    return Ok(Fetched::blocked(into_hits(results)));
                }
                PageOutcome::NoResults => {
                    debug!("No search results for {}", query);
                    if results.is_empty() {
                        return Ok(Fetched::new(vec![SearchHit::NoResults]));
                    }
                    break;
                }
                PageOutcome::Links(links) => {
                    if links.is_empty() {
                        // ran past the last page
                        break;
                    }
                    for link in links {
                        if results.len() >= max_results {
                            break;
                        }
                        if !results.contains(&link) {
                            results.push(link);
                        }
                    }

                    if max_results == 1 && !results.is_empty() {
                        break;
                    }
                    if results.len() >= max_results {
                        break;
                    }
                }
            }
        }

        debug!("Search '{}' returned {} links", query, results.len());
        Ok(Fetched::new(into_hits(results)))
    }
}

fn into_hits(links: Vec<String>) -> Vec<SearchHit> {
    links.into_iter().map(SearchHit::Link).collect()
}

/// `/url?q=https://target/&sa=U` -> `https://target/`. Other hrefs pass through.
pub fn decode_redirect(href: &str) -> String {
    if !href.starts_with("/url?") {
        return href.to_string();
    }

    let Ok(parsed) = Url::parse(&format!("http://redirect.invalid{}", href)) else {
        return String::new();
    };

    parsed
        .query_pairs()
        .find(|(key, _)| key == "q" || key == "url")
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ProxyPool;

    fn search_with(patterns: &[&str], domains: &[&str]) -> WebSearch {
        let mut config = AppConfig::default_template().unwrap();
        config.search.user_avoid_patterns = patterns.iter().map(|s| s.to_string()).collect();
        config.search.user_avoid_domains = domains.iter().map(|s| s.to_string()).collect();
        WebSearch::new(&config, Arc::new(ProxyPool::direct()))
    }

    #[test]
    fn test_decode_redirect() {
        assert_eq!(
            decode_redirect("/url?q=https://acme.com/about&sa=U&ved=x"),
            "https://acme.com/about"
        );
        assert_eq!(decode_redirect("https://acme.com/"), "https://acme.com/");
        assert_eq!(decode_redirect("/url?sa=U"), "");
    }

    #[test]
    fn test_should_avoid() {
        let search = search_with(&["/jobs/"], &["avoid.com"]);
        assert!(search.should_avoid("", false));
        assert!(search.should_avoid("/search?q=x", false));
        assert!(search.should_avoid("mailto:a@b.com", false));
        assert!(search.should_avoid("https://webcache.googleusercontent.com/search?q=cache:x", true));
        assert!(search.should_avoid("https://www.google.com/maps", true));
        assert!(search.should_avoid("https://sub.avoid.com/page", false));
        assert!(search.should_avoid("https://acme.com/jobs/1", false));

        // accept_all bypasses user lists only
        assert!(!search.should_avoid("https://sub.avoid.com/page", true));
        assert!(!search.should_avoid("https://acme.com/jobs/1", true));
        assert!(!search.should_avoid("https://acme.com/", false));
    }

    #[test]
    fn test_parse_captcha_page() {
        let search = search_with(&[], &[]);
        let page = "<html><body>Our systems have detected unusual traffic from your computer network.</body></html>";
        assert_eq!(search.parse_results_page(page, true), PageOutcome::Blocked);
    }

    #[test]
    fn test_parse_no_results_page() {
        let search = search_with(&[], &[]);
        let page = r#"<html><body><p>Your search - <b>site:zzz.com</b> - did not match any documents.</p>
            <a href="https://support.google.com/websearch">Help</a></body></html>"#;
        assert_eq!(search.parse_results_page(page, true), PageOutcome::NoResults);
    }

    #[test]
    fn test_parse_links_page() {
        let search = search_with(&[], &["avoid.com"]);
        let page = r#"<html><body>
            <a href="/url?q=https://acme.com/&sa=U">Acme</a>
            <a href="/url?q=https://acme.com/&sa=U">Acme again</a>
            <a class="x y" href="https://shop.acme.com/" ping="/url?sa=t&url=https://shop.acme.com/">Shop</a>
            <a href="/url?q=https://www.avoid.com/x&sa=U">Avoided</a>
            <a href="https://plain.com/">Not a result link</a>
            <a href="/search?q=next">Next</a>
        </body></html>"#;

        match search.parse_results_page(page, false) {
            PageOutcome::Links(links) => {
                assert_eq!(links, vec!["https://acme.com/".to_string(), "https://shop.acme.com/".to_string()]);
            }
            other => panic!("expected links, got {:?}", other),
        }
    }
}
