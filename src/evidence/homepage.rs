//! Homepage evidence: is the domain's website alive, and what does its title say?

use async_trait::async_trait;
use reqwest::StatusCode;
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{EvidenceSource, FetchConstraints, Fetched, SearchHit, SourceKind};
use crate::config::{AppConfig, HomepageConfig};
use crate::name_normalizer::collapse_whitespace;
use crate::proxy::{build_client, ProxyRotation};
use crate::result::DomainStatus;

/// Indexed pages below this count mark a domain as parked.
const MIN_INDEXED_PAGES: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomepageEvidence {
    pub status: DomainStatus,
    /// Only read when the site is active
    pub title: Option<String>,
}

impl HomepageEvidence {
    pub fn inactive(status: DomainStatus) -> Self {
        Self { status, title: None }
    }

    /// Candidate company names taken from the title.
    pub fn candidates(&self) -> Vec<String> {
        self.title.as_deref().map(split_title).unwrap_or_default()
    }
}

/// Split a page title around its first `-` or `|`. The company name may sit
/// on either side, so both halves are kept.
pub fn split_title(title: &str) -> Vec<String> {
    let parts: Vec<&str> = match title.find(['-', '|']) {
        Some(index) => vec![&title[..index], &title[index + 1..]],
        None => vec![title],
    };

    parts
        .into_iter()
        .map(collapse_whitespace)
        .filter(|part| !part.is_empty())
        .collect()
}

fn page_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    let title = collapse_whitespace(&document.select(&selector).next()?.text().collect::<String>());
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

/// Check the body for a parked / placeholder phrase. Phrases are lower case.
pub fn contains_parked_phrase(body: &str, phrases: &[String]) -> Option<String> {
    let lowered = body.to_lowercase();
    phrases
        .iter()
        .find(|phrase| !phrase.is_empty() && lowered.contains(&phrase.to_lowercase()))
        .cloned()
}

pub struct HomepageFetch {
    settings: HomepageConfig,
    search: Arc<dyn EvidenceSource<Item = SearchHit>>,
    proxies: Arc<dyn ProxyRotation>,
    user_agent: String,
    timeout: Duration,
}

impl HomepageFetch {
    pub fn new(
        config: &AppConfig,
        search: Arc<dyn EvidenceSource<Item = SearchHit>>,
        proxies: Arc<dyn ProxyRotation>,
    ) -> Self {
        Self {
            settings: config.homepage.clone(),
            search,
            proxies,
            user_agent: config.http.user_agent.clone(),
            timeout: config.homepage.timeout(),
        }
    }

    /// Status from the HTTP exchange alone, plus the body when it was read.
    async fn get_homepage(&self, domain: &str) -> anyhow::Result<Result<String, DomainStatus>> {
        let url = self.settings.url_for(domain);
        let proxy = self.proxies.random_proxy();
        let client = build_client(proxy.as_deref(), &self.user_agent, self.timeout)?;

        let response = match client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("{} did not respond: {}", url, e);
                return Ok(Err(DomainStatus::Offline));
            }
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(Err(DomainStatus::NotFound));
        }
        if !status.is_success() {
            debug!("{} returned HTTP {}", url, status);
            return Ok(Err(DomainStatus::Offline));
        }

        match response.text().await {
            Ok(body) => Ok(Ok(body)),
            Err(e) => {
                debug!("Failed to read body of {}: {}", url, e);
                Ok(Err(DomainStatus::Offline))
            }
        }
    }
}

#[async_trait]
impl EvidenceSource for HomepageFetch {
    type Item = HomepageEvidence;

    fn kind(&self) -> SourceKind {
        SourceKind::HomepageFetch
    }

    /// `query` is the domain. Always yields exactly one item unless blocked.
    async fn fetch(&self, query: &str, _constraints: &FetchConstraints) -> anyhow::Result<Fetched<HomepageEvidence>> {
        let body = match self.get_homepage(query).await? {
            Ok(body) => body,
            Err(status) => {
                info!("{} is {}", query, status);
                return Ok(Fetched::new(vec![HomepageEvidence::inactive(status)]));
            }
        };

        if let Some(phrase) = contains_parked_phrase(&body, &self.settings.parked_phrases) {
            info!("{} is parked (page says '{}')", query, phrase);
            return Ok(Fetched::new(vec![HomepageEvidence::inactive(DomainStatus::Parked)]));
        }

        // a parked domain typically isn't indexed
        let indexed = self
            .search
            .fetch(&format!("site:{}", query), &FetchConstraints::new(MIN_INDEXED_PAGES, true).uncapped())
            .await?;
        if indexed.blocked {
            return Ok(Fetched::blocked(Vec::new()));
        }

        let pages = indexed.items.iter().filter_map(SearchHit::as_link).count();
        if pages < MIN_INDEXED_PAGES {
            info!("{} is parked ({} indexed pages)", query, pages);
            return Ok(Fetched::new(vec![HomepageEvidence::inactive(DomainStatus::Parked)]));
        }

        let title = page_title(&body);
        debug!("{} is active, title: {:?}", query, title);

        Ok(Fetched::new(vec![HomepageEvidence {
            status: DomainStatus::Active,
            title,
        }]))
    }
}
