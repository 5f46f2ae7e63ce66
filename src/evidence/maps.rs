//! Places lookup through a maps text-search JSON API.
//!
//! Results come back a page at a time; each page carries a token for the
//! next one, and that token is briefly "not ready" after it is issued
//! (`INVALID_REQUEST`), so every page request goes through [`FixedRetry`].

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{EvidenceSource, FetchConstraints, Fetched, SourceKind};
use crate::config::AppConfig;
use crate::proxy::{build_client, ProxyRotation};
use crate::rate_limit::{Attempt, FixedRetry};

const NOT_READY_STATUS: &str = "INVALID_REQUEST";
const BLOCKED_STATUSES: &[&str] = &["OVER_QUERY_LIMIT", "REQUEST_DENIED"];
const DETAIL_FIELDS: &str = "name,international_phone_number,website,address_component";

#[derive(Debug, Clone, Default, Deserialize)]
struct TextSearchResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    next_page_token: Option<String>,
    #[serde(default)]
    results: Vec<PlaceSummary>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PlaceSummary {
    #[serde(default)]
    place_id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    formatted_address: String,
    #[serde(default)]
    types: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DetailsResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    result: PlaceDetails,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PlaceDetails {
    #[serde(default)]
    international_phone_number: Option<String>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    address_components: Vec<AddressComponent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressComponent {
    pub long_name: String,
    #[serde(default)]
    pub short_name: String,
    #[serde(default)]
    pub types: Vec<String>,
}

/// A place found by text search, enriched with its details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub address: String,
    pub address_components: Vec<AddressComponent>,
    /// Last comma-separated part of the address
    pub country: String,
    /// Place types joined with `; `
    pub industry: String,
    pub maps_url: String,
}

impl Place {
    fn from_parts(summary: PlaceSummary, details: PlaceDetails) -> Self {
        let country = summary
            .formatted_address
            .rsplit(", ")
            .next()
            .unwrap_or_default()
            .to_string();

        Self {
            maps_url: format!("https://www.google.com/maps/place/?q=place_id:{}", summary.place_id),
            id: summary.place_id,
            name: summary.name,
            phone: details.international_phone_number,
            website: details.website,
            address: summary.formatted_address,
            address_components: details.address_components,
            country,
            industry: summary.types.join("; "),
        }
    }
}

/// Log an API-reported error. Returns true when the status means we were blocked.
fn handle_error(status: &str, error_message: Option<&str>) -> bool {
    if status == "OK" || status == "ZERO_RESULTS" {
        return false;
    }

    error!("Places API: {} {}", status, error_message.unwrap_or_default());
    BLOCKED_STATUSES.contains(&status)
}

/// Keyword plus optional region, the form the text search expects.
pub fn query_for(keyword: &str, region: Option<&str>) -> String {
    match region {
        Some(region) if !region.trim().is_empty() => format!("{} {}", keyword.trim(), region.trim()),
        _ => keyword.trim().to_string(),
    }
}

pub struct MapsLookup {
    api_url: String,
    api_key: String,
    max_pages: usize,
    retry: FixedRetry,
    page_delay: Duration,
    proxies: Arc<dyn ProxyRotation>,
    user_agent: String,
    timeout: Duration,
}

impl MapsLookup {
    pub fn new(config: &AppConfig, api_key: String, proxies: Arc<dyn ProxyRotation>) -> Self {
        let maps = &config.maps;
        Self {
            api_url: maps.api_url.trim_end_matches('/').to_string(),
            api_key,
            max_pages: maps.max_pages,
            retry: FixedRetry::new(maps.not_ready_attempts, Duration::from_millis(maps.not_ready_delay_ms)),
            page_delay: Duration::from_millis(maps.page_delay_ms),
            proxies,
            user_agent: config.http.user_agent.clone(),
            timeout: config.http.timeout(),
        }
    }

    /// Build from config, reading the API key from the configured environment variable.
    pub fn from_env(config: &AppConfig, proxies: Arc<dyn ProxyRotation>) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.maps.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .with_context(|| format!("Places API key missing: set the {} environment variable", config.maps.api_key_env))?;

        Ok(Self::new(config, api_key, proxies))
    }

    async fn text_search_page(
        &self,
        client: &reqwest::Client,
        query: &str,
        page_token: Option<&str>,
    ) -> anyhow::Result<Attempt<TextSearchResponse>> {
        let mut params = vec![("query", query), ("key", self.api_key.as_str())];
        if let Some(token) = page_token {
            params.push(("pagetoken", token));
        }

        let response: TextSearchResponse = client
            .get(format!("{}/maps/api/place/textsearch/json", self.api_url))
            .query(&params)
            .send()
            .await
            .context("Places text search request failed")?
            .json()
            .await
            .context("Places text search returned invalid JSON")?;

        if response.status == NOT_READY_STATUS {
            return Ok(Attempt::NotReady(response));
        }
        Ok(Attempt::Ready(response))
    }

    /// Collect search results page by page. Second value is the blocked flag.
    async fn get_pages(
        &self,
        client: &reqwest::Client,
        query: &str,
        max_results: usize,
    ) -> (Vec<PlaceSummary>, bool) {
        let mut results: Vec<PlaceSummary> = Vec::new();
        let mut next_page_token: Option<String> = None;

        for page in 0..self.max_pages {
            info!("Getting page {} of places results for '{}'", page + 1, query);

            let token = next_page_token.as_deref();
            let response = match self.retry.run(move |_| self.text_search_page(client, query, token)).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Places search for '{}' failed: {:#}", query, e);
                    break;
                }
            };

            if handle_error(&response.status, response.error_message.as_deref()) {
                return (results, true);
            }

            next_page_token = response.next_page_token.filter(|t| !t.is_empty());
            results.extend(response.results);
            debug!("Found {} places so far", results.len());

            if results.len() >= max_results {
                info!("Reached places result limit: {}", max_results);
                results.truncate(max_results);
                break;
            }

            if next_page_token.is_none() {
                break;
            }

            // the next page token needs time to become valid
            tokio::time::sleep(self.page_delay).await;
        }

        (results, false)
    }

    async fn place_details(&self, client: &reqwest::Client, place_id: &str) -> anyhow::Result<DetailsResponse> {
        let response = client
            .get(format!("{}/maps/api/place/details/json", self.api_url))
            .query(&[("place_id", place_id), ("fields", DETAIL_FIELDS), ("key", self.api_key.as_str())])
            .send()
            .await
            .context("Places details request failed")?
            .json()
            .await
            .context("Places details returned invalid JSON")?;
        Ok(response)
    }
}

#[async_trait]
impl EvidenceSource for MapsLookup {
    type Item = Place;

    fn kind(&self) -> SourceKind {
        SourceKind::MapsLookup
    }

    async fn fetch(&self, query: &str, constraints: &FetchConstraints) -> anyhow::Result<Fetched<Place>> {
        let proxy = self.proxies.random_proxy();
        let client = build_client(proxy.as_deref(), &self.user_agent, self.timeout)?;

        let (summaries, blocked) = self.get_pages(&client, query, constraints.max_results).await;

        let mut names: HashSet<String> = HashSet::new();
        let mut places = Vec::new();

        for summary in summaries {
            // to avoid duplicates
            if !names.insert(summary.name.clone()) {
                continue;
            }

            let details = match self.place_details(&client, &summary.place_id).await {
                Ok(response) => {
                    if handle_error(&response.status, response.error_message.as_deref()) {
                        return Ok(Fetched::blocked(places));
                    }
                    response.result
                }
                Err(e) => {
                    debug!("No details for {}: {:#}", summary.name, e);
                    PlaceDetails::default()
                }
            };

            if details.international_phone_number.as_deref().map_or(true, str::is_empty) {
                debug!("Skipping {}: no international phone number", summary.name);
                continue;
            }

            places.push(Place::from_parts(summary, details));
        }

        if blocked {
            return Ok(Fetched::blocked(places));
        }
        Ok(Fetched::new(places))
    }
}
