//! Company registry evidence.
//!
//! The registry is reached two ways: a `site:<registry> <domain>` web search
//! that leads to a company's public page, and the registry's own name search.
//! Which elements hold which fields is described per registry site in
//! [`REGISTRY_PROFILES`], resolved once when the source is built.

use anyhow::Context;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{EvidenceSource, FetchConstraints, Fetched, SearchHit, SourceKind};
use crate::config::AppConfig;
use crate::domain_utils::is_canonical_company_page;
use crate::name_normalizer::collapse_whitespace;
use crate::proxy::{build_client, ProxyRotation};

/// Search results inspected when looking for a company page.
const REGISTRY_SEARCH_RESULTS: usize = 5;

/// Fields scraped from a registry company page. Every field is optional;
/// a page missing one is still a usable record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub company_name: Option<String>,
    pub company_number: Option<String>,
    pub registered_address: Option<String>,
    pub company_status: Option<String>,
    /// Page the record was read from
    pub url: Option<String>,
}

impl RegistryRecord {
    pub fn is_empty(&self) -> bool {
        self.company_name.is_none()
            && self.company_number.is_none()
            && self.registered_address.is_none()
            && self.company_status.is_none()
    }
}

/// One hit of the registry's own company search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryCandidate {
    pub name: String,
    pub address: String,
}

/// Where one field lives on a registry page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    /// Text of the first element matching a CSS selector
    Selector(&'static str),
    /// `<dd>` paired with the `<dt>` whose text equals the label
    DefinitionTerm(&'static str),
}

/// Parsing rules for one registry site.
#[derive(Debug, Clone, Copy)]
pub struct RegistryProfile {
    pub site: &'static str,
    /// Path prefix of a company page; the identifier follows it
    pub company_path: &'static str,
    pub company_name: FieldRule,
    pub company_number: FieldRule,
    pub registered_address: FieldRule,
    pub company_status: FieldRule,
    /// Path of the registry's own search, queried with `?q=`
    pub search_path: &'static str,
    /// One element per result of the registry's own search
    pub search_result: &'static str,
    pub search_result_name: &'static str,
    pub search_result_address: &'static str,
}

const COMPANIES_HOUSE: RegistryProfile = RegistryProfile {
    site: "beta.companieshouse.gov.uk",
    company_path: "/company/",
    company_name: FieldRule::Selector("div.company-header p.heading-xlarge"),
    company_number: FieldRule::Selector("p#company-number strong"),
    registered_address: FieldRule::DefinitionTerm("Registered office address"),
    company_status: FieldRule::DefinitionTerm("Company status"),
    search_path: "/search/companies",
    search_result: "li.type-company",
    search_result_name: "a[href*='/company/']",
    search_result_address: "p:not([class])",
};

pub const REGISTRY_PROFILES: &[RegistryProfile] = &[
    COMPANIES_HOUSE,
    RegistryProfile {
        site: "find-and-update.company-information.service.gov.uk",
        ..COMPANIES_HOUSE
    },
];

/// Rules for `site`, falling back to the first profile for unknown sites.
pub fn profile_for(site: &str) -> &'static RegistryProfile {
    let site = site.trim().trim_start_matches("www.").to_lowercase();
    match REGISTRY_PROFILES.iter().find(|p| p.site == site) {
        Some(profile) => profile,
        None => {
            warn!("No parsing rules for registry {}, using {} rules", site, REGISTRY_PROFILES[0].site);
            &REGISTRY_PROFILES[0]
        }
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn extract_field(document: &Html, rule: FieldRule) -> Option<String> {
    match rule {
        FieldRule::Selector(css) => {
            let selector = Selector::parse(css).ok()?;
            document.select(&selector).next().map(element_text).and_then(non_empty)
        }
        FieldRule::DefinitionTerm(label) => {
            let dl = Selector::parse("dl").ok()?;
            let dt = Selector::parse("dt").ok()?;
            let dd = Selector::parse("dd").ok()?;

            document.select(&dl).find_map(|pair| {
                let term = pair.select(&dt).next().map(element_text)?;
                if term != label {
                    return None;
                }
                pair.select(&dd).next().map(element_text).and_then(non_empty)
            })
        }
    }
}

/// Read a company page into a record. Missing fields stay `None`.
pub fn parse_company_page(html: &str, profile: &RegistryProfile) -> RegistryRecord {
    let document = Html::parse_document(html);

    RegistryRecord {
        company_name: extract_field(&document, profile.company_name),
        company_number: extract_field(&document, profile.company_number),
        registered_address: extract_field(&document, profile.registered_address),
        company_status: extract_field(&document, profile.company_status),
        url: None,
    }
}

/// Read the registry's own search results page.
pub fn parse_search_results(html: &str, profile: &RegistryProfile) -> Vec<RegistryCandidate> {
    let document = Html::parse_document(html);
    let (Ok(item_sel), Ok(name_sel), Ok(address_sel)) = (
        Selector::parse(profile.search_result),
        Selector::parse(profile.search_result_name),
        Selector::parse(profile.search_result_address),
    ) else {
        return Vec::new();
    };

    document
        .select(&item_sel)
        .filter_map(|result| {
            let name = result.select(&name_sel).next().map(element_text)?;
            if name.is_empty() {
                return None;
            }
            let address = result.select(&address_sel).next().map(element_text).unwrap_or_default();
            Some(RegistryCandidate { name, address })
        })
        .collect()
}

pub struct RegistrySearch {
    site: String,
    search_url: String,
    profile: &'static RegistryProfile,
    search: Arc<dyn EvidenceSource<Item = SearchHit>>,
    proxies: Arc<dyn ProxyRotation>,
    user_agent: String,
    timeout: Duration,
}

impl RegistrySearch {
    pub fn new(
        config: &AppConfig,
        search: Arc<dyn EvidenceSource<Item = SearchHit>>,
        proxies: Arc<dyn ProxyRotation>,
    ) -> Self {
        Self {
            site: config.registry.site.trim().to_string(),
            search_url: config.registry.search_url.trim_end_matches('/').to_string(),
            profile: profile_for(&config.registry.site),
            search,
            proxies,
            user_agent: config.http.user_agent.clone(),
            timeout: config.http.timeout(),
        }
    }

    async fn get_html(&self, url: &str, query: &[(&str, &str)]) -> anyhow::Result<String> {
        let proxy = self.proxies.random_proxy();
        let client = build_client(proxy.as_deref(), &self.user_agent, self.timeout)?;

        let response = client
            .get(url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        if !response.status().is_success() {
            anyhow::bail!("{} returned HTTP {}", url, response.status());
        }

        response.text().await.with_context(|| format!("Failed to read body of {}", url))
    }

    /// Fetch and parse one company page. Failures give an empty record.
    pub async fn fetch_company_page(&self, url: &str) -> RegistryRecord {
        match self.get_html(url, &[]).await {
            Ok(html) => {
                let mut record = parse_company_page(&html, self.profile);
                record.url = Some(url.to_string());
                record
            }
            Err(e) => {
                debug!("Registry page unavailable: {:#}", e);
                RegistryRecord::default()
            }
        }
    }

    /// Look companies up by name on the registry's own search.
    pub async fn search_by_name(&self, name: &str) -> Vec<RegistryCandidate> {
        let url = format!("{}{}", self.search_url, self.profile.search_path);

        match self.get_html(&url, &[("q", name)]).await {
            Ok(html) => {
                let candidates = parse_search_results(&html, self.profile);
                debug!("Registry search for '{}' found {} companies", name, candidates.len());
                candidates
            }
            Err(e) => {
                warn!("Registry search for '{}' failed: {:#}", name, e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl EvidenceSource for RegistrySearch {
    type Item = RegistryRecord;

    fn kind(&self) -> SourceKind {
        SourceKind::RegistrySearch
    }

    /// `query` is the domain being resolved.
    async fn fetch(&self, query: &str, _constraints: &FetchConstraints) -> anyhow::Result<Fetched<RegistryRecord>> {
        let search_query = format!("site:{} {}", self.site, query);
        let hits = self
            .search
            .fetch(&search_query, &FetchConstraints::new(REGISTRY_SEARCH_RESULTS, false))
            .await?;

        if hits.blocked {
            return Ok(Fetched::blocked(Vec::new()));
        }

        // main company page only, not officers/filing-history sub-pages
        let company_page = hits
            .items
            .iter()
            .filter_map(SearchHit::as_link)
            .find(|url| is_canonical_company_page(url, self.profile.company_path));

        let Some(url) = company_page else {
            debug!("No registry company page found for {}", query);
            return Ok(Fetched::empty());
        };

        info!("Registry page for {}: {}", query, url);
        let record = self.fetch_company_page(url).await;
        if record.is_empty() {
            return Ok(Fetched::empty());
        }

        Ok(Fetched::new(vec![record]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPANY_PAGE: &str = r#"<html><body>
        <div class="company-header">
            <p class="heading-xlarge">ACME WIDGETS LIMITED</p>
            <p id="company-number">Company number <strong>01234567</strong></p>
        </div>
        <dl>
            <dt>Registered office address</dt>
            <dd class="text data">
                1 High Street,
                Bath, BA1 1AA
            </dd>
        </dl>
        <dl>
            <dt>Company status</dt>
            <dd class="text data">Active</dd>
        </dl>
        <dl><dt>Company type</dt><dd>Private limited Company</dd></dl>
    </body></html>"#;

    #[test]
    fn test_parse_company_page() {
        let record = parse_company_page(COMPANY_PAGE, &COMPANIES_HOUSE);
        assert_eq!(record.company_name.as_deref(), Some("ACME WIDGETS LIMITED"));
        assert_eq!(record.company_number.as_deref(), Some("01234567"));
        assert_eq!(record.registered_address.as_deref(), Some("1 High Street, Bath, BA1 1AA"));
        assert_eq!(record.company_status.as_deref(), Some("Active"));
    }

    #[test]
    fn test_parse_page_with_missing_fields() {
        let record = parse_company_page("<html><body><p>Not a company</p></body></html>", &COMPANIES_HOUSE);
        assert!(record.is_empty());
    }

    #[test]
    fn test_parse_search_results() {
        let html = r#"<ul>
            <li class="type-company">
                <h3><a href="/company/07654321">HEAVEN SCENT INCENSE LTD</a></h3>
                <p class="meta crumbtrail">07654321 - Incorporated on 1 May 2011</p>
                <p>2 Mill Lane, Bradford-on-Avon, BA15 1AA</p>
            </li>
            <li class="type-company"><h3><a href="/company/1">  </a></h3></li>
            <li class="type-officer"><a href="/officers/x">Someone</a></li>
        </ul>"#;

        let results = parse_search_results(html, &COMPANIES_HOUSE);
        assert_eq!(
            results,
            vec![RegistryCandidate {
                name: "HEAVEN SCENT INCENSE LTD".to_string(),
                address: "2 Mill Lane, Bradford-on-Avon, BA15 1AA".to_string(),
            }]
        );
    }

    #[test]
    fn test_profile_lookup() {
        assert_eq!(profile_for("www.beta.companieshouse.gov.uk").site, "beta.companieshouse.gov.uk");
        let new_site = profile_for("find-and-update.company-information.service.gov.uk");
        assert_eq!(new_site.company_path, "/company/");
        assert_eq!(profile_for("unknown-registry.example").site, COMPANIES_HOUSE.site);
    }
}
