//! Domain to company identity resolution.
//!
//! One domain at a time goes through:
//!
//! ```text
//! Start -> RegistryLookup -> DomainScore -> [early stop] -> HomepageFetch
//!       -> StatusGate -> TitleScore -> [early stop] -> Finalize
//! ```
//!
//! A domain the sink already holds is skipped at `Start`. A blocked evidence
//! fetch ends the domain without storing anything and stops the whole batch.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::batch::{BatchReport, BlockedAt};
use crate::config::{AppConfig, ResolutionConfig};
use crate::confidence::ConfidenceAccumulator;
use crate::evidence::{
    EvidencePayload, EvidenceRecord, EvidenceSource, EvidenceStatus, FetchConstraints, HomepageEvidence,
    HomepageFetch, RegistryRecord, RegistrySearch, SourceKind, WebSearch,
};
use crate::name_normalizer::NameNormalizer;
use crate::proxy::{ProxyPool, ProxyRotation};
use crate::result::{DomainStatus, ResolutionResult, UNKNOWN_COMPANY};
use crate::result_sink::ResultSink;
use crate::similarity::{score, SimilarityMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Start,
    RegistryLookup,
    DomainScore,
    HomepageFetch,
    StatusGate,
    TitleScore,
    Finalize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::RegistryLookup => "registry lookup",
            Stage::DomainScore => "domain score",
            Stage::HomepageFetch => "homepage fetch",
            Stage::StatusGate => "status gate",
            Stage::TitleScore => "title score",
            Stage::Finalize => "finalize",
        };
        write!(f, "{}", name)
    }
}

/// How one domain's resolution ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Result built and handed to the sink
    Stored(ResolutionResult),
    /// The sink already had a result
    Skipped,
    /// An upstream answered with an anti-bot challenge; nothing was stored
    Blocked { stage: Stage, source: SourceKind },
}

pub struct IdentityResolver {
    registry: Arc<dyn EvidenceSource<Item = RegistryRecord>>,
    homepage: Arc<dyn EvidenceSource<Item = HomepageEvidence>>,
    normalizer: NameNormalizer,
    settings: ResolutionConfig,
    accumulator: ConfidenceAccumulator,
}

impl IdentityResolver {
    pub fn new(
        registry: Arc<dyn EvidenceSource<Item = RegistryRecord>>,
        homepage: Arc<dyn EvidenceSource<Item = HomepageEvidence>>,
        normalizer: NameNormalizer,
        settings: ResolutionConfig,
    ) -> Self {
        Self {
            registry,
            homepage,
            normalizer,
            settings,
            accumulator: ConfidenceAccumulator::new(),
        }
    }

    /// Wire the real evidence sources from configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        let proxies: Arc<dyn ProxyRotation> = Arc::new(ProxyPool::new(config.proxy.proxies.clone()));
        let search: Arc<WebSearch> = Arc::new(WebSearch::new(config, proxies.clone()));

        let registry = RegistrySearch::new(config, search.clone(), proxies.clone());
        let homepage = HomepageFetch::new(config, search, proxies);

        Self::new(
            Arc::new(registry),
            Arc::new(homepage),
            NameNormalizer::with_locations(&config.names.ignore_in_company_name),
            config.resolution.clone(),
        )
    }

    /// Comparison tests recorded for the most recent domain.
    pub fn last_tests(&self) -> &[crate::confidence::ComparisonTest] {
        self.accumulator.tests()
    }

    /// Resolve one domain and store its result.
    ///
    /// `Err` means the domain faulted (for example the sink could not write);
    /// the batch driver logs it and moves on.
    pub async fn resolve(&mut self, domain: &str, sink: &mut dyn ResultSink) -> anyhow::Result<Resolution> {
        if sink.exists(domain) {
            info!("Skipping. Already done {}", domain);
            return Ok(Resolution::Skipped);
        }

        self.accumulator.reset();
        info!("Finding {}", domain);

        let fetched = self
            .registry
            .fetch(domain, &FetchConstraints::new(1, false))
            .await
            .with_context(|| format!("{} failed for {}", Stage::RegistryLookup, domain))?;
        let evidence = EvidenceRecord::from_registry(&fetched);
        if evidence.status == EvidenceStatus::Blocked {
            warn!("{} blocked during {} of {}", evidence.source, Stage::RegistryLookup, domain);
            return Ok(Resolution::Blocked {
                stage: Stage::RegistryLookup,
                source: self.registry.kind(),
            });
        }
        let record = match evidence.payload {
            EvidencePayload::Registry(record) => record,
            _ => RegistryRecord::default(),
        };

        let registry_name = record
            .company_name
            .as_deref()
            .map(|name| self.normalizer.normalize(name))
            .unwrap_or_default();
        if registry_name.is_empty() {
            debug!("No registry name for {}, comparisons will fail", domain);
        }

        self.score_domain(domain, &registry_name);

        if self.accumulator.should_stop_early(self.settings.minimum_confidence) {
            info!("{}: confident enough after {}, homepage not checked", domain, Stage::DomainScore);
            return self.finalize(domain, record, DomainStatus::Unknown, sink);
        }

        let fetched = self
            .homepage
            .fetch(domain, &FetchConstraints::default())
            .await
            .with_context(|| format!("{} failed for {}", Stage::HomepageFetch, domain))?;
        let evidence = EvidenceRecord::from_homepage(&fetched);
        if evidence.status == EvidenceStatus::Blocked {
            warn!("{} blocked during {} of {}", evidence.source, Stage::HomepageFetch, domain);
            return Ok(Resolution::Blocked {
                stage: Stage::HomepageFetch,
                source: self.homepage.kind(),
            });
        }
        let homepage = match evidence.payload {
            EvidencePayload::Homepage(homepage) => homepage,
            _ => HomepageEvidence::inactive(DomainStatus::Unknown),
        };

        if !homepage.status.is_active() {
            debug!("{} {}: {} site, no title evidence", domain, Stage::StatusGate, homepage.status);
            return self.finalize(domain, record, homepage.status, sink);
        }

        self.score_title(domain, &registry_name, &homepage);

        if self.accumulator.should_stop_early(self.settings.minimum_confidence) {
            debug!("{}: confident enough after {}", domain, Stage::TitleScore);
        }

        self.finalize(domain, record, homepage.status, sink)
    }

    /// Registry name against the bare domain, once per similarity mode.
    fn score_domain(&mut self, domain: &str, registry_name: &str) {
        for mode in SimilarityMode::ALL {
            let weight = match mode {
                SimilarityMode::WordRun => self.settings.domain_word_weight,
                SimilarityMode::CharRun => self.settings.domain_char_weight,
            };
            let similarity = if registry_name.is_empty() {
                0.0
            } else {
                score(mode, registry_name, domain)
            };
            self.accumulator
                .record(similarity, weight, &format!("domain vs registry name ({})", mode));
        }
    }

    /// Best title candidate per similarity mode against the registry name.
    fn score_title(&mut self, domain: &str, registry_name: &str, homepage: &HomepageEvidence) {
        let candidates: Vec<String> = homepage
            .candidates()
            .iter()
            .map(|candidate| self.normalizer.normalize(candidate))
            .filter(|candidate| !candidate.is_empty())
            .collect();
        debug!("{} title candidates: {:?}", domain, candidates);

        for mode in SimilarityMode::ALL {
            let weight = match mode {
                SimilarityMode::WordRun => self.settings.title_word_weight,
                SimilarityMode::CharRun => self.settings.title_char_weight,
            };

            let mut best = 0.0;
            let mut best_candidate = "";
            if !registry_name.is_empty() {
                for candidate in &candidates {
                    let similarity = score(mode, registry_name, candidate);
                    if similarity > best {
                        best = similarity;
                        best_candidate = candidate.as_str();
                    }
                }
            }

            self.accumulator.record(
                best,
                weight,
                &format!("title '{}' vs registry name ({})", best_candidate, mode),
            );
        }
    }

    fn finalize(
        &self,
        domain: &str,
        record: RegistryRecord,
        domain_status: DomainStatus,
        sink: &mut dyn ResultSink,
    ) -> anyhow::Result<Resolution> {
        let state = self.accumulator.state();
        let result = ResolutionResult {
            domain: domain.to_string(),
            company_name: record.company_name.unwrap_or_else(|| UNKNOWN_COMPANY.to_string()),
            company_number: record.company_number.unwrap_or_default(),
            registered_address: record.registered_address.unwrap_or_default(),
            company_status: record.company_status.unwrap_or_default(),
            domain_status,
            confidence_percent: self.accumulator.percentage(),
        };

        info!(
            "{}: {} ({}%, {}/{} tests passed, domain {})",
            domain,
            result.company_name,
            result.confidence_percent,
            state.tests_passed,
            state.total_tests,
            result.domain_status
        );

        sink.store(result.clone())
            .with_context(|| format!("{} failed for {}", Stage::Finalize, domain))?;

        Ok(Resolution::Stored(result))
    }

    /// Resolve `domains` in order, one at a time.
    ///
    /// Stops early on a block or when `interrupted` is set between domains.
    /// `on_domain` is called after every domain that was looked at.
    pub async fn run_batch<F>(
        &mut self,
        domains: &[String],
        sink: &mut dyn ResultSink,
        interrupted: &AtomicBool,
        mut on_domain: F,
    ) -> BatchReport
    where
        F: FnMut(&str, &Resolution),
    {
        let mut report = BatchReport::new(domains.len());

        for domain in domains {
            if interrupted.load(Ordering::SeqCst) {
                warn!("Interrupted, stopping before {}", domain);
                report.interrupted = true;
                break;
            }

            match self.resolve(domain, sink).await {
                Ok(Resolution::Skipped) => {
                    report.skipped += 1;
                    on_domain(domain, &Resolution::Skipped);
                }
                Ok(resolution @ Resolution::Stored(_)) => {
                    report.processed += 1;
                    report.stored += 1;
                    on_domain(domain, &resolution);
                }
                Ok(Resolution::Blocked { stage, source }) => {
                    error!(
                        "{} reported an anti-bot block during {} of {}; stopping the batch",
                        source, stage, domain
                    );
                    report.blocked = Some(BlockedAt {
                        domain: domain.clone(),
                        stage,
                        source,
                    });
                    break;
                }
                Err(e) => {
                    error!("Failed to resolve {}: {:#}", domain, e);
                    report.processed += 1;
                    report.failed += 1;
                }
            }
        }

        report.finalize();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::Fetched;
    use crate::result_sink::MemorySink;
    use async_trait::async_trait;

    struct FixedRegistry(Option<&'static str>);

    #[async_trait]
    impl EvidenceSource for FixedRegistry {
        type Item = RegistryRecord;

        fn kind(&self) -> SourceKind {
            SourceKind::RegistrySearch
        }

        async fn fetch(&self, _query: &str, _c: &FetchConstraints) -> anyhow::Result<Fetched<RegistryRecord>> {
            Ok(match self.0 {
                Some(name) => Fetched::new(vec![RegistryRecord {
                    company_name: Some(name.to_string()),
                    ..Default::default()
                }]),
                None => Fetched::empty(),
            })
        }
    }

    struct FixedHomepage(HomepageEvidence);

    #[async_trait]
    impl EvidenceSource for FixedHomepage {
        type Item = HomepageEvidence;

        fn kind(&self) -> SourceKind {
            SourceKind::HomepageFetch
        }

        async fn fetch(&self, _query: &str, _c: &FetchConstraints) -> anyhow::Result<Fetched<HomepageEvidence>> {
            Ok(Fetched::new(vec![self.0.clone()]))
        }
    }

    fn settings(minimum_confidence: u32) -> ResolutionConfig {
        ResolutionConfig {
            minimum_confidence,
            domain_word_weight: 400,
            domain_char_weight: 400,
            title_word_weight: 300,
            title_char_weight: 300,
        }
    }

    fn resolver(name: Option<&'static str>, homepage: HomepageEvidence, minimum: u32) -> IdentityResolver {
        IdentityResolver::new(
            Arc::new(FixedRegistry(name)),
            Arc::new(FixedHomepage(homepage)),
            NameNormalizer::new(),
            settings(minimum),
        )
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::RegistryLookup.to_string(), "registry lookup");
    }

    #[tokio::test]
    async fn test_unknown_company_when_registry_is_empty() {
        let mut resolver = resolver(None, HomepageEvidence::inactive(DomainStatus::Offline), 800);
        let mut sink = MemorySink::new();

        let resolution = resolver.resolve("nobody.com", &mut sink).await.unwrap();
        match resolution {
            Resolution::Stored(result) => {
                assert_eq!(result.company_name, UNKNOWN_COMPANY);
                assert_eq!(result.company_number, "");
                assert_eq!(result.domain_status, DomainStatus::Offline);
                assert_eq!(result.confidence_percent, 0);
            }
            other => panic!("expected a stored result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_title_keeps_best_candidate_per_mode() {
        let homepage = HomepageEvidence {
            status: DomainStatus::Active,
            title: Some("Home | Acme Widgets".to_string()),
        };
        let mut resolver = resolver(Some("Acme Widgets Limited"), homepage, 5000);
        let mut sink = MemorySink::new();

        resolver.resolve("acme-gadgets-shop.com", &mut sink).await.unwrap();

        // two domain tests plus exactly one title test per mode
        let tests = resolver.last_tests();
        assert_eq!(tests.len(), 4);
        assert_eq!(tests[2].similarity, 1.0);
        assert_eq!(tests[3].similarity, 1.0);
        assert!(tests[2].description.contains("acme widgets"));
    }

    #[tokio::test]
    async fn test_accumulator_reset_between_domains() {
        let homepage = HomepageEvidence::inactive(DomainStatus::Parked);
        let mut resolver = resolver(Some("Acme Widgets Limited"), homepage, 5000);
        let mut sink = MemorySink::new();

        resolver.resolve("acmewidgets.com", &mut sink).await.unwrap();
        resolver.resolve("acmewidgets.co.uk", &mut sink).await.unwrap();

        assert_eq!(resolver.last_tests().len(), 2);
        assert_eq!(sink.results()[1].confidence_percent, 100);
    }
}
