//! In-memory evidence sources for driving the resolver without a network.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use companyfinder::evidence::{
    EvidenceSource, FetchConstraints, Fetched, HomepageEvidence, RegistryRecord, SearchHit, SourceKind,
};
use companyfinder::result_sink::{MemorySink, ResultSink};
use companyfinder::ResolutionResult;

pub struct FixedRegistry {
    pub name: Option<String>,
    pub blocked: bool,
    pub calls: AtomicUsize,
}

impl FixedRegistry {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            blocked: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EvidenceSource for FixedRegistry {
    type Item = RegistryRecord;

    fn kind(&self) -> SourceKind {
        SourceKind::RegistrySearch
    }

    async fn fetch(&self, _query: &str, _constraints: &FetchConstraints) -> anyhow::Result<Fetched<RegistryRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.blocked {
            return Ok(Fetched::blocked(Vec::new()));
        }
        Ok(match &self.name {
            Some(name) => Fetched::new(vec![RegistryRecord {
                company_name: Some(name.clone()),
                company_number: Some("01234567".to_string()),
                ..Default::default()
            }]),
            None => Fetched::empty(),
        })
    }
}

pub struct FixedHomepage {
    pub evidence: HomepageEvidence,
    pub calls: AtomicUsize,
}

impl FixedHomepage {
    pub fn new(evidence: HomepageEvidence) -> Self {
        Self {
            evidence,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EvidenceSource for FixedHomepage {
    type Item = HomepageEvidence;

    fn kind(&self) -> SourceKind {
        SourceKind::HomepageFetch
    }

    async fn fetch(&self, _query: &str, _constraints: &FetchConstraints) -> anyhow::Result<Fetched<HomepageEvidence>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Fetched::new(vec![self.evidence.clone()]))
    }
}

/// Search that always answers with the same links, or a block.
pub struct FixedSearch {
    pub links: Vec<String>,
    pub blocked: bool,
}

impl FixedSearch {
    pub fn links(count: usize) -> Self {
        Self {
            links: (0..count).map(|i| format!("https://indexed.example/page{}", i)).collect(),
            blocked: false,
        }
    }

    pub fn blocked() -> Self {
        Self {
            links: Vec::new(),
            blocked: true,
        }
    }
}

#[async_trait]
impl EvidenceSource for FixedSearch {
    type Item = SearchHit;

    fn kind(&self) -> SourceKind {
        SourceKind::WebSearch
    }

    async fn fetch(&self, _query: &str, constraints: &FetchConstraints) -> anyhow::Result<Fetched<SearchHit>> {
        if self.blocked {
            return Ok(Fetched::blocked(Vec::new()));
        }
        Ok(Fetched::new(
            self.links
                .iter()
                .take(constraints.max_results)
                .cloned()
                .map(SearchHit::Link)
                .collect(),
        ))
    }
}

/// Sink whose `store` fails for one domain, like a full disk mid-batch.
pub struct FailingSink {
    pub fail_domain: String,
    pub inner: MemorySink,
}

impl FailingSink {
    pub fn failing_on(domain: &str) -> Self {
        Self {
            fail_domain: domain.to_string(),
            inner: MemorySink::new(),
        }
    }
}

impl ResultSink for FailingSink {
    fn exists(&self, domain: &str) -> bool {
        self.inner.exists(domain)
    }

    fn store(&mut self, result: ResolutionResult) -> anyhow::Result<()> {
        if result.domain == self.fail_domain {
            anyhow::bail!("No space left on device");
        }
        self.inner.store(result)
    }
}
