//! Evidence sources for identity resolution
//!
//! Each source wraps one external system (search engine, company registry,
//! the domain's homepage, a places API) behind the same contract: a fetch
//! returns the items it found plus a `blocked` flag raised when the upstream
//! answered with an anti-bot challenge. Transient failures degrade to empty
//! results; a block is never an error.

pub mod homepage;
pub mod maps;
pub mod registry;
pub mod web_search;

use async_trait::async_trait;
use std::fmt;

pub use homepage::{HomepageEvidence, HomepageFetch};
pub use maps::{MapsLookup, Place};
pub use registry::{RegistryCandidate, RegistryRecord, RegistrySearch};
pub use web_search::{SearchHit, WebSearch};

/// Which kind of upstream produced a piece of evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SourceKind {
    RegistrySearch,
    WebSearch,
    HomepageFetch,
    MapsLookup,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::RegistrySearch => write!(f, "registry_search"),
            SourceKind::WebSearch => write!(f, "web_search"),
            SourceKind::HomepageFetch => write!(f, "homepage_fetch"),
            SourceKind::MapsLookup => write!(f, "maps_lookup"),
        }
    }
}

/// Limits a caller places on one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchConstraints {
    /// Stop once this many items were collected
    pub max_results: usize,
    /// Skip the caller-configured avoid lists when true
    pub accept_all: bool,
    /// Ignore the configured result cap; the caller's count is a threshold
    pub uncapped: bool,
}

impl FetchConstraints {
    pub fn new(max_results: usize, accept_all: bool) -> Self {
        Self {
            max_results: max_results.max(1),
            accept_all,
            uncapped: false,
        }
    }

    /// Same limits, exempt from `search.maximum_search_results`.
    pub fn uncapped(mut self) -> Self {
        self.uncapped = true;
        self
    }
}

impl Default for FetchConstraints {
    fn default() -> Self {
        Self::new(10, true)
    }
}

/// Items returned by one fetch, plus whether the upstream blocked us.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub items: Vec<T>,
    pub blocked: bool,
}

impl<T> Fetched<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items, blocked: false }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Anti-bot challenge detected; `items` holds whatever came before it.
    pub fn blocked(items: Vec<T>) -> Self {
        Self { items, blocked: true }
    }

    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }
}

/// One external system behind the uniform fetch contract.
#[async_trait]
pub trait EvidenceSource: Send + Sync {
    type Item: Send;

    fn kind(&self) -> SourceKind;

    /// `Err` is reserved for faults that are not the upstream's doing (for
    /// example an HTTP client that cannot be built).
    async fn fetch(&self, query: &str, constraints: &FetchConstraints) -> anyhow::Result<Fetched<Self::Item>>;
}

/// Outcome of one evidence call, kept for the duration of a single domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceStatus {
    Found,
    Empty,
    Blocked,
}

/// What a source contributed while resolving one domain.
#[derive(Debug, Clone)]
pub struct EvidenceRecord {
    pub source: SourceKind,
    pub payload: EvidencePayload,
    pub status: EvidenceStatus,
}

#[derive(Debug, Clone)]
pub enum EvidencePayload {
    Registry(RegistryRecord),
    Homepage(HomepageEvidence),
    Nothing,
}

impl EvidenceRecord {
    pub fn from_registry(fetched: &Fetched<RegistryRecord>) -> Self {
        let status = Self::status_of(fetched);
        let payload = fetched
            .first()
            .cloned()
            .map(EvidencePayload::Registry)
            .unwrap_or(EvidencePayload::Nothing);
        Self {
            source: SourceKind::RegistrySearch,
            payload,
            status,
        }
    }

    pub fn from_homepage(fetched: &Fetched<HomepageEvidence>) -> Self {
        let status = Self::status_of(fetched);
        let payload = fetched
            .first()
            .cloned()
            .map(EvidencePayload::Homepage)
            .unwrap_or(EvidencePayload::Nothing);
        Self {
            source: SourceKind::HomepageFetch,
            payload,
            status,
        }
    }

    fn status_of<T>(fetched: &Fetched<T>) -> EvidenceStatus {
        if fetched.blocked {
            EvidenceStatus::Blocked
        } else if fetched.items.is_empty() {
            EvidenceStatus::Empty
        } else {
            EvidenceStatus::Found
        }
    }
}
