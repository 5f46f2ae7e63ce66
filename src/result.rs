use serde::{Deserialize, Serialize};

/// Placeholder company name when no registry record was found.
pub const UNKNOWN_COMPANY: &str = "unknown";

/// What the domain's homepage turned out to be.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum DomainStatus {
    /// Homepage was never checked
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "parked")]
    Parked,
    #[serde(rename = "offline")]
    Offline,
    #[serde(rename = "404 error")]
    NotFound,
}

impl DomainStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainStatus::Unknown => "unknown",
            DomainStatus::Active => "active",
            DomainStatus::Parked => "parked",
            DomainStatus::Offline => "offline",
            DomainStatus::NotFound => "404 error",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, DomainStatus::Active)
    }
}

impl std::fmt::Display for DomainStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Final verdict for one domain. Built once, handed to the sink once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolutionResult {
    pub domain: String,
    pub company_name: String,
    pub company_number: String,
    pub registered_address: String,
    pub company_status: String,
    pub domain_status: DomainStatus,
    pub confidence_percent: u32,
}

impl ResolutionResult {
    /// Row in the tabular output order:
    /// domain, company name, confidence, company number, registered address,
    /// company status, domain status.
    pub fn to_row(&self) -> [String; 7] {
        [
            self.domain.clone(),
            self.company_name.clone(),
            self.confidence_percent.to_string(),
            self.company_number.clone(),
            self.registered_address.clone(),
            self.company_status.clone(),
            self.domain_status.to_string(),
        ]
    }
}
