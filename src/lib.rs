pub mod batch;
pub mod cli;
pub mod confidence;
pub mod config;
pub mod domain_utils;
pub mod evidence;
pub mod export;
pub mod logger;
pub mod name_normalizer;
pub mod proxy;
pub mod rate_limit;
pub mod replay;
pub mod resolver;
pub mod result;
pub mod result_sink;
pub mod similarity;

pub use batch::BatchReport;
pub use config::AppConfig;
pub use resolver::{IdentityResolver, Resolution, Stage};
pub use result::{DomainStatus, ResolutionResult};
pub use result_sink::{JournalSink, MemorySink, ResultSink};
