use crate::evidence::Place;
use crate::result::{DomainStatus, ResolutionResult};
use anyhow::{Context, Result};
use csv::Writer;
use std::fs::File;
use tracing::{debug, info};

pub const CSV_HEADERS: [&str; 7] = [
    "domain",
    "company name",
    "confidence",
    "company number",
    "registered address",
    "company status",
    "domain status",
];

pub fn export_csv(results: &[ResolutionResult], output_path: &str) -> Result<()> {
    debug!("Exporting {} results to CSV: {}", results.len(), output_path);

    let file = File::create(output_path).with_context(|| format!("Failed to create {}", output_path))?;
    let mut wtr = Writer::from_writer(file);

    wtr.write_record(CSV_HEADERS)?;
    for result in results {
        wtr.write_record(result.to_row())?;
    }

    wtr.flush()?;
    info!("Exported {} results to CSV: {}", results.len(), output_path);

    Ok(())
}

pub fn export_places_json(places: &[Place], output_path: &str) -> Result<()> {
    debug!("Exporting {} places to JSON: {}", places.len(), output_path);

    let json = serde_json::to_string_pretty(places)?;
    std::fs::write(output_path, json).with_context(|| format!("Failed to write {}", output_path))?;
    info!("Exported {} places to JSON: {}", places.len(), output_path);

    Ok(())
}

/// Counts by domain status, for the end-of-run summary.
pub fn print_results_summary(results: &[ResolutionResult]) {
    let identified = results.iter().filter(|r| r.confidence_percent > 0).count();

    println!("\n=== Results ===");
    println!("Domains in output: {}", results.len());
    println!("With a matching company: {}", identified);

    for status in [
        DomainStatus::Active,
        DomainStatus::Parked,
        DomainStatus::Offline,
        DomainStatus::NotFound,
        DomainStatus::Unknown,
    ] {
        let count = results.iter().filter(|r| r.domain_status == status).count();
        if count > 0 {
            println!("  {}: {}", status, count);
        }
    }
}
