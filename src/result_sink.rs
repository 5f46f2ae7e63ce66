// result_sink.rs - Where finished resolutions go
//
// The resolver asks the sink whether a domain is already done before doing
// any work, and stores exactly one record per processed domain.
//
// JournalSink appends records as JSONL (one JSON object per line) through a
// zstd level 3 encoder, flushed after every record so a killed process keeps
// everything it stored. Re-opening an existing journal reads back what
// survived the last run, rewrites it as one complete frame through a temp
// file and appends new frames after it, so a batch interrupted by a block or
// a crash resumes where it stopped.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::result::ResolutionResult;

const ZSTD_LEVEL: i32 = 3;

/// Journal file name inside the output directory.
pub const JOURNAL_FILE: &str = "companyfinder-results.jsonl.zst";

/// Persistence collaborator of the resolver.
pub trait ResultSink {
    /// Whether `domain` already has a stored result.
    fn exists(&self, domain: &str) -> bool;

    /// Store one finished result.
    fn store(&mut self, result: ResolutionResult) -> Result<()>;
}

/// Keeps results in memory. Used by tests and one-off lookups.
#[derive(Debug, Default)]
pub struct MemorySink {
    results: Vec<ResolutionResult>,
    done: HashSet<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat `domains` as already resolved.
    pub fn with_done<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            results: Vec::new(),
            done: domains.into_iter().map(Into::into).collect(),
        }
    }

    pub fn results(&self) -> &[ResolutionResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<ResolutionResult> {
        self.results
    }
}

impl ResultSink for MemorySink {
    fn exists(&self, domain: &str) -> bool {
        self.done.contains(domain)
    }

    fn store(&mut self, result: ResolutionResult) -> Result<()> {
        self.done.insert(result.domain.clone());
        self.results.push(result);
        Ok(())
    }
}

/// Disk-backed sink: zstd-compressed JSONL journal.
pub struct JournalSink {
    writer: zstd::stream::write::Encoder<'static, BufWriter<File>>,
    path: PathBuf,
    done: HashSet<String>,
    /// Records carried over from an earlier run
    resumed: usize,
    count: usize,
}

impl JournalSink {
    /// Open the journal in `output_dir`, resuming from it if it exists.
    pub fn open(output_dir: &Path) -> Result<Self> {
        Self::with_path(&output_dir.join(JOURNAL_FILE))
    }

    /// Open a journal at an explicit path.
    pub fn with_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
        }

        let previous = if path.exists() {
            let previous = Self::read_results(path)?;
            Self::rewrite(path, &previous)?;
            previous
        } else {
            Vec::new()
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open result journal: {}", path.display()))?;
        let encoder = zstd::stream::write::Encoder::new(BufWriter::new(file), ZSTD_LEVEL)
            .context("Failed to create zstd encoder")?;

        let resumed = previous.len();
        if resumed > 0 {
            debug!("Resuming {} with {} stored results", path.display(), resumed);
        }

        Ok(Self {
            writer: encoder,
            path: path.to_path_buf(),
            done: previous.into_iter().map(|result| result.domain).collect(),
            resumed,
            count: resumed,
        })
    }

    /// Replace the journal with one finished frame holding `results`.
    ///
    /// The new copy is written next to the journal and renamed over it, so the
    /// previous run's records exist on disk at every point.
    fn rewrite(path: &Path, results: &[ResolutionResult]) -> Result<()> {
        let temp_path = path.with_extension("zst.tmp");
        let file = File::create(&temp_path)
            .with_context(|| format!("Failed to create temp journal: {}", temp_path.display()))?;
        let mut encoder = zstd::stream::write::Encoder::new(BufWriter::new(file), ZSTD_LEVEL)
            .context("Failed to create zstd encoder")?;

        for result in results {
            let json = serde_json::to_string(result).context("Failed to serialize ResolutionResult")?;
            encoder.write_all(json.as_bytes())?;
            encoder.write_all(b"\n")?;
        }

        let mut writer = encoder.finish().context("Failed to finalize zstd stream")?;
        writer.flush()?;
        writer
            .get_ref()
            .sync_all()
            .with_context(|| format!("Failed to sync temp journal: {}", temp_path.display()))?;
        drop(writer);

        std::fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to replace result journal: {}", path.display()))?;
        Ok(())
    }

    fn append(&mut self, result: &ResolutionResult) -> Result<()> {
        let json = serde_json::to_string(result).context("Failed to serialize ResolutionResult")?;
        self.writer.write_all(json.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.flush()?;
        self.done.insert(result.domain.clone());
        self.count += 1;
        Ok(())
    }

    /// Flush the zstd encoder so everything stored so far is on disk.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush zstd encoder")?;
        Ok(())
    }

    /// Finalize the zstd stream and read every stored result back.
    pub fn finish(mut self) -> Result<Vec<ResolutionResult>> {
        self.flush()?;
        let mut writer = self.writer.finish().context("Failed to finalize zstd stream")?;
        writer.flush()?;
        drop(writer);
        Self::read_results(&self.path)
    }

    /// Read results from a journal, skipping corrupt lines and stopping at a
    /// truncated frame.
    pub fn read_results(path: &Path) -> Result<Vec<ResolutionResult>> {
        let file = File::open(path).with_context(|| format!("Failed to open result journal: {}", path.display()))?;
        let decoder = zstd::stream::read::Decoder::new(file).context("Failed to create zstd decoder")?;
        let reader = BufReader::new(decoder);

        let mut results = Vec::new();
        let mut errors = 0;

        for (line_num, line_result) in reader.lines().enumerate() {
            match line_result {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<ResolutionResult>(&line) {
                        Ok(result) => results.push(result),
                        Err(e) => {
                            errors += 1;
                            if errors <= 3 {
                                warn!("Skipping corrupt line {} in {}: {}", line_num + 1, path.display(), e);
                            }
                        }
                    }
                }
                Err(_) => {
                    // truncated zstd frame, everything recoverable was read
                    break;
                }
            }
        }

        if errors > 3 {
            warn!("{} total corrupt lines skipped in {}", errors, path.display());
        }

        Ok(results)
    }

    /// Records written this run, excluding resumed ones.
    pub fn stored_this_run(&self) -> usize {
        self.count - self.resumed
    }

    pub fn resumed(&self) -> usize {
        self.resumed
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for JournalSink {
    fn exists(&self, domain: &str) -> bool {
        self.done.contains(domain)
    }

    fn store(&mut self, result: ResolutionResult) -> Result<()> {
        self.append(&result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::DomainStatus;
    use tempfile::TempDir;

    fn make_result(domain: &str) -> ResolutionResult {
        ResolutionResult {
            domain: domain.to_string(),
            company_name: format!("{} Limited", domain),
            company_number: "01234567".to_string(),
            registered_address: "1 High Street, Bath".to_string(),
            company_status: "Active".to_string(),
            domain_status: DomainStatus::Active,
            confidence_percent: 90,
        }
    }

    #[test]
    fn test_memory_sink() {
        let mut sink = MemorySink::with_done(["done.com"]);
        assert!(sink.exists("done.com"));
        assert!(!sink.exists("new.com"));

        sink.store(make_result("new.com")).unwrap();
        assert!(sink.exists("new.com"));
        assert_eq!(sink.results().len(), 1);
    }

    #[test]
    fn test_journal_stores_and_finishes() {
        let tmp = TempDir::new().unwrap();
        let mut sink = JournalSink::open(tmp.path()).unwrap();

        sink.store(make_result("acme.com")).unwrap();
        assert!(sink.exists("acme.com"));
        assert_eq!(sink.stored_this_run(), 1);

        let results = sink.finish().unwrap();
        assert_eq!(results, vec![make_result("acme.com")]);
    }

    #[test]
    fn test_every_store_reaches_disk() {
        let tmp = TempDir::new().unwrap();
        let mut sink = JournalSink::open(tmp.path()).unwrap();

        for i in 0..10 {
            sink.store(make_result(&format!("v{}.com", i))).unwrap();
        }
        // process::exit runs no destructors
        std::mem::forget(sink);

        let reopened = JournalSink::open(tmp.path()).unwrap();
        assert_eq!(reopened.resumed(), 10);
        assert!(reopened.exists("v9.com"));
    }

    #[test]
    fn test_reopen_replaces_journal_atomically() {
        let tmp = TempDir::new().unwrap();

        let mut first = JournalSink::open(tmp.path()).unwrap();
        first.store(make_result("one.com")).unwrap();
        std::mem::forget(first);

        let second = JournalSink::open(tmp.path()).unwrap();
        assert_eq!(second.resumed(), 1);
        assert!(!tmp.path().join(JOURNAL_FILE).with_extension("zst.tmp").exists());
        drop(second);

        // an idle run leaves the rewritten frame untouched
        let third = JournalSink::open(tmp.path()).unwrap();
        assert_eq!(third.resumed(), 1);
        let results = third.finish().unwrap();
        assert_eq!(results, vec![make_result("one.com")]);
    }

    #[test]
    fn test_journal_resumes_previous_run() {
        let tmp = TempDir::new().unwrap();

        let mut first = JournalSink::open(tmp.path()).unwrap();
        first.store(make_result("one.com")).unwrap();
        first.finish().unwrap();

        let mut second = JournalSink::open(tmp.path()).unwrap();
        assert_eq!(second.resumed(), 1);
        assert!(second.exists("one.com"));
        second.store(make_result("two.com")).unwrap();
        assert_eq!(second.stored_this_run(), 1);

        let domains: Vec<String> = second.finish().unwrap().into_iter().map(|r| r.domain).collect();
        assert_eq!(domains, vec!["one.com", "two.com"]);
    }

    #[test]
    fn test_journal_survives_unfinished_run() {
        let tmp = TempDir::new().unwrap();

        let mut crashed = JournalSink::open(tmp.path()).unwrap();
        crashed.store(make_result("kept.com")).unwrap();
        crashed.flush().unwrap();
        // dropped without finish(), like a killed process
        drop(crashed);

        let reopened = JournalSink::open(tmp.path()).unwrap();
        assert!(reopened.exists("kept.com"));
    }

    #[test]
    fn test_read_results_skips_corrupt_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("journal.jsonl.zst");

        let good = serde_json::to_string(&make_result("good.com")).unwrap();
        let content = format!("{}\nnot json\n\n{}\n", good, good);
        let compressed = zstd::encode_all(content.as_bytes(), ZSTD_LEVEL).unwrap();
        std::fs::write(&path, compressed).unwrap();

        let results = JournalSink::read_results(&path).unwrap();
        assert_eq!(results.len(), 2);
    }
}
