use crate::config::Settings;
use crate::models::property_id_from_filename;
use crate::normalize::DerivedMetrics;
use crate::rates::RateProvider;
use crate::scrapers::ListingParser;
use crate::store::CsvStore;
use anyhow::{Context, Result};
use chrono::Local;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Counts reported at the end of a batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total_files: usize,
    /// Already stored before this run
    pub skipped: usize,
    pub extracted: usize,
    /// Stored but missing an id, a type, a price or a location
    pub degraded: usize,
    pub unreadable: usize,
    /// Pages whose listing id was seen earlier in the same run
    pub duplicates: usize,
    /// Records that could not be written
    pub failed: usize,
}

impl RunSummary {
    /// Nothing to do: no pages, or every page already stored
    pub fn nothing_new(&self) -> bool {
        self.total_files == 0 || self.skipped == self.total_files
    }

    fn log(&self) {
        info!("Extraction Summary:");
        info!("- Successfully processed: {} files", self.extracted);
        info!("- Degraded records: {}", self.degraded);
        info!("- Unreadable: {} files", self.unreadable);
        info!("- Duplicates: {} files", self.duplicates);
        info!("- Failed: {} files", self.failed);
        info!("- Skipped (already processed): {} files", self.skipped);
        info!("- Total files: {} files", self.total_files);
    }
}

/// Batch driver: saved pages in, appended CSV rows out
pub struct Pipeline<P: ListingParser + 'static> {
    settings: Settings,
    parser: Arc<P>,
    rates: Box<dyn RateProvider>,
    store: CsvStore,
}

impl<P: ListingParser + 'static> Pipeline<P> {
    pub fn new(settings: Settings, parser: P, rates: Box<dyn RateProvider>) -> Self {
        let store = CsvStore::new(settings.output_csv.clone());
        Self {
            settings,
            parser: Arc::new(parser),
            rates,
            store,
        }
    }

    pub fn store(&self) -> &CsvStore {
        &self.store
    }

    /// Saved pages in the input directory, sorted by name
    pub fn list_html_files(&self) -> Result<Vec<PathBuf>> {
        let dir = &self.settings.html_dir;
        let entries = fs::read_dir(dir)
            .with_context(|| format!("Failed to read HTML folder {}", dir.display()))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "html"))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Extract every page not yet in the store and append the results.
    ///
    /// Rates are fetched once per run. Pages are parsed in parallel, but only
    /// this loop writes to the store.
    pub async fn run_once(&self) -> Result<RunSummary> {
        info!(
            "Starting property extraction on {} ({} parser, {} rates)",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            self.parser.source_name(),
            self.rates.source_name()
        );

        self.store.ensure_schema()?;
        let rates = self.rates.fetch_rates().await;
        let mut seen = self.store.existing_ids()?;
        let stored_files = self.store.stored_source_files()?;

        if !stored_files.is_empty() {
            self.store.refresh_reference_prices(&rates)?;
        }

        let files = self.list_html_files()?;
        let mut summary = RunSummary {
            total_files: files.len(),
            ..Default::default()
        };
        info!("Found {} HTML files to process", files.len());

        let pending: Vec<PathBuf> = files
            .into_iter()
            .filter(|path| {
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let stored = stored_files.contains(&name)
                    || property_id_from_filename(&name).is_some_and(|id| seen.contains(&id));
                if stored {
                    debug!("Skipping {} - already exists in CSV", path.display());
                    summary.skipped += 1;
                }
                !stored
            })
            .collect();

        if pending.is_empty() {
            info!("No new files to process");
            summary.log();
            return Ok(summary);
        }
        info!("Processing {} new HTML files...", pending.len());

        let parser = Arc::clone(&self.parser);
        let mut results = stream::iter(pending)
            .map(|path| {
                let parser = Arc::clone(&parser);
                tokio::task::spawn_blocking(move || parser.extract(&path))
            })
            .buffer_unordered(self.settings.max_concurrent.max(1));

        while let Some(joined) = results.next().await {
            let record = match joined {
                Ok(Some(record)) => record,
                Ok(None) => {
                    summary.unreadable += 1;
                    continue;
                }
                Err(e) => {
                    error!("Extraction task failed: {}", e);
                    summary.unreadable += 1;
                    continue;
                }
            };

            if let Some(id) = &record.property_id {
                if !seen.insert(id.clone()) {
                    debug!("Skipping {} - listing {} already stored", record.source_file, id);
                    summary.duplicates += 1;
                    continue;
                }
            }

            let mut record = record;
            DerivedMetrics::compute(&record, &rates).apply(&mut record);
            if record.is_degraded() {
                debug!("Degraded record from {}", record.source_file);
                summary.degraded += 1;
            }

            match self.store.append(std::slice::from_ref(&record)) {
                Ok(_) => summary.extracted += 1,
                Err(e) => {
                    warn!("Failed to add data from {} to CSV: {:#}", record.source_file, e);
                    summary.failed += 1;
                }
            }
        }

        summary.log();
        Ok(summary)
    }

    /// Run repeatedly, waiting `interval` between runs that found new pages
    pub async fn watch(&self, interval: Duration, max_runs: usize) -> Vec<RunSummary> {
        let mut summaries = Vec::new();

        for run in 1..=max_runs {
            info!("--- Starting extraction run {} of {} ---", run, max_runs);
            let nothing_new = match self.run_once().await {
                Ok(summary) => {
                    let nothing_new = summary.nothing_new();
                    summaries.push(summary);
                    nothing_new
                }
                Err(e) => {
                    error!("Extraction run {} failed: {:#}", run, e);
                    false
                }
            };

            if run == max_runs {
                info!("Completed {} extraction runs. Exiting.", max_runs);
                break;
            }
            if nothing_new {
                info!("No new files to process. Skipping wait and proceeding to next run.");
                continue;
            }

            info!("Waiting {} minutes before next extraction run...", interval.as_secs() / 60);
            tokio::time::sleep(interval).await;
        }

        summaries
    }

    /// Fetch rates and recompute converted prices for every stored row
    pub async fn refresh_prices(&self) -> Result<usize> {
        self.store.ensure_schema()?;
        let rates = self.rates.fetch_rates().await;
        self.store.refresh_reference_prices(&rates)
    }
}
