use crate::models::ListingRecord;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Common trait for listing page parsers
/// Each portal gets its own implementation; the batch driver only sees this
pub trait ListingParser: Send + Sync {
    /// Build a record from one saved page. Fields that cannot be found stay
    /// empty; parsing itself never fails.
    fn parse(&self, html: &str, source_file: &str) -> ListingRecord;

    /// Get the name of the portal this parser understands
    fn source_name(&self) -> &'static str;

    /// Read and parse a saved page. `None` when the file cannot be read.
    fn extract(&self, path: &Path) -> Option<ListingRecord> {
        let source_file = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        match fs::read_to_string(path) {
            Ok(html) => Some(self.parse(&html, &source_file)),
            Err(e) => {
                warn!("Error reading {}: {}", path.display(), e);
                None
            }
        }
    }
}
