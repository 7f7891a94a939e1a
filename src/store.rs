use crate::models::{property_id_from_filename, ListingRecord, COLUMNS};
use crate::normalize::{parse_area, DerivedMetrics};
use crate::rates::ExchangeRates;
use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Headers and raw cells of the store file
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Typed view of one row. Unknown columns are ignored.
    fn record(&self, row: &[String]) -> Result<ListingRecord> {
        let headers = StringRecord::from(self.headers.clone());
        let fields = StringRecord::from(row.to_vec());
        Ok(fields.deserialize(Some(&headers))?)
    }

    fn set(&self, row: &mut [String], column: &str, value: Option<f64>) -> bool {
        let Some(idx) = self.column(column) else {
            return false;
        };
        let text = number_cell(value);
        if row[idx] == text {
            return false;
        }
        row[idx] = text;
        true
    }
}

fn number_cell(value: Option<f64>) -> String {
    value
        .and_then(serde_json::Number::from_f64)
        .map(|n| n.to_string())
        .unwrap_or_default()
}

/// CSV file holding every extracted listing.
///
/// Only one writer may use a store at a time; the batch driver funnels all
/// appends through a single consumer.
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn exists(&self) -> bool {
        fs::metadata(&self.path).map(|m| m.len() > 0).unwrap_or(false)
    }

    /// Create the file with the canonical header, or add any canonical
    /// columns an older file lacks. Existing rows get empty cells for the new
    /// columns and columns we do not know are kept.
    pub fn ensure_schema(&self) -> Result<()> {
        if !self.exists() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let table = Table {
                headers: COLUMNS.iter().map(|c| c.to_string()).collect(),
                rows: Vec::new(),
            };
            self.write_table(&table)?;
            info!("Created new CSV file: {}", self.path.display());
            return Ok(());
        }

        let mut table = self.read_table()?;
        let missing: Vec<&str> = COLUMNS
            .iter()
            .copied()
            .filter(|c| table.column(c).is_none())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let backup = self.backup_path();
        fs::copy(&self.path, &backup)
            .with_context(|| format!("Failed to back up {}", self.path.display()))?;
        info!("Created backup of original CSV at: {}", backup.display());

        table.headers.extend(missing.iter().map(|c| c.to_string()));
        for row in &mut table.rows {
            row.resize(table.headers.len(), String::new());
        }
        self.write_table(&table)?;
        info!("Added new columns to CSV: {}", missing.join(", "));
        Ok(())
    }

    pub fn read_table(&self) -> Result<Table> {
        if !self.exists() {
            return Ok(Table {
                headers: COLUMNS.iter().map(|c| c.to_string()).collect(),
                rows: Vec::new(),
            });
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for (line, result) in reader.records().enumerate() {
            let record =
                result.with_context(|| format!("Malformed row in {}", self.path.display()))?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            if row.len() > headers.len() {
                warn!(
                    "Row {} of {} has {} cells for {} columns, dropping the extra cells",
                    line + 2,
                    self.path.display(),
                    row.len(),
                    headers.len()
                );
            }
            row.resize(headers.len(), String::new());
            rows.push(row);
        }

        Ok(Table { headers, rows })
    }

    /// Replace the file contents through a temporary file
    fn write_table(&self, table: &Table) -> Result<()> {
        let tmp = self.sibling("tmp");
        {
            let mut writer = WriterBuilder::new()
                .has_headers(false)
                .from_path(&tmp)
                .with_context(|| format!("Failed to create {}", tmp.display()))?;
            writer.write_record(&table.headers)?;
            for row in &table.rows {
                writer.write_record(row)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".");
        name.push(suffix);
        PathBuf::from(name)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.sibling("bak")
    }

    /// Ids already stored, including ids encoded in `source_file` names
    pub fn existing_ids(&self) -> Result<HashSet<String>> {
        let table = self.read_table()?;
        let mut ids = HashSet::new();

        if let Some(idx) = table.column("property_id") {
            ids.extend(
                table
                    .rows
                    .iter()
                    .map(|row| row[idx].trim())
                    .filter(|id| !id.is_empty())
                    .map(str::to_string),
            );
        }
        if let Some(idx) = table.column("source_file") {
            ids.extend(
                table
                    .rows
                    .iter()
                    .filter_map(|row| property_id_from_filename(row[idx].trim())),
            );
        }

        info!("Loaded {} existing property IDs from CSV", ids.len());
        Ok(ids)
    }

    /// Names of the saved pages already stored, so pages without any id are
    /// not ingested twice
    pub fn stored_source_files(&self) -> Result<HashSet<String>> {
        let table = self.read_table()?;
        let Some(idx) = table.column("source_file") else {
            return Ok(HashSet::new());
        };

        Ok(table
            .rows
            .iter()
            .map(|row| row[idx].trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect())
    }

    pub fn load(&self) -> Result<Vec<ListingRecord>> {
        let table = self.read_table()?;
        let mut records = Vec::with_capacity(table.rows.len());
        for (line, row) in table.rows.iter().enumerate() {
            match table.record(row) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unreadable row {}: {}", line + 2, e),
            }
        }
        Ok(records)
    }

    /// Append records in the file's own column order
    pub fn append(&self, records: &[ListingRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        if !self.exists() {
            self.ensure_schema()?;
        }

        let headers = self.read_headers()?;
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {} for append", self.path.display()))?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);

        for record in records {
            writer.write_record(record.to_row(&headers))?;
            debug!("Added data from {} to CSV", record.source_file);
        }
        writer.flush()?;
        Ok(records.len())
    }

    fn read_headers(&self) -> Result<Vec<String>> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        Ok(reader.headers()?.iter().map(str::to_string).collect())
    }

    /// Recompute the converted price and the per-area prices of every row.
    /// Returns the number of rows that changed.
    pub fn refresh_reference_prices(&self, rates: &ExchangeRates) -> Result<usize> {
        let mut table = self.read_table()?;
        let mut updated = 0;

        let mut rows = std::mem::take(&mut table.rows);
        for row in &mut rows {
            let record = match table.record(row) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Cannot refresh row: {}", e);
                    continue;
                }
            };
            let metrics = DerivedMetrics::compute(&record, rates);
            if metrics.price_in_reference_currency.is_none() {
                continue;
            }

            let mut changed = table.set(
                row,
                "price_in_reference_currency",
                metrics.price_in_reference_currency,
            );
            changed |= table.set(row, "price_per_m2", metrics.price_per_m2);
            changed |= table.set(row, "price_per_donum", metrics.price_per_donum);
            if changed {
                updated += 1;
            }
        }
        table.rows = rows;

        if updated > 0 {
            self.write_table(&table)?;
            info!("Updated reference prices for {} existing entries", updated);
        }
        Ok(updated)
    }

    /// Re-derive land areas from description and title. A value is replaced
    /// when missing, below `min_plausible_m2`, or when the text gives more
    /// than one and a half times the stored area.
    pub fn fix_land_areas(&self, min_plausible_m2: f64) -> Result<usize> {
        let mut table = self.read_table()?;
        let mut fixes = 0;

        let mut rows = std::mem::take(&mut table.rows);
        for row in &mut rows {
            let Ok(record) = table.record(row) else {
                continue;
            };
            if !record.is_land() {
                continue;
            }

            let text = format!(
                "{} {}",
                record.description.as_deref().unwrap_or_default(),
                record.title.as_deref().unwrap_or_default()
            );
            let Some(parsed) = parse_area(&text) else {
                continue;
            };

            let replace = match record.area_m2 {
                None => true,
                Some(current) => current < min_plausible_m2 || parsed > current * 1.5,
            };
            if !replace {
                continue;
            }

            let metrics =
                DerivedMetrics::from_reference(record.price_in_reference_currency, Some(parsed));
            table.set(row, "area_m2", Some(parsed));
            table.set(row, "price_per_m2", metrics.price_per_m2);
            table.set(row, "price_per_donum", metrics.price_per_donum);
            fixes += 1;
        }
        table.rows = rows;

        if fixes > 0 {
            self.write_table(&table)?;
            info!("Fixed area_m2 for {} land listings in CSV", fixes);
        } else {
            info!("No area_m2 fixes applied (all values plausible)");
        }
        Ok(fixes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ListingType;

    fn temp_store(name: &str) -> (PathBuf, CsvStore) {
        let dir = std::env::temp_dir().join(format!("evler-store-{}-{}", name, std::process::id()));
        fs::remove_dir_all(&dir).ok();
        fs::create_dir_all(&dir).unwrap();
        let store = CsvStore::new(dir.join("processed").join("property_details.csv"));
        (dir, store)
    }

    fn listing(id: &str) -> ListingRecord {
        let mut record = ListingRecord::new(format!("{}.html", id));
        record.property_id = Some(id.to_string());
        record.title = Some(format!("Listing {}", id));
        record.price = Some(100.0);
        record.currency = Some("GBP".to_string());
        record.listing_type = Some(ListingType::Sale);
        record.area_m2 = Some(1338.0);
        record
    }

    #[test]
    fn test_ensure_schema_creates_header() {
        let (dir, store) = temp_store("create");
        store.ensure_schema().unwrap();

        let contents = fs::read_to_string(store.path()).unwrap();
        assert_eq!(contents.trim_end(), COLUMNS.join(","));

        // second call is a no-op
        store.ensure_schema().unwrap();
        assert!(!store.backup_path().exists());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_ensure_schema_extends_old_file() {
        let (dir, store) = temp_store("extend");
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(
            store.path(),
            "source_file,property_id,title,floor\n1.html,1,Old listing,3\n",
        )
        .unwrap();

        store.ensure_schema().unwrap();

        let table = store.read_table().unwrap();
        assert_eq!(&table.headers[..4], &["source_file", "property_id", "title", "floor"]);
        assert_eq!(table.headers.len(), COLUMNS.len() + 1);
        assert_eq!(table.rows[0][3], "3");
        assert!(table.rows[0][4..].iter().all(|cell| cell.is_empty()));
        assert!(store.backup_path().exists());

        let records = store.load().unwrap();
        assert_eq!(records[0].title.as_deref(), Some("Old listing"));
        assert_eq!(records[0].price, None);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_append_and_load() {
        let (dir, store) = temp_store("append");
        store.append(&[listing("101"), listing("102")]).unwrap();
        store.append(&[listing("103")]).unwrap();

        let records = store.load().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0], listing("101"));
        assert_eq!(records[2].listing_type, Some(ListingType::Sale));

        let ids = store.existing_ids().unwrap();
        assert!(ids.contains("101") && ids.contains("102") && ids.contains("103"));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_existing_ids_from_source_file() {
        let (dir, store) = temp_store("ids");
        let mut record = ListingRecord::new("555.html");
        record.title = Some("No id on page".to_string());
        store.append(&[record]).unwrap();

        let ids = store.existing_ids().unwrap();
        assert_eq!(ids, HashSet::from(["555".to_string()]));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_stored_source_files_include_unnumbered_pages() {
        let (dir, store) = temp_store("sources");
        let mut record = ListingRecord::new("villa-alsancak.html");
        record.title = Some("Villa".to_string());
        store.append(&[record, listing("7")]).unwrap();

        let files = store.stored_source_files().unwrap();
        assert_eq!(
            files,
            HashSet::from(["villa-alsancak.html".to_string(), "7.html".to_string()])
        );
        assert!(!store.existing_ids().unwrap().contains("villa-alsancak"));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_overlong_rows_are_cut_to_header_width() {
        let (dir, store) = temp_store("overlong");
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(
            store.path(),
            "source_file,property_id,title\n1.html,1,Short\n2.html,2,Long,stray,cells\n",
        )
        .unwrap();

        let table = store.read_table().unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1], vec!["2.html", "2", "Long"]);
        assert_eq!(table.rows[0], vec!["1.html", "1", "Short"]);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_garbage_numeric_cells_become_empty() {
        let (dir, store) = temp_store("garbage");
        store.ensure_schema().unwrap();
        let mut row = vec![String::new(); COLUMNS.len()];
        row[0] = "9.html".to_string();
        row[3] = "call us".to_string();
        row[5] = "Lease".to_string();
        let mut contents = fs::read_to_string(store.path()).unwrap();
        contents.push_str(&row.join(","));
        contents.push('\n');
        fs::write(store.path(), contents).unwrap();

        let records = store.load().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].price, None);
        assert_eq!(records[0].listing_type, None);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_refresh_reference_prices() {
        let (dir, store) = temp_store("refresh");
        let mut unpriced = listing("2");
        unpriced.price = None;
        store.append(&[listing("1"), unpriced]).unwrap();

        let rates = ExchangeRates::from_iter([("GBP", 50.0)]);
        assert_eq!(store.refresh_reference_prices(&rates).unwrap(), 1);

        let records = store.load().unwrap();
        assert_eq!(records[0].price_in_reference_currency, Some(5000.0));
        assert_eq!(records[0].price_per_m2, Some(3.74));
        assert_eq!(records[0].price_per_donum, Some(5000.0));
        assert_eq!(records[1].price_in_reference_currency, None);

        // nothing changes on a second pass with the same rates
        assert_eq!(store.refresh_reference_prices(&rates).unwrap(), 0);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_fix_land_areas() {
        let (dir, store) = temp_store("fix");

        let mut land = listing("1");
        land.property_type = Some("Arsa".to_string());
        land.area_m2 = Some(3.0);
        land.price_in_reference_currency = Some(401_400.0);
        land.description = Some("Satılık 3 dönüm tarla".to_string());

        let mut flat = listing("2");
        flat.property_type = Some("Konut".to_string());
        flat.area_m2 = Some(3.0);
        flat.description = Some("3 dönüm bahçeli".to_string());

        let mut plausible = listing("3");
        plausible.property_subtype = Some("Arsa".to_string());
        plausible.area_m2 = Some(4000.0);
        plausible.description = Some("3 dönüm".to_string());

        store.append(&[land, flat, plausible]).unwrap();
        assert_eq!(store.fix_land_areas(100.0).unwrap(), 1);

        let records = store.load().unwrap();
        assert_eq!(records[0].area_m2, Some(4014.0));
        assert_eq!(records[0].price_per_m2, Some(100.0));
        assert_eq!(records[0].price_per_donum, Some(133_800.0));
        assert_eq!(records[1].area_m2, Some(3.0));
        assert_eq!(records[2].area_m2, Some(4000.0));
        fs::remove_dir_all(&dir).ok();
    }
}
