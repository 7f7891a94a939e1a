use crate::models::{ListingRecord, ListingType};
use crate::normalize::DONUM_M2;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

/// Default number of rows returned by a search
pub const DEFAULT_LIMIT: usize = 200;

/// Default number of rows returned by a free-text query
pub const DEFAULT_QUERY_LIMIT: usize = 50;

/// Columns a search can be sorted on
pub const SORTABLE_COLUMNS: &[&str] = &[
    "price",
    "area_m2",
    "price_in_reference_currency",
    "price_per_m2",
    "price_per_donum",
];

/// Filters over the stored dataset. Unset filters match everything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    /// Text filters match case- and diacritic-insensitively
    pub city: Option<String>,
    pub district: Option<String>,
    pub listing_type: Option<ListingType>,
    pub property_type: Option<String>,
    pub property_subtype: Option<String>,
    /// Bounds on the price in the reference currency
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_area_m2: Option<f64>,
    pub max_area_m2: Option<f64>,
    pub min_donum: Option<f64>,
    pub max_donum: Option<f64>,
    /// Accepted room counts such as `3+1`
    pub rooms: Vec<String>,
    pub keywords_all: Vec<String>,
    pub keywords_any: Vec<String>,
    pub keywords_none: Vec<String>,
    pub has_phone: Option<bool>,
    pub has_images: Option<bool>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub sort: Option<SortSpec>,
    pub limit: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            city: None,
            district: None,
            listing_type: None,
            property_type: None,
            property_subtype: None,
            min_price: None,
            max_price: None,
            min_area_m2: None,
            max_area_m2: None,
            min_donum: None,
            max_donum: None,
            rooms: Vec::new(),
            keywords_all: Vec::new(),
            keywords_any: Vec::new(),
            keywords_none: Vec::new(),
            has_phone: None,
            has_images: None,
            date_from: None,
            date_to: None,
            sort: None,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// Sort order, written `column` or `column:asc|desc`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub column: String,
    pub descending: bool,
}

impl FromStr for SortSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (column, direction) = s.split_once(':').unwrap_or((s, "asc"));
        let column = column.trim();
        if !SORTABLE_COLUMNS.contains(&column) {
            return Err(format!(
                "cannot sort on '{}', expected one of: {}",
                column,
                SORTABLE_COLUMNS.join(", ")
            ));
        }

        let descending = match direction.trim().to_lowercase().as_str() {
            "asc" => false,
            "desc" => true,
            other => return Err(format!("unknown sort direction '{}'", other)),
        };

        Ok(Self {
            column: column.to_string(),
            descending,
        })
    }
}

/// Lowercase and strip Turkish diacritics so `Lefkoşa` matches `lefkosa`
pub fn fold_turkish(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .filter(|c| *c != '\u{307}')
        .map(|c| match c {
            'ç' => 'c',
            'ğ' => 'g',
            'ı' => 'i',
            'ö' => 'o',
            'ş' => 's',
            'ü' => 'u',
            'â' => 'a',
            'î' => 'i',
            'û' => 'u',
            other => other,
        })
        .collect()
}

/// Dates as written on listing pages (`DD/MM/YYYY`)
pub fn parse_listing_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%d/%m/%Y").ok()
}

fn contains_folded(field: Option<&str>, needle: &Option<String>) -> bool {
    match needle {
        None => true,
        Some(needle) => {
            let needle = fold_turkish(needle);
            field.is_some_and(|value| fold_turkish(value).contains(&needle))
        }
    }
}

/// A missing value never satisfies a bound
fn within(value: Option<f64>, min: Option<f64>, max: Option<f64>) -> bool {
    if min.is_none() && max.is_none() {
        return true;
    }
    let Some(value) = value else {
        return false;
    };
    min.is_none_or(|min| value >= min) && max.is_none_or(|max| value <= max)
}

impl SearchParams {
    pub fn matches(&self, record: &ListingRecord) -> bool {
        if !contains_folded(record.city.as_deref(), &self.city)
            || !contains_folded(record.district.as_deref(), &self.district)
            || !contains_folded(record.property_type.as_deref(), &self.property_type)
            || !contains_folded(record.property_subtype.as_deref(), &self.property_subtype)
        {
            return false;
        }

        if self.listing_type.is_some() && record.listing_type != self.listing_type {
            return false;
        }

        let donum = record.area_m2.map(|area| area / DONUM_M2);
        if !within(record.price_in_reference_currency, self.min_price, self.max_price)
            || !within(record.area_m2, self.min_area_m2, self.max_area_m2)
            || !within(donum, self.min_donum, self.max_donum)
        {
            return false;
        }

        if !self.rooms.is_empty() {
            let Some(rooms) = record.room_count.as_deref() else {
                return false;
            };
            let rooms = fold_turkish(rooms.trim());
            if !self.rooms.iter().any(|r| fold_turkish(r.trim()) == rooms) {
                return false;
            }
        }

        if !self.matches_keywords(record) {
            return false;
        }

        if self.has_phone.is_some_and(|wanted| record.has_phone() != wanted)
            || self.has_images.is_some_and(|wanted| record.has_images() != wanted)
        {
            return false;
        }

        self.matches_dates(record)
    }

    fn matches_keywords(&self, record: &ListingRecord) -> bool {
        if self.keywords_all.is_empty()
            && self.keywords_any.is_empty()
            && self.keywords_none.is_empty()
        {
            return true;
        }

        let text = fold_turkish(&format!(
            "{} {}",
            record.title.as_deref().unwrap_or_default(),
            record.description.as_deref().unwrap_or_default()
        ));
        let found = |keyword: &String| text.contains(&fold_turkish(keyword.trim()));

        self.keywords_all.iter().all(found)
            && (self.keywords_any.is_empty() || self.keywords_any.iter().any(found))
            && !self.keywords_none.iter().any(found)
    }

    /// The update date is preferred; listings never updated use their
    /// listing date.
    fn matches_dates(&self, record: &ListingRecord) -> bool {
        if self.date_from.is_none() && self.date_to.is_none() {
            return true;
        }

        let date = record
            .update_date
            .as_deref()
            .and_then(parse_listing_date)
            .or_else(|| record.listing_date.as_deref().and_then(parse_listing_date));
        let Some(date) = date else {
            return false;
        };

        self.date_from.is_none_or(|from| date >= from) && self.date_to.is_none_or(|to| date <= to)
    }
}

/// Matching records, sorted when asked and cut to `params.limit`
pub fn search<'a>(records: &'a [ListingRecord], params: &SearchParams) -> Vec<&'a ListingRecord> {
    let mut results: Vec<&ListingRecord> =
        records.iter().filter(|r| params.matches(r)).collect();

    if let Some(sort) = &params.sort {
        results.sort_by(|a, b| {
            match (a.numeric_column(&sort.column), b.numeric_column(&sort.column)) {
                (Some(x), Some(y)) => {
                    let ordering = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
                    if sort.descending {
                        ordering.reverse()
                    } else {
                        ordering
                    }
                }
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        });
    }

    results.truncate(params.limit);
    results
}

/// Folded text of the fields a free-text query looks into
fn query_text(record: &ListingRecord) -> String {
    let fields = [
        &record.title,
        &record.description,
        &record.district,
        &record.city,
        &record.property_type,
        &record.property_subtype,
        &record.agency_name,
    ];
    let joined: Vec<&str> = fields.iter().filter_map(|field| field.as_deref()).collect();
    fold_turkish(&joined.join(" "))
}

/// Free-text lookup over the stored listings.
///
/// Every whitespace-separated token must appear in one of the text fields,
/// ignoring case and Turkish diacritics. A query made of a single number also
/// matches that listing id exactly. Results with more matching tokens come
/// first, then the most recently updated.
pub fn query<'a>(records: &'a [ListingRecord], text: &str, limit: usize) -> Vec<&'a ListingRecord> {
    let folded = fold_turkish(text);
    let tokens: Vec<&str> = folded.split_whitespace().collect();
    let id_token = match tokens.as_slice() {
        [token] if token.chars().all(|c| c.is_ascii_digit()) => Some(*token),
        _ => None,
    };

    let mut hits: Vec<(usize, Option<NaiveDate>, &ListingRecord)> = records
        .iter()
        .filter_map(|record| {
            let haystack = query_text(record);
            let matched = tokens.iter().filter(|token| haystack.contains(**token)).count();
            let id_match = id_token
                .is_some_and(|id| record.property_id.as_deref().map(str::trim) == Some(id));

            let updated = record.update_date.as_deref().and_then(parse_listing_date);
            (matched == tokens.len() || id_match).then_some((matched, updated, record))
        })
        .collect();

    hits.sort_by(|a, b| {
        b.0.cmp(&a.0).then_with(|| match (a.1, b.1) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
    });

    hits.into_iter()
        .take(limit)
        .map(|(_, _, record)| record)
        .collect()
}

/// Summary of a price series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceStats {
    pub count: usize,
    pub min: f64,
    pub p25: f64,
    pub median: f64,
    pub p75: f64,
    pub max: f64,
    pub mean: f64,
}

impl PriceStats {
    /// `None` when the series has no finite values
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut sorted: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

        let count = sorted.len();
        Some(Self {
            count,
            min: sorted[0],
            p25: quantile(&sorted, 0.25),
            median: quantile(&sorted, 0.5),
            p75: quantile(&sorted, 0.75),
            max: sorted[count - 1],
            mean: sorted.iter().sum::<f64>() / count as f64,
        })
    }
}

// linear interpolation between closest ranks; `sorted` is non-empty
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (position - lower as f64)
}
