use serde::{Deserialize, Serialize};

/// Country every 101evler listing belongs to
pub const DEFAULT_COUNTRY: &str = "Northern Cyprus";

/// Column order of the tabular store. Downstream reports read these names.
pub const COLUMNS: &[&str] = &[
    "source_file",
    "property_id",
    "title",
    "price",
    "currency",
    "listing_type",
    "property_type",
    "property_subtype",
    "room_count",
    "district",
    "city",
    "country",
    "agency_name",
    "url",
    "description",
    "listing_date",
    "update_date",
    "title_deed_type",
    "min_rental_period",
    "payment_interval",
    "exchange_option",
    "area_m2",
    "price_in_reference_currency",
    "price_per_m2",
    "price_per_donum",
    "image_links",
    "phone_numbers",
    "whatsapp_numbers",
];

/// Numeric listing id encoded in a saved page name (`123456.html`)
pub fn property_id_from_filename(filename: &str) -> Option<String> {
    let stem = filename.strip_suffix(".html")?;
    (!stem.is_empty() && stem.chars().all(|c| c.is_ascii_digit())).then(|| stem.to_string())
}

/// Whether the listing is offered for rent or for sale
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ListingType {
    Rent,
    Sale,
}

impl ListingType {
    /// Map the portal's "Durumu" value (Kiralık / Satılık)
    pub fn from_status(status: &str) -> Option<Self> {
        if status.contains("Kiralık") {
            Some(Self::Rent)
        } else if status.contains("Satılık") {
            Some(Self::Sale)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rent => "Rent",
            Self::Sale => "Sale",
        }
    }
}

/// One row of the dataset, produced from one listing page.
///
/// Every field except `source_file` is optional: a page that lost part of its
/// structure still yields a record with the fields that could be found.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ListingRecord {
    pub source_file: String,
    pub property_id: Option<String>,
    pub title: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub price: Option<f64>,
    pub currency: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub listing_type: Option<ListingType>,
    pub property_type: Option<String>,
    pub property_subtype: Option<String>,
    pub room_count: Option<String>,
    pub district: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub agency_name: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub listing_date: Option<String>,
    pub update_date: Option<String>,
    pub title_deed_type: Option<String>,
    pub min_rental_period: Option<String>,
    pub payment_interval: Option<String>,
    pub exchange_option: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub area_m2: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub price_in_reference_currency: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub price_per_m2: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    pub price_per_donum: Option<f64>,
    pub image_links: Option<String>,
    pub phone_numbers: Option<String>,
    pub whatsapp_numbers: Option<String>,
}

impl ListingRecord {
    pub fn new(source_file: impl Into<String>) -> Self {
        Self {
            source_file: source_file.into(),
            ..Default::default()
        }
    }

    /// True when the page lacked an id, a listing/property type, a priced
    /// currency or a location. Such records are still stored.
    pub fn is_degraded(&self) -> bool {
        let has_basic = self.property_id.is_some()
            && (self.listing_type.is_some() || self.property_type.is_some());
        let has_price = self.price.is_some() && self.currency.is_some();
        let has_location = self.district.is_some() || self.city.is_some();
        !(has_basic && has_price && has_location)
    }

    /// Land plots ("arsa") by type or subtype
    pub fn is_land(&self) -> bool {
        [&self.property_type, &self.property_subtype]
            .iter()
            .any(|field| {
                field
                    .as_deref()
                    .map(|v| v.to_lowercase().contains("arsa"))
                    .unwrap_or(false)
            })
    }

    pub fn has_phone(&self) -> bool {
        self.phone_numbers.as_deref().is_some_and(|v| !v.is_empty())
    }

    pub fn has_images(&self) -> bool {
        self.image_links.as_deref().is_some_and(|v| !v.is_empty())
    }

    /// Numeric column by name, for sorting and statistics
    pub fn numeric_column(&self, column: &str) -> Option<f64> {
        match column {
            "price" => self.price,
            "area_m2" => self.area_m2,
            "price_in_reference_currency" => self.price_in_reference_currency,
            "price_per_m2" => self.price_per_m2,
            "price_per_donum" => self.price_per_donum,
            _ => None,
        }
    }

    /// Render the record in the order of `headers`. Columns the record does
    /// not know about are left empty.
    pub fn to_row(&self, headers: &[String]) -> Vec<String> {
        let value = serde_json::to_value(self).unwrap_or_default();
        headers
            .iter()
            .map(|header| cell_text(value.get(header.as_str())))
            .collect()
    }
}

fn cell_text(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers() -> Vec<String> {
        COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_property_id_from_filename() {
        assert_eq!(property_id_from_filename("451524.html"), Some("451524".to_string()));
        assert_eq!(property_id_from_filename("451524.htm"), None);
        assert_eq!(property_id_from_filename("listing-1.html"), None);
        assert_eq!(property_id_from_filename(".html"), None);
    }

    #[test]
    fn test_listing_type_from_status() {
        assert_eq!(ListingType::from_status("Kiralık"), Some(ListingType::Rent));
        assert_eq!(ListingType::from_status("Satılık Daire"), Some(ListingType::Sale));
        assert_eq!(ListingType::from_status("Günlük"), None);
    }

    #[test]
    fn test_to_row_follows_header_order() {
        let mut record = ListingRecord::new("123.html");
        record.property_id = Some("123".to_string());
        record.price = Some(1500.0);
        record.listing_type = Some(ListingType::Rent);

        let headers = vec![
            "price".to_string(),
            "property_id".to_string(),
            "listing_type".to_string(),
            "legacy".to_string(),
            "title".to_string(),
        ];
        let row = record.to_row(&headers);
        assert_eq!(row, vec!["1500.0", "123", "Rent", "", ""]);
    }

    #[test]
    fn test_to_row_covers_every_column() {
        let mut record = ListingRecord::new("77.html");
        record.area_m2 = Some(2007.0);
        let row = record.to_row(&headers());
        assert_eq!(row.len(), COLUMNS.len());
        assert_eq!(row[0], "77.html");
        assert_eq!(row[21], "2007.0");
        assert!(row[1].is_empty());
    }

    #[test]
    fn test_degraded_detection() {
        let mut record = ListingRecord::new("1.html");
        assert!(record.is_degraded());

        record.property_id = Some("1".to_string());
        record.property_type = Some("Konut".to_string());
        record.price = Some(100.0);
        record.currency = Some("GBP".to_string());
        record.city = Some("Girne".to_string());
        assert!(!record.is_degraded());
    }

    #[test]
    fn test_is_land() {
        let mut record = ListingRecord::new("1.html");
        assert!(!record.is_land());
        record.property_subtype = Some("Tarla / Arsa".to_string());
        assert!(record.is_land());
    }
}
