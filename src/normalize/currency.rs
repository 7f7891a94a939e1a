use super::area::{round2, DONUM_M2};
use crate::models::ListingRecord;
use crate::rates::ExchangeRates;
use tracing::warn;

/// ISO code for a currency symbol; codes and unknown strings pass through
pub fn iso_code(currency: &str) -> &str {
    match currency.trim() {
        "£" => "GBP",
        "$" => "USD",
        "€" => "EUR",
        "₺" => "TRY",
        other => other,
    }
}

/// Convert `price` into Turkish Lira.
///
/// A currency with no known rate is converted at 1.0, as if it already were
/// in lira. That case is logged so mispriced rows can be traced.
pub fn to_reference_currency(
    price: Option<f64>,
    currency: Option<&str>,
    rates: &ExchangeRates,
) -> Option<f64> {
    let price = price.filter(|p| p.is_finite())?;
    let code = iso_code(currency?);

    let rate = rates.rate_for(code).unwrap_or_else(|| {
        warn!("No exchange rate for {:?}, assuming 1.0", code);
        1.0
    });

    Some(round2(price * rate))
}

/// Price figures derived from the raw price, the currency and the area
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DerivedMetrics {
    pub price_in_reference_currency: Option<f64>,
    pub price_per_m2: Option<f64>,
    pub price_per_donum: Option<f64>,
}

impl DerivedMetrics {
    pub fn compute(record: &ListingRecord, rates: &ExchangeRates) -> Self {
        let reference = to_reference_currency(record.price, record.currency.as_deref(), rates);
        Self::from_reference(reference, record.area_m2)
    }

    /// Per-area figures from an already converted price
    pub fn from_reference(reference: Option<f64>, area_m2: Option<f64>) -> Self {
        let area = area_m2.filter(|a| *a > 0.0);
        let per_area = |unit_m2: f64| match (reference, area) {
            (Some(price), Some(area)) => Some(round2(price / (area / unit_m2))),
            _ => None,
        };

        Self {
            price_in_reference_currency: reference,
            price_per_m2: per_area(1.0),
            price_per_donum: per_area(DONUM_M2),
        }
    }

    pub fn apply(&self, record: &mut ListingRecord) {
        record.price_in_reference_currency = self.price_in_reference_currency;
        record.price_per_m2 = self.price_per_m2;
        record.price_per_donum = self.price_per_donum;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rates() -> ExchangeRates {
        ExchangeRates::from_iter([("GBP", 50.0), ("USD", 38.0), ("EUR", 42.0)])
    }

    #[test]
    fn test_symbol_mapping() {
        assert_eq!(iso_code("£"), "GBP");
        assert_eq!(iso_code("$"), "USD");
        assert_eq!(iso_code("€"), "EUR");
        assert_eq!(iso_code("₺"), "TRY");
        assert_eq!(iso_code("GBP"), "GBP");
    }

    #[test]
    fn test_conversion() {
        let rates = rates();
        assert_eq!(to_reference_currency(Some(100.0), Some("GBP"), &rates), Some(5000.0));
        assert_eq!(to_reference_currency(Some(100.0), Some("£"), &rates), Some(5000.0));
        assert_eq!(to_reference_currency(Some(250.0), Some("TRY"), &rates), Some(250.0));
        assert_eq!(to_reference_currency(Some(250.0), Some("₺"), &rates), Some(250.0));
    }

    #[test]
    fn test_missing_inputs() {
        let rates = rates();
        assert_eq!(to_reference_currency(None, Some("GBP"), &rates), None);
        assert_eq!(to_reference_currency(Some(100.0), None, &rates), None);
        assert_eq!(to_reference_currency(Some(f64::NAN), Some("GBP"), &rates), None);
    }

    #[test]
    fn test_unknown_currency_uses_identity() {
        let rates = rates();
        assert_eq!(to_reference_currency(Some(100.0), Some("XXX"), &rates), Some(100.0));
    }

    #[test]
    fn test_derived_metrics() {
        let mut record = ListingRecord::new("1.html");
        record.price = Some(1000.0);
        record.currency = Some("GBP".to_string());
        record.area_m2 = Some(1338.0);

        let metrics = DerivedMetrics::compute(&record, &rates());
        assert_eq!(metrics.price_in_reference_currency, Some(50000.0));
        assert_eq!(metrics.price_per_m2, Some(37.37));
        assert_eq!(metrics.price_per_donum, Some(50000.0));
    }

    #[test]
    fn test_no_per_area_metrics_without_area() {
        let mut record = ListingRecord::new("1.html");
        record.price = Some(1000.0);
        record.currency = Some("USD".to_string());

        let metrics = DerivedMetrics::compute(&record, &rates());
        assert_eq!(metrics.price_in_reference_currency, Some(38000.0));
        assert_eq!(metrics.price_per_m2, None);
        assert_eq!(metrics.price_per_donum, None);

        record.area_m2 = Some(0.0);
        let metrics = DerivedMetrics::compute(&record, &rates());
        assert_eq!(metrics.price_per_m2, None);
    }
}
