use crate::config::Settings;
use crate::normalize::{normalize_number, NumberPolicy};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Currency every price is converted into
pub const REFERENCE_CURRENCY: &str = "TRY";

/// Currencies read from the feed
pub const TRACKED_CURRENCIES: &[&str] = &["USD", "EUR", "GBP"];

/// Buying rates against the reference currency.
///
/// The reference currency itself is never stored; `rate_for` answers 1.0
/// for it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExchangeRates(BTreeMap<String, f64>);

impl ExchangeRates {
    pub fn rate_for(&self, code: &str) -> Option<f64> {
        if code == REFERENCE_CURRENCY {
            return Some(1.0);
        }
        self.0.get(code).copied()
    }

    pub fn insert(&mut self, code: impl Into<String>, rate: f64) {
        self.0.insert(code.into(), rate);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(code, rate)| (code.as_str(), *rate))
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for ExchangeRates {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(code, rate)| (code.into(), rate)).collect())
    }
}

#[derive(Debug, Error)]
pub enum RateError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("feed returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("feed contained no tracked currency")]
    Empty,
}

/// Source of exchange rates. Implementations never fail: when the
/// source cannot be read they answer with approximate constants.
#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn fetch_rates(&self) -> ExchangeRates;

    fn source_name(&self) -> &'static str;
}

/// Rates from the Turkish central bank daily XML feed
pub struct TcmbRateProvider {
    client: Client,
    url: String,
    fallback: ExchangeRates,
}

impl TcmbRateProvider {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: settings.rates_url.clone(),
            fallback: fallback_rates(settings),
        })
    }

    async fn try_fetch(&self) -> Result<ExchangeRates, RateError> {
        debug!("Fetching exchange rates from {}", self.url);

        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(RateError::Status(response.status()));
        }

        let body = response.text().await?;
        parse_tcmb_xml(&body)
    }
}

#[async_trait]
impl RateProvider for TcmbRateProvider {
    async fn fetch_rates(&self) -> ExchangeRates {
        match self.try_fetch().await {
            Ok(rates) => {
                info!("Fetched exchange rates for {} currencies", rates.len());
                let rates = complete_from(rates, &self.fallback);
                for (code, rate) in rates.iter() {
                    debug!("1 {} = {} {}", code, rate, REFERENCE_CURRENCY);
                }
                rates
            }
            Err(e) => {
                warn!("Exchange rate feed unavailable ({}), using fallback rates", e);
                self.fallback.clone()
            }
        }
    }

    fn source_name(&self) -> &'static str {
        "TCMB"
    }
}

/// Always answers with the same table. Used offline and in tests.
pub struct FixedRateProvider {
    rates: ExchangeRates,
}

impl FixedRateProvider {
    pub fn new(rates: ExchangeRates) -> Self {
        Self { rates }
    }
}

#[async_trait]
impl RateProvider for FixedRateProvider {
    async fn fetch_rates(&self) -> ExchangeRates {
        self.rates.clone()
    }

    fn source_name(&self) -> &'static str {
        "fixed"
    }
}

pub fn fallback_rates(settings: &Settings) -> ExchangeRates {
    settings
        .fallback_rates
        .iter()
        .map(|(code, rate)| (code.clone(), *rate))
        .collect()
}

/// Read `<Currency Kod="...">` blocks and their `ForexBuying` values
pub fn parse_tcmb_xml(xml: &str) -> Result<ExchangeRates, RateError> {
    static CURRENCY: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"(?s)<Currency\b[^>]*\bKod="([A-Z]{3})"[^>]*>(.*?)</Currency>"#)
            .expect("valid regex")
    });
    static FOREX_BUYING: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"<ForexBuying>\s*([^<]*?)\s*</ForexBuying>").expect("valid regex")
    });

    let mut rates = ExchangeRates::default();
    for caps in CURRENCY.captures_iter(xml) {
        let code = &caps[1];
        if !TRACKED_CURRENCIES.contains(&code) {
            continue;
        }
        let rate = FOREX_BUYING
            .captures(&caps[2])
            .and_then(|buying| normalize_number(&buying[1], NumberPolicy::Decimal))
            .filter(|rate| *rate > 0.0);
        if let Some(rate) = rate {
            rates.insert(code, rate);
        }
    }

    if rates.is_empty() {
        return Err(RateError::Empty);
    }
    Ok(rates)
}

fn complete_from(mut rates: ExchangeRates, fallback: &ExchangeRates) -> ExchangeRates {
    for code in TRACKED_CURRENCIES {
        if rates.rate_for(code).is_none() {
            if let Some(rate) = fallback.rate_for(code) {
                warn!("Feed had no {} rate, using fallback {}", code, rate);
                rates.insert(*code, rate);
            }
        }
    }
    rates
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Tarih_Date Tarih="18.10.2026" Date="10/18/2026" Bulten_No="2026/198">
    <Currency CrossOrder="0" Kod="USD" CurrencyCode="USD">
        <Unit>1</Unit>
        <Isim>ABD DOLARI</Isim>
        <CurrencyName>US DOLLAR</CurrencyName>
        <ForexBuying>38.1204</ForexBuying>
        <ForexSelling>38.1891</ForexSelling>
    </Currency>
    <Currency CrossOrder="1" Kod="AUD" CurrencyCode="AUD">
        <Unit>1</Unit>
        <ForexBuying>24.6110</ForexBuying>
    </Currency>
    <Currency CrossOrder="9" Kod="EUR" CurrencyCode="EUR">
        <Unit>1</Unit>
        <ForexBuying>42,0051</ForexBuying>
    </Currency>
    <Currency CrossOrder="10" Kod="GBP" CurrencyCode="GBP">
        <Unit>1</Unit>
        <ForexBuying></ForexBuying>
    </Currency>
</Tarih_Date>"#;

    #[test]
    fn test_parse_feed() {
        let rates = parse_tcmb_xml(FEED).unwrap();
        assert_eq!(rates.rate_for("USD"), Some(38.1204));
        assert_eq!(rates.rate_for("EUR"), Some(42.0051));
        assert_eq!(rates.rate_for("GBP"), None);
        assert_eq!(rates.rate_for("AUD"), None);
        assert_eq!(rates.len(), 2);
    }

    #[test]
    fn test_reference_currency_is_implicit() {
        let rates = ExchangeRates::default();
        assert_eq!(rates.rate_for("TRY"), Some(1.0));
        assert!(rates.is_empty());
    }

    #[test]
    fn test_empty_feed_is_an_error() {
        assert!(matches!(parse_tcmb_xml("<Tarih_Date/>"), Err(RateError::Empty)));
        assert!(matches!(parse_tcmb_xml("not xml at all"), Err(RateError::Empty)));
    }

    #[test]
    fn test_missing_currencies_completed_from_fallback() {
        let fallback = fallback_rates(&Settings::default());
        let rates = complete_from(parse_tcmb_xml(FEED).unwrap(), &fallback);
        assert_eq!(
            rates.iter().collect::<Vec<_>>(),
            vec![("EUR", 42.0051), ("GBP", 48.7317), ("USD", 38.1204)]
        );
    }

    #[tokio::test]
    async fn test_unreachable_feed_returns_fallback() {
        let settings = Settings {
            rates_url: "http://127.0.0.1:9/today.xml".to_string(),
            request_timeout_secs: 2,
            ..Settings::default()
        };
        let provider = TcmbRateProvider::new(&settings).unwrap();

        let rates = provider.fetch_rates().await;
        assert_eq!(rates, fallback_rates(&settings));
        assert_eq!(rates.rate_for("USD"), Some(37.8646));
    }

    #[tokio::test]
    async fn test_fixed_provider() {
        let provider = FixedRateProvider::new(ExchangeRates::from_iter([("GBP", 50.0)]));
        assert_eq!(provider.fetch_rates().await.rate_for("GBP"), Some(50.0));
        assert_eq!(provider.source_name(), "fixed");
    }
}
