use super::number::{normalize_number, NumberPolicy};
use regex::Regex;
use std::sync::LazyLock;

/// Square meters in one dönüm
pub const DONUM_M2: f64 = 1338.0;
/// Square meters in one evlek (a quarter dönüm)
pub const EVLEK_M2: f64 = DONUM_M2 / 4.0;
/// Square meters in one square foot
pub const FT2_TO_M2: f64 = 0.092903;

mod patterns {
    use super::*;

    pub static SQUARE_METERS: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(\d+[.,]?\d*)\s*(?:m2|m²|metrekare)").expect("valid regex")
    });

    pub static DONUM_THEN_EVLEK: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(\d+[.,]?\d*)\s*(?:dönüm|donum)[^\d]*(\d+[.,]?\d*)\s*evlek")
            .expect("valid regex")
    });

    pub static EVLEK_THEN_DONUM: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(\d+[.,]?\d*)\s*evlek[^\d]*(\d+[.,]?\d*)\s*(?:dönüm|donum)")
            .expect("valid regex")
    });

    pub static DONUM: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(\d+[.,]?\d*)\s*(?:dönüm|donum)").expect("valid regex")
    });

    pub static EVLEK: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(\d+[.,]?\d*)\s*evlek").expect("valid regex"));

    pub static SQUARE_FEET: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(\d+[.,]?\d*)\s*(?:ayak\s*kare|ft2|ft²|sq\s*ft)").expect("valid regex")
    });
}

/// Find an area in free text and return it in square meters.
///
/// Units are tried in a fixed order and the first hit wins: m², then a
/// combined dönüm + evlek phrase (either order), dönüm, evlek, square feet.
/// A unit whose number reads as zero or garbage falls through to the next.
pub fn parse_area(text: &str) -> Option<f64> {
    let text = text.to_lowercase();

    if let Some(m2) = first_number(&patterns::SQUARE_METERS, &text, NumberPolicy::Area) {
        return Some(round2(m2));
    }

    // must run before the single-unit checks so neither unit is dropped
    if let Some(caps) = patterns::DONUM_THEN_EVLEK.captures(&text) {
        let donum = normalize_number(&caps[1], NumberPolicy::Decimal).unwrap_or(0.0);
        let evlek = normalize_number(&caps[2], NumberPolicy::Decimal).unwrap_or(0.0);
        return Some(round2(donum * DONUM_M2 + evlek * EVLEK_M2));
    }
    if let Some(caps) = patterns::EVLEK_THEN_DONUM.captures(&text) {
        let evlek = normalize_number(&caps[1], NumberPolicy::Decimal).unwrap_or(0.0);
        let donum = normalize_number(&caps[2], NumberPolicy::Decimal).unwrap_or(0.0);
        return Some(round2(donum * DONUM_M2 + evlek * EVLEK_M2));
    }

    if let Some(donum) = first_number(&patterns::DONUM, &text, NumberPolicy::Decimal) {
        return Some(round2(donum * DONUM_M2));
    }

    if let Some(evlek) = first_number(&patterns::EVLEK, &text, NumberPolicy::Decimal) {
        return Some(round2(evlek * EVLEK_M2));
    }

    if let Some(ft2) = first_number(&patterns::SQUARE_FEET, &text, NumberPolicy::Area) {
        return Some(round2(ft2 * FT2_TO_M2));
    }

    None
}

/// Read the "Metrekare" field of the listing table, e.g. `10.532 m2`.
pub fn parse_area_field(value: &str) -> Option<f64> {
    static FIELD: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"([0-9.,]+)\s*(?:m2|m²|metrekare)").expect("valid regex")
    });

    let value = value.to_lowercase();
    let caps = FIELD.captures(&value)?;
    normalize_number(&caps[1], NumberPolicy::AreaField).map(round2)
}

fn first_number(pattern: &Regex, text: &str, policy: NumberPolicy) -> Option<f64> {
    let caps = pattern.captures(text)?;
    normalize_number(&caps[1], policy).filter(|v| *v > 0.0)
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_units() {
        assert_eq!(parse_area("10 dönüm"), Some(13380.0));
        assert_eq!(parse_area("2 evlek"), Some(669.0));
        assert_eq!(parse_area("1000 m2"), Some(1000.0));
        assert_eq!(parse_area("85 m²"), Some(85.0));
        assert_eq!(parse_area("120 metrekare bahçe"), Some(120.0));
        assert_eq!(parse_area("3 donum arsa"), Some(4014.0));
    }

    #[test]
    fn test_square_feet() {
        let area = parse_area("1076 ft2").unwrap();
        assert!((area - 100.0).abs() < 0.1);
        let area = parse_area("2,150 sq ft villa").unwrap();
        assert!((area - 199.74).abs() < 0.01);
        assert!(parse_area("500 ayak kare").is_some());
    }

    #[test]
    fn test_combined_units_are_summed() {
        assert_eq!(parse_area("1 dönüm 2 evlek"), Some(2007.0));
        assert_eq!(parse_area("2 evlek ve 1 dönüm arazi"), Some(2007.0));
        assert_eq!(parse_area("Arsa 3 DÖNÜM, 1 EVLEK"), Some(4348.5));
    }

    #[test]
    fn test_m2_wins_over_other_units() {
        assert_eq!(parse_area("2 dönüm (2.676 m2)"), Some(2.68));
        assert_eq!(parse_area("2 dönüm yaklaşık 12.676 m2"), Some(12676.0));
    }

    #[test]
    fn test_decimal_donum() {
        assert_eq!(parse_area("1,5 dönüm"), Some(2007.0));
        assert_eq!(parse_area("0,5 evlek"), Some(167.25));
    }

    #[test]
    fn test_zero_falls_through() {
        assert_eq!(parse_area("0 m2 kapalı alan, 2 dönüm bahçe"), Some(2676.0));
    }

    #[test]
    fn test_no_unit() {
        assert_eq!(parse_area("lovely sea view apartment"), None);
        assert_eq!(parse_area(""), None);
        assert_eq!(parse_area("3+1 daire, 5. kat"), None);
    }

    #[test]
    fn test_area_field() {
        assert_eq!(parse_area_field("2.783 m²"), Some(2783.0));
        assert_eq!(parse_area_field("10.532 m2"), Some(10532.0));
        assert_eq!(parse_area_field("135 m2"), Some(135.0));
        assert_eq!(parse_area_field("95,5 M2"), Some(95.5));
        assert_eq!(parse_area_field("bilinmiyor"), None);
    }
}
