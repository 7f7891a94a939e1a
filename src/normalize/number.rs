/// How to read `.` and `,` in a numeric token.
///
/// The source pages mix conventions, so the caller picks the policy that
/// matches the field being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberPolicy {
    /// Small quantities (dönüm, evlek, feed rates): `,` is always a decimal
    /// separator unless both separators appear.
    Decimal,
    /// Areas in free text (m², ft²). A lone `.` counts as thousands only when
    /// the token has at least five digits.
    Area,
    /// The structured "Metrekare" field. Like `Area`, without the five-digit
    /// requirement.
    AreaField,
}

/// Minimum digit count for a lone `.` to be read as thousands in free text
const AREA_THOUSANDS_MIN_DIGITS: usize = 5;

/// Convert a raw token to a float under `policy`. `None` when the token is
/// empty or still not a number after normalization.
pub fn normalize_number(raw: &str, policy: NumberPolicy) -> Option<f64> {
    let token = raw.trim();
    if token.is_empty() {
        return None;
    }

    let normalized = match policy {
        NumberPolicy::Decimal => decimal(token),
        NumberPolicy::Area => area(token, AREA_THOUSANDS_MIN_DIGITS),
        NumberPolicy::AreaField => area(token, 0),
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn decimal(token: &str) -> String {
    if token.contains('.') && token.contains(',') {
        token.replace('.', "").replace(',', ".")
    } else {
        token.replace(',', ".")
    }
}

fn area(token: &str, min_digits: usize) -> String {
    match (token.contains('.'), token.contains(',')) {
        (true, true) => token.replace('.', "").replace(',', "."),
        (false, true) => {
            let stripped = token.replace(',', "");
            if trailing_group_len(token, ',') == 3 && is_all_digits(&stripped) {
                stripped
            } else {
                token.replace(',', ".")
            }
        }
        (true, false) => {
            let stripped = token.replace('.', "");
            if trailing_group_len(token, '.') == 3
                && is_all_digits(&stripped)
                && stripped.chars().count() >= min_digits
            {
                stripped
            } else {
                token.to_string()
            }
        }
        (false, false) => token.to_string(),
    }
}

fn trailing_group_len(token: &str, separator: char) -> usize {
    token
        .rsplit(separator)
        .next()
        .map(|group| group.chars().count())
        .unwrap_or(0)
}

fn is_all_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_policy() {
        assert_eq!(normalize_number("2,5", NumberPolicy::Decimal), Some(2.5));
        assert_eq!(normalize_number("2.5", NumberPolicy::Decimal), Some(2.5));
        // comma is never thousands on its own
        assert_eq!(normalize_number("1,250", NumberPolicy::Decimal), Some(1.25));
        assert_eq!(normalize_number("1.250,75", NumberPolicy::Decimal), Some(1250.75));
        assert_eq!(normalize_number("12", NumberPolicy::Decimal), Some(12.0));
    }

    #[test]
    fn test_area_policy_comma() {
        assert_eq!(normalize_number("2,783", NumberPolicy::Area), Some(2783.0));
        assert_eq!(normalize_number("2,5", NumberPolicy::Area), Some(2.5));
        assert_eq!(normalize_number("12,50", NumberPolicy::Area), Some(12.5));
        assert_eq!(normalize_number("10.532,5", NumberPolicy::Area), Some(10532.5));
    }

    #[test]
    fn test_area_policy_dot_needs_five_digits() {
        assert_eq!(normalize_number("10.532", NumberPolicy::Area), Some(10532.0));
        assert_eq!(normalize_number("2.783", NumberPolicy::Area), Some(2.783));
        assert_eq!(normalize_number("120.5", NumberPolicy::Area), Some(120.5));
    }

    #[test]
    fn test_area_field_policy_dot_is_thousands() {
        assert_eq!(normalize_number("2.783", NumberPolicy::AreaField), Some(2783.0));
        assert_eq!(normalize_number("10.532", NumberPolicy::AreaField), Some(10532.0));
        assert_eq!(normalize_number("95.5", NumberPolicy::AreaField), Some(95.5));
        assert_eq!(normalize_number("1.338,5", NumberPolicy::AreaField), Some(1338.5));
    }

    #[test]
    fn test_garbage_returns_none() {
        assert_eq!(normalize_number("", NumberPolicy::Area), None);
        assert_eq!(normalize_number("   ", NumberPolicy::Decimal), None);
        assert_eq!(normalize_number("abc", NumberPolicy::Decimal), None);
        assert_eq!(normalize_number("1,2,3", NumberPolicy::Decimal), None);
        assert_eq!(normalize_number("inf", NumberPolicy::Area), None);
    }
}
