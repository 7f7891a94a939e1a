//! Number, area and price normalization for listing fields.

pub mod area;
pub mod currency;
pub mod number;

pub use area::{parse_area, parse_area_field, DONUM_M2, EVLEK_M2, FT2_TO_M2};
pub use currency::{iso_code, to_reference_currency, DerivedMetrics};
pub use number::{normalize_number, NumberPolicy};
