pub mod evler;
pub mod traits;

pub use evler::EvlerParser;
pub use traits::ListingParser;
