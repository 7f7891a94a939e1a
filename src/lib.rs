//! Listing extraction for saved 101evler.com pages: parse each page into a
//! record, normalize areas and prices, and keep the results in a CSV dataset.

pub mod config;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod rates;
pub mod scrapers;
pub mod search;
pub mod store;
