//! Unit conversion and pack weight aggregation.
//!
//! Weights are stored in whatever unit the user entered them in and are only
//! converted to grams while aggregating.

mod aggregate;
mod units;

pub use aggregate::{compute_category_summaries, compute_pack_weights, CategorySummary, PackWeights};
pub use units::{convert_from_grams, convert_to_grams, round2, WeightUnit};
