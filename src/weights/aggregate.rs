use std::collections::BTreeMap;

use serde::Serialize;

use super::units::{round2, WeightUnit};
use crate::items::PackItem;

const UNCATEGORIZED: &str = "Other";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackWeights {
    pub base_weight: f64,
    pub total_weight: f64,
    pub unit: WeightUnit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub name: String,
    pub items: usize,
    pub weight: f64,
    pub percentage: f64,
}

fn line_grams(item: &PackItem) -> f64 {
    item.weight_unit.to_grams(item.weight) * f64::from(item.quantity.max(0))
}

fn live(items: &[PackItem]) -> impl Iterator<Item = &PackItem> {
    items.iter().filter(|i| !i.deleted)
}

/// Base weight excludes consumable and worn items; total includes everything.
pub fn compute_pack_weights(items: &[PackItem], unit: WeightUnit) -> PackWeights {
    let mut total = 0.0;
    let mut base = 0.0;
    for item in live(items) {
        let grams = line_grams(item);
        total += grams;
        if !item.consumable && !item.worn {
            base += grams;
        }
    }
    PackWeights {
        base_weight: round2(unit.from_grams(base)),
        total_weight: round2(unit.from_grams(total)),
        unit,
    }
}

/// Groups items by category, ordered by name.
pub fn compute_category_summaries(items: &[PackItem], unit: WeightUnit) -> Vec<CategorySummary> {
    let mut groups: BTreeMap<String, (usize, f64)> = BTreeMap::new();
    let mut total = 0.0;
    for item in live(items) {
        let name = item
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(UNCATEGORIZED);
        let grams = line_grams(item);
        total += grams;
        let entry = groups.entry(name.to_string()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += grams;
    }

    groups
        .into_iter()
        .map(|(name, (count, grams))| CategorySummary {
            name,
            items: count,
            weight: round2(unit.from_grams(grams)),
            percentage: if total > 0.0 {
                round2(grams / total * 100.0)
            } else {
                0.0
            },
        })
        .collect()
}
