use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

const GRAMS_PER_OZ: f64 = 28.3495;
const GRAMS_PER_KG: f64 = 1000.0;
const GRAMS_PER_LB: f64 = 453.592;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "weight_unit", rename_all = "lowercase")]
pub enum WeightUnit {
    #[default]
    G,
    Oz,
    Kg,
    Lb,
}

impl WeightUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::G => "g",
            Self::Oz => "oz",
            Self::Kg => "kg",
            Self::Lb => "lb",
        }
    }

    fn grams_per_unit(self) -> f64 {
        match self {
            Self::G => 1.0,
            Self::Oz => GRAMS_PER_OZ,
            Self::Kg => GRAMS_PER_KG,
            Self::Lb => GRAMS_PER_LB,
        }
    }

    pub fn to_grams(self, weight: f64) -> f64 {
        weight * self.grams_per_unit()
    }

    pub fn from_grams(self, grams: f64) -> f64 {
        grams / self.grams_per_unit()
    }
}

impl fmt::Display for WeightUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown weight unit: {0}")]
pub struct UnknownUnit(String);

impl FromStr for WeightUnit {
    type Err = UnknownUnit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "g" => Ok(Self::G),
            "oz" => Ok(Self::Oz),
            "kg" => Ok(Self::Kg),
            "lb" | "lbs" => Ok(Self::Lb),
            other => Err(UnknownUnit(other.to_string())),
        }
    }
}

/// Converts `weight` expressed in `unit` to grams. Unknown units pass through.
pub fn convert_to_grams(weight: f64, unit: &str) -> f64 {
    match unit.parse::<WeightUnit>() {
        Ok(u) => u.to_grams(weight),
        Err(_) => weight,
    }
}

/// Converts grams to `unit`. Unknown units pass through.
pub fn convert_from_grams(grams: f64, unit: &str) -> f64 {
    match unit.parse::<WeightUnit>() {
        Ok(u) => u.from_grams(grams),
        Err(_) => grams,
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
