//! Entity dimensions and their column mapping

use std::fmt;
use std::str::FromStr;
use serde::{Serialize, Deserialize};

/// An entity axis by which contracts can be grouped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Contractor,
    Area,
    Organization,
    Category,
}

impl Dimension {
    /// All dimensions in display order
    pub const ALL: [Dimension; 4] = [
        Dimension::Contractor,
        Dimension::Area,
        Dimension::Organization,
        Dimension::Category,
    ];

    /// Column holding this dimension's value in facts and aggregate files.
    ///
    /// This is the only place the mapping lives; everything that needs a
    /// column for a dimension goes through here.
    pub fn column(self) -> &'static str {
        match self {
            Dimension::Contractor => "contractor_name",
            Dimension::Area => "area_of_delivery",
            Dimension::Organization => "organization_name",
            Dimension::Category => "business_category",
        }
    }

    /// Short identifier used in file names and commands
    pub fn key(self) -> &'static str {
        match self {
            Dimension::Contractor => "contractor",
            Dimension::Area => "area",
            Dimension::Organization => "organization",
            Dimension::Category => "category",
        }
    }

    /// Human readable label
    pub fn label(self) -> &'static str {
        match self {
            Dimension::Contractor => "Contractor",
            Dimension::Area => "Area of delivery",
            Dimension::Organization => "Organization",
            Dimension::Category => "Business category",
        }
    }

    /// Every dimension except this one, in display order
    pub fn complement(self) -> Vec<Dimension> {
        Self::ALL.iter().copied().filter(|d| *d != self).collect()
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Error returned when parsing an unknown dimension name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown dimension '{0}' (expected contractor, area, organization or category)")]
pub struct UnknownDimension(pub String);

impl FromStr for Dimension {
    type Err = UnknownDimension;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "contractor" | "contractor_name" => Ok(Dimension::Contractor),
            "area" | "area_of_delivery" => Ok(Dimension::Area),
            "organization" | "organisation" | "organization_name" => Ok(Dimension::Organization),
            "category" | "business_category" => Ok(Dimension::Category),
            _ => Err(UnknownDimension(s.to_string())),
        }
    }
}
