//! Where source files live and how they are named

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::str::FromStr;
use serde::{Serialize, Deserialize};

use ax_core::Dimension;
use crate::DataError;

/// Location of a source file
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceLocator {
    /// Fetched over HTTP(S)
    Url(String),
    /// Read from the local filesystem
    Path(PathBuf),
}

impl SourceLocator {
    /// Interpret a string as a URL when it has an http(s) scheme, else as a path
    pub fn parse(value: &str) -> Self {
        let lower = value.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            SourceLocator::Url(value.trim_end_matches('/').to_string())
        } else {
            SourceLocator::Path(PathBuf::from(value))
        }
    }

    /// Append a relative path segment
    pub fn join(&self, segment: &str) -> Self {
        match self {
            SourceLocator::Url(url) => SourceLocator::Url(format!("{}/{}", url.trim_end_matches('/'), segment)),
            SourceLocator::Path(path) => SourceLocator::Path(path.join(segment)),
        }
    }

    /// Last path component
    pub fn file_name(&self) -> &str {
        match self {
            SourceLocator::Url(url) => url.rsplit('/').next().unwrap_or(url),
            SourceLocator::Path(path) => path.file_name().and_then(|n| n.to_str()).unwrap_or("source"),
        }
    }

    /// Name the file is registered under in the engine.
    ///
    /// Stable for a locator and distinct across locators, so two sources never
    /// share a registration slot.
    pub fn logical_name(&self) -> String {
        let stem: String = self
            .file_name()
            .split('.')
            .next()
            .unwrap_or("source")
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();

        let mut hasher = DefaultHasher::new();
        self.to_string().hash(&mut hasher);
        format!("{}_{:08x}", stem, hasher.finish() as u32)
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocator::Url(url) => f.write_str(url),
            SourceLocator::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Time slice the statistics are aggregated over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Granularity {
    #[default]
    AllTime,
    Year { year: i32 },
    Quarter { year: i32, quarter: u8 },
}

impl Granularity {
    /// Directory segment under the base path
    pub fn segment(&self) -> String {
        match self {
            Granularity::AllTime => "all_time".to_string(),
            Granularity::Year { year } => format!("yearly/year_{}", year),
            Granularity::Quarter { year, quarter } => format!("quarterly/year_{}_q{}", year, quarter),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::AllTime => f.write_str("all time"),
            Granularity::Year { year } => write!(f, "{}", year),
            Granularity::Quarter { year, quarter } => write!(f, "{} Q{}", year, quarter),
        }
    }
}

impl FromStr for Granularity {
    type Err = DataError;

    /// Accepts `all_time`, `2023`, `2023-q2` or `2023q2`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if s == "all_time" || s == "all" {
            return Ok(Granularity::AllTime);
        }

        let invalid = || DataError::Config(format!("invalid granularity '{}'", s));
        match s.split_once('q') {
            Some((year, quarter)) => {
                let year = year.trim_end_matches(['-', '_']).parse().map_err(|_| invalid())?;
                let quarter: u8 = quarter.parse().map_err(|_| invalid())?;
                if !(1..=4).contains(&quarter) {
                    return Err(invalid());
                }
                Ok(Granularity::Quarter { year, quarter })
            }
            None => Ok(Granularity::Year { year: s.parse().map_err(|_| invalid())? }),
        }
    }
}

/// File layout of a statistics dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLayout {
    pub base: SourceLocator,
    pub granularity: Granularity,
}

impl SourceLayout {
    pub fn new(base: SourceLocator, granularity: Granularity) -> Self {
        Self { base, granularity }
    }

    fn dir(&self) -> SourceLocator {
        self.base.join(&self.granularity.segment())
    }

    /// Pre-grouped summary file for a dimension
    pub fn aggregate(&self, dimension: Dimension) -> SourceLocator {
        self.dir().join(&format!("agg_by_{}.arrow", dimension.key()))
    }

    /// Line-level facts file
    pub fn facts(&self) -> SourceLocator {
        self.dir().join("facts.arrow")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = SourceLayout::new(
            SourceLocator::parse("https://data.example.org/awards/"),
            Granularity::Quarter { year: 2023, quarter: 2 },
        );
        assert_eq!(
            layout.facts().to_string(),
            "https://data.example.org/awards/quarterly/year_2023_q2/facts.arrow"
        );
        assert_eq!(
            layout.aggregate(Dimension::Area).file_name(),
            "agg_by_area.arrow"
        );

        let yearly = SourceLayout::new(SourceLocator::parse("/srv/stats"), Granularity::Year { year: 2021 });
        assert_eq!(
            yearly.facts(),
            SourceLocator::Path(PathBuf::from("/srv/stats/yearly/year_2021/facts.arrow"))
        );
    }

    #[test]
    fn test_logical_names_are_distinct_per_locator() {
        let a = SourceLocator::parse("/srv/stats/all_time/facts.arrow");
        let b = SourceLocator::parse("/srv/stats/yearly/year_2021/facts.arrow");
        assert_eq!(a.logical_name(), a.clone().logical_name());
        assert_ne!(a.logical_name(), b.logical_name());
        assert!(a.logical_name().starts_with("facts_"));
    }

    #[test]
    fn test_parse_granularity() {
        assert_eq!("all_time".parse::<Granularity>().unwrap(), Granularity::AllTime);
        assert_eq!("2022".parse::<Granularity>().unwrap(), Granularity::Year { year: 2022 });
        assert_eq!(
            "2022-Q3".parse::<Granularity>().unwrap(),
            Granularity::Quarter { year: 2022, quarter: 3 }
        );
        assert!("2022q5".parse::<Granularity>().is_err());
        assert!("someday".parse::<Granularity>().is_err());
    }
}
