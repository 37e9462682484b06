//! Tab and table state shared between the data layer and the views

mod generation;
mod paging;

pub use generation::Generation;
pub use paging::Pager;

use std::fmt;
use indexmap::IndexMap;
use serde::{Serialize, Deserialize};

/// A result row: column name to value, in select-list order
pub type Row = IndexMap<String, serde_json::Value>;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn keyword(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl std::str::FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Asc),
            "desc" | "descending" => Ok(SortDirection::Desc),
            other => Err(format!("unknown sort direction '{}'", other)),
        }
    }
}

/// Column plus direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOrder {
    pub column: String,
    pub direction: SortDirection,
}

impl SortOrder {
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self::new(column, SortDirection::Desc)
    }

    pub fn asc(column: impl Into<String>) -> Self {
        Self::new(column, SortDirection::Asc)
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.column, self.direction.keyword())
    }
}

/// Identifies one tab of an open drill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TabKind {
    /// Top related entities along a dimension
    Related(crate::dimension::Dimension),
    /// Line-level contracts
    Contracts,
}

impl fmt::Display for TabKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TabKind::Related(dimension) => f.write_str(dimension.label()),
            TabKind::Contracts => f.write_str("Contracts"),
        }
    }
}

/// One related entity of a drill context, as shown in a dimension tab
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedEntity {
    pub entity: String,
    pub contract_count: u64,
    pub total_value: f64,
    pub average_value: f64,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
}

/// Load state of a single tab.
///
/// `loading` is expected to imply empty `rows` and no `error`, but this is not
/// enforced.
#[derive(Debug, Clone, Serialize)]
pub struct TabState<T> {
    pub rows: Vec<T>,
    pub loading: bool,
    pub error: Option<String>,
}

impl<T> TabState<T> {
    pub fn loading() -> Self {
        Self {
            rows: Vec::new(),
            loading: true,
            error: None,
        }
    }

    pub fn loaded(rows: Vec<T>) -> Self {
        Self {
            rows,
            loading: false,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            rows: Vec::new(),
            loading: false,
            error: Some(error.into()),
        }
    }

    /// Neither loading nor failed
    pub fn is_ready(&self) -> bool {
        !self.loading && self.error.is_none()
    }
}

impl<T> Default for TabState<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            loading: false,
            error: None,
        }
    }
}

/// State of the contracts tab, which pages through line-level records
#[derive(Debug, Clone, Serialize)]
pub struct ContractsTabState {
    pub rows: Vec<Row>,
    pub loading: bool,
    pub error: Option<String>,
    pub total_count: u64,
    pub pager: Pager,
    pub order_by: SortOrder,
}

impl ContractsTabState {
    pub fn new(page_size: usize, order_by: SortOrder) -> Self {
        Self {
            rows: Vec::new(),
            loading: false,
            error: None,
            total_count: 0,
            pager: Pager::new(page_size),
            order_by,
        }
    }

    /// Item offset of the current page
    pub fn page_offset(&self) -> usize {
        self.pager.offset()
    }

    /// Mark a new request in flight, keeping the paging window and sort
    pub fn begin(&mut self, pager: Pager, order_by: SortOrder) {
        self.rows.clear();
        self.loading = true;
        self.error = None;
        self.pager = pager;
        self.order_by = order_by;
    }

    pub fn finish(&mut self, rows: Vec<Row>, total_count: u64) {
        self.rows = rows;
        self.total_count = total_count;
        self.loading = false;
        self.error = None;
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.rows.clear();
        self.total_count = 0;
        self.loading = false;
        self.error = Some(error.into());
    }
}
