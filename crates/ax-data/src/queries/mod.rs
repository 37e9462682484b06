//! The two queries a drill runs against the facts file: top related
//! entities along a dimension, and the paged contract listing.

use serde_json::Value;

use ax_core::{Dimension, RelatedEntity, Row, SortOrder};
use crate::fetch::{FetchOptions, LoadedSource, Page, PagedFetcher};
use crate::query::{Aggregate, AggregateFn, ColumnKind, Filter, GroupQuery, Predicate, Projection, SelectItem};
use crate::sources::SourceLocator;
use crate::{DataError, Result};

/// Measure column of the facts file
pub const AMOUNT_COLUMN: &str = "contract_amount";
/// Date column of the facts file
pub const DATE_COLUMN: &str = "award_date";

/// Output columns of the contract listing, in order
pub const LISTING_COLUMNS: [(&str, ColumnKind); 9] = [
    ("award_date", ColumnKind::Date),
    ("contractor_name", ColumnKind::Text),
    ("organization_name", ColumnKind::Text),
    ("business_category", ColumnKind::Text),
    ("area_of_delivery", ColumnKind::Text),
    ("contract_amount", ColumnKind::Number),
    ("award_title", ColumnKind::Text),
    ("notice_title", ColumnKind::Text),
    ("contract_no", ColumnKind::Text),
];

/// Top `limit` values of `target` among facts where `source` equals
/// `source_value`, by total contract value.
///
/// A facts file without the target column yields no rows. Missing amount or
/// date columns read as zero and null.
pub async fn top_related(
    fetcher: &PagedFetcher,
    source: Dimension,
    source_value: &str,
    target: Dimension,
    limit: usize,
    facts: &SourceLocator,
) -> Result<Vec<RelatedEntity>> {
    let mut loaded = fetcher.load(facts).await?;
    let outcome = aggregate_related(&mut loaded, source, source_value, target, limit).await;
    let closed = loaded.close().await;

    let entities = outcome?;
    closed?;
    tracing::info!(
        "{} '{}': {} related {} entities",
        source.label(),
        source_value,
        entities.len(),
        target.key()
    );
    Ok(entities)
}

async fn aggregate_related(
    loaded: &mut LoadedSource,
    source: Dimension,
    source_value: &str,
    target: Dimension,
    limit: usize,
) -> Result<Vec<RelatedEntity>> {
    let columns = loaded.columns().await?;
    if !columns.contains(target.column()) {
        tracing::warn!("Facts have no '{}' column; {} tab is empty", target.column(), target.label());
        return Ok(Vec::new());
    }

    let query = GroupQuery::new(loaded.name(), target.column(), "entity")
        .aggregate(Aggregate::count("contract_count"))
        .aggregate(Aggregate::over(AggregateFn::Sum, AMOUNT_COLUMN, ColumnKind::Number, "total_value"))
        .aggregate(Aggregate::over(AggregateFn::Avg, AMOUNT_COLUMN, ColumnKind::Number, "average_value"))
        .aggregate(Aggregate::over(AggregateFn::Min, DATE_COLUMN, ColumnKind::Date, "first_date"))
        .aggregate(Aggregate::over(AggregateFn::Max, DATE_COLUMN, ColumnKind::Date, "last_date"))
        .filter(
            Filter::new()
                .and(Predicate::eq(source.column(), source_value))
                .and(Predicate::not_null(target.column())),
        )
        .order_by(SortOrder::desc("total_value"))
        .limit(limit)
        .guard(columns);

    let rows = loaded.query_rows(&query.to_sql()).await?;
    Ok(rows.iter().map(related_entity).collect())
}

fn related_entity(row: &Row) -> RelatedEntity {
    let number = |key: &str| row.get(key).and_then(Value::as_f64).unwrap_or(0.0);
    RelatedEntity {
        entity: row.get("entity").and_then(text).unwrap_or_default(),
        contract_count: row.get("contract_count").and_then(Value::as_u64).unwrap_or(0),
        total_value: number("total_value"),
        average_value: number("average_value"),
        first_date: row.get("first_date").and_then(text),
        last_date: row.get("last_date").and_then(text),
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// A contract listing request
#[derive(Debug, Clone, PartialEq)]
pub struct ContractQuery {
    /// Equality filters, ANDed root first
    pub filters: Vec<(Dimension, String)>,
    pub offset: usize,
    pub page_size: usize,
    pub order_by: SortOrder,
}

impl ContractQuery {
    pub fn new(filters: Vec<(Dimension, String)>, page_size: usize) -> Self {
        Self {
            filters,
            offset: 0,
            page_size,
            order_by: default_listing_order(),
        }
    }

    pub fn at_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn sorted_by(mut self, order_by: SortOrder) -> Self {
        self.order_by = order_by;
        self
    }
}

/// Newest awards first
pub fn default_listing_order() -> SortOrder {
    SortOrder::desc(DATE_COLUMN)
}

/// Whether the listing can be sorted by `column`
pub fn is_listing_column(column: &str) -> bool {
    LISTING_COLUMNS.iter().any(|(name, _)| *name == column)
}

/// One page of contract lines matching every filter.
///
/// The same dimension filtered twice with different values matches nothing.
/// Listing columns missing from the file come back as placeholders.
pub async fn list_contracts(
    fetcher: &PagedFetcher,
    query: &ContractQuery,
    facts: &SourceLocator,
) -> Result<Page> {
    if query.page_size == 0 {
        return Err(DataError::InvalidPaging);
    }

    let order_by = if is_listing_column(&query.order_by.column) {
        query.order_by.clone()
    } else {
        tracing::warn!("Cannot sort contracts by '{}'; using {}", query.order_by.column, default_listing_order());
        default_listing_order()
    };

    let projection = Projection::Items(
        LISTING_COLUMNS
            .iter()
            .map(|(column, kind)| SelectItem::guarded(*column, *kind))
            .collect(),
    );
    let options = FetchOptions {
        filter: Filter::from_dimensions(&query.filters),
        order_by: Some(order_by),
        projection,
    };

    fetcher.fetch(facts, query.offset, query.page_size, options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use serde_json::json;
    use crate::engine::SqliteEngine;
    use crate::sources::MemoryFetcher;

    const HEADER: &str = "award_date,contractor_name,organization_name,business_category,area_of_delivery,\
        contract_amount,award_title,notice_title,contract_no\n";

    /// ACME CORP holds 24 contracts over twelve areas, one to three apiece
    fn facts_csv() -> String {
        let mut csv = HEADER.to_string();
        let mut no = 0;
        for area in 0..12 {
            for n in 0..(area % 3 + 1) {
                no += 1;
                csv.push_str(&format!(
                    "2023-{:02}-{:02},ACME CORP,City Works,Construction,Area {:02},{},Job {},Notice {},C-{}\n",
                    area % 12 + 1,
                    n + 1,
                    area,
                    1000 * (area + 1) + n,
                    no,
                    no,
                    no
                ));
            }
        }
        csv.push_str("2023-05-01,Globex,City Works,Consulting,Area 00,99999,Audit,Audit notice,G-1\n");
        csv.push_str("2023-06-01,O'Brien & Sons,Port Authority,Construction,Metro,500,Dock,Dock notice,O-1\n");
        csv.push_str("2023-07-01,O'Brien & Sons,Port Authority,Construction,Harbor,700,Pier,Pier notice,O-2\n");
        csv
    }

    fn setup(body: String) -> (PagedFetcher, SourceLocator) {
        let facts = SourceLocator::parse("https://stats.example.org/all_time/facts.arrow");
        let files = MemoryFetcher::new();
        files.insert(facts.clone(), body);
        let fetcher = PagedFetcher::new(Arc::new(SqliteEngine::open().unwrap()), Arc::new(files));
        (fetcher, facts)
    }

    #[tokio::test]
    async fn test_top_related_areas_for_contractor() {
        let (fetcher, facts) = setup(facts_csv());
        let related = top_related(&fetcher, Dimension::Contractor, "ACME CORP", Dimension::Area, 10, &facts)
            .await
            .unwrap();

        assert_eq!(related.len(), 10);
        assert!(related.windows(2).all(|w| w[0].total_value >= w[1].total_value));
        let counted: u64 = related.iter().map(|r| r.contract_count).sum();
        assert!(counted <= 24);
        assert!(related.iter().all(|r| r.first_date.is_some() && r.last_date.is_some()));
        assert!(related.iter().all(|r| r.entity != "Metro"));
    }

    #[tokio::test]
    async fn test_top_related_without_target_column_is_empty() {
        let csv = "contractor_name,contract_amount\nACME CORP,10\n".to_string();
        let (fetcher, facts) = setup(csv);
        let related = top_related(&fetcher, Dimension::Contractor, "ACME CORP", Dimension::Area, 10, &facts)
            .await
            .unwrap();
        assert!(related.is_empty());
    }

    #[tokio::test]
    async fn test_listing_with_two_filters() {
        let (fetcher, facts) = setup(facts_csv());
        let query = ContractQuery::new(
            vec![
                (Dimension::Contractor, "O'Brien & Sons".to_string()),
                (Dimension::Area, "Harbor".to_string()),
            ],
            20,
        );
        let page = list_contracts(&fetcher, &query, &facts).await.unwrap();

        assert_eq!(page.total_count, 1);
        assert_eq!(page.rows[0]["contract_no"], json!("O-2"));
        let keys: Vec<&str> = page.rows[0].keys().map(String::as_str).collect();
        let expected: Vec<&str> = LISTING_COLUMNS.iter().map(|(c, _)| *c).collect();
        assert_eq!(keys, expected);
    }

    #[tokio::test]
    async fn test_same_dimension_twice_matches_nothing() {
        let (fetcher, facts) = setup(facts_csv());
        let query = ContractQuery::new(
            vec![
                (Dimension::Contractor, "ACME CORP".to_string()),
                (Dimension::Contractor, "Globex".to_string()),
            ],
            20,
        );
        let page = list_contracts(&fetcher, &query, &facts).await.unwrap();
        assert!(page.rows.is_empty());
        assert_eq!(page.total_count, 0);
    }

    #[tokio::test]
    async fn test_listing_tolerates_missing_columns() {
        let csv = "contractor_name,contract_amount,contract_no\nACME CORP,10,A-1\nACME CORP,30,A-2\n".to_string();
        let (fetcher, facts) = setup(csv);
        let query = ContractQuery::new(vec![(Dimension::Contractor, "ACME CORP".to_string())], 20);

        let page = list_contracts(&fetcher, &query, &facts).await.unwrap();
        assert_eq!(page.total_count, 2);
        assert_eq!(page.rows[0]["notice_title"], json!(""));
        assert_eq!(page.rows[0]["award_date"], Value::Null);
        assert_eq!(page.rows[0]["area_of_delivery"], json!(""));
    }

    #[tokio::test]
    async fn test_listing_paging_and_unknown_sort_column() {
        let (fetcher, facts) = setup(facts_csv());
        let query = ContractQuery::new(vec![(Dimension::Contractor, "ACME CORP".to_string())], 20)
            .at_offset(20)
            .sorted_by(SortOrder::desc("total_value"));

        let page = list_contracts(&fetcher, &query, &facts).await.unwrap();
        assert_eq!(page.total_count, 24);
        assert_eq!(page.rows.len(), 4);
        assert!(page
            .rows
            .windows(2)
            .all(|w| w[0]["award_date"].as_str() >= w[1]["award_date"].as_str()));
    }
}
