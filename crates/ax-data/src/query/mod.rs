//! Query compiler.
//!
//! Filters, sorts, paging and projections are described with a small typed
//! AST and rendered to query text here, and only here. Every text literal goes
//! through [`quote_literal`] and every identifier through [`quote_ident`].
//!
//! Column references can be guarded against the columns actually present in
//! the registered source (see [`ColumnSet`]): an absent column is replaced by a
//! literal default of the expected kind instead of failing the query.

use std::fmt;
use ahash::AHashSet;

use ax_core::{Dimension, SortOrder};

/// Quote a string literal, doubling embedded single quotes
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quote an identifier, doubling embedded double quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// A literal value in query text
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Text(String),
    Integer(i64),
    Real(f64),
    Null,
}

impl Literal {
    pub fn to_sql(&self) -> String {
        match self {
            Literal::Text(text) => quote_literal(text),
            Literal::Integer(i) => i.to_string(),
            Literal::Real(f) if f.is_finite() => f.to_string(),
            Literal::Real(_) | Literal::Null => "NULL".to_string(),
        }
    }

    /// Placeholder standing in for an absent column compared with this value
    fn placeholder(&self) -> Literal {
        match self {
            Literal::Text(_) => ColumnKind::Text.default_literal(),
            Literal::Integer(_) | Literal::Real(_) => ColumnKind::Number.default_literal(),
            Literal::Null => Literal::Null,
        }
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Text(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::Text(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Integer(value)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Real(value)
    }
}

/// Semantic type of an expected column, used to pick its placeholder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Number,
    Date,
}

impl ColumnKind {
    pub fn default_literal(self) -> Literal {
        match self {
            ColumnKind::Text => Literal::Text(String::new()),
            ColumnKind::Number => Literal::Integer(0),
            ColumnKind::Date => Literal::Null,
        }
    }
}

/// Columns present in a registered source, as probed from the engine
#[derive(Debug, Clone, Default)]
pub struct ColumnSet {
    names: AHashSet<String>,
}

impl ColumnSet {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names.into_iter().map(|n| n.as_ref().to_ascii_lowercase()).collect(),
        }
    }

    /// Case-insensitive membership test
    pub fn contains(&self, column: &str) -> bool {
        self.names.contains(&column.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Render a column reference, or `fallback` when the column is known to be absent
fn operand(column: &str, fallback: Literal, columns: Option<&ColumnSet>) -> String {
    match columns {
        Some(set) if !set.contains(column) => fallback.to_sql(),
        _ => quote_ident(column),
    }
}

/// One boolean condition of a filter
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column = value`
    Eq { column: String, value: Literal },
    /// Case-insensitive substring match
    Contains { column: String, needle: String },
    /// `column >= value`
    AtLeast { column: String, value: f64 },
    /// `column IS NOT NULL`
    NotNull { column: String },
}

impl Predicate {
    pub fn eq(column: impl Into<String>, value: impl Into<Literal>) -> Self {
        Predicate::Eq { column: column.into(), value: value.into() }
    }

    pub fn contains(column: impl Into<String>, needle: impl Into<String>) -> Self {
        Predicate::Contains { column: column.into(), needle: needle.into() }
    }

    pub fn at_least(column: impl Into<String>, value: f64) -> Self {
        Predicate::AtLeast { column: column.into(), value }
    }

    pub fn not_null(column: impl Into<String>) -> Self {
        Predicate::NotNull { column: column.into() }
    }

    pub fn column(&self) -> &str {
        match self {
            Predicate::Eq { column, .. }
            | Predicate::Contains { column, .. }
            | Predicate::AtLeast { column, .. }
            | Predicate::NotNull { column } => column,
        }
    }

    fn to_sql(&self, columns: Option<&ColumnSet>) -> String {
        match self {
            Predicate::Eq { column, value } => {
                format!("{} = {}", operand(column, value.placeholder(), columns), value.to_sql())
            }
            Predicate::Contains { column, needle } => {
                let pattern = needle
                    .replace('\\', "\\\\")
                    .replace('%', "\\%")
                    .replace('_', "\\_");
                format!(
                    "{} LIKE {} ESCAPE '\\'",
                    operand(column, ColumnKind::Text.default_literal(), columns),
                    quote_literal(&format!("%{}%", pattern)),
                )
            }
            Predicate::AtLeast { column, value } => {
                format!(
                    "{} >= {}",
                    operand(column, ColumnKind::Number.default_literal(), columns),
                    Literal::Real(*value).to_sql(),
                )
            }
            Predicate::NotNull { column } => {
                format!("{} IS NOT NULL", operand(column, Literal::Null, columns))
            }
        }
    }
}

/// Conjunction of predicates, rendered in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Equality on each dimension's column, in the given order
    pub fn from_dimensions(filters: &[(Dimension, String)]) -> Self {
        Self {
            predicates: filters
                .iter()
                .map(|(dimension, value)| Predicate::eq(dimension.column(), value.as_str()))
                .collect(),
        }
    }

    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn push(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Body of the WHERE clause, or `None` for an empty filter
    pub fn to_sql(&self, columns: Option<&ColumnSet>) -> Option<String> {
        if self.predicates.is_empty() {
            return None;
        }
        let parts: Vec<String> = self.predicates.iter().map(|p| p.to_sql(columns)).collect();
        Some(parts.join(" AND "))
    }
}

/// One entry of a select list
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// A column that must exist
    Column(String),
    /// A column replaced by a placeholder of `kind` when absent
    Guarded { column: String, kind: ColumnKind },
    /// Arbitrary expression under an alias
    Expr { sql: String, alias: String },
}

impl SelectItem {
    pub fn guarded(column: impl Into<String>, kind: ColumnKind) -> Self {
        SelectItem::Guarded { column: column.into(), kind }
    }

    /// Output column name
    pub fn name(&self) -> &str {
        match self {
            SelectItem::Column(column) | SelectItem::Guarded { column, .. } => column,
            SelectItem::Expr { alias, .. } => alias,
        }
    }

    fn to_sql(&self, columns: Option<&ColumnSet>) -> String {
        match self {
            SelectItem::Column(column) => quote_ident(column),
            SelectItem::Guarded { column, kind } => match columns {
                Some(set) if !set.contains(column) => {
                    format!("{} AS {}", kind.default_literal().to_sql(), quote_ident(column))
                }
                _ => quote_ident(column),
            },
            SelectItem::Expr { sql, alias } => format!("{} AS {}", sql, quote_ident(alias)),
        }
    }
}

/// Columns to return
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Projection {
    #[default]
    All,
    Items(Vec<SelectItem>),
}

impl Projection {
    pub fn columns<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Projection::Items(names.into_iter().map(|n| SelectItem::Column(n.into())).collect())
    }

    fn to_sql(&self, columns: Option<&ColumnSet>) -> String {
        match self {
            Projection::All => "*".to_string(),
            Projection::Items(items) if items.is_empty() => "*".to_string(),
            Projection::Items(items) => items
                .iter()
                .map(|item| item.to_sql(columns))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

fn order_sql(order: &SortOrder) -> String {
    format!("{} {}", quote_ident(&order.column), order.direction.keyword())
}

/// A filtered, ordered, paged select over one registered source
#[derive(Debug, Clone, Default)]
pub struct QuerySpec {
    pub source: String,
    pub filter: Filter,
    pub order_by: Option<SortOrder>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub projection: Projection,
    /// Probed columns; when set, guarded references are checked against it
    pub columns: Option<ColumnSet>,
}

impl QuerySpec {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn order_by(mut self, order: SortOrder) -> Self {
        self.order_by = Some(order);
        self
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }

    pub fn project(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn guard(mut self, columns: ColumnSet) -> Self {
        self.columns = Some(columns);
        self
    }

    fn where_sql(&self) -> String {
        self.filter
            .to_sql(self.columns.as_ref())
            .map(|clause| format!(" WHERE {}", clause))
            .unwrap_or_default()
    }

    /// The page query
    pub fn to_sql(&self) -> String {
        let mut sql = format!(
            "SELECT {} FROM {}{}",
            self.projection.to_sql(self.columns.as_ref()),
            quote_ident(&self.source),
            self.where_sql(),
        );
        if let Some(order) = &self.order_by {
            sql.push_str(&format!(" ORDER BY {}", order_sql(order)));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, self.offset));
        }
        sql
    }

    /// Row count under the same filter, ignoring order and paging
    pub fn count_sql(&self) -> String {
        format!(
            "SELECT COUNT(*) AS total_count FROM {}{}",
            quote_ident(&self.source),
            self.where_sql(),
        )
    }
}

impl fmt::Display for QuerySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// Aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    fn name(self) -> &'static str {
        match self {
            AggregateFn::Count => "COUNT",
            AggregateFn::Sum => "SUM",
            AggregateFn::Avg => "AVG",
            AggregateFn::Min => "MIN",
            AggregateFn::Max => "MAX",
        }
    }
}

/// One aggregate output column
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub func: AggregateFn,
    /// `None` aggregates over rows (`COUNT(*)`)
    pub column: Option<(String, ColumnKind)>,
    pub alias: String,
}

impl Aggregate {
    pub fn count(alias: impl Into<String>) -> Self {
        Self { func: AggregateFn::Count, column: None, alias: alias.into() }
    }

    pub fn over(func: AggregateFn, column: impl Into<String>, kind: ColumnKind, alias: impl Into<String>) -> Self {
        Self { func, column: Some((column.into(), kind)), alias: alias.into() }
    }

    fn to_sql(&self, columns: Option<&ColumnSet>) -> String {
        let arg = match &self.column {
            None => "*".to_string(),
            Some((column, kind)) => operand(column, kind.default_literal(), columns),
        };
        format!("{}({}) AS {}", self.func.name(), arg, quote_ident(&self.alias))
    }
}

/// A grouped aggregation over one registered source
#[derive(Debug, Clone)]
pub struct GroupQuery {
    pub source: String,
    pub group_by: String,
    pub group_alias: String,
    pub aggregates: Vec<Aggregate>,
    pub filter: Filter,
    pub order_by: Option<SortOrder>,
    pub limit: Option<usize>,
    pub columns: Option<ColumnSet>,
}

impl GroupQuery {
    pub fn new(source: impl Into<String>, group_by: impl Into<String>, group_alias: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            group_by: group_by.into(),
            group_alias: group_alias.into(),
            aggregates: Vec::new(),
            filter: Filter::new(),
            order_by: None,
            limit: None,
            columns: None,
        }
    }

    pub fn aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregates.push(aggregate);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn order_by(mut self, order: SortOrder) -> Self {
        self.order_by = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn guard(mut self, columns: ColumnSet) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn to_sql(&self) -> String {
        let columns = self.columns.as_ref();
        let group = quote_ident(&self.group_by);

        let mut select = vec![format!("{} AS {}", group, quote_ident(&self.group_alias))];
        select.extend(self.aggregates.iter().map(|a| a.to_sql(columns)));

        let mut sql = format!("SELECT {} FROM {}", select.join(", "), quote_ident(&self.source));
        if let Some(clause) = self.filter.to_sql(columns) {
            sql.push_str(&format!(" WHERE {}", clause));
        }
        sql.push_str(&format!(" GROUP BY {}", group));
        if let Some(order) = &self.order_by {
            sql.push_str(&format!(" ORDER BY {}", order_sql(order)));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balanced_quotes(sql: &str) -> bool {
        sql.matches('\'').count() % 2 == 0
    }

    #[test]
    fn test_apostrophe_is_doubled() {
        let filter = Filter::from_dimensions(&[(Dimension::Contractor, "O'Brien & Sons".to_string())]);
        let sql = filter.to_sql(None).unwrap();
        assert_eq!(sql, "\"contractor_name\" = 'O''Brien & Sons'");
        assert!(balanced_quotes(&sql));
    }

    #[test]
    fn test_predicates_are_anded_in_order() {
        let filter = Filter::from_dimensions(&[
            (Dimension::Contractor, "ACME CORP".to_string()),
            (Dimension::Area, "Metro".to_string()),
        ]);
        assert_eq!(
            filter.to_sql(None).unwrap(),
            "\"contractor_name\" = 'ACME CORP' AND \"area_of_delivery\" = 'Metro'"
        );
        assert!(Filter::new().to_sql(None).is_none());
    }

    #[test]
    fn test_page_and_count_queries_share_the_filter() {
        let spec = QuerySpec::new("agg_by_contractor")
            .filter(Filter::new().and(Predicate::contains("contractor_name", "50%_off")))
            .order_by(SortOrder::desc("total_value"))
            .page(25, 50);

        assert_eq!(
            spec.to_sql(),
            "SELECT * FROM \"agg_by_contractor\" WHERE \"contractor_name\" LIKE '%50\\%\\_off%' ESCAPE '\\' \
             ORDER BY \"total_value\" DESC LIMIT 25 OFFSET 50"
        );
        assert_eq!(
            spec.count_sql(),
            "SELECT COUNT(*) AS total_count FROM \"agg_by_contractor\" WHERE \"contractor_name\" LIKE '%50\\%\\_off%' ESCAPE '\\'"
        );
    }

    #[test]
    fn test_absent_columns_become_typed_placeholders() {
        let columns = ColumnSet::from_names(["Contractor_Name", "contract_amount"]);
        let spec = QuerySpec::new("facts")
            .project(Projection::Items(vec![
                SelectItem::guarded("contractor_name", ColumnKind::Text),
                SelectItem::guarded("notice_title", ColumnKind::Text),
                SelectItem::guarded("award_date", ColumnKind::Date),
                SelectItem::guarded("contract_amount", ColumnKind::Number),
            ]))
            .filter(Filter::new().and(Predicate::eq("business_category", "Works")))
            .guard(columns);

        assert_eq!(
            spec.to_sql(),
            "SELECT \"contractor_name\", '' AS \"notice_title\", NULL AS \"award_date\", \"contract_amount\" \
             FROM \"facts\" WHERE '' = 'Works'"
        );
    }

    #[test]
    fn test_group_query() {
        let query = GroupQuery::new("facts", "area_of_delivery", "entity")
            .aggregate(Aggregate::count("contract_count"))
            .aggregate(Aggregate::over(AggregateFn::Sum, "contract_amount", ColumnKind::Number, "total_value"))
            .aggregate(Aggregate::over(AggregateFn::Min, "award_date", ColumnKind::Date, "first_date"))
            .filter(Filter::new().and(Predicate::not_null("area_of_delivery")))
            .order_by(SortOrder::desc("total_value"))
            .limit(10)
            .guard(ColumnSet::from_names(["area_of_delivery", "contract_amount"]));

        assert_eq!(
            query.to_sql(),
            "SELECT \"area_of_delivery\" AS \"entity\", COUNT(*) AS \"contract_count\", \
             SUM(\"contract_amount\") AS \"total_value\", MIN(NULL) AS \"first_date\" \
             FROM \"facts\" WHERE \"area_of_delivery\" IS NOT NULL GROUP BY \"area_of_delivery\" \
             ORDER BY \"total_value\" DESC LIMIT 10"
        );
    }

    #[test]
    fn test_identifiers_and_literals_escape() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(Literal::Real(f64::NAN).to_sql(), "NULL");
        assert_eq!(Literal::from(2.5).to_sql(), "2.5");
    }
}
