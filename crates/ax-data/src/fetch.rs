//! Paged retrieval from a registered source file

use std::sync::Arc;
use serde_json::Value;

use ax_core::{Row, SortOrder};
use crate::engine::{Engine, EngineConnection};
use crate::query::{ColumnSet, Filter, Projection, QuerySpec};
use crate::sources::{SourceFetcher, SourceLocator};
use crate::{DataError, Result};

/// One page of rows plus the row count of the whole filtered result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub rows: Vec<Row>,
    pub total_count: u64,
}

/// Everything about a page request except the source and the window
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub filter: Filter,
    pub order_by: Option<SortOrder>,
    pub projection: Projection,
}

/// A source registered with the engine and a connection to query it.
///
/// Must be [`close`](LoadedSource::close)d when done.
pub struct LoadedSource {
    name: String,
    connection: Box<dyn EngineConnection>,
}

impl LoadedSource {
    /// Logical name the source is registered under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Probe the columns actually present in the registered file
    pub async fn columns(&mut self) -> Result<ColumnSet> {
        let names = self.connection.columns(&self.name).await?;
        Ok(ColumnSet::from_names(names))
    }

    pub async fn query_rows(&mut self, sql: &str) -> Result<Vec<Row>> {
        tracing::debug!("Executing: {}", sql);
        Ok(self.connection.query(sql).await?.into_rows())
    }

    /// Run a single-row `COUNT(*)` query and read its first column
    pub async fn count(&mut self, sql: &str) -> Result<u64> {
        let rows = self.query_rows(sql).await?;
        Ok(rows
            .first()
            .and_then(|row| row.values().next())
            .map(count_value)
            .unwrap_or(0))
    }

    pub async fn close(self) -> Result<()> {
        self.connection.close().await
    }
}

fn count_value(value: &Value) -> u64 {
    value
        .as_u64()
        .or_else(|| value.as_f64().map(|f| f.max(0.0) as u64))
        .unwrap_or(0)
}

/// Fetches pages of rows from source files through the engine.
///
/// Every call re-fetches and re-registers the file, so a page always
/// reflects the current bytes at the locator.
#[derive(Clone)]
pub struct PagedFetcher {
    engine: Arc<dyn Engine>,
    fetcher: Arc<dyn SourceFetcher>,
}

impl PagedFetcher {
    pub fn new(engine: Arc<dyn Engine>, fetcher: Arc<dyn SourceFetcher>) -> Self {
        Self { engine, fetcher }
    }

    /// Fetch the file, register it, and open a connection onto it
    pub async fn load(&self, locator: &SourceLocator) -> Result<LoadedSource> {
        let bytes = self.fetcher.fetch(locator).await?;
        let name = locator.logical_name();
        self.engine.register_file_buffer(&name, bytes).await?;
        let connection = self.engine.connect().await?;
        Ok(LoadedSource { name, connection })
    }

    /// Fetch `page_size` rows starting at row `offset`.
    ///
    /// Column references in the projection and filter are checked against the
    /// file's actual columns. `total_count` counts every row matching the
    /// filter regardless of the window.
    pub async fn fetch(
        &self,
        locator: &SourceLocator,
        offset: usize,
        page_size: usize,
        options: FetchOptions,
    ) -> Result<Page> {
        if page_size == 0 {
            return Err(DataError::InvalidPaging);
        }

        let mut source = self.load(locator).await?;
        let outcome = Self::read_page(&mut source, offset, page_size, options).await;
        let closed = source.close().await;

        let page = outcome?;
        closed?;
        tracing::info!(
            "Fetched {} of {} rows from {} at offset {}",
            page.rows.len(),
            page.total_count,
            locator.file_name(),
            offset
        );
        Ok(page)
    }

    async fn read_page(
        source: &mut LoadedSource,
        offset: usize,
        page_size: usize,
        options: FetchOptions,
    ) -> Result<Page> {
        let columns = source.columns().await?;
        let mut spec = QuerySpec::new(source.name())
            .filter(options.filter)
            .project(options.projection)
            .page(page_size, offset)
            .guard(columns);
        spec.order_by = options.order_by;

        let rows = source.query_rows(&spec.to_sql()).await?;
        let total_count = source.count(&spec.count_sql()).await?;
        Ok(Page { rows, total_count })
    }
}
