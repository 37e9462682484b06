//! The top-level entity table

use std::sync::Arc;
use std::time::Duration;
use parking_lot::RwLock;

use ax_core::events::events::{BrowserFailed, BrowserLoaded};
use ax_core::{Debouncer, Dimension, Generation, Pager, Row, SortOrder};
use ax_data::{DataError, FetchOptions, Filter, Page, Predicate, SourceLayout};

use crate::{InFlight, ViewerContext};

/// Column of aggregate files holding each entity's total contract value
const TOTAL_COLUMN: &str = "total_value";

/// Everything that determines which page of entities is shown
#[derive(Debug, Clone, PartialEq)]
pub struct BrowserQuery {
    /// Case-insensitive substring of the entity name; empty matches all
    pub search: String,
    /// Only entities with at least this total value
    pub min_total: Option<f64>,
    pub order_by: SortOrder,
    pub pager: Pager,
}

impl BrowserQuery {
    pub fn new(page_size: usize) -> Self {
        Self {
            search: String::new(),
            min_total: None,
            order_by: SortOrder::desc(TOTAL_COLUMN),
            pager: Pager::new(page_size),
        }
    }

    fn filter(&self, dimension: Dimension) -> Filter {
        let mut filter = Filter::new();
        let search = self.search.trim();
        if !search.is_empty() {
            filter.push(Predicate::contains(dimension.column(), search));
        }
        if let Some(min) = self.min_total {
            filter.push(Predicate::at_least(TOTAL_COLUMN, min));
        }
        filter
    }
}

/// What the entity table currently shows
#[derive(Debug, Clone)]
pub struct BrowserView {
    pub dimension: Dimension,
    pub rows: Vec<Row>,
    pub total_count: u64,
    pub loading: bool,
    /// Page-level error banner
    pub error: Option<String>,
    /// Query the rows answer, or the one in flight while loading
    pub query: BrowserQuery,
}

impl BrowserView {
    /// Entity names on the page, in row order
    pub fn entities(&self) -> Vec<String> {
        let column = self.dimension.column();
        self.rows
            .iter()
            .filter_map(|row| row.get(column).and_then(|v| v.as_str()).map(String::from))
            .collect()
    }

    pub fn page_count(&self) -> u64 {
        self.query.pager.page_count(self.total_count)
    }
}

struct Inner {
    ctx: ViewerContext,
    layout: RwLock<SourceLayout>,
    view: RwLock<BrowserView>,
    /// Latest edits, not yet dispatched
    pending: RwLock<BrowserQuery>,
    generation: Generation,
    in_flight: InFlight,
}

/// Paged, searchable table over the aggregate file of one dimension.
///
/// Edits to search, filter, sort or page are coalesced by a debouncer; only
/// the last state of a burst is fetched.
pub struct EntityBrowser {
    inner: Arc<Inner>,
    debouncer: Debouncer<BrowserQuery>,
}

impl EntityBrowser {
    pub fn new(ctx: ViewerContext, layout: SourceLayout, dimension: Dimension, page_size: usize, quiet: Duration) -> Self {
        let query = BrowserQuery::new(page_size);
        let runtime = ctx.runtime_handle.clone();
        let inner = Arc::new(Inner {
            ctx,
            layout: RwLock::new(layout),
            view: RwLock::new(BrowserView {
                dimension,
                rows: Vec::new(),
                total_count: 0,
                loading: false,
                error: None,
                query: query.clone(),
            }),
            pending: RwLock::new(query),
            generation: Generation::new(),
            in_flight: InFlight::default(),
        });

        let dispatcher = Arc::downgrade(&inner);
        let debouncer = Debouncer::new(quiet, runtime, move |query: BrowserQuery| {
            if let Some(inner) = dispatcher.upgrade() {
                Inner::dispatch(&inner, query);
            }
        });

        Self { inner, debouncer }
    }

    pub fn view(&self) -> BrowserView {
        self.inner.view.read().clone()
    }

    pub fn dimension(&self) -> Dimension {
        self.inner.view.read().dimension
    }

    /// Filter entity names by substring, from the first page
    pub fn set_search(&self, search: &str) {
        self.edit(|q| {
            q.search = search.to_string();
            q.pager = Pager::new(q.pager.page_size());
        });
    }

    /// Only show entities with at least `min` total value, from the first page
    pub fn set_min_total(&self, min: Option<f64>) {
        self.edit(|q| {
            q.min_total = min;
            q.pager = Pager::new(q.pager.page_size());
        });
    }

    pub fn sort_by(&self, order_by: SortOrder) {
        self.edit(|q| {
            q.order_by = order_by;
            q.pager = Pager::new(q.pager.page_size());
        });
    }

    /// Jump to a zero-based page
    pub fn goto_page(&self, page: usize) {
        self.edit(|q| q.pager = Pager::at_page(q.pager.page_size(), page));
    }

    pub fn next_page(&self) {
        let total = self.inner.view.read().total_count;
        self.edit(|q| {
            if q.pager.has_next(total) {
                q.pager = q.pager.next();
            }
        });
    }

    pub fn previous_page(&self) {
        self.edit(|q| q.pager = q.pager.previous());
    }

    /// Show another dimension's aggregate file, resetting the query
    pub fn set_dimension(&self, dimension: Dimension) {
        self.inner.view.write().dimension = dimension;
        self.edit(|q| *q = BrowserQuery::new(q.pager.page_size()));
    }

    /// Read from another dataset slice, keeping the query
    pub fn set_layout(&self, layout: SourceLayout) {
        *self.inner.layout.write() = layout;
        self.edit(|q| q.pager = Pager::new(q.pager.page_size()));
    }

    /// Fetch the current query without waiting for the quiet period
    pub fn refresh_now(&self) {
        self.debouncer.cancel();
        let query = self.inner.pending.read().clone();
        Inner::dispatch(&self.inner, query);
    }

    /// Whether an edit is waiting for its quiet period
    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// Wait for the fetch in flight, if any
    pub async fn idle(&self) {
        self.inner.in_flight.wait().await;
    }

    fn edit(&self, change: impl FnOnce(&mut BrowserQuery)) {
        let query = {
            let mut pending = self.inner.pending.write();
            change(&mut pending);
            pending.clone()
        };
        self.debouncer.schedule(query);
    }
}

impl Inner {
    fn dispatch(this: &Arc<Self>, query: BrowserQuery) {
        let token = this.generation.advance();
        let dimension = {
            let mut view = this.view.write();
            view.loading = true;
            view.query = query.clone();
            view.dimension
        };
        let locator = this.layout.read().aggregate(dimension);
        tracing::info!("Fetching {} page {} ({})", dimension.key(), query.pager.page() + 1, locator);

        let inner = this.clone();
        let task = this.ctx.runtime_handle.spawn(async move {
            let options = FetchOptions {
                filter: query.filter(dimension),
                order_by: Some(query.order_by.clone()),
                ..Default::default()
            };
            let result = inner
                .ctx
                .fetcher
                .fetch(&locator, query.pager.offset(), query.pager.page_size(), options)
                .await;
            inner.apply(token, result);
        });
        this.in_flight.track(task);
    }

    fn apply(&self, token: u64, result: Result<Page, DataError>) {
        let page = {
            let mut view = self.view.write();
            if !self.generation.is_current(token) {
                tracing::warn!("Dropping stale entity page");
                return;
            }
            view.loading = false;
            match result {
                Ok(page) => {
                    view.rows = page.rows;
                    view.total_count = page.total_count;
                    view.error = None;
                    Ok((view.rows.len(), page.total_count, view.query.pager.page()))
                }
                Err(e) => {
                    view.rows.clear();
                    view.total_count = 0;
                    view.error = Some(e.to_string());
                    Err(e.to_string())
                }
            }
        };

        match page {
            Ok((rows, total_count, page)) => self.ctx.events.publish(BrowserLoaded { rows, total_count, page }),
            Err(error) => {
                tracing::error!("Entity table failed: {}", error);
                self.ctx.events.publish(BrowserFailed { error });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use ax_core::events::handler_from_fn;
    use ax_data::{Granularity, MemoryFetcher, PagedFetcher, SourceLocator, SqliteEngine};

    const AGG: &str = "contractor_name,contract_count,total_value\n\
        ACME CORP,12,900.0\n\
        Globex,3,450.0\n\
        Initech,7,300.0\n\
        Acme Rivals,1,50.0\n";

    fn browser(quiet: Duration) -> (EntityBrowser, Arc<Mutex<Vec<usize>>>) {
        let layout = SourceLayout::new(SourceLocator::parse("/stats"), Granularity::AllTime);
        let files = MemoryFetcher::new();
        files.insert(layout.aggregate(Dimension::Contractor), AGG);

        let fetcher = PagedFetcher::new(Arc::new(SqliteEngine::open().unwrap()), Arc::new(files));
        let ctx = ViewerContext::new(fetcher, tokio::runtime::Handle::current());

        let loads = Arc::new(Mutex::new(Vec::new()));
        let sink = loads.clone();
        ctx.events.subscribe::<BrowserLoaded>(handler_from_fn(move |event| {
            if let Some(loaded) = event.as_any().downcast_ref::<BrowserLoaded>() {
                sink.lock().push(loaded.rows);
            }
        }));

        (EntityBrowser::new(ctx, layout, Dimension::Contractor, 2, quiet), loads)
    }

    #[tokio::test]
    async fn test_typing_burst_fetches_once() {
        let (browser, loads) = browser(Duration::from_millis(50));
        for search in ["a", "ac", "acm", "acme"] {
            browser.set_search(search);
        }
        assert!(browser.is_pending());

        tokio::time::sleep(Duration::from_millis(300)).await;
        browser.idle().await;

        assert_eq!(*loads.lock(), vec![2]);
        let view = browser.view();
        assert_eq!(view.query.search, "acme");
        assert_eq!(view.total_count, 2);
        assert_eq!(view.entities(), vec!["ACME CORP", "Acme Rivals"]);
    }

    #[tokio::test]
    async fn test_paging_by_configured_page_size() {
        let (browser, _) = browser(Duration::from_millis(10));
        browser.refresh_now();
        browser.idle().await;
        assert_eq!(browser.view().page_count(), 2);

        browser.next_page();
        tokio::time::sleep(Duration::from_millis(100)).await;
        browser.idle().await;

        let view = browser.view();
        assert_eq!(view.query.pager.offset(), 2);
        assert_eq!(view.entities(), vec!["Initech", "Acme Rivals"]);
        assert!(!view.query.pager.has_next(view.total_count));
    }

    #[tokio::test]
    async fn test_min_total_filter() {
        let (browser, _) = browser(Duration::from_millis(10));
        browser.set_min_total(Some(400.0));
        browser.refresh_now();
        browser.idle().await;

        assert_eq!(browser.view().total_count, 2);
        assert_eq!(browser.view().entities(), vec!["ACME CORP", "Globex"]);
    }

    #[tokio::test]
    async fn test_missing_file_sets_page_error() {
        let (browser, loads) = browser(Duration::from_millis(10));
        browser.set_dimension(Dimension::Area);
        browser.refresh_now();
        browser.idle().await;

        let view = browser.view();
        assert!(!view.loading);
        assert!(view.rows.is_empty());
        assert!(view.error.unwrap().contains("404"));
        assert!(loads.lock().is_empty());
    }
}
