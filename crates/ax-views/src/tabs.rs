//! Per-drill tab loading

use std::sync::Arc;
use indexmap::IndexMap;
use parking_lot::RwLock;

use ax_core::events::events::{TabFailed, TabLoaded};
use ax_core::{
    ContractsTabState, Dimension, DrillState, FilterContext, Generation, NavigationError,
    NavigationSubscriber, Pager, RelatedEntity, SortOrder, TabKind, TabState,
};
use ax_data::queries::default_listing_order;
use ax_data::{list_contracts, top_related, ContractQuery, DataError, ExplorerConfig, Page, SourceLocator};

use crate::{InFlight, ViewerContext};

/// Sizes of the per-drill tabs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TabSettings {
    /// Rows per related-entity tab
    pub related_limit: usize,
    /// Rows per contracts page
    pub contracts_page_size: usize,
}

impl Default for TabSettings {
    fn default() -> Self {
        Self {
            related_limit: 10,
            contracts_page_size: 20,
        }
    }
}

impl From<&ExplorerConfig> for TabSettings {
    fn from(config: &ExplorerConfig) -> Self {
        Self {
            related_limit: config.related_limit,
            contracts_page_size: config.contracts_page_size,
        }
    }
}

/// State of every tab of the open drill
#[derive(Debug, Clone)]
pub struct TabBoard {
    /// Context the tabs describe; `None` when collapsed
    pub context: Option<Arc<FilterContext>>,
    /// One tab per complementary dimension, in display order
    pub related: IndexMap<Dimension, TabState<RelatedEntity>>,
    pub contracts: ContractsTabState,
}

impl TabBoard {
    fn empty(settings: TabSettings) -> Self {
        Self {
            context: None,
            related: IndexMap::new(),
            contracts: ContractsTabState::new(settings.contracts_page_size, default_listing_order()),
        }
    }

    /// Whether any tab is still waiting for its query
    pub fn is_loading(&self) -> bool {
        self.contracts.loading || self.related.values().any(|tab| tab.loading)
    }
}

struct Inner {
    ctx: ViewerContext,
    settings: TabSettings,
    facts: RwLock<SourceLocator>,
    board: RwLock<TabBoard>,
    /// Bumped on every navigation; guards the related-entity tabs
    context_generation: Generation,
    /// Bumped on every navigation, re-sort and re-page; guards the contracts tab
    contracts_generation: Generation,
    in_flight: InFlight,
}

/// Loads the tabs of whatever drill context the navigator enters.
///
/// Registered as a navigation subscriber; each transition into an open
/// context launches one query per related-entity tab plus the contracts
/// listing, each writing only its own tab. Responses that arrive after a
/// newer transition are dropped.
pub struct TabOrchestrator {
    inner: Arc<Inner>,
}

impl TabOrchestrator {
    pub fn new(ctx: ViewerContext, settings: TabSettings, facts: SourceLocator) -> Self {
        Self {
            inner: Arc::new(Inner {
                ctx,
                settings,
                facts: RwLock::new(facts),
                board: RwLock::new(TabBoard::empty(settings)),
                context_generation: Generation::new(),
                contracts_generation: Generation::new(),
                in_flight: InFlight::default(),
            }),
        }
    }

    pub fn settings(&self) -> TabSettings {
        self.inner.settings
    }

    /// Point subsequent loads at another facts file
    pub fn set_facts(&self, facts: SourceLocator) {
        *self.inner.facts.write() = facts;
    }

    /// Copy of the current tab states
    pub fn snapshot(&self) -> TabBoard {
        self.inner.board.read().clone()
    }

    /// Wait for every launched load to finish
    pub async fn idle(&self) {
        self.inner.in_flight.wait().await;
    }

    /// Re-run the listing sorted by `order_by`, from the first page
    pub fn sort_contracts(&self, order_by: SortOrder) -> Result<(), NavigationError> {
        let pager = Pager::new(self.inner.settings.contracts_page_size);
        self.reload_contracts(pager, order_by)
    }

    /// Re-run the listing for the page containing `offset`, keeping the sort
    pub fn page_contracts(&self, offset: usize) -> Result<(), NavigationError> {
        let (pager, order_by) = {
            let board = self.inner.board.read();
            let pager = Pager::at_offset(board.contracts.pager.page_size(), offset);
            (pager, board.contracts.order_by.clone())
        };
        self.reload_contracts(pager, order_by)
    }

    fn reload_contracts(&self, pager: Pager, order_by: SortOrder) -> Result<(), NavigationError> {
        let token = self.inner.contracts_generation.advance();
        let context = {
            let mut board = self.inner.board.write();
            let context = board.context.clone().ok_or(NavigationError::NotOpen)?;
            board.contracts.begin(pager, order_by.clone());
            context
        };

        tracing::debug!("Reloading contracts at offset {} by {}", pager.offset(), order_by);
        self.spawn_contracts(&context, pager, order_by, token);
        Ok(())
    }

    fn open(&self, context: &Arc<FilterContext>) {
        let context_token = self.inner.context_generation.advance();
        let contracts_token = self.inner.contracts_generation.advance();
        let targets = context.source_dimension().complement();
        let pager = Pager::new(self.inner.settings.contracts_page_size);
        let order_by = default_listing_order();

        {
            let mut board = self.inner.board.write();
            board.context = Some(context.clone());
            board.related = targets.iter().map(|d| (*d, TabState::loading())).collect();
            board.contracts.total_count = 0;
            board.contracts.begin(pager, order_by.clone());
        }

        tracing::info!("Loading {} tabs for {}", targets.len() + 1, context.breadcrumb());
        for target in targets {
            self.spawn_related(context, target, context_token);
        }
        self.spawn_contracts(context, pager, order_by, contracts_token);
    }

    fn collapse(&self) {
        self.inner.context_generation.advance();
        self.inner.contracts_generation.advance();
        *self.inner.board.write() = TabBoard::empty(self.inner.settings);
        tracing::debug!("Tab board cleared");
    }

    fn spawn_related(&self, context: &Arc<FilterContext>, target: Dimension, token: u64) {
        let inner = self.inner.clone();
        let context = context.clone();
        let facts = self.inner.facts.read().clone();

        let task = self.inner.ctx.runtime_handle.spawn(async move {
            let result = top_related(
                &inner.ctx.fetcher,
                context.source_dimension(),
                context.source_value(),
                target,
                inner.settings.related_limit,
                &facts,
            )
            .await;
            inner.apply_related(target, token, result);
        });
        self.inner.in_flight.track(task);
    }

    fn spawn_contracts(&self, context: &Arc<FilterContext>, pager: Pager, order_by: SortOrder, token: u64) {
        let inner = self.inner.clone();
        let query = ContractQuery::new(context.breadcrumb().filters(), pager.page_size())
            .at_offset(pager.offset())
            .sorted_by(order_by);
        let facts = self.inner.facts.read().clone();

        let task = self.inner.ctx.runtime_handle.spawn(async move {
            let result = list_contracts(&inner.ctx.fetcher, &query, &facts).await;
            inner.apply_contracts(token, result);
        });
        self.inner.in_flight.track(task);
    }
}

impl Inner {
    fn apply_related(&self, target: Dimension, token: u64, result: Result<Vec<RelatedEntity>, DataError>) {
        let tab = TabKind::Related(target);
        {
            let mut board = self.board.write();
            if !self.context_generation.is_current(token) {
                tracing::warn!("Dropping stale {} result", tab);
                return;
            }
            let state = match &result {
                Ok(rows) => TabState::loaded(rows.clone()),
                Err(e) => TabState::failed(e.to_string()),
            };
            board.related.insert(target, state);
        }

        match result {
            Ok(rows) => self.ctx.events.publish(TabLoaded { tab, rows: rows.len(), total_count: None }),
            Err(e) => {
                tracing::error!("{} tab failed: {}", tab, e);
                self.ctx.events.publish(TabFailed { tab, error: e.to_string() });
            }
        }
    }

    fn apply_contracts(&self, token: u64, result: Result<Page, DataError>) {
        let tab = TabKind::Contracts;
        let outcome = {
            let mut board = self.board.write();
            if !self.contracts_generation.is_current(token) {
                tracing::warn!("Dropping stale {} result", tab);
                return;
            }
            match result {
                Ok(page) => {
                    let rows = page.rows.len();
                    board.contracts.finish(page.rows, page.total_count);
                    Ok((rows, page.total_count))
                }
                Err(e) => {
                    let message = e.to_string();
                    board.contracts.fail(message.clone());
                    Err(message)
                }
            }
        };

        match outcome {
            Ok((rows, total)) => self.ctx.events.publish(TabLoaded { tab, rows, total_count: Some(total) }),
            Err(error) => {
                tracing::error!("{} tab failed: {}", tab, error);
                self.ctx.events.publish(TabFailed { tab, error });
            }
        }
    }
}

impl NavigationSubscriber for TabOrchestrator {
    fn on_navigation_change(&self, state: &DrillState) {
        match state {
            DrillState::Open(context) => self.open(context),
            DrillState::Collapsed => self.collapse(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ax_data::engine::{Engine, EngineConnection, ResultSet, SqliteEngine};
    use ax_data::{MemoryFetcher, PagedFetcher};
    use serde_json::json;

    const FACTS: &str = "award_date,contractor_name,organization_name,business_category,area_of_delivery,contract_amount,contract_no\n\
        2023-01-10,ACME CORP,City Works,Construction,Metro,1000,A-1\n\
        2023-02-10,ACME CORP,City Works,Construction,Harbor,2500,A-2\n\
        2023-03-10,ACME CORP,Port Authority,Dredging,Harbor,4000,A-3\n\
        2023-04-10,Globex,City Works,Consulting,Metro,800,G-1\n\
        2023-05-10,Globex,Port Authority,Consulting,Harbor,300,G-2\n";

    /// Fails every query mentioning `poison`
    struct FlakyEngine {
        inner: SqliteEngine,
        poison: &'static str,
    }

    struct FlakyConnection {
        inner: Box<dyn EngineConnection>,
        poison: &'static str,
    }

    #[async_trait]
    impl Engine for FlakyEngine {
        async fn register_file_buffer(&self, name: &str, bytes: Vec<u8>) -> ax_data::Result<()> {
            self.inner.register_file_buffer(name, bytes).await
        }

        async fn drop_file(&self, name: &str) -> ax_data::Result<()> {
            self.inner.drop_file(name).await
        }

        async fn connect(&self) -> ax_data::Result<Box<dyn EngineConnection>> {
            Ok(Box::new(FlakyConnection {
                inner: self.inner.connect().await?,
                poison: self.poison,
            }))
        }
    }

    #[async_trait]
    impl EngineConnection for FlakyConnection {
        async fn query(&mut self, sql: &str) -> ax_data::Result<ResultSet> {
            if sql.contains(self.poison) {
                return Err(DataError::Engine("simulated outage".into()));
            }
            self.inner.query(sql).await
        }

        async fn columns(&mut self, name: &str) -> ax_data::Result<Vec<String>> {
            self.inner.columns(name).await
        }

        async fn close(self: Box<Self>) -> ax_data::Result<()> {
            self.inner.close().await
        }
    }

    fn orchestrator(engine: Arc<dyn Engine>) -> Arc<TabOrchestrator> {
        let facts = SourceLocator::parse("/stats/all_time/facts.arrow");
        let files = MemoryFetcher::new();
        files.insert(facts.clone(), FACTS);
        let ctx = ViewerContext::new(PagedFetcher::new(engine, Arc::new(files)), tokio::runtime::Handle::current());
        Arc::new(TabOrchestrator::new(ctx, TabSettings::default(), facts))
    }

    fn sqlite() -> Arc<dyn Engine> {
        Arc::new(SqliteEngine::open().unwrap())
    }

    #[tokio::test]
    async fn test_open_loads_every_tab() {
        let tabs = orchestrator(sqlite());
        let root = FilterContext::root(Dimension::Contractor, "ACME CORP");
        tabs.on_navigation_change(&DrillState::Open(root));

        let loading = tabs.snapshot();
        assert!(loading.is_loading());
        assert_eq!(
            loading.related.keys().copied().collect::<Vec<_>>(),
            vec![Dimension::Area, Dimension::Organization, Dimension::Category]
        );

        tabs.idle().await;
        let board = tabs.snapshot();
        assert!(!board.is_loading());

        let areas = &board.related[&Dimension::Area];
        assert!(areas.is_ready());
        assert_eq!(areas.rows[0].entity, "Harbor");
        assert_eq!(areas.rows[0].contract_count, 2);
        assert_eq!(areas.rows[0].total_value, 6500.0);

        assert_eq!(board.contracts.total_count, 3);
        assert_eq!(board.contracts.rows[0]["contract_no"], json!("A-3"));
    }

    #[tokio::test]
    async fn test_failed_tab_does_not_affect_siblings() {
        let engine = Arc::new(FlakyEngine {
            inner: SqliteEngine::open().unwrap(),
            poison: "GROUP BY \"organization_name\"",
        });
        let tabs = orchestrator(engine);
        tabs.on_navigation_change(&DrillState::Open(FilterContext::root(Dimension::Contractor, "ACME CORP")));
        tabs.idle().await;

        let board = tabs.snapshot();
        let organizations = &board.related[&Dimension::Organization];
        assert!(!organizations.loading);
        assert!(organizations.rows.is_empty());
        assert!(organizations.error.as_deref().unwrap().contains("simulated outage"));

        assert!(board.related[&Dimension::Area].is_ready());
        assert!(board.related[&Dimension::Category].is_ready());
        assert!(board.contracts.error.is_none());
        assert_eq!(board.contracts.rows.len(), 3);
    }

    #[tokio::test]
    async fn test_child_context_filters_contracts_by_whole_path() {
        let tabs = orchestrator(sqlite());
        let root = FilterContext::root(Dimension::Contractor, "ACME CORP");
        let child = FilterContext::child(&root, Dimension::Area, "Harbor");
        tabs.on_navigation_change(&DrillState::Open(child));
        tabs.idle().await;

        let board = tabs.snapshot();
        assert_eq!(board.contracts.total_count, 2);
        assert_eq!(
            board.related.keys().copied().collect::<Vec<_>>(),
            vec![Dimension::Contractor, Dimension::Organization, Dimension::Category]
        );
        let contractors = &board.related[&Dimension::Contractor];
        assert_eq!(contractors.rows.len(), 2);
    }

    #[tokio::test]
    async fn test_stale_results_are_dropped() {
        let tabs = orchestrator(sqlite());
        tabs.on_navigation_change(&DrillState::Open(FilterContext::root(Dimension::Contractor, "ACME CORP")));
        tabs.on_navigation_change(&DrillState::Open(FilterContext::root(Dimension::Contractor, "Globex")));
        tabs.idle().await;

        let board = tabs.snapshot();
        assert_eq!(board.context.as_ref().unwrap().source_value(), "Globex");
        assert_eq!(board.contracts.total_count, 2);
        assert!(board.contracts.rows.iter().all(|r| r["contractor_name"] == json!("Globex")));

        let stale = tabs.inner.contracts_generation.current() - 1;
        tabs.inner.apply_contracts(stale, Ok(Page::default()));
        assert_eq!(tabs.snapshot().contracts.total_count, 2);
    }

    #[tokio::test]
    async fn test_sort_and_page_rerun_only_contracts() {
        let tabs = orchestrator(sqlite());
        tabs.on_navigation_change(&DrillState::Open(FilterContext::root(Dimension::Contractor, "ACME CORP")));
        tabs.idle().await;
        let context_generation = tabs.inner.context_generation.current();

        tabs.sort_contracts(SortOrder::asc("contract_amount")).unwrap();
        tabs.idle().await;
        let board = tabs.snapshot();
        assert_eq!(board.contracts.rows[0]["contract_no"], json!("A-1"));
        assert_eq!(tabs.inner.context_generation.current(), context_generation);
        assert!(board.related.values().all(|tab| tab.is_ready()));

        tabs.page_contracts(25).unwrap();
        tabs.idle().await;
        let board = tabs.snapshot();
        assert_eq!(board.contracts.page_offset(), 20);
        assert!(board.contracts.rows.is_empty());
        assert_eq!(board.contracts.order_by, SortOrder::asc("contract_amount"));
    }

    #[tokio::test]
    async fn test_collapse_clears_board() {
        let tabs = orchestrator(sqlite());
        tabs.on_navigation_change(&DrillState::Open(FilterContext::root(Dimension::Contractor, "ACME CORP")));
        tabs.on_navigation_change(&DrillState::Collapsed);
        tabs.idle().await;

        let board = tabs.snapshot();
        assert!(board.context.is_none());
        assert!(board.related.is_empty());
        assert!(board.contracts.rows.is_empty());
        assert!(matches!(tabs.sort_contracts(SortOrder::desc("award_date")), Err(NavigationError::NotOpen)));
    }
}
