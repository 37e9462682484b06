//! A drill session: navigator, tabs and entity table wired together

use std::sync::Arc;

use ax_core::events::events::DrillChanged;
use ax_core::events::EventBus;
use ax_core::{Breadcrumb, Dimension, DrillNavigator, DrillState, FilterContext, NavigationError, SortOrder};
use ax_data::{ExplorerConfig, Granularity, SourceLayout};

use crate::{BrowserView, EntityBrowser, TabBoard, TabOrchestrator, TabSettings, ViewerContext};

/// Owns one explorer session.
///
/// The tab orchestrator is subscribed to the navigator, so every drill
/// transition reloads the tabs before the call returns.
pub struct DrillSession {
    navigator: DrillNavigator,
    tabs: Arc<TabOrchestrator>,
    browser: EntityBrowser,
    layout: SourceLayout,
    events: Arc<EventBus>,
}

impl DrillSession {
    pub fn new(ctx: ViewerContext, config: &ExplorerConfig) -> Self {
        let layout = config.layout();
        let events = ctx.events.clone();

        let navigator = DrillNavigator::new(config.dataset);
        let tabs = Arc::new(TabOrchestrator::new(ctx.clone(), TabSettings::from(config), layout.facts()));
        navigator.add_subscriber(tabs.clone());

        let browser = EntityBrowser::new(ctx, layout.clone(), config.dataset, config.page_size, config.debounce());

        tracing::info!("Session opened on {} ({})", layout.base, layout.granularity);
        Self {
            navigator,
            tabs,
            browser,
            layout,
            events,
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn browser(&self) -> &EntityBrowser {
        &self.browser
    }

    pub fn tabs(&self) -> &TabOrchestrator {
        &self.tabs
    }

    pub fn current(&self) -> DrillState {
        self.navigator.current()
    }

    pub fn breadcrumb(&self) -> Breadcrumb {
        self.navigator.breadcrumb()
    }

    /// Open a drill on an entity of the top-level table
    pub fn drill(&self, value: &str) -> Result<Arc<FilterContext>, NavigationError> {
        let ctx = self.navigator.drill(value)?;
        self.announce();
        Ok(ctx)
    }

    /// Drill deeper from a related-entity tab
    pub fn drill_from_tab(&self, value: &str, dimension: Dimension) -> Result<Arc<FilterContext>, NavigationError> {
        let ctx = self.navigator.drill_from_tab(value, dimension)?;
        self.announce();
        Ok(ctx)
    }

    pub fn go_back(&self) -> Result<DrillState, NavigationError> {
        let state = self.navigator.go_back()?;
        self.announce();
        Ok(state)
    }

    pub fn close(&self) {
        self.navigator.close();
        self.announce();
    }

    pub fn sort_contracts(&self, order_by: SortOrder) -> Result<(), NavigationError> {
        self.tabs.sort_contracts(order_by)
    }

    pub fn page_contracts(&self, offset: usize) -> Result<(), NavigationError> {
        self.tabs.page_contracts(offset)
    }

    /// Browse another dimension; closes any open drill
    pub fn set_dataset(&self, dimension: Dimension) {
        self.navigator.close();
        self.navigator.set_dataset_dimension(dimension);
        self.browser.set_dimension(dimension);
        self.announce();
    }

    /// Switch to another time slice; closes any open drill
    pub fn set_granularity(&mut self, granularity: Granularity) {
        self.navigator.close();
        self.layout = SourceLayout::new(self.layout.base.clone(), granularity);
        self.tabs.set_facts(self.layout.facts());
        self.browser.set_layout(self.layout.clone());
        tracing::info!("Switched to {}", granularity);
        self.announce();
    }

    pub fn layout(&self) -> &SourceLayout {
        &self.layout
    }

    /// Copy of every tab's state
    pub fn snapshot(&self) -> TabBoard {
        self.tabs.snapshot()
    }

    pub fn browser_view(&self) -> BrowserView {
        self.browser.view()
    }

    /// Wait until the tabs and the entity table have no load in flight
    pub async fn idle(&self) {
        self.tabs.idle().await;
        self.browser.idle().await;
    }

    fn announce(&self) {
        let breadcrumb = self.navigator.breadcrumb();
        self.events.publish(DrillChanged {
            depth: breadcrumb.len(),
            breadcrumb: breadcrumb.to_string(),
        });
    }
}
