//! Drill navigator implementation

use super::{Breadcrumb, DrillState, FilterContext, NavigationError, NavigationSubscriber};
use crate::dimension::Dimension;
use std::sync::{Arc, Weak};
use parking_lot::RwLock;

/// Navigation state stored internally
#[derive(Debug, Clone)]
struct NavigatorState {
    /// Dimension implied by the dataset the top-level table shows
    dataset_dimension: Dimension,
    current: DrillState,
}

/// The drill navigation stack.
///
/// Holds either nothing (`Collapsed`) or the leaf of a parent-linked chain of
/// [`FilterContext`]s. Every transition notifies subscribers with the state
/// it entered.
pub struct DrillNavigator {
    state: Arc<RwLock<NavigatorState>>,
    subscribers: Arc<RwLock<Vec<Weak<dyn NavigationSubscriber>>>>,
}

impl DrillNavigator {
    /// Create a collapsed navigator for a dataset
    pub fn new(dataset_dimension: Dimension) -> Self {
        let state = NavigatorState {
            dataset_dimension,
            current: DrillState::Collapsed,
        };

        Self {
            state: Arc::new(RwLock::new(state)),
            subscribers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn dataset_dimension(&self) -> Dimension {
        self.state.read().dataset_dimension
    }

    /// Change the dataset the next root drill is taken from
    pub fn set_dataset_dimension(&self, dimension: Dimension) {
        self.state.write().dataset_dimension = dimension;
    }

    /// Open a fresh drill path on a value of the dataset's dimension.
    ///
    /// Any open path is discarded.
    pub fn drill(&self, value: &str) -> Result<Arc<FilterContext>, NavigationError> {
        let value = Self::validate(value)?;
        let mut state = self.state.write();
        let ctx = FilterContext::root(state.dataset_dimension, value);
        state.current = DrillState::Open(ctx.clone());
        drop(state);

        tracing::info!("Drill opened on {} = '{}'", ctx.source_dimension(), ctx.source_value());
        self.notify_subscribers();
        Ok(ctx)
    }

    /// Drill one level deeper from a related-entity tab
    pub fn drill_from_tab(&self, value: &str, dimension: Dimension) -> Result<Arc<FilterContext>, NavigationError> {
        let value = Self::validate(value)?;
        let mut state = self.state.write();
        let parent = match &state.current {
            DrillState::Open(ctx) => ctx.clone(),
            DrillState::Collapsed => return Err(NavigationError::NotOpen),
        };

        let ctx = FilterContext::child(&parent, dimension, value);
        state.current = DrillState::Open(ctx.clone());
        drop(state);

        tracing::info!("Drilled into {} = '{}' (depth {})", dimension, ctx.source_value(), ctx.depth());
        self.notify_subscribers();
        Ok(ctx)
    }

    /// Return to the parent context, collapsing when at the root
    pub fn go_back(&self) -> Result<DrillState, NavigationError> {
        let mut state = self.state.write();
        let next = match &state.current {
            DrillState::Open(ctx) => match ctx.parent() {
                Some(parent) => DrillState::Open(parent.clone()),
                None => DrillState::Collapsed,
            },
            DrillState::Collapsed => return Err(NavigationError::NotOpen),
        };
        state.current = next.clone();
        drop(state);

        tracing::debug!("Navigated back to depth {}", next.depth());
        self.notify_subscribers();
        Ok(next)
    }

    /// Collapse unconditionally
    pub fn close(&self) {
        self.state.write().current = DrillState::Collapsed;
        tracing::debug!("Drill closed");
        self.notify_subscribers();
    }

    /// Current state
    pub fn current(&self) -> DrillState {
        self.state.read().current.clone()
    }

    /// Breadcrumb of the current path; empty when collapsed
    pub fn breadcrumb(&self) -> Breadcrumb {
        self.state
            .read()
            .current
            .context()
            .map(|ctx| ctx.breadcrumb())
            .unwrap_or_default()
    }

    pub fn depth(&self) -> usize {
        self.state.read().current.depth()
    }

    /// Add a subscriber
    pub fn add_subscriber(&self, subscriber: Arc<dyn NavigationSubscriber>) {
        let mut subscribers = self.subscribers.write();
        subscribers.push(Arc::downgrade(&subscriber));
    }

    fn validate(value: &str) -> Result<&str, NavigationError> {
        if value.trim().is_empty() {
            Err(NavigationError::EmptyValue)
        } else {
            Ok(value)
        }
    }

    /// Notify all subscribers of navigation change
    fn notify_subscribers(&self) {
        let current = self.current();

        // Collect live subscribers first so none is called under the lock
        let live: Vec<Arc<dyn NavigationSubscriber>> = {
            let mut subscribers = self.subscribers.write();
            subscribers.retain(|weak| weak.strong_count() > 0);
            subscribers.iter().filter_map(|weak| weak.upgrade()).collect()
        };

        for subscriber in live {
            subscriber.on_navigation_change(&current);
        }
    }
}
