//! Core functionality for the award explorer
//!
//! This crate provides the dimension model, the drill navigation stack, tab
//! state, and the debounce scheduler shared by the data layer and the views.

pub mod dimension;
pub mod events;
pub mod navigation;
pub mod schedule;
pub mod state;

// Re-export commonly used types
pub use dimension::Dimension;
pub use navigation::{
    Breadcrumb, Crumb, DrillNavigator, DrillState, FilterContext,
    NavigationError, NavigationSubscriber,
};
pub use schedule::{Debouncer, DEFAULT_QUIET_PERIOD};
pub use state::{
    ContractsTabState, Generation, Pager, RelatedEntity, Row,
    SortDirection, SortOrder, TabKind, TabState,
};
