//! Drill navigation: the stack of filter contexts a user has opened

mod context;
mod engine;
mod subscriber;

pub use context::{Breadcrumb, Crumb, FilterContext};
pub use engine::DrillNavigator;
pub use subscriber::NavigationSubscriber;

use std::sync::Arc;

/// Where the navigator currently stands
#[derive(Debug, Clone, Default)]
pub enum DrillState {
    /// No drill is open
    #[default]
    Collapsed,
    /// A drill is open on the given context
    Open(Arc<FilterContext>),
}

impl DrillState {
    /// The open context, if any
    pub fn context(&self) -> Option<&Arc<FilterContext>> {
        match self {
            DrillState::Collapsed => None,
            DrillState::Open(ctx) => Some(ctx),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, DrillState::Open(_))
    }

    /// Nesting depth; zero when collapsed
    pub fn depth(&self) -> usize {
        self.context().map(|ctx| ctx.depth()).unwrap_or(0)
    }
}

/// Errors reported by navigation transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NavigationError {
    #[error("no drill is open")]
    NotOpen,

    #[error("cannot drill on an empty value")]
    EmptyValue,
}
