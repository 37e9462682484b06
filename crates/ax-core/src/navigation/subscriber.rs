//! Navigation subscriber trait

use super::DrillState;

/// Trait for components that need to respond to drill transitions
pub trait NavigationSubscriber: Send + Sync {
    /// Called after every transition, with the state just entered
    fn on_navigation_change(&self, state: &DrillState);
}
