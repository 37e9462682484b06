use std::fmt;
use std::sync::Arc;
use serde::{Serialize, Deserialize};

use crate::dimension::Dimension;

/// One level of a drill path.
///
/// Contexts are immutable and only ever built from an existing chain, so the
/// parent links cannot form a cycle.
#[derive(Debug)]
pub struct FilterContext {
    source_dimension: Dimension,
    source_value: String,
    parent: Option<Arc<FilterContext>>,
    depth: usize,
}

impl FilterContext {
    /// Start a new drill path
    pub fn root(dimension: Dimension, value: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            source_dimension: dimension,
            source_value: value.into(),
            parent: None,
            depth: 1,
        })
    }

    /// Nest one level below `parent`
    pub fn child(parent: &Arc<FilterContext>, dimension: Dimension, value: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            source_dimension: dimension,
            source_value: value.into(),
            parent: Some(parent.clone()),
            depth: parent.depth + 1,
        })
    }

    pub fn source_dimension(&self) -> Dimension {
        self.source_dimension
    }

    pub fn source_value(&self) -> &str {
        &self.source_value
    }

    pub fn parent(&self) -> Option<&Arc<FilterContext>> {
        self.parent.as_ref()
    }

    /// Number of contexts on the path, this one included
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Walk from this context up to the root
    pub fn ancestors(&self) -> impl Iterator<Item = &FilterContext> {
        std::iter::successors(Some(self), |ctx| ctx.parent.as_deref())
    }

    /// Root-first path leading to this context
    pub fn breadcrumb(&self) -> Breadcrumb {
        let mut crumbs: Vec<Crumb> = self
            .ancestors()
            .map(|ctx| Crumb {
                dimension: ctx.source_dimension,
                value: ctx.source_value.clone(),
            })
            .collect();
        crumbs.reverse();
        Breadcrumb(crumbs)
    }
}

/// A single `(dimension, value)` step of a breadcrumb
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crumb {
    pub dimension: Dimension,
    pub value: String,
}

/// Root-first drill path, derived on demand from a [`FilterContext`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadcrumb(Vec<Crumb>);

impl Breadcrumb {
    pub fn crumbs(&self) -> &[Crumb] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Crumb> {
        self.0.iter()
    }

    /// The accumulated equality filters, in drill order
    pub fn filters(&self) -> Vec<(Dimension, String)> {
        self.0.iter().map(|c| (c.dimension, c.value.clone())).collect()
    }
}

impl fmt::Display for Breadcrumb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, crumb) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(" > ")?;
            }
            write!(f, "{}: {}", crumb.dimension.label(), crumb.value)?;
        }
        Ok(())
    }
}
