//! Layout and partial nesting

use crate::error::TemplateError;

/// Keys of the templates currently rendering, outermost first.
///
/// Each nested layout or partial extends a copy of its parent's chain, so
/// sibling renders never see each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderChain {
    keys: Vec<String>,
    max_depth: usize,
}

impl RenderChain {
    pub fn new(max_depth: usize) -> Self {
        Self {
            keys: Vec::new(),
            max_depth,
        }
    }

    /// The chain extended with `key`.
    ///
    /// Fails with `LayoutCycle` when `key` is already rendering and with
    /// `LayoutDepthExceeded` when the chain is full. Both report the chain
    /// including `key`.
    pub fn enter(&self, key: &str) -> Result<RenderChain, TemplateError> {
        if self.contains(key) {
            let mut chain = self.keys.clone();
            chain.push(key.to_string());
            return Err(TemplateError::LayoutCycle { chain });
        }
        self.enter_partial(key)
    }

    /// The chain extended with a partial `key`.
    ///
    /// Partials may include themselves, so only the depth limit applies.
    pub fn enter_partial(&self, key: &str) -> Result<RenderChain, TemplateError> {
        let mut keys = self.keys.clone();
        keys.push(key.to_string());

        if self.keys.len() >= self.max_depth {
            return Err(TemplateError::LayoutDepthExceeded {
                chain: keys,
                max_depth: self.max_depth,
            });
        }
        Ok(Self {
            keys,
            max_depth: self.max_depth,
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn depth(&self) -> usize {
        self.keys.len()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}
