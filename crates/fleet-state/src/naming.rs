//! Human-readable node names of the form `node-<n>`.
//!
//! The generator keeps a watermark and scans forward from it for the
//! first unassigned name. Once the watermark reaches the ceiling it wraps
//! back to the current node count, so the counter stays bounded.

use crate::error::{StateError, StateResult};

/// Highest counter value a generated name may use.
pub const NAME_CEILING: u64 = 100_000;

/// Prefix shared by all generated node names.
pub const NAME_PREFIX: &str = "node-";

/// Format the node name for counter value `n`.
pub fn node_name(n: u64) -> String {
    format!("{NAME_PREFIX}{n}")
}

/// Watermark-based node name allocator.
///
/// Not synchronized on its own: the inventory calls it under the node
/// table's write lock so reserving a name and registering the node are a
/// single step.
#[derive(Debug, Clone)]
pub struct NameGenerator {
    watermark: u64,
    ceiling: u64,
}

impl NameGenerator {
    pub fn new() -> Self {
        Self::with_ceiling(NAME_CEILING)
    }

    /// Use a custom ceiling (mainly for exercising wrap-around).
    pub fn with_ceiling(ceiling: u64) -> Self {
        Self {
            watermark: 0,
            ceiling,
        }
    }

    /// Last counter value handed out.
    pub fn watermark(&self) -> u64 {
        self.watermark
    }

    /// Reserve the next free name.
    ///
    /// `node_count` is the size of the full (unfiltered) node list and
    /// `is_taken` reports whether a name is already assigned.
    pub fn next_name(
        &mut self,
        node_count: usize,
        is_taken: impl Fn(&str) -> bool,
    ) -> StateResult<String> {
        let floor = node_count as u64;
        if self.watermark >= self.ceiling {
            self.watermark = floor;
        }

        if let Some(name) = self.scan(&is_taken) {
            return Ok(name);
        }

        // Nothing above the watermark; retry once from the node count.
        if self.watermark > floor {
            self.watermark = floor;
            if let Some(name) = self.scan(&is_taken) {
                return Ok(name);
            }
        }

        Err(StateError::NameSpaceExhausted(self.ceiling))
    }

    fn scan(&mut self, is_taken: &impl Fn(&str) -> bool) -> Option<String> {
        for n in self.watermark + 1..=self.ceiling {
            let name = node_name(n);
            if !is_taken(&name) {
                self.watermark = n;
                return Some(name);
            }
        }
        None
    }
}

impl Default for NameGenerator {
    fn default() -> Self {
        Self::new()
    }
}
