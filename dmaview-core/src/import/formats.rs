//! Accumulated (format, modifier) advertisement

use std::collections::{BTreeMap, BTreeSet};

use crate::formats::{MOD_LINEAR, fourcc_to_string};

/// Format -> modifiers the compositor accepts
///
/// A set per format, so the result does not depend on the order the
/// compositor sends its events in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatTable {
    entries: BTreeMap<u32, BTreeSet<u64>>,
}

impl FormatTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pair; returns false if it was already known
    pub fn insert(&mut self, format: u32, modifier: u64) -> bool {
        self.entries.entry(format).or_default().insert(modifier)
    }

    pub fn supports(&self, format: u32, modifier: u64) -> bool {
        self.entries
            .get(&format)
            .is_some_and(|mods| mods.contains(&modifier))
    }

    /// Formats usable with untiled buffers
    pub fn linear_formats(&self) -> Vec<u32> {
        self.entries
            .iter()
            .filter(|(_, mods)| mods.contains(&MOD_LINEAR))
            .map(|(format, _)| *format)
            .collect()
    }

    /// Number of distinct formats
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One line per format, for `--list-formats`
    pub fn describe(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(format, mods)| {
                let mods: Vec<String> = mods.iter().map(|m| format!("{:#018x}", m)).collect();
                format!("{} ({:#010x}): {}", fourcc_to_string(*format), format, mods.join(", "))
            })
            .collect()
    }
}
