//! URL fragment sync
//!
//! The current step is mirrored in the URL fragment as `#step=<name>`.
//! Forward transitions push a new entry; back/forward navigation is fed
//! into the controller with [`FormSteps::on_history_pop`](super::FormSteps::on_history_pop).

const STEP_PARAM: &str = "step";

pub trait History: Send + Sync {
    /// Add an entry with the given fragment, or no fragment
    fn push(&mut self, fragment: Option<String>);

    /// Replace the current entry's fragment
    fn replace(&mut self, fragment: Option<String>);

    /// Fragment of the current entry
    fn current(&self) -> Option<String>;
}

pub fn step_fragment(step: &str) -> String {
    format!("#{}={}", STEP_PARAM, step)
}

/// Step name carried by a fragment, with or without the leading `#`
pub fn parse_step_fragment(fragment: &str) -> Option<&str> {
    let fragment = fragment.strip_prefix('#').unwrap_or(fragment);
    fragment
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == STEP_PARAM)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

/// In-process history stack
#[derive(Debug, Clone)]
pub struct MemoryHistory {
    entries: Vec<Option<String>>,
    index: usize,
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self {
            entries: vec![None],
            index: 0,
        }
    }
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a pre-existing fragment, as when a page is reloaded
    pub fn with_fragment(fragment: &str) -> Self {
        Self {
            entries: vec![Some(fragment.to_string())],
            index: 0,
        }
    }

    /// Move back one entry, returning the fragment to hand to the controller
    pub fn back(&mut self) -> Option<Option<String>> {
        if self.index == 0 {
            return None;
        }
        self.index -= 1;
        Some(self.entries[self.index].clone())
    }

    pub fn forward(&mut self) -> Option<Option<String>> {
        if self.index + 1 >= self.entries.len() {
            return None;
        }
        self.index += 1;
        Some(self.entries[self.index].clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl History for MemoryHistory {
    fn push(&mut self, fragment: Option<String>) {
        self.entries.truncate(self.index + 1);
        self.entries.push(fragment);
        self.index = self.entries.len() - 1;
    }

    fn replace(&mut self, fragment: Option<String>) {
        self.entries[self.index] = fragment;
    }

    fn current(&self) -> Option<String> {
        self.entries[self.index].clone()
    }
}
