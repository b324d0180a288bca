/// One externally-sourced note attached to anchor the model's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextEntry {
    /// Storage key the note was fetched from.
    pub key: String,
    /// Prefix-stripped name shown to the user and in the context block.
    pub display_name: String,
    /// Full note contents.
    pub text: String,
}

/// The set of currently attached notes, in selection order.
///
/// Selection order is the documented concatenation order for request
/// assembly; re-attaching an already-selected key replaces its content
/// without moving it.
#[derive(Debug, Default)]
pub struct ContextStore {
    entries: Vec<ContextEntry>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a note, replacing any previous entry with the same key.
    pub fn attach(&mut self, entry: ContextEntry) {
        match self.entries.iter_mut().find(|e| e.key == entry.key) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Detach by key. Returns whether anything was removed.
    pub fn detach(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.key != key);
        before != self.entries.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|entry| entry.key == key)
    }

    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    /// Copy of the current selection, for folding into a submitted turn.
    /// Later store mutations do not affect the snapshot.
    pub fn snapshot(&self) -> Vec<ContextEntry> {
        self.entries.clone()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
