use std::collections::HashMap;

/// Classifies where (and whether) an argument entry appears in rendered output.
///
/// Rendering groups entries by phase: `PreSource` entries belong before the
/// input operand on the final command line, `PostSource` entries after it.
/// `Internal` entries are bookkeeping only; they are visible to lookup
/// operations but excluded from every rendered form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    PreSource,
    PostSource,
    Internal,
}

/// Logical position of a new entry among its phase's siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Insert before all existing entries of the phase.
    Prepend,
    /// Insert after all existing entries of the phase.
    Append,
    /// Insert at the given index, shifting entries at that index and after it
    /// one slot to the right. An index past the end is clamped to the end.
    At(usize),
}

/// One argument-builder insertion: an ordered run of tokens plus its phase and
/// an optional metadata map attached at insertion time.
///
/// Metadata is immutable once the entry is stored; it exists only for lookup
/// and filtering and is never rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgEntry {
    tokens: Vec<String>,
    phase: Phase,
    metadata: HashMap<String, String>,
}

impl ArgEntry {
    pub(crate) fn new(tokens: Vec<String>, phase: Phase, metadata: HashMap<String, String>) -> Self {
        Self {
            tokens,
            phase,
            metadata,
        }
    }

    /// The tokens contributed by this entry, in order.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// The phase this entry was inserted into.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The metadata map attached at insertion time.
    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// All tokens joined with single spaces, the form pattern matching runs against.
    pub(crate) fn joined(&self) -> String {
        self.tokens.join(" ")
    }

    /// True when every key/value pair of `filter` is present in this entry's metadata.
    pub(crate) fn metadata_contains(&self, filter: &HashMap<String, String>) -> bool {
        filter
            .iter()
            .all(|(k, v)| self.metadata.get(k) == Some(v))
    }
}

/// Ordered collection of [`ArgEntry`] records for one builder instance.
///
/// Entries live in an append-only arena whose index doubles as the entry's
/// stable global identifier, assigned in insertion call order. Render order is
/// kept separately as one list of arena indices per phase, so positional
/// insertion never renumbers stored entries and lookups by global index stay
/// cheap.
#[derive(Debug, Default)]
pub struct TokenStore {
    entries: Vec<ArgEntry>,
    pre_source: Vec<usize>,
    post_source: Vec<usize>,
    internal: Vec<usize>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `entry` at `position` within its phase and return the assigned
    /// global index.
    ///
    /// Within a phase, inserting at index `i` shifts the entries currently at
    /// `i` and after it one slot to the right, so repeated inserts at the same
    /// index leave the latest insert first. Out-of-range indices are clamped
    /// to the end of the phase list.
    pub fn insert(&mut self, entry: ArgEntry, position: Position) -> usize {
        let id = self.entries.len();
        let order = self.order_mut(entry.phase());
        let slot = match position {
            Position::Prepend => 0,
            Position::Append => order.len(),
            Position::At(i) => i.min(order.len()),
        };
        order.insert(slot, id);
        self.entries.push(entry);
        id
    }

    /// Clear all entries, returning the store to its initial empty state.
    /// Global indices restart from zero afterwards.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.pre_source.clear();
        self.post_source.clear();
        self.internal.clear();
    }

    /// Iterate over `(global index, entry)` pairs in global insertion order.
    pub fn all(&self) -> impl Iterator<Item = (usize, &ArgEntry)> {
        self.entries.iter().enumerate()
    }

    /// Look up a single entry by its global index.
    pub fn get(&self, id: usize) -> Option<&ArgEntry> {
        self.entries.get(id)
    }

    /// Number of entries currently stored, across all phases.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Global indices of the given phase's entries, in render order.
    pub(crate) fn phase_order(&self, phase: Phase) -> &[usize] {
        match phase {
            Phase::PreSource => &self.pre_source,
            Phase::PostSource => &self.post_source,
            Phase::Internal => &self.internal,
        }
    }

    fn order_mut(&mut self, phase: Phase) -> &mut Vec<usize> {
        match phase {
            Phase::PreSource => &mut self.pre_source,
            Phase::PostSource => &mut self.post_source,
            Phase::Internal => &mut self.internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(tokens: &[&str], phase: Phase) -> ArgEntry {
        ArgEntry::new(
            tokens.iter().map(|t| t.to_string()).collect(),
            phase,
            HashMap::new(),
        )
    }

    #[test]
    fn insert_assigns_global_indices_in_call_order() {
        let mut store = TokenStore::new();
        let a = store.insert(entry(&["-a"], Phase::PostSource), Position::Append);
        let b = store.insert(entry(&["-b"], Phase::PreSource), Position::Append);
        let c = store.insert(entry(&["-c"], Phase::Internal), Position::Append);
        assert_eq!((a, b, c), (0, 1, 2));
    }

    #[test]
    fn all_yields_global_order_regardless_of_phase_positions() {
        let mut store = TokenStore::new();
        store.insert(entry(&["-a"], Phase::PostSource), Position::Append);
        store.insert(entry(&["-b"], Phase::PostSource), Position::Prepend);
        let ids: Vec<usize> = store.all().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![0, 1]);
        // Render order within the phase is the reverse of global order here.
        assert_eq!(store.phase_order(Phase::PostSource), &[1, 0]);
    }

    #[test]
    fn insert_at_index_pushes_existing_entries_right() {
        let mut store = TokenStore::new();
        store.insert(entry(&["first"], Phase::PostSource), Position::Append);
        store.insert(entry(&["second"], Phase::PostSource), Position::Append);
        store.insert(entry(&["wedged"], Phase::PostSource), Position::At(1));
        assert_eq!(store.phase_order(Phase::PostSource), &[0, 2, 1]);
    }

    #[test]
    fn repeated_insert_at_same_index_keeps_latest_first() {
        let mut store = TokenStore::new();
        store.insert(entry(&["older"], Phase::PostSource), Position::At(0));
        store.insert(entry(&["newer"], Phase::PostSource), Position::At(0));
        assert_eq!(store.phase_order(Phase::PostSource), &[1, 0]);
    }

    #[test]
    fn out_of_range_index_clamps_to_end() {
        let mut store = TokenStore::new();
        store.insert(entry(&["-a"], Phase::PostSource), Position::Append);
        store.insert(entry(&["-b"], Phase::PostSource), Position::At(99));
        assert_eq!(store.phase_order(Phase::PostSource), &[0, 1]);
    }

    #[test]
    fn phases_keep_independent_orderings() {
        let mut store = TokenStore::new();
        store.insert(entry(&["post"], Phase::PostSource), Position::Append);
        store.insert(entry(&["pre"], Phase::PreSource), Position::Append);
        store.insert(entry(&["pre2"], Phase::PreSource), Position::Prepend);
        assert_eq!(store.phase_order(Phase::PreSource), &[2, 1]);
        assert_eq!(store.phase_order(Phase::PostSource), &[0]);
    }

    #[test]
    fn reset_is_idempotent_and_restarts_indices() {
        let mut store = TokenStore::new();
        store.insert(entry(&["-a"], Phase::PostSource), Position::Append);
        store.insert(entry(&["-b"], Phase::Internal), Position::Append);

        store.reset();
        assert!(store.is_empty());
        assert_eq!(store.all().count(), 0);

        store.reset();
        assert_eq!(store.all().count(), 0);

        let id = store.insert(entry(&["-c"], Phase::PostSource), Position::Append);
        assert_eq!(id, 0);
    }

    #[test]
    fn metadata_contains_requires_full_superset() {
        let mut meta = HashMap::new();
        meta.insert("foo".to_string(), "bar".to_string());
        meta.insert("qux".to_string(), "der".to_string());
        let e = ArgEntry::new(vec!["-x".to_string()], Phase::PostSource, meta);

        let mut filter = HashMap::new();
        filter.insert("foo".to_string(), "bar".to_string());
        assert!(e.metadata_contains(&filter));

        filter.insert("missing".to_string(), "v".to_string());
        assert!(!e.metadata_contains(&filter));

        let mut wrong_value = HashMap::new();
        wrong_value.insert("foo".to_string(), "nope".to_string());
        assert!(!e.metadata_contains(&wrong_value));
    }
}
