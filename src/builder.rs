use crate::store::{ArgEntry, Phase, Position, TokenStore};
use anyhow::{Result, bail};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};

/// Accumulates command-line argument entries and renders them for invocation.
///
/// A builder is created once per external-command invocation: calling code
/// adds entries incrementally, the invocation layer asks for the rendered
/// argument vector, and the builder is discarded (or [`reset`](Self::reset))
/// afterwards. There is no cross-invocation persistence.
///
/// Tokens are taken pre-split; the builder never re-tokenizes a string into
/// multiple words. Callers holding a single command-line string should split
/// it first with [`crate::split_tokens`].
///
/// Example
/// ```
/// use exec_args::{ArgsBuilder, Phase, Position};
///
/// let mut args = ArgsBuilder::new();
/// args.add(&["-resize", "100x75!"]).unwrap();
/// args.add_to(&["-hoxi", "76"], Phase::PostSource, Position::Prepend).unwrap();
/// assert_eq!(
///     args.to_debug_string(Phase::PostSource),
///     "[-hoxi] [76] [-resize] [100x75!]"
/// );
/// assert_eq!(
///     args.to_argument_vector(Phase::PostSource),
///     vec!["-hoxi", "76", "-resize", "100x75!"]
/// );
/// ```
#[derive(Debug, Default)]
pub struct ArgsBuilder {
    store: TokenStore,
}

impl ArgsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `tokens` as one entry at the end of the `PostSource` phase.
    ///
    /// Returns the builder for chaining. An empty token slice is a usage
    /// error and is rejected.
    pub fn add(&mut self, tokens: &[&str]) -> Result<&mut Self> {
        self.add_tagged(tokens, Phase::PostSource, Position::Append, HashMap::new())
    }

    /// Add `tokens` as one entry at `position` within `phase`.
    pub fn add_to(&mut self, tokens: &[&str], phase: Phase, position: Position) -> Result<&mut Self> {
        self.add_tagged(tokens, phase, position, HashMap::new())
    }

    /// Add `tokens` with an attached metadata map.
    ///
    /// Metadata is never rendered; it only serves later [`find`](Self::find)
    /// calls. The map is frozen into the entry at insertion time.
    pub fn add_tagged(
        &mut self,
        tokens: &[&str],
        phase: Phase,
        position: Position,
        metadata: HashMap<String, String>,
    ) -> Result<&mut Self> {
        if tokens.is_empty() {
            bail!("argument entry requires at least one token");
        }
        let tokens = tokens.iter().map(|t| t.to_string()).collect();
        self.store.insert(ArgEntry::new(tokens, phase, metadata), position);
        Ok(self)
    }

    /// Find entries whose space-joined token string matches `pattern`.
    ///
    /// `phase` restricts matching to one phase when given; unlike rendering,
    /// `Internal` entries are matched like any other, since lookup is an
    /// introspection operation. `metadata` restricts matches to entries whose
    /// metadata contains every given key/value pair.
    ///
    /// Results are keyed by global index, in ascending global order.
    pub fn find(
        &self,
        pattern: &Regex,
        phase: Option<Phase>,
        metadata: Option<&HashMap<String, String>>,
    ) -> BTreeMap<usize, &ArgEntry> {
        self.store
            .all()
            .filter(|(_, e)| phase.is_none_or(|p| e.phase() == p))
            .filter(|(_, e)| metadata.is_none_or(|m| e.metadata_contains(m)))
            .filter(|(_, e)| pattern.is_match(&e.joined()))
            .collect()
    }

    /// Render the given phase as a human-readable string with each token
    /// individually bracketed, e.g. `[-resize] [100x75!]`. Tokens containing
    /// spaces stay intact as one bracketed unit. Intended for logging and
    /// tests, not for invocation.
    ///
    /// `Internal` entries never appear; asking for the `Internal` phase
    /// yields an empty string.
    pub fn to_debug_string(&self, phase: Phase) -> String {
        let mut parts = Vec::new();
        for entry in self.rendered(phase) {
            for token in entry.tokens() {
                parts.push(format!("[{token}]"));
            }
        }
        parts.join(" ")
    }

    /// Render the given phase as a flat argv vector, suitable for passing
    /// directly to a process-spawn API. No quoting is applied; the child
    /// receives each token exactly as stored.
    ///
    /// `Internal` entries never appear; asking for the `Internal` phase
    /// yields an empty vector.
    pub fn to_argument_vector(&self, phase: Phase) -> Vec<String> {
        self.rendered(phase)
            .flat_map(|e| e.tokens().iter().cloned())
            .collect()
    }

    /// Iterate over `(global index, entry)` pairs in global insertion order,
    /// including `Internal` entries.
    pub fn all(&self) -> impl Iterator<Item = (usize, &ArgEntry)> {
        self.store.all()
    }

    /// Clear every entry, readying the builder for reuse.
    pub fn reset(&mut self) {
        self.store.reset();
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    fn rendered(&self, phase: Phase) -> impl Iterator<Item = &ArgEntry> {
        let order: &[usize] = match phase {
            Phase::Internal => &[],
            _ => self.store.phase_order(phase),
        };
        order.iter().filter_map(|&id| self.store.get(id))
    }
}

/// Escape `value` so that, embedded in a single shell-interpreted command
/// string, it is read back as exactly one literal token.
///
/// Prefer [`ArgsBuilder::to_argument_vector`] plus argv-style spawning where
/// possible; it sidesteps shell interpretation entirely. This helper exists
/// for callers that must hand a flat string to a shell.
pub fn escape(value: &str) -> String {
    shlex::try_quote(value)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| format!("'{}'", value.replace('\'', "'\\''")))
}
