//! Move-to-front tables for location strings.
//!
//! The writer and the reader each hold one table per string kind (file path,
//! definition name). Both start from the same placeholder contents and apply
//! the same shifts, so an index written on one side always resolves to the
//! same string on the other.

prelude! {}

/// Number of entries in an MTF table.
pub const TABLE_LEN: usize = 15;

/// On-wire marker announcing a literal string instead of a table index.
pub const LITERAL_IDX: u8 = 31;

/// Initial contents of every MTF table.
///
/// Fifteen distinct strings; encoder and decoder must start from the same
/// ones so that their shifts stay synchronized.
const PLACEHOLDERS: [&str; TABLE_LEN] = [
    "!0", "!1", "!2", "!3", "!4", "!5", "!6", "!7", "!8", "!9", "!10", "!11", "!12", "!13", "!14",
];

/// A move-to-front table.
///
/// `S` is `String` on the writer side and `&str` borrowing the input bytes on
/// the reader side.
#[derive(Debug, Clone)]
pub struct MtfTable<S> {
    /// Table entries, most recent first.
    ///
    /// **Always has length [`TABLE_LEN`].**
    slots: Vec<S>,
}

impl<S> MtfTable<S>
where
    S: Borrow<str>,
{
    /// Moves the entry at `idx` to the front and returns it.
    ///
    /// Fails with `BadFormat` when `idx` is not a legal table index; callers
    /// are expected to have handled the literal marker beforehand.
    pub fn decode(&mut self, idx: u8) -> Res<S>
    where
        S: Clone,
    {
        format_check((idx as usize) < TABLE_LEN, || {
            format!("illegal MTF index {}, expected 0..{}", idx, TABLE_LEN)
        })?;
        let entry = self.slots.remove(idx as usize);
        self.slots.insert(0, entry.clone());
        debug_assert_eq!(self.slots.len(), TABLE_LEN);
        Ok(entry)
    }

    /// Installs a literal string at the front of the table.
    ///
    /// Shifts all entries down one slot; the last one falls off.
    pub fn install_new(&mut self, s: S) {
        self.slots.insert(0, s);
        self.slots.truncate(TABLE_LEN);
        debug_assert_eq!(self.slots.len(), TABLE_LEN);
    }

    /// Entry at some index, test-only inspection.
    #[cfg(test)]
    pub fn slot(&self, idx: usize) -> &str {
        self.slots[idx].borrow()
    }
}

impl MtfTable<String> {
    /// Writer-side constructor.
    pub fn new() -> Self {
        Self {
            slots: PLACEHOLDERS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Encodes a string.
    ///
    /// Returns the index the string was found at *before* promotion, or
    /// `None` when the string was absent, in which case it has been
    /// installed at the front exactly like [`install_new`] on the decoder
    /// side (all entries shift, the last one falls off).
    ///
    /// [`install_new`]: struct.MtfTable.html#method.install_new (install_new method)
    pub fn encode(&mut self, s: &str) -> Option<u8> {
        match self.slots.iter().position(|entry| entry.as_str() == s) {
            Some(idx) => {
                let entry = self.slots.remove(idx);
                self.slots.insert(0, entry);
                debug_assert_eq!(self.slots.len(), TABLE_LEN);
                Some(idx as u8)
            }
            None => {
                self.install_new(s.to_string());
                None
            }
        }
    }
}

impl<'data> MtfTable<&'data str> {
    /// Reader-side constructor.
    pub fn new_borrowed() -> Self {
        Self {
            slots: PLACEHOLDERS.to_vec(),
        }
    }
}
