//! Indexed read access to a block's interned strings.

/// The string table of one decoded block.
///
/// Entries are indexed 1..N; index 0 is the empty/absent sentinel and always
/// reads as `""`, as do out-of-range indices and non-UTF-8 entries.
pub struct StringTableReader {
    strings: Vec<Vec<u8>>,
}

impl StringTableReader {
    pub(crate) fn new(strings: Vec<Vec<u8>>) -> StringTableReader {
        StringTableReader { strings }
    }

    pub(crate) fn empty() -> StringTableReader {
        StringTableReader { strings: Vec::new() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    #[inline]
    pub fn get(&self, id: u32) -> &str {
        if id == 0 {
            return "";
        }

        match self.strings.get(id as usize) {
            Some(raw) => std::str::from_utf8(raw).unwrap_or(""),
            None => "",
        }
    }

    /// Linear scan for `value`, returning its id or 0 when absent.
    pub fn find(&self, value: &str) -> u32 {
        self.entries().find(|(_, s)| *s == value).map_or(0, |(id, _)| id)
    }

    /// All addressable entries with their 1-based ids.
    pub fn entries(&self) -> impl Iterator<Item = (u32, &str)> {
        self.strings
            .iter()
            .enumerate()
            .skip(1)
            .map(|(id, raw)| (id as u32, std::str::from_utf8(raw).unwrap_or("")))
    }
}
