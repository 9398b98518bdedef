//! The deduplicating output string interner.

use rustc_hash::FxHashMap;

use crate::model;

/// Assigns dense 1-based ids to strings in insertion order. The empty
/// string always interns to 0 and is never stored; id 0 is the on-wire
/// empty sentinel.
#[derive(Default)]
pub struct StringTableBuilder {
    ids: FxHashMap<String, u32>,
    entries: Vec<String>,
}

impl StringTableBuilder {
    pub fn new() -> StringTableBuilder {
        StringTableBuilder::default()
    }

    pub fn intern(&mut self, value: &str) -> u32 {
        if value.is_empty() {
            return 0;
        }

        if let Some(&id) = self.ids.get(value) {
            return id;
        }

        let id = (self.entries.len() + 1) as u32;
        self.entries.push(value.to_owned());
        self.ids.insert(value.to_owned(), id);
        id
    }

    /// Number of interned strings, the empty sentinel excluded.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Produces the on-wire table (leading empty entry, then interned
    /// strings in id order) and the remap array with
    /// `remap[interned_id] = on_wire_id`. The encoder rewrites every
    /// surviving tag id through the remap at flush; the indirection is what
    /// keeps wire ids dense after flush-time cleanup. The builder is left
    /// empty.
    pub fn finalize(&mut self) -> (model::StringTable, Vec<u32>) {
        let mut remap = vec![0_u32; self.entries.len() + 1];
        let mut table = model::StringTable {
            s: Vec::with_capacity(self.entries.len() + 1),
        };
        table.s.push(Vec::new());

        for (offset, value) in self.entries.drain(..).enumerate() {
            remap[offset + 1] = table.s.len() as u32;
            table.s.push(value.into_bytes());
        }

        self.ids.clear();
        (table, remap)
    }
}
