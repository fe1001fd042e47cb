//! Module inventory entries.
//!
//! Clients report entries as `id:version` composites. Policy cares
//! only about the id; signatures cover the raw entry, so both forms
//! are kept.

/// One reported module entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModEntry {
    /// Full entry as reported, e.g. `fabricloader:0.15.11`.
    pub raw: String,
    /// Identifier before the first `:`; the whole entry if none.
    pub id: String,
}

impl ModEntry {
    /// Split a composite entry into id and raw form.
    pub fn parse(entry: &str) -> ModEntry {
        let id = match entry.find(':') {
            Some(i) => &entry[..i],
            None => entry,
        };
        ModEntry {
            raw: entry.to_string(),
            id: id.to_string(),
        }
    }
}

/// Strip versions from a raw entry list, keeping only non-empty ids.
pub fn strip_versions(entries: &[String]) -> Vec<String> {
    entries
        .iter()
        .map(|e| ModEntry::parse(e).id)
        .filter(|id| !id.is_empty())
        .collect()
}
