//! Section-name to output-file mapping, shared by extraction and creation
//! so containers round-trip name-stably.

use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct SectionPathMap {
    entries: BTreeMap<String, String>,
}

impl Default for SectionPathMap {
    fn default() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert("banner".to_owned(), "banner.bnr".to_owned());
        entries.insert("icon".to_owned(), "icon.icn".to_owned());
        entries.insert("logo".to_owned(), "logo.bcma.lz".to_owned());
        Self { entries }
    }
}

impl SectionPathMap {
    pub fn empty() -> Self {
        Self { entries: BTreeMap::new() }
    }

    pub fn with_entry(mut self, name: &str, file_name: &str) -> Self {
        self.entries.insert(name.to_owned(), file_name.to_owned());
        self
    }

    /// Resolve a section name to its output file name. The second value is
    /// false when the name is not a well-known one and fell back to
    /// `<name>.bin`; callers may want to note that.
    pub fn resolve(&self, name: &str, index: usize) -> (String, bool) {
        if let Some(mapped) = self.entries.get(name) {
            (mapped.clone(), true)
        } else if index == 0 {
            ("code.bin".to_owned(), true)
        } else {
            (format!("{name}.bin"), false)
        }
    }
}
