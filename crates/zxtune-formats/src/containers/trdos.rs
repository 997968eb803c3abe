//! TR-DOS file names and catalogue building shared by disk images.

use log::debug;

use super::Entry;
use crate::binary::Container;

/// Size of a TR-DOS sector.
pub(crate) const SECTOR_SIZE: usize = 256;

/// Largest file TR-DOS can describe: 255 sectors.
const MAX_FILE_SIZE: usize = 0xFF00;

/// `name.ext` for an 8-byte name and 3-byte type field.
///
/// Only the first type byte is an extension unless all three are
/// alphanumeric; the other two usually hold a load address.
pub(crate) fn file_name(name: &[u8], kind: &[u8]) -> String {
    let base: String = name
        .iter()
        .map(|&b| printable(b))
        .collect::<String>()
        .trim_end()
        .to_string();
    let ext_len = if kind.iter().all(u8::is_ascii_alphanumeric) { kind.len() } else { 1 };
    let ext: String = kind.iter().take(ext_len).map(|&b| printable(b)).collect();
    let ext = ext.trim_end();
    if ext.is_empty() {
        base
    } else {
        format!("{base}.{ext}")
    }
}

fn printable(b: u8) -> char {
    if b.is_ascii_graphic() || b == b' ' {
        b as char
    } else {
        '_'
    }
}

/// Catalogue record before merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FileRecord {
    pub name: String,
    pub offset: usize,
    pub size: usize,
}

/// Whether `next` continues `prev`.
///
/// Files above 255 sectors are split by the trackers that write them; the
/// tail parts follow immediately and either the head is a multiple of 255
/// sectors or the tail is a known `'.x` satellite.
fn mergeable(prev: &FileRecord, next: &FileRecord) -> bool {
    if prev.offset + prev.size != next.offset {
        return false;
    }
    if prev.size % MAX_FILE_SIZE == 0 {
        return true;
    }
    if !next.name.contains("'.") {
        return false;
    }
    // ProDigiTracker and DigitalStudio modules
    matches!((prev.size, next.size), (0xC300, 0xC000) | (0xF200, 0xC000))
}

/// Collects catalogue records into files with unique names.
#[derive(Debug, Default)]
pub(crate) struct CatalogueBuilder {
    files: Vec<FileRecord>,
}

impl CatalogueBuilder {
    pub fn add(&mut self, record: FileRecord) {
        if let Some(last) = self.files.last_mut() {
            if mergeable(last, &record) {
                debug!("merging '{}' into '{}'", record.name, last.name);
                last.size += record.size;
                return;
            }
        }
        let name = self.unique_name(&record.name);
        self.files.push(FileRecord { name, ..record });
    }

    fn has_file(&self, name: &str) -> bool {
        self.files.iter().any(|f| f.name == name)
    }

    fn unique_name(&self, name: &str) -> String {
        if !name.is_empty() && !self.has_file(name) {
            return name.to_string();
        }
        let (base, ext) = match name.rfind('.') {
            Some(dot) => name.split_at(dot),
            None => (name, ""),
        };
        (1..)
            .map(|idx| format!("{base}~{idx}{ext}"))
            .find(|candidate| !self.has_file(candidate))
            .unwrap_or_default()
    }

    /// Entries sharing `data`; files running past its end are truncated.
    pub fn build(self, data: &Container) -> Vec<Entry> {
        self.files
            .into_iter()
            .filter_map(|file| {
                let size = file.size.min(data.size().saturating_sub(file.offset));
                if size == 0 {
                    debug!("'{}' lies outside the image", file.name);
                    return None;
                }
                data.subcontainer(file.offset, size).map(|data| Entry { name: file.name, data })
            })
            .collect()
    }
}
