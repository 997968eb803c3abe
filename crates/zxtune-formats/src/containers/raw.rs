//! Scanner for modules embedded at arbitrary offsets.
//!
//! Memory dumps and executables often carry a module somewhere in the
//! middle. Entries are named `+<offset>`.

use log::debug;

use super::Entry;
use crate::binary::Container;

/// Format identifier.
pub const ID: &str = "RAW";

/// Leading character of scanner subpaths.
pub const PREFIX: char = '+';

/// Subpath component for a module at `offset`.
pub fn subpath(offset: usize) -> String {
    format!("{PREFIX}{offset}")
}

/// Offset named by a `+<offset>` component.
pub fn parse_subpath(component: &str) -> Option<usize> {
    component.strip_prefix(PREFIX)?.parse().ok()
}

/// Data starting at the offset named by `component`.
pub fn find(data: &Container, component: &str) -> Option<Container> {
    parse_subpath(component).and_then(|offset| data.tail(offset))
}

/// Every module found by `probe`, which returns the size of a module
/// starting at the beginning of its argument.
///
/// Scanning resumes right after each module found.
pub fn scan<F>(data: &Container, mut probe: F) -> Vec<Entry>
where
    F: FnMut(&[u8]) -> Option<usize>,
{
    let mut entries = Vec::new();
    let mut offset = 0;
    while offset < data.size() {
        let rest = &data.data()[offset..];
        match probe(rest) {
            Some(size) => {
                let size = size.clamp(1, rest.len());
                debug!("RAW: {size} bytes module at 0x{offset:x}");
                if let Some(module) = data.subcontainer(offset, size) {
                    entries.push(Entry {
                        name: subpath(offset),
                        data: module,
                    });
                }
                offset += size;
            }
            None => offset += 1,
        }
    }
    entries
}
