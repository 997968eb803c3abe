//! Composite files holding other files.
//!
//! An [`Archive`] splits its data into named [`Entry`] items; the registry
//! re-detects every entry, so containers nest freely (`disk.trd?tune.$c`).

use crate::binary::Container;
use crate::error::Result;

pub mod hobeta;
pub mod hrip;
pub mod raw;
pub mod scl;
pub mod trd;
mod trdos;

/// Named file extracted from a container.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Name used as a subpath component
    pub name: String,
    /// File contents
    pub data: Container,
}

/// Container format.
pub trait Archive: Send + Sync {
    /// Cheap structural test.
    fn check(&self, data: &[u8]) -> bool;

    /// Every file of the container, in catalogue order.
    ///
    /// Broken entries are skipped with a warning; only an unreadable
    /// catalogue fails.
    fn entries(&self, data: &Container) -> Result<Vec<Entry>>;

    /// File named `name`, if any.
    fn find(&self, data: &Container, name: &str) -> Result<Option<Container>> {
        Ok(self
            .entries(data)?
            .into_iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.data))
    }
}
