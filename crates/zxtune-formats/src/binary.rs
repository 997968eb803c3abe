//! Immutable, shareable byte containers.

use std::fmt;
use std::sync::Arc;

/// Reference-counted view over a byte buffer.
///
/// Subcontainers share the parent storage; no bytes are copied.
#[derive(Clone)]
pub struct Container {
    storage: Arc<[u8]>,
    offset: usize,
    size: usize,
}

impl Container {
    /// Wrap owned bytes.
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        let storage = data.into();
        let size = storage.len();
        Self {
            storage,
            offset: 0,
            size,
        }
    }

    /// Copy a slice into a new container.
    pub fn from_slice(data: &[u8]) -> Self {
        Self::new(data.to_vec())
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// True for zero-sized containers.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Viewed bytes.
    pub fn data(&self) -> &[u8] {
        &self.storage[self.offset..self.offset + self.size]
    }

    /// Range `offset..offset+size` of this container, `None` when out of bounds.
    pub fn subcontainer(&self, offset: usize, size: usize) -> Option<Container> {
        let end = offset.checked_add(size)?;
        (end <= self.size).then(|| Container {
            storage: Arc::clone(&self.storage),
            offset: self.offset + offset,
            size,
        })
    }

    /// Everything from `offset` to the end.
    pub fn tail(&self, offset: usize) -> Option<Container> {
        self.subcontainer(offset, self.size.checked_sub(offset)?)
    }
}

impl AsRef<[u8]> for Container {
    fn as_ref(&self) -> &[u8] {
        self.data()
    }
}

impl From<Vec<u8>> for Container {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("offset", &self.offset)
            .field("size", &self.size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subcontainer_shares_storage() {
        let parent = Container::new(vec![1u8, 2, 3, 4, 5]);
        let sub = parent.subcontainer(1, 3).expect("in range");
        assert_eq!(sub.data(), &[2, 3, 4]);
        let nested = sub.subcontainer(1, 2).expect("in range");
        assert_eq!(nested.data(), &[3, 4]);
        assert!(Arc::ptr_eq(&parent.storage, &nested.storage));
    }

    #[test]
    fn test_subcontainer_bounds() {
        let parent = Container::new(vec![0u8; 4]);
        assert!(parent.subcontainer(2, 3).is_none());
        assert!(parent.subcontainer(usize::MAX, 2).is_none());
        assert_eq!(parent.tail(4).map(|c| c.size()), Some(0));
        assert!(parent.tail(5).is_none());
    }
}
