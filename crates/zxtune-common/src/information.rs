//! Module information: free-form properties plus playback statistics.

use crate::FRAME_RATE_PAL;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known property names.
pub mod attributes {
    /// Format identifier of the innermost player ("PT3", "STC", ...)
    pub const TYPE: &str = "Type";
    /// Module title
    pub const TITLE: &str = "Title";
    /// Module author
    pub const AUTHOR: &str = "Author";
    /// Tracker that produced the module
    pub const PROGRAM: &str = "Program";
    /// Chain of containers the module was extracted from (`TRD=>HRIP`)
    pub const CONTAINER: &str = "Container";
    /// Name of the innermost file
    pub const FILENAME: &str = "Filename";
    /// Full module path including subpaths
    pub const PATH: &str = "Path";
    /// Diagnostics collected while decoding, one per line
    pub const WARNINGS: &str = "Warnings";
    /// Playable entries of a multitrack container, one per line
    pub const SUBMODULES: &str = "Submodules";
    /// Format version
    pub const VERSION: &str = "Version";
    /// Free comment
    pub const COMMENT: &str = "Comment";

    /// Separator used when chaining container names.
    pub const CONTAINER_DELIMITER: &str = "=>";
}

/// Numeric statistics collected while decoding and during the timing dry run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModuleStatistics {
    /// Entries in the position list
    pub positions: usize,
    /// Decoded patterns
    pub patterns: usize,
    /// Logical channels
    pub channels: usize,
    /// Initial frames per line
    pub tempo: usize,
    /// Total frames until the end of the position list
    pub frames: usize,
    /// Index of the loop position
    pub loop_position: usize,
    /// Frame at which the loop position starts
    pub loop_frame: usize,
}

/// Information block attached to every player.
///
/// Property keys are unique; setting an existing key replaces its value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Information {
    /// Free-form properties
    pub properties: BTreeMap<String, String>,
    /// Numeric statistics
    pub statistics: ModuleStatistics,
}

impl Information {
    /// Create an empty information block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create information carrying only a type identifier.
    pub fn with_type(type_id: &str) -> Self {
        let mut info = Self::new();
        info.set(attributes::TYPE, type_id);
        info
    }

    /// Set or replace a property. Empty values remove the property.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() {
            self.properties.remove(key);
        } else {
            self.properties.insert(key.to_string(), value);
        }
    }

    /// Read a property.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Prepend a container name to the container chain.
    pub fn push_container(&mut self, container: &str) {
        let chain = match self.get(attributes::CONTAINER) {
            Some(inner) => format!("{}{}{}", container, attributes::CONTAINER_DELIMITER, inner),
            None => container.to_string(),
        };
        self.set(attributes::CONTAINER, chain);
    }

    /// Warnings recorded for the module.
    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.get(attributes::WARNINGS).into_iter().flat_map(str::lines)
    }

    /// Submodule paths of a multitrack container.
    pub fn submodules(&self) -> impl Iterator<Item = &str> {
        self.get(attributes::SUBMODULES).into_iter().flat_map(str::lines)
    }
}

/// Read access to the well-known properties and timing of a module.
///
/// Implementors provide raw property lookup and statistics; every named
/// field derives from those two.
pub trait MetadataFields {
    /// Property by key.
    fn property(&self, key: &str) -> Option<&str>;

    /// Decoding statistics.
    fn module_statistics(&self) -> &ModuleStatistics;

    /// Module title, empty when unknown.
    fn title(&self) -> &str {
        self.property(attributes::TITLE).unwrap_or("")
    }

    /// Author, empty when unknown.
    fn author(&self) -> &str {
        self.property(attributes::AUTHOR).unwrap_or("")
    }

    /// Editor that produced the module, empty when unknown.
    fn program(&self) -> &str {
        self.property(attributes::PROGRAM).unwrap_or("")
    }

    /// Format identifier (`PT3`, `STC`, `TRD`...).
    fn format(&self) -> &str {
        self.property(attributes::TYPE).unwrap_or("")
    }

    /// Frames until the end, `None` for containers.
    fn frame_count(&self) -> Option<usize> {
        let frames = self.module_statistics().frames;
        (frames != 0).then_some(frames)
    }

    /// First frame of the loop.
    fn loop_frame(&self) -> Option<usize> {
        self.frame_count().map(|_| self.module_statistics().loop_frame)
    }

    /// Length at the 50Hz interrupt rate.
    fn duration_seconds(&self) -> Option<f32> {
        self.frame_count().map(|frames| frames as f32 / FRAME_RATE_PAL as f32)
    }
}

impl MetadataFields for Information {
    fn property(&self, key: &str) -> Option<&str> {
        self.get(key)
    }

    fn module_statistics(&self) -> &ModuleStatistics {
        &self.statistics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties_are_unique() {
        let mut info = Information::with_type("PT3");
        info.set(attributes::TITLE, "first");
        info.set(attributes::TITLE, "second");
        assert_eq!(info.title(), "second");
        assert_eq!(info.properties.len(), 2);
        info.set(attributes::TITLE, "");
        assert_eq!(info.get(attributes::TITLE), None);
    }

    #[test]
    fn test_container_chain() {
        let mut info = Information::with_type("PT2");
        info.push_container("HRIP");
        info.push_container("TRD");
        assert_eq!(info.get(attributes::CONTAINER), Some("TRD=>HRIP"));
    }

    #[test]
    fn test_duration() {
        let mut info = Information::with_type("STC");
        assert_eq!(info.duration_seconds(), None);
        info.statistics.frames = 500;
        assert_eq!(info.duration_seconds(), Some(10.0));
        assert_eq!(info.format(), "STC");
        info.statistics.loop_frame = 100;
        assert_eq!(info.loop_frame(), Some(100));
        assert_eq!(info.program(), "");
        info.set(attributes::PROGRAM, "Sound Tracker");
        assert_eq!(info.program(), "Sound Tracker");
    }

    #[test]
    fn test_serialize_roundtrip_keeps_statistics() {
        let mut info = Information::with_type("ASC");
        info.statistics.positions = 3;
        let json = serde_json::to_string(&info).expect("serializable");
        let back: Information = serde_json::from_str(&json).expect("deserializable");
        assert_eq!(back, info);
    }
}
