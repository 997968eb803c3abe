//! Ordered list of format handlers and recursive module detection.
//!
//! Handlers are kept sorted by priority. Containers (0..=19) come before
//! players (20 and up) so composite files are unwrapped before leaf formats
//! get a chance to claim them.

use bitflags::bitflags;
use log::{debug, trace};

use crate::binary::Container;
use crate::containers::{hobeta, hrip, raw, scl, trd, Archive};
use crate::error::{FormatError, Result};
use crate::formats::{asc, chi, pdt, psg, pt2, pt3, stc, stp, ts, Decoded};
use crate::module::Module;
use crate::path;
use zxtune_common::attributes;

/// Deepest container nesting followed.
const MAX_DEPTH: usize = 8;

bitflags! {
    /// What a handler is and which device its players drive.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u32 {
        /// Holds several files
        const MULTITRACK = 1 << 0;
        /// Holds exactly one file, unwrapped transparently
        const WRAPPER = 1 << 1;
        /// Finds modules at arbitrary offsets
        const SCANNER = 1 << 2;
        /// Decodes a playable module
        const PLAYER = 1 << 8;
        /// Single AY/YM chip
        const DEVICE_AYM = 1 << 9;
        /// Two AY/YM chips
        const DEVICE_TURBOSOUND = 1 << 10;
        /// Digital sample player
        const DEVICE_DAC = 1 << 11;
    }
}

/// Player format entry points.
pub type CheckFn = fn(&[u8]) -> bool;
/// Player factory.
pub type CreateFn = fn(&[u8]) -> Result<Decoded>;

/// How a descriptor handles data.
pub enum Handler {
    /// Leaf format
    Player {
        /// Cheap structural test
        check: CheckFn,
        /// Authoritative decoder
        create: CreateFn,
    },
    /// Container format
    Archive(Box<dyn Archive>),
    /// Offset scanner, used for `+<offset>` subpaths and as a last resort
    Scanner,
}

/// Registered format.
pub struct Descriptor {
    /// Format identifier
    pub id: &'static str,
    /// Human-readable description
    pub description: &'static str,
    /// Capability bits
    pub capabilities: Capabilities,
    /// Lower values are tried first
    pub priority: u8,
    /// Detection entry points
    pub handler: Handler,
}

/// Public view of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Description {
    /// Format identifier
    pub id: &'static str,
    /// Human-readable description
    pub description: &'static str,
    /// Capability bits
    pub capabilities: Capabilities,
}

impl Descriptor {
    fn player(id: &'static str, description: &'static str, device: Capabilities, priority: u8, check: CheckFn, create: CreateFn) -> Self {
        Self {
            id,
            description,
            capabilities: Capabilities::PLAYER | device,
            priority,
            handler: Handler::Player { check, create },
        }
    }

    fn archive(id: &'static str, description: &'static str, kind: Capabilities, priority: u8, archive: impl Archive + 'static) -> Self {
        Self {
            id,
            description,
            capabilities: kind,
            priority,
            handler: Handler::Archive(Box::new(archive)),
        }
    }

    /// Id, description and capabilities.
    pub fn describe(&self) -> Description {
        Description {
            id: self.id,
            description: self.description,
            capabilities: self.capabilities,
        }
    }

    /// Structural test; the scanner never claims data by itself.
    pub fn check(&self, data: &[u8]) -> bool {
        match &self.handler {
            Handler::Player { check, .. } => check(data),
            Handler::Archive(archive) => archive.check(data),
            Handler::Scanner => false,
        }
    }
}

impl std::fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Descriptor")
            .field("id", &self.id)
            .field("capabilities", &self.capabilities)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Format registry.
///
/// # Example
///
/// ```no_run
/// use zxtune_formats::Registry;
/// use zxtune_common::Player;
///
/// let registry = Registry::default();
/// let module = registry.load("disk.trd?tune.C")?;
/// println!("{:?}", module.information().get("Title"));
/// # Ok::<(), zxtune_formats::FormatError>(())
/// ```
#[derive(Debug)]
pub struct Registry {
    descriptors: Vec<Descriptor>,
}

impl Default for Registry {
    /// Every built-in format.
    fn default() -> Self {
        let aym = Capabilities::DEVICE_AYM;
        let dac = Capabilities::DEVICE_DAC;
        let mut registry = Self::empty();
        for descriptor in [
            Descriptor::archive(hobeta::ID, "Hobeta wrapped file", Capabilities::WRAPPER, 0, hobeta::Hobeta),
            Descriptor::archive(scl::ID, "SCL archive", Capabilities::MULTITRACK, 1, scl::Scl),
            Descriptor::archive(hrip::ID, "Hrip archive", Capabilities::MULTITRACK, 2, hrip::Hrip::default()),
            Descriptor::archive(trd::ID, "TR-DOS disk image", Capabilities::MULTITRACK, 3, trd::Trd),
            Descriptor {
                id: raw::ID,
                description: "Raw data scanner",
                capabilities: Capabilities::SCANNER | Capabilities::MULTITRACK,
                priority: 19,
                handler: Handler::Scanner,
            },
            Descriptor::player(ts::ID, "TurboSound", Capabilities::DEVICE_TURBOSOUND, 20, ts::check, ts::create),
            Descriptor::player(psg::ID, "PSG register dump", aym, 21, psg::check, psg::create),
            Descriptor::player(chi::ID, "Chip Tracker", dac, 22, chi::check, chi::create),
            Descriptor::player(pdt::ID, "ProDigi Tracker", dac, 23, pdt::check, pdt::create),
            Descriptor::player(pt3::ID, "ProTracker v3.x / Vortex", aym, 24, pt3::check, pt3::create),
            Descriptor::player(pt2::ID, "ProTracker v2.x", aym, 25, pt2::check, pt2::create),
            Descriptor::player(stp::ID, "Sound Tracker Pro", aym, 26, stp::check, stp::create),
            Descriptor::player(asc::ID, "ASC Sound Master", aym, 27, asc::check, asc::create),
            Descriptor::player(stc::ID, "Sound Tracker v1.x", aym, 28, stc::check, stc::create),
        ] {
            registry.register(descriptor);
        }
        registry
    }
}

impl Registry {
    /// Registry without any format.
    pub fn empty() -> Self {
        Self { descriptors: Vec::new() }
    }

    /// Add a format, keeping the list ordered by priority.
    ///
    /// Equal priorities keep registration order.
    pub fn register(&mut self, descriptor: Descriptor) {
        let pos = self
            .descriptors
            .partition_point(|d| d.priority <= descriptor.priority);
        self.descriptors.insert(pos, descriptor);
    }

    /// Registered formats in detection order.
    pub fn describe(&self) -> impl Iterator<Item = Description> + '_ {
        self.descriptors.iter().map(Descriptor::describe)
    }

    /// Id of the first format accepting `data`.
    pub fn check(&self, data: &[u8]) -> Option<&'static str> {
        self.descriptors.iter().find(|d| d.check(data)).map(|d| d.id)
    }

    /// Open `data` without a subpath.
    pub fn create(&self, data: &Container) -> Result<Module> {
        self.open(data, "")
    }

    /// Open the entry named by `subpath` inside `data`.
    pub fn open(&self, data: &Container, subpath: &str) -> Result<Module> {
        self.open_at(data, subpath, 0)
    }

    /// Read a file and open the module named by `full_path`.
    pub fn load(&self, full_path: &str) -> Result<Module> {
        let (file, subpath) = path::split_path(full_path);
        let data = Container::new(std::fs::read(file)?);
        debug!("loaded {} bytes from {file}", data.size());
        let mut module = self.open(&data, subpath)?;
        let info = module.information_mut();
        info.set(attributes::PATH, full_path);
        if info.get(attributes::FILENAME).is_none() {
            info.set(attributes::FILENAME, path::file_name(full_path));
        }
        Ok(module)
    }

    /// Playable subpaths of `data`, `""` when `data` itself plays.
    pub fn submodules(&self, data: &Container) -> Vec<String> {
        self.list(data, 0)
    }

    fn open_at(&self, data: &Container, subpath: &str, depth: usize) -> Result<Module> {
        if depth > MAX_DEPTH {
            return Err("containers nested too deep".into());
        }
        let (component, rest) = path::extract_subpath(subpath);
        if component.is_empty() {
            return self.detect(data, depth);
        }
        if raw::parse_subpath(component).is_some() {
            let inner = raw::find(data, component).ok_or_else(|| FormatError::InvalidPath {
                path: component.to_string(),
            })?;
            let module = self.open_at(&inner, rest, depth + 1)?;
            return Ok(Module::delegate(raw::ID, component, module));
        }
        for descriptor in &self.descriptors {
            let Handler::Archive(archive) = &descriptor.handler else {
                continue;
            };
            if !archive.check(data.data()) {
                continue;
            }
            if descriptor.capabilities.contains(Capabilities::WRAPPER) {
                let entries = match archive.entries(data) {
                    Ok(entries) => entries,
                    Err(e) => {
                        debug!("{}: {e}", descriptor.id);
                        continue;
                    }
                };
                if let Some(entry) = entries.into_iter().next() {
                    let module = self.open_at(&entry.data, subpath, depth + 1)?;
                    return Ok(Module::delegate(descriptor.id, &entry.name, module));
                }
                continue;
            }
            match archive.find(data, component) {
                Ok(Some(inner)) => {
                    let module = self.open_at(&inner, rest, depth + 1)?;
                    return Ok(Module::delegate(descriptor.id, component, module));
                }
                Ok(None) => {}
                Err(e) => debug!("{}: {e}", descriptor.id),
            }
        }
        Err(FormatError::InvalidPath {
            path: component.to_string(),
        })
    }

    fn detect(&self, data: &Container, depth: usize) -> Result<Module> {
        for descriptor in &self.descriptors {
            if !descriptor.check(data.data()) {
                continue;
            }
            trace!("{} accepts {} bytes", descriptor.id, data.size());
            match &descriptor.handler {
                Handler::Player { create, .. } => match create(data.data()) {
                    Ok(decoded) => {
                        debug!("decoded {} module of {} bytes", descriptor.id, decoded.size);
                        return Ok(Module::leaf(decoded.player));
                    }
                    Err(e) => debug!("{} rejected data: {e}", descriptor.id),
                },
                Handler::Archive(archive) if descriptor.capabilities.contains(Capabilities::WRAPPER) => {
                    let entry = match archive.entries(data) {
                        Ok(entries) => entries.into_iter().next(),
                        Err(e) => {
                            debug!("{}: {e}", descriptor.id);
                            None
                        }
                    };
                    let Some(entry) = entry else {
                        continue;
                    };
                    match self.detect(&entry.data, depth + 1) {
                        Ok(module) => return Ok(Module::delegate(descriptor.id, &entry.name, module)),
                        Err(e) => debug!("{}: '{}': {e}", descriptor.id, entry.name),
                    }
                }
                Handler::Archive(_) => {
                    let submodules = self.list_archive(descriptor, data, depth);
                    if !submodules.is_empty() {
                        return Ok(Module::multitrack(descriptor.id, &submodules));
                    }
                    debug!("{}: no playable entries", descriptor.id);
                }
                Handler::Scanner => {}
            }
        }
        if self.has_scanner() {
            let found: Vec<String> = self.scan(data).into_iter().map(|e| e.name).collect();
            if !found.is_empty() {
                return Ok(Module::multitrack(raw::ID, &found));
            }
        }
        Err(FormatError::NotRecognized)
    }

    fn list(&self, data: &Container, depth: usize) -> Vec<String> {
        if depth > MAX_DEPTH {
            return Vec::new();
        }
        for descriptor in &self.descriptors {
            if !descriptor.check(data.data()) {
                continue;
            }
            let found = match &descriptor.handler {
                Handler::Player { create, .. } => match create(data.data()) {
                    Ok(_) => vec![String::new()],
                    Err(_) => Vec::new(),
                },
                Handler::Archive(archive) if descriptor.capabilities.contains(Capabilities::WRAPPER) => {
                    match archive.entries(data) {
                        Ok(entries) => entries
                            .first()
                            .map(|entry| self.list(&entry.data, depth + 1))
                            .unwrap_or_default(),
                        Err(_) => Vec::new(),
                    }
                }
                Handler::Archive(_) => self.list_archive(descriptor, data, depth),
                Handler::Scanner => Vec::new(),
            };
            if !found.is_empty() {
                return found;
            }
        }
        if self.has_scanner() {
            return self.scan(data).into_iter().map(|e| e.name).collect();
        }
        Vec::new()
    }

    /// Entries of a multitrack container that lead to modules.
    fn list_archive(&self, descriptor: &Descriptor, data: &Container, depth: usize) -> Vec<String> {
        let Handler::Archive(archive) = &descriptor.handler else {
            return Vec::new();
        };
        let entries = match archive.entries(data) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("{}: {e}", descriptor.id);
                return Vec::new();
            }
        };
        let mut found = Vec::new();
        for entry in entries {
            let inner = self.list(&entry.data, depth + 1);
            if inner.is_empty() {
                debug!("{}: skipping '{}'", descriptor.id, entry.name);
            }
            found.extend(inner.iter().map(|sub| path::combine_path(&entry.name, sub)));
        }
        found
    }

    fn has_scanner(&self) -> bool {
        self.descriptors.iter().any(|d| matches!(d.handler, Handler::Scanner))
    }

    /// Leaf modules at any offset.
    fn scan(&self, data: &Container) -> Vec<crate::containers::Entry> {
        raw::scan(data, |chunk| {
            self.descriptors.iter().find_map(|d| match &d.handler {
                Handler::Player { check, create } if check(chunk) => create(chunk).ok().map(|m| m.size),
                _ => None,
            })
        })
    }
}
