//! Opened modules: a single player, possibly reached through containers.

use zxtune_common::{attributes, Information, PlaybackState, Player};
use zxtune_devices::sound::{ChannelState, Receiver, RenderParameters};

/// Result of opening data through the [`Registry`](crate::Registry).
pub enum Module {
    /// Playable module decoded directly from the data.
    Leaf {
        /// Information of the player, extended by the opener
        info: Information,
        /// Decoded player
        player: Box<dyn Player>,
    },
    /// Module extracted from a container; rendering goes to `inner`.
    Delegating {
        /// Inner information with the container chain prepended
        info: Information,
        /// Unwrapped module
        inner: Box<Module>,
    },
    /// Container of several modules; nothing to render.
    ///
    /// Playable subpaths are listed in the `Submodules` property.
    Multitrack {
        /// Container information
        info: Information,
    },
}

impl Module {
    /// Wrap a decoded player.
    pub fn leaf(player: Box<dyn Player>) -> Self {
        Module::Leaf {
            info: player.information().clone(),
            player,
        }
    }

    /// Module found in entry `name` of a `container` container.
    pub fn delegate(container: &str, name: &str, inner: Module) -> Self {
        let mut info = inner.information().clone();
        info.push_container(container);
        if info.get(attributes::FILENAME).is_none() {
            info.set(attributes::FILENAME, name);
        }
        Module::Delegating {
            info,
            inner: Box::new(inner),
        }
    }

    /// Container listing `submodules`.
    pub fn multitrack(container: &str, submodules: &[String]) -> Self {
        let mut info = Information::with_type(container);
        info.set(attributes::SUBMODULES, submodules.join("\n"));
        Module::Multitrack { info }
    }

    /// Mutable information, e.g. to record the opened path.
    pub fn information_mut(&mut self) -> &mut Information {
        match self {
            Module::Leaf { info, .. } | Module::Delegating { info, .. } | Module::Multitrack { info } => info,
        }
    }

    /// True for containers without own audio.
    pub fn is_multitrack(&self) -> bool {
        matches!(self, Module::Multitrack { .. })
    }

    /// Innermost player, `None` for multitrack containers.
    pub fn player(&self) -> Option<&dyn Player> {
        match self {
            Module::Leaf { player, .. } => Some(player.as_ref()),
            Module::Delegating { inner, .. } => inner.player(),
            Module::Multitrack { .. } => None,
        }
    }

    fn player_mut(&mut self) -> Option<&mut (dyn Player + 'static)> {
        match self {
            Module::Leaf { player, .. } => Some(player.as_mut()),
            Module::Delegating { inner, .. } => inner.player_mut(),
            Module::Multitrack { .. } => None,
        }
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Module::Leaf { .. } => "Leaf",
            Module::Delegating { .. } => "Delegating",
            Module::Multitrack { .. } => "Multitrack",
        };
        f.debug_struct("Module")
            .field("kind", &kind)
            .field("info", self.information())
            .finish()
    }
}

impl Player for Module {
    fn information(&self) -> &Information {
        match self {
            Module::Leaf { info, .. } | Module::Delegating { info, .. } | Module::Multitrack { info } => info,
        }
    }

    fn render_frame(&mut self, params: &RenderParameters, receiver: &mut dyn Receiver) -> PlaybackState {
        self.player_mut()
            .map_or(PlaybackState::Stopped, |p| p.render_frame(params, receiver))
    }

    fn reset(&mut self) -> PlaybackState {
        self.player_mut().map_or(PlaybackState::Stopped, |p| p.reset())
    }

    fn set_position(&mut self, frame: usize) -> PlaybackState {
        self.player_mut()
            .map_or(PlaybackState::Stopped, |p| p.set_position(frame))
    }

    fn state(&self) -> PlaybackState {
        self.player().map_or(PlaybackState::Stopped, |p| p.state())
    }

    fn current_frame(&self) -> usize {
        self.player().map_or(0, |p| p.current_frame())
    }

    fn channels_state(&self) -> Vec<ChannelState> {
        self.player().map(|p| p.channels_state()).unwrap_or_default()
    }
}
