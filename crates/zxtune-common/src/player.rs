//! Frame-stepping player trait.
//!
//! Every decoded module, container wrapper and dual-chip composite implements
//! [`Player`]. Frames are rendered strictly in order; seeking resets and
//! fast-forwards.

use crate::information::Information;
use zxtune_devices::sound::{ChannelState, Receiver, RenderParameters};

/// Playback state reported after each frame.
///
/// Pausing is left to the caller: a paused player is simply not rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum PlaybackState {
    /// Player reached the end (or was never started).
    #[default]
    Stopped,
    /// Player has more frames to render.
    Playing,
}

/// Object-safe player interface.
///
/// # Example
///
/// ```ignore
/// use zxtune_common::{Player, PlaybackState};
///
/// fn play(player: &mut dyn Player, params: &RenderParameters, out: &mut dyn Receiver) {
///     while player.render_frame(params, out) == PlaybackState::Playing {}
/// }
/// ```
pub trait Player: Send {
    /// Module information.
    fn information(&self) -> &Information;

    /// Render one frame into `receiver`.
    ///
    /// Returns [`PlaybackState::Stopped`] after the last frame of a non-looped
    /// module, calling [`Receiver::flush`] once.
    fn render_frame(&mut self, params: &RenderParameters, receiver: &mut dyn Receiver) -> PlaybackState;

    /// Rewind to the first frame.
    fn reset(&mut self) -> PlaybackState;

    /// Seek to an absolute frame by resetting and fast-forwarding.
    fn set_position(&mut self, frame: usize) -> PlaybackState;

    /// Current state.
    fn state(&self) -> PlaybackState;

    /// Index of the next frame to render.
    fn current_frame(&self) -> usize;

    /// Live per-channel state of the underlying device(s).
    ///
    /// Default returns an empty list.
    fn channels_state(&self) -> Vec<ChannelState> {
        Vec::new()
    }

    /// Total frames, 0 if unknown.
    fn frame_count(&self) -> usize {
        self.information().statistics.frames
    }

    /// Playback position as a fraction (0.0 to 1.0).
    fn playback_position(&self) -> f32 {
        match self.frame_count() {
            0 => 0.0,
            total => (self.current_frame() as f32 / total as f32).min(1.0),
        }
    }

    /// Total duration in seconds for the given frame duration.
    fn duration_seconds(&self, params: &RenderParameters) -> f32 {
        self.frame_count() as f32 * params.frame_duration_us as f32 / 1_000_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_ordering() {
        // combining sub-players picks the minimum state
        assert_eq!(
            PlaybackState::Playing.min(PlaybackState::Stopped),
            PlaybackState::Stopped
        );
        assert_eq!(PlaybackState::default(), PlaybackState::Stopped);
    }
}
