//! Offline rendering and WAV export.

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use log::{debug, info};
use zxtune_devices::sound::{MixingReceiver, Receiver, Sample, SAMPLE_MID};

use crate::{PlaybackState, Player, RenderParameters, Result, ZxtuneError};

/// Output channels of exported files.
pub const WAV_CHANNELS: u16 = 2;

/// Frames rendered when neither the module nor the caller gives a length
/// (15 minutes at 50Hz).
pub const DEFAULT_FRAME_LIMIT: usize = 50 * 60 * 15;

/// Unsigned device sample to signed 16-bit PCM.
fn to_pcm(sample: Sample) -> i16 {
    (i32::from(sample) - i32::from(SAMPLE_MID)) as i16
}

/// Receiver writing 16-bit PCM through `hound`.
///
/// Write errors are kept and reported by [`WavReceiver::finalize`].
pub struct WavReceiver<W: Write + Seek> {
    writer: hound::WavWriter<W>,
    channels: usize,
    error: Option<hound::Error>,
    ticks: usize,
}

impl WavReceiver<BufWriter<File>> {
    /// Create a WAV file at `path`.
    pub fn create(path: impl AsRef<Path>, sample_rate: u32, channels: u16) -> Result<Self> {
        let writer = hound::WavWriter::create(path, spec(sample_rate, channels))
            .map_err(|e| ZxtuneError::AudioFileError(format!("Failed to create WAV file: {e}")))?;
        Ok(Self::from_writer(writer, channels))
    }
}

impl<W: Write + Seek> WavReceiver<W> {
    /// Write WAV data into `sink`.
    pub fn new(sink: W, sample_rate: u32, channels: u16) -> Result<Self> {
        let writer = hound::WavWriter::new(sink, spec(sample_rate, channels))
            .map_err(|e| ZxtuneError::AudioFileError(format!("Failed to start WAV stream: {e}")))?;
        Ok(Self::from_writer(writer, channels))
    }

    fn from_writer(writer: hound::WavWriter<W>, channels: u16) -> Self {
        Self {
            writer,
            channels: usize::from(channels),
            error: None,
            ticks: 0,
        }
    }

    /// Finish the file, returning the number of sample ticks written.
    pub fn finalize(self) -> Result<usize> {
        if let Some(e) = self.error {
            return Err(ZxtuneError::AudioFileError(format!("Failed to write sample: {e}")));
        }
        self.writer
            .finalize()
            .map_err(|e| ZxtuneError::AudioFileError(format!("Failed to finalize WAV file: {e}")))?;
        Ok(self.ticks)
    }
}

fn spec(sample_rate: u32, channels: u16) -> hound::WavSpec {
    hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

impl<W: Write + Seek> Receiver for WavReceiver<W> {
    fn apply_sample(&mut self, samples: &[Sample]) {
        if self.error.is_some() {
            return;
        }
        for idx in 0..self.channels {
            let value = samples.get(idx).copied().unwrap_or(SAMPLE_MID);
            if let Err(e) = self.writer.write_sample(to_pcm(value)) {
                self.error = Some(e);
                return;
            }
        }
        self.ticks += 1;
    }
}

/// Render up to `max_frames` frames of `player` into `receiver`.
///
/// Without a limit, non-looped modules play to their end and looped ones for
/// their nominal length. Returns the number of frames rendered.
pub fn render(
    player: &mut dyn Player,
    params: &RenderParameters,
    receiver: &mut dyn Receiver,
    max_frames: Option<usize>,
) -> usize {
    let limit = max_frames.unwrap_or_else(|| match player.frame_count() {
        0 => DEFAULT_FRAME_LIMIT,
        frames if params.looped => frames,
        _ => DEFAULT_FRAME_LIMIT,
    });
    let mut frames = 0;
    while frames < limit {
        if player.render_frame(params, receiver) == PlaybackState::Stopped {
            break;
        }
        frames += 1;
    }
    if frames == limit {
        receiver.flush();
    }
    debug!("rendered {frames} frames");
    frames
}

/// Render a module to a stereo WAV file.
///
/// Device channels are spread over the two outputs alternately (A/C left,
/// B right for a single AY). Returns the number of frames rendered.
pub fn export_to_wav(
    player: &mut dyn Player,
    params: &RenderParameters,
    output_path: impl AsRef<Path>,
    max_frames: Option<usize>,
) -> Result<usize> {
    let output_path = output_path.as_ref();
    let mut wav = WavReceiver::create(output_path, params.sound_freq, WAV_CHANNELS)?;
    let frames = {
        let mut mixer = MixingReceiver::new(&mut wav, usize::from(WAV_CHANNELS));
        render(player, params, &mut mixer, max_frames)
    };
    let ticks = wav.finalize()?;
    info!(
        "wrote {} ({frames} frames, {:.1}s)",
        output_path.display(),
        ticks as f32 / params.sound_freq as f32
    );
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use zxtune_devices::sound::{SAMPLE_MAX, SAMPLE_MIN};

    #[test]
    fn test_pcm_conversion() {
        assert_eq!(to_pcm(SAMPLE_MID), 0);
        assert_eq!(to_pcm(SAMPLE_MIN), i16::MIN);
        assert_eq!(to_pcm(SAMPLE_MAX), i16::MAX);
    }

    #[test]
    fn test_wav_receiver_writes_channels() {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut wav = WavReceiver::new(&mut buffer, 8000, 2).unwrap();
            wav.apply_sample(&[SAMPLE_MID, SAMPLE_MAX, SAMPLE_MIN]);
            wav.apply_sample(&[SAMPLE_MIN]);
            assert_eq!(wav.finalize().unwrap(), 2);
        }
        buffer.set_position(0);
        let reader = hound::WavReader::new(buffer).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 8000);
        let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples, [0, i16::MAX, i16::MIN, 0]);
    }
}
