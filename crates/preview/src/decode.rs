//! Audio file decoding into an in-memory [`PcmTrack`].

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use rodio::{Decoder, Source};

use crate::analysis::PcmTrack;
use crate::error::AudioError;

/// Opens and fully decodes a WAV, FLAC, Ogg Vorbis or MP3 file.
pub fn load_track(path: &Path) -> Result<PcmTrack, AudioError> {
    let file = File::open(path).map_err(|err| AudioError::Open {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;
    let track = decode_track(BufReader::new(file))?;
    tracing::info!(
        path = %path.display(),
        channels = track.channels(),
        sample_rate = track.sample_rate(),
        seconds = track.duration(),
        "decoded audio track"
    );
    Ok(track)
}

/// Decodes an entire stream into interleaved samples in `[-1, 1]`.
pub fn decode_track<R>(reader: R) -> Result<PcmTrack, AudioError>
where
    R: Read + Seek + Send + Sync + 'static,
{
    let decoder = Decoder::new(reader).map_err(|err| AudioError::Decode(err.to_string()))?;
    let channels = decoder.channels();
    let sample_rate = decoder.sample_rate();
    let samples: Vec<f32> = decoder.map(|sample| f32::from(sample) / 32768.0).collect();
    PcmTrack::new(samples, channels, sample_rate)
}
