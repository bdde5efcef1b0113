//! Pull-model audio sources sampled by the renderer at the start of a draw.

use crossbeam_channel::{Receiver, TryRecvError};

use crate::analysis::{PcmTrack, SpectrumAnalyzer};
use crate::audio::AudioFrame;
use crate::error::AudioError;

/// Source of audio snapshots.
///
/// `Ok(None)` means nothing new is available and the renderer keeps the
/// frame it already has.
pub trait AudioFeed: Send {
    fn frame_at(&mut self, time: f64) -> Result<Option<AudioFrame>, AudioError>;
}

/// Feed that never produces audio; the texture stays silent.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentFeed;

impl AudioFeed for SilentFeed {
    fn frame_at(&mut self, _time: f64) -> Result<Option<AudioFrame>, AudioError> {
        Ok(None)
    }
}

/// Feed backed by snapshots pushed from an asynchronous analysis thread.
/// Only the most recent snapshot queued since the last draw is used.
#[derive(Debug)]
pub struct ChannelAudioFeed {
    receiver: Receiver<AudioFrame>,
}

impl ChannelAudioFeed {
    pub fn new(receiver: Receiver<AudioFrame>) -> Self {
        Self { receiver }
    }
}

impl AudioFeed for ChannelAudioFeed {
    fn frame_at(&mut self, _time: f64) -> Result<Option<AudioFrame>, AudioError> {
        let mut latest = None;
        loop {
            match self.receiver.try_recv() {
                Ok(frame) => latest = Some(frame),
                Err(TryRecvError::Empty) => return Ok(latest),
                Err(TryRecvError::Disconnected) => {
                    return match latest {
                        Some(frame) => Ok(Some(frame)),
                        None => Err(AudioError::Disconnected),
                    };
                }
            }
        }
    }
}

/// Feed that analyses a decoded track at the presentation time.
#[derive(Debug)]
pub struct TrackAudioFeed {
    track: PcmTrack,
    analyzer: SpectrumAnalyzer,
}

impl TrackAudioFeed {
    pub fn new(track: PcmTrack) -> Self {
        Self {
            track,
            analyzer: SpectrumAnalyzer::new(),
        }
    }

    pub fn track(&self) -> &PcmTrack {
        &self.track
    }
}

impl AudioFeed for TrackAudioFeed {
    fn frame_at(&mut self, time: f64) -> Result<Option<AudioFrame>, AudioError> {
        Ok(Some(self.analyzer.analyze(&self.track, time)))
    }
}
