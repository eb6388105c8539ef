use crate::usf::{read_usf, write_usf, USF_MAGIC};
use crate::wav::{read_riff, write_riff, Sound, WaveWriteOptions, RIFF_MAGIC};
use binread::{BinRead, BinReaderExt};
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
/// An enum representing all possible errors when reading or writing sounds
pub enum SoundError {
    #[error("Sound data ends before {0} is complete")]
    Truncated(&'static str),
    #[error("Invalid sound image: {0}")]
    BadImage(String),
    #[error("Unsupported sound format: {0}")]
    Unsupported(String),
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    #[error(transparent)]
    ParseError(#[from] binread::Error),
}

pub type Result<T> = core::result::Result<T, SoundError>;

pub(crate) fn read_record<T: BinRead>(
    data: &[u8],
    offset: usize,
    size: usize,
    what: &'static str,
) -> Result<T> {
    match offset.checked_add(size) {
        Some(end) if end <= data.len() => Ok(Cursor::new(&data[offset..end]).read_le()?),
        _ => Err(SoundError::Truncated(what)),
    }
}

/// The two container flavours a sound resource can be stored in
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum SoundContainer {
    /// Plain RIFF/WAVE with PCM data
    StandardRiff,
    /// Pleo USF, optionally ADPCM compressed
    PleoUsf,
}

impl SoundContainer {
    /// Picks the container from the leading signature
    pub fn detect(data: &[u8]) -> Option<SoundContainer> {
        match data.get(0..4) {
            Some(sig) if sig == RIFF_MAGIC => Some(SoundContainer::StandardRiff),
            Some(sig) if sig == USF_MAGIC => Some(SoundContainer::PleoUsf),
            _ => None,
        }
    }

    pub fn read(self, data: &[u8]) -> Result<Sound> {
        match self {
            SoundContainer::StandardRiff => read_riff(data),
            SoundContainer::PleoUsf => read_usf(data),
        }
    }

    pub fn write(self, sound: &Sound, options: &WaveWriteOptions) -> Result<Vec<u8>> {
        match self {
            SoundContainer::StandardRiff => write_riff(sound, options),
            SoundContainer::PleoUsf => write_usf(sound, options),
        }
    }

    /// Conventional file extension
    pub fn extension(self) -> &'static str {
        match self {
            SoundContainer::StandardRiff => "wav",
            SoundContainer::PleoUsf => "usf",
        }
    }
}
