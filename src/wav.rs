use crate::sound::{read_record, Result, SoundContainer, SoundError};
use binread::BinRead;
use binwrite::BinWrite;
use derivative::*;
use log::{debug, trace};
use num::ToPrimitive;
use std::path::Path;

pub(crate) const RIFF_MAGIC: [u8; 4] = *b"RIFF";
const WAVE_MAGIC: [u8; 4] = *b"WAVE";
const FMT_MAGIC: [u8; 4] = *b"fmt ";
const FACT_MAGIC: [u8; 4] = *b"fact";
const DATA_MAGIC: [u8; 4] = *b"data";

/// Sample rate Pleo plays back natively
pub const PLEO_SAMPLE_RATE: u32 = 11025;

const PCM_FORMAT: u16 = 1;

/// Size = 0xC
#[derive(Debug, Eq, PartialEq, Copy, Clone, BinRead, BinWrite)]
#[br(little)]
#[binwrite(little)]
struct RiffHeader {
    magic: [u8; 4],
    chunk_len: u32,
    riff_type: [u8; 4],
}

/// Size = 0x8
#[derive(Debug, Eq, PartialEq, Copy, Clone, BinRead, BinWrite)]
#[br(little)]
#[binwrite(little)]
struct ChunkHeader {
    magic: [u8; 4],
    chunk_len: u32,
}

const RIFF_HEADER_SIZE: usize = 0xC;
const CHUNK_HEADER_SIZE: usize = 0x8;
const FORMAT_SIZE: usize = 0x10;

/// The body of a `fmt ` chunk. Size = 0x10
#[derive(Debug, Eq, PartialEq, Copy, Clone, BinRead, BinWrite)]
#[br(little)]
#[binwrite(little)]
pub struct WaveFormat {
    pub format_tag: u16,
    pub channels: u16,
    pub samples_per_sec: u32,
    pub avg_bytes_per_sec: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl Default for WaveFormat {
    /// Mono 8-bit PCM at the native Pleo rate
    fn default() -> Self {
        WaveFormat::pcm(1, PLEO_SAMPLE_RATE, 8)
    }
}

impl WaveFormat {
    pub fn pcm(channels: u16, samples_per_sec: u32, bits_per_sample: u16) -> WaveFormat {
        let block_align = channels.saturating_mul(bits_per_sample / 8);
        WaveFormat {
            format_tag: PCM_FORMAT,
            channels,
            samples_per_sec,
            avg_bytes_per_sec: samples_per_sec.saturating_mul(block_align as u32),
            block_align,
            bits_per_sample,
        }
    }

    /// True for mono 8-bit data at 11025 Hz, which needs no conversion
    pub fn is_pleo_native(&self) -> bool {
        self.channels == 1
            && self.samples_per_sec == PLEO_SAMPLE_RATE
            && self.block_align == 1
            && self.bits_per_sample == 8
    }

    fn validate(&self) -> Result<()> {
        if self.format_tag != PCM_FORMAT
            || !(1..=2).contains(&self.channels)
            || !(1..=4).contains(&self.block_align)
            || (self.bits_per_sample != 8 && self.bits_per_sample != 16)
        {
            return Err(SoundError::Unsupported(format!(
                "tag {}, {} channels, {} bits, block align {}",
                self.format_tag, self.channels, self.bits_per_sample, self.block_align
            )));
        }
        Ok(())
    }

    /// One frame of silence in this format
    pub(crate) fn silence(&self) -> Vec<u8> {
        let fill = if self.bits_per_sample == 8 { 128 } else { 0 };
        vec![fill; (self.block_align as usize).max(1)]
    }
}

/// Options shared by the RIFF and USF writers
#[derive(Debug, Eq, PartialEq, Copy, Clone, Default)]
pub struct WaveWriteOptions {
    /// Emit a `fact` chunk in RIFF output
    pub fact_chunk: bool,
    /// Store USF payloads as raw PCM instead of ADPCM
    pub force_pcm: bool,
}

#[derive(Derivative, Clone, PartialEq, Eq, Default)]
#[derivative(Debug)]
/// Decoded PCM sound with its format
pub struct Sound {
    pub format: WaveFormat,
    #[derivative(Debug = "ignore")]
    pub data: Vec<u8>,
    /// Name carried by USF images or taken from the file name
    pub name: String,
}

impl Sound {
    pub fn new(format: WaveFormat, data: Vec<u8>) -> Sound {
        Sound {
            format,
            data,
            name: String::new(),
        }
    }

    /// Parses a RIFF or USF image, detected by its signature
    pub fn from_bytes(data: &[u8]) -> Result<Sound> {
        let container = SoundContainer::detect(data).ok_or_else(|| {
            SoundError::BadImage(format!(
                "unknown signature \"{}\"",
                String::from_utf8_lossy(&data[..data.len().min(4)])
            ))
        })?;
        container.read(data)
    }

    /// Reads a sound file, naming it after the file stem when the image does
    /// not carry a name
    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Sound> {
        let path = path.as_ref();
        let mut sound = Self::from_bytes(&std::fs::read(path)?)?;
        if sound.name.is_empty() {
            if let Some(stem) = path.file_stem() {
                sound.name = stem.to_string_lossy().into_owned();
            }
        }
        Ok(sound)
    }

    pub fn write_file<P: AsRef<Path>>(
        &self,
        path: P,
        container: SoundContainer,
        options: &WaveWriteOptions,
    ) -> Result<()> {
        let data = container.write(self, options)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    pub fn is_pleo_native(&self) -> bool {
        self.format.is_pleo_native()
    }

    /// Number of sample frames
    pub fn frame_count(&self) -> usize {
        self.data.len() / (self.format.block_align as usize).max(1)
    }
}

pub(crate) fn read_riff(data: &[u8]) -> Result<Sound> {
    if data.len() < RIFF_HEADER_SIZE + 2 * CHUNK_HEADER_SIZE {
        return Err(SoundError::Truncated("RIFF header"));
    }
    let riff: RiffHeader = read_record(data, 0, RIFF_HEADER_SIZE, "RIFF header")?;
    if riff.magic != RIFF_MAGIC || riff.riff_type != WAVE_MAGIC {
        return Err(SoundError::BadImage("not a RIFF WAVE image".to_owned()));
    }
    let riff_end = (CHUNK_HEADER_SIZE + riff.chunk_len as usize).min(data.len());

    let mut format: Option<WaveFormat> = None;
    let mut pos = RIFF_HEADER_SIZE;
    while pos < riff_end {
        let chunk: ChunkHeader = read_record(data, pos, CHUNK_HEADER_SIZE, "chunk header")?;
        let body = pos + CHUNK_HEADER_SIZE;
        let len = chunk.chunk_len as usize;
        match chunk.magic {
            FMT_MAGIC => {
                if format.is_some() {
                    return Err(SoundError::BadImage("more than one fmt chunk".to_owned()));
                }
                if len < FORMAT_SIZE {
                    return Err(SoundError::BadImage(format!("fmt chunk of {} bytes", len)));
                }
                let fmt: WaveFormat = read_record(data, body, FORMAT_SIZE, "fmt chunk")?;
                fmt.validate()?;
                format = Some(fmt);
            }
            DATA_MAGIC => {
                let format = format
                    .ok_or_else(|| SoundError::BadImage("data chunk before fmt chunk".to_owned()))?;
                let samples = data
                    .get(body..body.saturating_add(len))
                    .ok_or(SoundError::Truncated("data chunk"))?;
                debug!("Read {} bytes of {}-bit RIFF data", len, format.bits_per_sample);
                return Ok(Sound::new(format, samples.to_vec()));
            }
            FACT_MAGIC => trace!("Skipping fact chunk"),
            other => trace!("Skipping chunk \"{}\"", String::from_utf8_lossy(&other)),
        }
        pos = body.saturating_add(len + (len & 1));
    }
    Err(SoundError::BadImage("no data chunk".to_owned()))
}

pub(crate) fn write_riff(sound: &Sound, options: &WaveWriteOptions) -> Result<Vec<u8>> {
    let samples = if sound.data.is_empty() {
        sound.format.silence()
    } else {
        sound.data.clone()
    };
    let data_len = samples
        .len()
        .to_u32()
        .ok_or_else(|| SoundError::Unsupported(format!("{} bytes of data", samples.len())))?;
    let pad = samples.len() & 1;
    let mut total = RIFF_HEADER_SIZE + CHUNK_HEADER_SIZE + FORMAT_SIZE;
    if options.fact_chunk {
        total += CHUNK_HEADER_SIZE + 4;
    }
    total += CHUNK_HEADER_SIZE + samples.len() + pad;

    let mut buf = Vec::with_capacity(total);
    RiffHeader {
        magic: RIFF_MAGIC,
        chunk_len: (total - CHUNK_HEADER_SIZE) as u32,
        riff_type: WAVE_MAGIC,
    }
    .write(&mut buf)?;
    ChunkHeader {
        magic: FMT_MAGIC,
        chunk_len: FORMAT_SIZE as u32,
    }
    .write(&mut buf)?;
    sound.format.write(&mut buf)?;
    if options.fact_chunk {
        ChunkHeader {
            magic: FACT_MAGIC,
            chunk_len: 4,
        }
        .write(&mut buf)?;
        let frames = data_len / (sound.format.block_align as u32).max(1);
        buf.extend_from_slice(&frames.to_le_bytes());
    }
    ChunkHeader {
        magic: DATA_MAGIC,
        chunk_len: data_len,
    }
    .write(&mut buf)?;
    buf.extend_from_slice(&samples);
    if pad == 1 {
        buf.push(0);
    }
    Ok(buf)
}
