use binread::BinRead;
use binwrite::BinWrite;
mod adpcm;
mod checksum;
mod parse;
mod resource;
mod sound;
mod usf;
mod wav;
mod writer;
pub use adpcm::{decode_adpcm, encode_adpcm, SampleWidth};
pub use checksum::{adler32, Adler32};
pub use parse::{verify_checksum, ImageInfo, UrfArchive, UrfError};
pub use resource::{Element, ElementStatus, ResourceError, ResourceList};
pub use sound::{SoundContainer, SoundError};
pub use wav::{Sound, WaveFormat, WaveWriteOptions, PLEO_SAMPLE_RATE};
pub use writer::{UrfWriteError, WriterOptions};

const URF_MAGIC: [u8; 4] = *b"UGRF";
const SIZE_MAGIC: [u8; 4] = *b"SIZE";
const ADLR_MAGIC: [u8; 4] = *b"ADLR";

/// Shortest element payload, the embedded signature
pub const MIN_ELEMENT_LEN: usize = 4;
/// Longest element name stored in a TOC entry
pub const MAX_NAME_LEN: usize = 32;
/// Largest entry count a category TOC may declare
pub const MAX_ENTRIES: usize = 0xFFF;
/// Offset written for filler entries
pub const FILLER_OFFSET: u32 = 0xFFFF_FFFF;

const CATEGORY_ALIGNMENT: usize = 0x200;
const TOC_ALIGNMENT: usize = 0x200;
const TRAILER_ALIGNMENT: usize = 8;
const PAD_BYTE: u8 = b'0';

/// One of the five fixed resource kinds, in on-disk order
#[derive(Debug, Eq, PartialEq, Copy, Clone, Hash, PartialOrd, Ord)]
pub enum Category {
    Sound,
    Motion,
    Command,
    Script,
    Property,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Sound,
        Category::Motion,
        Category::Command,
        Category::Script,
        Category::Property,
    ];

    /// TOC signature of the category
    pub const fn signature(self) -> [u8; 4] {
        match self {
            Category::Sound => *b"UGSF",
            Category::Motion => *b"UGMF",
            Category::Command => *b"UGCF",
            Category::Script => *b" AMX",
            Category::Property => *b"PROP",
        }
    }

    /// First human readable resource ID of the category
    pub const fn base_id(self) -> u32 {
        match self {
            Category::Sound => 0x1000,
            Category::Motion => 0x2000,
            Category::Command => 0x3000,
            Category::Script => 0x4000,
            Category::Property => 0x5000,
        }
    }

    /// Alignment of each element inside the category's data block
    pub const fn alignment(self) -> usize {
        match self {
            Category::Sound
            | Category::Motion
            | Category::Command
            | Category::Script
            | Category::Property => 4,
        }
    }

    pub const fn index(self) -> usize {
        self as usize
    }

    /// Resolves a 4-byte tag to its category
    pub fn from_signature(tag: &[u8]) -> Option<Category> {
        if tag.len() < 4 {
            return None;
        }
        Self::ALL
            .iter()
            .copied()
            .find(|category| category.signature() == tag[..4])
    }

    /// Human readable ID of the element at `index`
    pub fn resource_id(self, index: usize) -> u32 {
        self.base_id() + index as u32
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Category::Sound => "sound",
            Category::Motion => "motion",
            Category::Command => "command",
            Category::Script => "script",
            Category::Property => "property",
        })
    }
}

/// Size = 0x14
#[derive(Debug, Eq, PartialEq, Copy, Clone, BinRead, BinWrite)]
#[br(little)]
#[binwrite(little)]
struct ArchiveHeader {
    magic: [u8; 4],
    format: u32,
    build_time: i64,
    version: u32,
}

/// Size = 0x8. Used for the TOC offset table, the size record, category TOC
/// headers and the checksum trailer alike.
#[derive(Debug, Eq, PartialEq, Copy, Clone, BinRead, BinWrite)]
#[br(little)]
#[binwrite(little)]
struct TocRecord {
    magic: [u8; 4],
    value: u32,
}

/// Size = 0x28. Written by hand in `writer.rs`, binwrite has no impl for
/// 32-byte arrays.
#[derive(Debug, Eq, PartialEq, Copy, Clone, BinRead)]
#[br(little)]
struct TocEntry {
    offset: u32,
    length: u32,
    name: [u8; MAX_NAME_LEN],
}

const HEADER_SIZE: usize = 0x14;
const RECORD_SIZE: usize = 0x8;
const ENTRY_SIZE: usize = 0x28;

fn align(pos: usize, alignment: usize) -> usize {
    (pos + alignment - 1) & !(alignment - 1)
}
