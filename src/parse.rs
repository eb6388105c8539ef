use crate::*;
use binread::{BinRead, BinReaderExt};
use chrono::{DateTime, TimeZone, Utc};
use derivative::*;
use log::{debug, trace, warn};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
/// An enum representing all possible errors when reading a URF archive
pub enum UrfError {
    #[error("Archive data ends before {0} is complete")]
    Truncated(&'static str),
    #[error("Invalid archive signature: \"{0}\"")]
    MalformedHeader(String),
    #[error("Invalid {category} table of contents: {reason}")]
    MalformedToc {
        category: Category,
        reason: String,
    },
    #[error("Invalid UTF element name")]
    InvalidName(#[from] std::str::Utf8Error),
    #[error("Archive has no checksum trailer")]
    MalformedTrailer,
    #[error("Checksum mismatch: stored 0x{expected:08X}, computed 0x{actual:08X}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    #[error(transparent)]
    ParseError(#[from] binread::Error),
}

pub type Result<T> = core::result::Result<T, UrfError>;

/// Reads a little-endian record at `offset`, failing with `Truncated` when it
/// does not fit inside `data`
fn read_at<T: BinRead>(data: &[u8], offset: usize, size: usize, what: &'static str) -> Result<T> {
    match offset.checked_add(size) {
        Some(end) if end <= data.len() => {
            Ok(Cursor::new(&data[offset..end]).read_le()?)
        }
        _ => Err(UrfError::Truncated(what)),
    }
}

fn entry_name(raw: &[u8; MAX_NAME_LEN]) -> Result<&str> {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(MAX_NAME_LEN);
    Ok(std::str::from_utf8(&raw[..end])?)
}

fn lossy_tag(tag: &[u8]) -> String {
    String::from_utf8_lossy(tag).into_owned()
}

/// Header fields of a parsed image
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct ImageInfo {
    pub format: u32,
    pub version: u32,
    /// Raw build time, seconds since the unix epoch
    pub build_time: i64,
    /// Image size declared by the `SIZE` record, excluding the trailer
    pub declared_size: u32,
}

impl ImageInfo {
    pub fn built_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.build_time, 0).single()
    }
}

#[derive(Derivative, Clone, Default)]
#[derivative(Debug)]
/// A Pleo URF resource archive: one resource list per category
pub struct UrfArchive {
    pub(crate) lists: [ResourceList; 5],
    #[derivative(Debug = "ignore")]
    info: Option<ImageInfo>,
}

impl PartialEq for UrfArchive {
    /// Returns true if and only if every category holds the same elements
    fn eq(&self, other: &Self) -> bool {
        self.lists == other.lists
    }
}

impl Eq for UrfArchive {}

impl UrfArchive {
    /// Parses a URF archive from binary data
    pub fn new<T: AsRef<[u8]>>(data: T) -> Result<UrfArchive> {
        let data = data.as_ref();
        if data.len() < RECORD_SIZE {
            return Err(UrfError::Truncated("archive header"));
        }
        if data[0..4] != URF_MAGIC {
            return Err(UrfError::MalformedHeader(lossy_tag(&data[0..4])));
        }
        if data.len() < HEADER_SIZE + RECORD_SIZE {
            return Err(UrfError::Truncated("archive header"));
        }
        let header: ArchiveHeader = read_at(data, 0, HEADER_SIZE, "archive header")?;

        let mut toc_offsets = [0u32; 5];
        let mut pos = HEADER_SIZE;
        let size_record = loop {
            let record: TocRecord = read_at(data, pos, RECORD_SIZE, "TOC offset table")?;
            pos += RECORD_SIZE;
            if record.magic == SIZE_MAGIC {
                break record;
            }
            match Category::from_signature(&record.magic) {
                Some(category) => toc_offsets[category.index()] = record.value,
                None => trace!("Skipping unknown TOC record \"{}\"", lossy_tag(&record.magic)),
            }
        };
        let declared_size = size_record.value;
        if declared_size as usize + RECORD_SIZE != data.len() {
            debug!(
                "Declared size {} does not match image length {}",
                declared_size,
                data.len()
            );
        }

        let mut archive = UrfArchive {
            lists: Default::default(),
            info: Some(ImageInfo {
                format: header.format,
                version: header.version,
                build_time: header.build_time,
                declared_size,
            }),
        };
        for category in Category::ALL.iter().copied() {
            let toc_offset = toc_offsets[category.index()] as usize;
            if toc_offset > 0 {
                archive.read_category(data, category, toc_offset)?;
            }
        }
        Ok(archive)
    }

    fn read_category(&mut self, data: &[u8], category: Category, toc_offset: usize) -> Result<()> {
        if toc_offset.saturating_add(RECORD_SIZE) > data.len() {
            return Err(UrfError::MalformedToc {
                category,
                reason: format!("offset 0x{:X} is outside the archive", toc_offset),
            });
        }
        let toc: TocRecord = read_at(data, toc_offset, RECORD_SIZE, "TOC header")?;
        if toc.magic != category.signature() {
            return Err(UrfError::MalformedToc {
                category,
                reason: format!("unexpected signature \"{}\"", lossy_tag(&toc.magic)),
            });
        }

        let entry_count = toc.value as usize / ENTRY_SIZE;
        if entry_count == 0 || entry_count > MAX_ENTRIES {
            if entry_count > 0 {
                warn!("Skipping {} TOC with {} entries", category, entry_count);
            }
            return Ok(());
        }
        let entries_offset = toc_offset + RECORD_SIZE;
        if entries_offset + entry_count * ENTRY_SIZE > data.len() {
            return Err(UrfError::Truncated("TOC entry table"));
        }

        let list = &mut self.lists[category.index()];
        for i in 0..entry_count {
            let entry: TocEntry =
                read_at(data, entries_offset + i * ENTRY_SIZE, ENTRY_SIZE, "TOC entry")?;
            let offset = entry.offset as usize;
            if offset == 0 || offset >= data.len() || entry.length == 0 {
                list.add_filler();
                continue;
            }
            // Property entries store the name length; the payload is always a
            // 4-byte reference.
            let length = match category {
                Category::Property => MIN_ELEMENT_LEN,
                _ => entry.length as usize,
            };
            let payload = data
                .get(offset..offset.saturating_add(length))
                .ok_or(UrfError::Truncated("element data"))?;
            if payload.len() < MIN_ELEMENT_LEN {
                warn!("{} entry {} holds only {} bytes", category, i, payload.len());
                list.add_filler();
                continue;
            }
            let name = entry_name(&entry.name)?;
            list.push_element(name, payload);
        }
        debug!("Read {} {} entries", entry_count, category);
        Ok(())
    }

    /// Reads and parses a URF archive file
    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<UrfArchive> {
        let data = std::fs::read(path)?;
        Self::new(data)
    }

    /// Replaces the contents of this archive with a parsed image. Nothing is
    /// changed when parsing fails.
    pub fn load<T: AsRef<[u8]>>(&mut self, data: T) -> Result<()> {
        *self = Self::new(data)?;
        Ok(())
    }

    /// Header fields of the image this archive was parsed from, if any
    pub fn info(&self) -> Option<&ImageInfo> {
        self.info.as_ref()
    }

    pub fn resources(&self, category: Category) -> &ResourceList {
        &self.lists[category.index()]
    }

    pub fn resources_mut(&mut self, category: Category) -> &mut ResourceList {
        &mut self.lists[category.index()]
    }

    pub fn sounds(&self) -> &ResourceList {
        self.resources(Category::Sound)
    }

    pub fn motions(&self) -> &ResourceList {
        self.resources(Category::Motion)
    }

    pub fn commands(&self) -> &ResourceList {
        self.resources(Category::Command)
    }

    pub fn scripts(&self) -> &ResourceList {
        self.resources(Category::Script)
    }

    pub fn properties(&self) -> &ResourceList {
        self.resources(Category::Property)
    }

    /// Empties every category
    pub fn clear(&mut self) {
        for list in self.lists.iter_mut() {
            list.clear();
        }
        self.info = None;
    }

    /// Total number of slots across all categories, fillers included
    pub fn element_count(&self) -> usize {
        self.lists.iter().map(ResourceList::count).sum()
    }
}

/// Checks the `ADLR` trailer of an archive image, returning the checksum
pub fn verify_checksum(data: &[u8]) -> Result<u32> {
    if data.len() < HEADER_SIZE + RECORD_SIZE {
        return Err(UrfError::Truncated("archive header"));
    }
    let trailer_offset = data.len() - RECORD_SIZE;
    let trailer: TocRecord = read_at(data, trailer_offset, RECORD_SIZE, "checksum trailer")?;
    if trailer.magic != ADLR_MAGIC {
        return Err(UrfError::MalformedTrailer);
    }
    let actual = adler32(&data[..trailer_offset]);
    if actual != trailer.value {
        return Err(UrfError::ChecksumMismatch {
            expected: trailer.value,
            actual,
        });
    }
    Ok(actual)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(records: &[(&[u8; 4], u32)]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(b"UGRF");
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&0i64.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        for (magic, value) in records {
            data.extend_from_slice(&magic[..]);
            data.extend_from_slice(&value.to_le_bytes());
        }
        data
    }

    fn toc_entry(data: &mut Vec<u8>, offset: u32, length: u32, name: &str) {
        data.extend_from_slice(&offset.to_le_bytes());
        data.extend_from_slice(&length.to_le_bytes());
        let mut raw = [0u8; MAX_NAME_LEN];
        raw[..name.len()].copy_from_slice(name.as_bytes());
        data.extend_from_slice(&raw);
    }

    #[test]
    fn reject_short_buffers() {
        assert!(matches!(UrfArchive::new(b""), Err(UrfError::Truncated(_))));
        assert!(matches!(UrfArchive::new(b"UGRF\x01"), Err(UrfError::Truncated(_))));
        assert!(matches!(
            UrfArchive::new(b"UGRF\x01\0\0\0\0\0\0\0"),
            Err(UrfError::Truncated(_))
        ));
    }

    #[test]
    fn reject_bad_signature() {
        let mut data = header(&[(b"SIZE", 0)]);
        data[0..4].copy_from_slice(b"PACK");
        assert!(matches!(
            UrfArchive::new(&data),
            Err(UrfError::MalformedHeader(_))
        ));
        assert!(matches!(
            UrfArchive::new(b"RIFF\0\0\0\0"),
            Err(UrfError::MalformedHeader(_))
        ));
    }

    #[test]
    fn missing_size_record() {
        let data = header(&[(b"UGSF", 0), (b"UGMF", 0), (b"XXXX", 0)]);
        assert!(matches!(UrfArchive::new(&data), Err(UrfError::Truncated(_))));
    }

    #[test]
    fn empty_archive_and_unknown_records() {
        let data = header(&[(b"XXXX", 1234), (b"UGSF", 0), (b"SIZE", 44)]);
        let archive = UrfArchive::new(&data).unwrap();
        assert_eq!(archive.element_count(), 0);
        let info = archive.info().unwrap();
        assert_eq!(info.format, 1);
        assert_eq!(info.declared_size, 44);
        assert_eq!(info.built_at().unwrap().timestamp(), 0);
    }

    #[test]
    fn toc_signature_mismatch() {
        let mut data = header(&[(b"UGSF", 36), (b"SIZE", 0)]);
        data.extend_from_slice(b"UGMF");
        data.extend_from_slice(&0u32.to_le_bytes());
        assert!(matches!(
            UrfArchive::new(&data),
            Err(UrfError::MalformedToc {
                category: Category::Sound,
                ..
            })
        ));
    }

    #[test]
    fn toc_offset_out_of_bounds() {
        let data = header(&[(b"UGCF", 0x1000), (b"SIZE", 0)]);
        assert!(matches!(
            UrfArchive::new(&data),
            Err(UrfError::MalformedToc {
                category: Category::Command,
                ..
            })
        ));
    }

    #[test]
    fn truncated_entry_table() {
        let mut data = header(&[(b"UGMF", 36), (b"SIZE", 0)]);
        data.extend_from_slice(b"UGMF");
        data.extend_from_slice(&80u32.to_le_bytes());
        toc_entry(&mut data, 0xFFFF_FFFF, 0, "");
        assert!(matches!(UrfArchive::new(&data), Err(UrfError::Truncated(_))));
    }

    #[test]
    fn element_past_end() {
        let mut data = header(&[(b"UGMF", 36), (b"SIZE", 0)]);
        data.extend_from_slice(b"UGMF");
        data.extend_from_slice(&40u32.to_le_bytes());
        toc_entry(&mut data, 4, 500, "walk");
        assert!(matches!(UrfArchive::new(&data), Err(UrfError::Truncated(_))));
    }

    #[test]
    fn fillers_and_property_lengths() {
        // header (20) + three records (24); motion TOC at 44, property TOC at 172
        let mut data = header(&[(b"UGMF", 44), (b"PROP", 172), (b"SIZE", 0)]);
        data.extend_from_slice(b"UGMF");
        data.extend_from_slice(&120u32.to_le_bytes());
        toc_entry(&mut data, 220, 5, "one");
        toc_entry(&mut data, 0xFFFF_FFFF, 0, "");
        toc_entry(&mut data, 225, 4, "two");
        assert_eq!(data.len(), 172);
        data.extend_from_slice(b"PROP");
        data.extend_from_slice(&40u32.to_le_bytes());
        toc_entry(&mut data, 220, 7, "volumes");
        assert_eq!(data.len(), 220);
        data.extend_from_slice(b"PRP1-trailing-bytes");

        let archive = UrfArchive::new(&data).unwrap();
        let motions = archive.motions();
        assert_eq!(motions.count(), 3);
        assert_eq!(motions.get(0).unwrap().name(), "one");
        assert_eq!(motions.get(0).unwrap().data(), b"PRP1-");
        assert!(motions.get(1).unwrap().is_filler());
        assert_eq!(motions.get(2).unwrap().data(), b"trai");
        let props = archive.properties();
        assert_eq!(props.count(), 1);
        assert_eq!(props.get(0).unwrap().name(), "volumes");
        assert_eq!(props.get(0).unwrap().data(), b"PRP1");
    }

    #[test]
    fn duplicate_names_keep_their_slots() {
        // header (20) + two records (16); motion TOC at 36, data at 124
        let mut data = header(&[(b"UGMF", 36), (b"SIZE", 0)]);
        data.extend_from_slice(b"UGMF");
        data.extend_from_slice(&80u32.to_le_bytes());
        toc_entry(&mut data, 124, 4, "walk");
        toc_entry(&mut data, 128, 4, "walk");
        assert_eq!(data.len(), 124);
        data.extend_from_slice(b"UGMFUGMF");

        let archive = UrfArchive::new(&data).unwrap();
        let motions = archive.motions();
        assert_eq!(motions.count(), 2);
        assert_eq!(motions.get(1).unwrap().name(), "walk");
        assert_eq!(motions.find_by_name("walk"), Some(0));
    }

    #[test]
    fn oversized_toc_is_skipped() {
        // header (20) + three records (24); motion TOC at 44, sound TOC at 52
        let mut data = header(&[(b"UGMF", 44), (b"UGSF", 52), (b"SIZE", 0)]);
        data.extend_from_slice(b"UGMF");
        data.extend_from_slice(&((MAX_ENTRIES as u32 + 1) * ENTRY_SIZE as u32).to_le_bytes());
        data.extend_from_slice(b"UGSF");
        data.extend_from_slice(&40u32.to_le_bytes());
        toc_entry(&mut data, 100, 8, "bark");
        assert_eq!(data.len(), 100);
        data.extend_from_slice(b"UGSFbark");

        let archive = UrfArchive::new(&data).unwrap();
        assert!(archive.motions().is_empty());
        assert_eq!(archive.sounds().count(), 1);
        assert_eq!(archive.sounds().get(0).unwrap().data(), b"UGSFbark");
    }

    #[test]
    fn load_keeps_state_on_error() {
        let mut archive = UrfArchive::default();
        archive
            .resources_mut(Category::Script)
            .add("main", &b" AMXmain"[..])
            .unwrap();
        assert!(archive.load(b"JUNKJUNKJUNK").is_err());
        assert_eq!(archive.scripts().count(), 1);
    }

    #[test]
    fn checksum_trailer() {
        let mut data = header(&[(b"SIZE", 28)]);
        let checksum = adler32(&data);
        data.extend_from_slice(b"ADLR");
        data.extend_from_slice(&checksum.to_le_bytes());
        assert_eq!(verify_checksum(&data).unwrap(), checksum);
        data[10] ^= 0xFF;
        assert!(matches!(
            verify_checksum(&data),
            Err(UrfError::ChecksumMismatch { .. })
        ));
        let plain = header(&[(b"SIZE", 28), (b"XXXX", 0)]);
        assert!(matches!(verify_checksum(&plain), Err(UrfError::MalformedTrailer)));
    }
}
