use crate::*;
use binwrite::BinWrite;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use num::ToPrimitive;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;
use thiserror::Error;

type Result<T> = core::result::Result<T, UrfWriteError>;

#[derive(Debug, Error)]
pub enum UrfWriteError {
    #[error("Archive layout mismatch: computed {expected} bytes, wrote {actual}")]
    LayoutMismatch { expected: usize, actual: usize },
    #[error("Archive offset {0} does not fit in 32 bits")]
    TooLarge(usize),
    #[error("Property element {0} has no name")]
    UnnamedProperty(usize),
    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

/// Header values stamped into a written archive
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct WriterOptions {
    /// Build time to record; the current time when unset
    pub build_time: Option<DateTime<Utc>>,
    pub format: u32,
    pub version: u32,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            build_time: None,
            format: 1,
            version: 0,
        }
    }
}

impl BinWrite for TocEntry {
    fn write_options<W: Write>(
        &self,
        writer: &mut W,
        _: &binwrite::WriterOption,
    ) -> std::io::Result<()> {
        self.offset.to_le_bytes().write(writer)?;
        self.length.to_le_bytes().write(writer)?;
        writer.write_all(&self.name)
    }
}

fn to_u32(value: usize) -> Result<u32> {
    value.to_u32().ok_or(UrfWriteError::TooLarge(value))
}

/// Pads with `'0'` up to the next multiple of `alignment`
fn pad<W: Write + Seek>(writer: &mut W, alignment: usize) -> Result<usize> {
    let pos = writer.stream_position()? as usize;
    let aligned = align(pos, alignment);
    std::io::copy(
        &mut std::io::repeat(PAD_BYTE).take((aligned - pos) as u64),
        writer,
    )?;
    Ok(aligned)
}

fn name_field(name: &str) -> [u8; MAX_NAME_LEN] {
    let mut raw = [0u8; MAX_NAME_LEN];
    let len = name.len().min(MAX_NAME_LEN);
    raw[..len].copy_from_slice(&name.as_bytes()[..len]);
    raw
}

impl UrfArchive {
    /// Number of bytes `to_bytes` will produce
    pub fn compute_size(&self) -> usize {
        let mut size = HEADER_SIZE + Category::ALL.len() * RECORD_SIZE + RECORD_SIZE;

        for category in Category::ALL.iter().copied() {
            let list = self.resources(category);
            if list.is_empty() {
                continue;
            }
            size = align(size, CATEGORY_ALIGNMENT);
            for element in list {
                size = align(size, category.alignment()) + element.len();
            }
        }

        size = align(size, TOC_ALIGNMENT);
        for list in self.lists.iter() {
            size += RECORD_SIZE + list.count() * ENTRY_SIZE;
        }

        align(size, TRAILER_ALIGNMENT) + RECORD_SIZE
    }

    /// Serializes the archive, stamping the current time
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.to_bytes_with(&WriterOptions::default())
    }

    pub fn to_bytes_with(&self, options: &WriterOptions) -> Result<Vec<u8>> {
        // Property entries store the name length, so a nameless one would
        // read back as a filler.
        if let Some(index) = self
            .properties()
            .iter()
            .position(|e| !e.is_filler() && e.name().is_empty())
        {
            return Err(UrfWriteError::UnnamedProperty(index));
        }
        let expected = self.compute_size();
        let mut writer = Cursor::new(Vec::with_capacity(expected));

        ArchiveHeader {
            magic: URF_MAGIC,
            format: options.format,
            build_time: options.build_time.unwrap_or_else(Utc::now).timestamp(),
            version: options.version,
        }
        .write(&mut writer)?;
        for category in Category::ALL.iter() {
            TocRecord {
                magic: category.signature(),
                value: 0,
            }
            .write(&mut writer)?;
        }
        TocRecord {
            magic: SIZE_MAGIC,
            value: to_u32(expected - RECORD_SIZE)?,
        }
        .write(&mut writer)?;

        let mut offsets: [Vec<u32>; 5] = Default::default();
        for category in Category::ALL.iter().copied() {
            let list = self.resources(category);
            if list.is_empty() {
                continue;
            }
            if list.count() > MAX_ENTRIES {
                warn!(
                    "{} has {} entries; readers ignore more than {}",
                    category,
                    list.count(),
                    MAX_ENTRIES
                );
            }
            pad(&mut writer, CATEGORY_ALIGNMENT)?;
            let category_offsets = &mut offsets[category.index()];
            for element in list {
                let pos = pad(&mut writer, category.alignment())?;
                if element.is_filler() {
                    category_offsets.push(FILLER_OFFSET);
                } else {
                    category_offsets.push(to_u32(pos)?);
                    writer.write_all(element.data())?;
                }
                let end = writer.position() as usize;
                if end > expected {
                    return Err(UrfWriteError::LayoutMismatch {
                        expected,
                        actual: end,
                    });
                }
            }
        }

        pad(&mut writer, TOC_ALIGNMENT)?;
        for category in Category::ALL.iter().copied() {
            let list = self.resources(category);
            let toc_offset = writer.position();
            writer.seek(SeekFrom::Start(
                (HEADER_SIZE + category.index() * RECORD_SIZE) as u64,
            ))?;
            TocRecord {
                magic: category.signature(),
                value: to_u32(toc_offset as usize)?,
            }
            .write(&mut writer)?;
            writer.seek(SeekFrom::Start(toc_offset))?;

            TocRecord {
                magic: category.signature(),
                value: to_u32(list.count() * ENTRY_SIZE)?,
            }
            .write(&mut writer)?;
            for (element, offset) in list.iter().zip(offsets[category.index()].iter()) {
                let entry = if element.is_filler() {
                    TocEntry {
                        offset: FILLER_OFFSET,
                        length: 0,
                        name: [0; MAX_NAME_LEN],
                    }
                } else {
                    TocEntry {
                        offset: *offset,
                        length: match category {
                            Category::Property => to_u32(element.name().len())?,
                            _ => to_u32(element.len())?,
                        },
                        name: name_field(element.name()),
                    }
                };
                entry.write(&mut writer)?;
            }
        }

        let body_len = pad(&mut writer, TRAILER_ALIGNMENT)?;
        if body_len + RECORD_SIZE != expected {
            return Err(UrfWriteError::LayoutMismatch {
                expected,
                actual: body_len + RECORD_SIZE,
            });
        }

        let mut buf = writer.into_inner();
        TocRecord {
            magic: ADLR_MAGIC,
            value: adler32(&buf),
        }
        .write(&mut buf)?;
        debug!(
            "Wrote archive with {} elements, {} bytes",
            self.element_count(),
            buf.len()
        );
        Ok(buf)
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let buf = self.to_bytes()?;
        writer.write_all(&buf)?;
        Ok(())
    }

    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let buf = self.to_bytes()?;
        std::fs::write(path, buf)?;
        Ok(())
    }
}
