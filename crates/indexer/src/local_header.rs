//! Forward-only access to zip local file headers.
//!
//! Entries whose sizes are known up front go to the `zip` crate. Entries
//! written by streaming producers (`jar`, `ZipOutputStream`, pipes) set
//! general-purpose bit 3 and carry their sizes in a data descriptor after
//! the data; those are decoded here, relying on deflate being
//! self-terminating.

use crate::error::Result;
use flate2::bufread::DeflateDecoder;
use std::io::{self, BufRead, Read};
use zip::result::ZipError;

const LOCAL_FILE_HEADER: u32 = 0x0403_4b50;
const CENTRAL_DIRECTORY_HEADER: u32 = 0x0201_4b50;
const END_OF_CENTRAL_DIRECTORY: u32 = 0x0605_4b50;
const ZIP64_END_OF_CENTRAL_DIRECTORY: u32 = 0x0606_4b50;
const DATA_DESCRIPTOR: u32 = 0x0807_4b50;

const FLAG_ENCRYPTED: u16 = 1;
const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATED: u16 = 8;

const ZIP64_EXTRA_FIELD: u16 = 0x0001;

const FIXED_HEADER_LEN: usize = 30;

/// The fixed 30-byte part of a local file header.
pub(crate) struct LocalHeader {
    raw: [u8; FIXED_HEADER_LEN],
}

impl LocalHeader {
    /// `None` once the central directory starts or the stream ends cleanly
    /// between entries.
    pub(crate) fn read_next<R: Read>(reader: &mut R) -> Result<Option<Self>> {
        let mut raw = [0u8; FIXED_HEADER_LEN];
        match read_up_to(reader, &mut raw[..4])? {
            0 => return Ok(None),
            4 => {}
            _ => return Err(ZipError::InvalidArchive("Truncated record signature").into()),
        }
        match u32_at(&raw, 0) {
            LOCAL_FILE_HEADER => {}
            CENTRAL_DIRECTORY_HEADER | END_OF_CENTRAL_DIRECTORY | ZIP64_END_OF_CENTRAL_DIRECTORY => {
                return Ok(None)
            }
            _ => return Err(ZipError::InvalidArchive("Invalid local file header").into()),
        }
        reader.read_exact(&mut raw[4..])?;
        Ok(Some(Self { raw }))
    }

    /// The header exactly as read, for handing back to a parser that wants it.
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub(crate) fn has_data_descriptor(&self) -> bool {
        self.flags() & FLAG_DATA_DESCRIPTOR != 0
    }

    fn flags(&self) -> u16 {
        u16_at(&self.raw, 6)
    }

    fn method(&self) -> u16 {
        u16_at(&self.raw, 8)
    }

    fn compressed_size(&self) -> u32 {
        u32_at(&self.raw, 18)
    }

    fn name_len(&self) -> usize {
        usize::from(u16_at(&self.raw, 26))
    }

    fn extra_len(&self) -> usize {
        usize::from(u16_at(&self.raw, 28))
    }
}

enum Body<'a, R: BufRead> {
    Deflated(DeflateDecoder<&'a mut R>),
    Stored(io::Take<&'a mut R>),
}

/// An entry whose sizes follow its data.
pub(crate) struct DescribedEntry<'a, R: BufRead> {
    name: String,
    zip64: bool,
    body: Body<'a, R>,
    inflated: u64,
}

impl<'a, R: BufRead> DescribedEntry<'a, R> {
    /// Reads the variable part of the header and positions `reader` at the data.
    pub(crate) fn open(header: &LocalHeader, reader: &'a mut R) -> Result<Self> {
        if header.flags() & FLAG_ENCRYPTED != 0 {
            return Err(ZipError::UnsupportedArchive("Encrypted entries are not supported").into());
        }
        let mut name = vec![0u8; header.name_len()];
        reader.read_exact(&mut name)?;
        let mut extra = vec![0u8; header.extra_len()];
        reader.read_exact(&mut extra)?;

        let stored_size = header.compressed_size();
        let body = match header.method() {
            METHOD_DEFLATED => Body::Deflated(DeflateDecoder::new(reader)),
            // Without a size, a stored entry has no detectable end.
            METHOD_STORED if stored_size != 0 && stored_size != u32::MAX => {
                Body::Stored(reader.take(u64::from(stored_size)))
            }
            METHOD_STORED => {
                return Err(ZipError::UnsupportedArchive(
                    "Stored entry with a data descriptor and no size",
                )
                .into())
            }
            _ => return Err(ZipError::UnsupportedArchive("Compression method not supported").into()),
        };

        Ok(Self {
            name: String::from_utf8_lossy(&name).into_owned(),
            zip64: has_zip64_field(&extra),
            body,
            inflated: 0,
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn is_dir(&self) -> bool {
        self.name.ends_with('/') || self.name.ends_with('\\')
    }

    /// Skip whatever was not read, consume the data descriptor and return the
    /// entry's uncompressed size.
    pub(crate) fn finish(mut self) -> Result<u64> {
        self.inflated += io::copy(&mut self.body, &mut io::sink())?;
        let reader = match self.body {
            Body::Deflated(decoder) => decoder.into_inner(),
            Body::Stored(take) => take.into_inner(),
        };

        // Signature is optional; the CRC follows it or comes first.
        let mut word = [0u8; 4];
        reader.read_exact(&mut word)?;
        if u32::from_le_bytes(word) == DATA_DESCRIPTOR {
            reader.read_exact(&mut word)?;
        }
        let mut sizes = [0u8; 16];
        let sizes_len = if self.zip64 { 16 } else { 8 };
        reader.read_exact(&mut sizes[..sizes_len])?;
        Ok(self.inflated)
    }
}

impl<R: BufRead> Read for Body<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Deflated(decoder) => decoder.read(buf),
            Self::Stored(take) => take.read(buf),
        }
    }
}

impl<R: BufRead> Read for DescribedEntry<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.body.read(buf)?;
        self.inflated += n as u64;
        Ok(n)
    }
}

fn has_zip64_field(mut extra: &[u8]) -> bool {
    while extra.len() >= 4 {
        let id = u16_at(extra, 0);
        let len = usize::from(u16_at(extra, 2));
        if id == ZIP64_EXTRA_FIELD {
            return true;
        }
        extra = extra.get(4 + len..).unwrap_or_default();
    }
    false
}

fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

fn u16_at(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn u32_at(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
