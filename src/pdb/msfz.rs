//! The MSFZ container (PDZ files). Streams are lists of fragments and each fragment is either
//! a run of uncompressed bytes in the file or part of a compressed chunk. Compressed chunks
//! aren't supported so only the uncompressed fragments can be read.
//!
//! The stream directory is an array of u32 words. For each stream it holds either the nil
//! marker or a list of fragment records, (size, offset low, offset high), ended by a zero
//! size.
use crate::address_space::{AddressSpace, SharedSpace};
use crate::error::{FormatError, Result, checked_add};
use crate::layout::{Descriptor, Record, Struct, descriptor};
use crate::reader::Reader;
use std::sync::Arc;

pub const MSFZ_MAGIC: &[u8; 32] = b"Microsoft MSFZ Container\r\n\x1aALD\0\0";

const VERSION_V0: u64 = 0;
const COMPRESSION_NONE: u32 = 0;
const NIL_FRAGMENT_SIZE: u32 = 0xffffffff;
const WORDS_PER_FRAGMENT: usize = 3;
const COMPRESSED_CHUNK_MASK: u32 = 1 << 31;

#[derive(Clone, Debug)]
pub struct MsfzFileHeader {
    pub signature: Vec<u8>,
    pub version: u64,
    pub stream_dir_offset: u64,
    pub chunk_table_offset: u64,
    pub num_streams: u32,
    pub stream_dir_compression: u32,
    pub stream_dir_size_compressed: u32,
    pub stream_dir_size_uncompressed: u32,
    pub num_chunks: u32,
    pub chunk_table_size: u32,
}

impl Struct for MsfzFileHeader {
    const DESCRIPTOR: &'static Descriptor = descriptor!("PdbMsfzFileHeader" {
        "Signature": Bytes(32),
        "Version": U64,
        "StreamDirOffset": U64,
        "ChunkTableOffset": U64,
        "NumStreams": U32,
        "StreamDirCompression": U32,
        "StreamDirSizeCompressed": U32,
        "StreamDirSizeUncompressed": U32,
        "NumChunks": U32,
        "ChunkTableSize": U32,
    });

    fn from_record(record: &Record) -> Result<Self> {
        Ok(MsfzFileHeader {
            signature: record.bytes("Signature")?.to_vec(),
            version: record.u64("Version")?,
            stream_dir_offset: record.u64("StreamDirOffset")?,
            chunk_table_offset: record.u64("ChunkTableOffset")?,
            num_streams: record.u32("NumStreams")?,
            stream_dir_compression: record.u32("StreamDirCompression")?,
            stream_dir_size_compressed: record.u32("StreamDirSizeCompressed")?,
            stream_dir_size_uncompressed: record.u32("StreamDirSizeUncompressed")?,
            num_chunks: record.u32("NumChunks")?,
            chunk_table_size: record.u32("ChunkTableSize")?,
        })
    }
}

impl MsfzFileHeader {
    pub fn is_magic_valid(&self) -> bool {
        self.signature == MSFZ_MAGIC
    }
}

// Shared by the file and every stream reader handed out.
struct StreamDirectory {
    reader: Reader,
    words: Vec<u32>,

    /// Index into `words` of each stream's first fragment record.
    starts: Vec<usize>,
}

impl StreamDirectory {
    fn stream_size(&self, stream: u32) -> u64 {
        let mut size = 0;
        let mut pos = self.starts[stream as usize];
        while let Some(fragment_size) = self.words.get(pos) {
            match *fragment_size {
                NIL_FRAGMENT_SIZE => return 0,
                0 => break,
                n => size += n as u64,
            }
            pos += WORDS_PER_FRAGMENT;
        }
        size
    }

    fn read_stream(&self, stream: u32, mut position: u64, buffer: &mut [u8]) -> Result<usize> {
        let mut index = self.starts[stream as usize];
        let mut transferred = 0;
        while transferred < buffer.len() {
            let fragment_size = self.words[index];
            if fragment_size == NIL_FRAGMENT_SIZE || fragment_size == 0 {
                break;
            }

            // Chains were checked when the directory was opened.
            let low = self.words[index + 1];
            let high = self.words[index + 2];
            index += WORDS_PER_FRAGMENT;

            if position >= fragment_size as u64 {
                position -= fragment_size as u64;
                continue;
            }

            let count = (buffer.len() - transferred).min((fragment_size as u64 - position) as usize);
            if high & COMPRESSED_CHUNK_MASK != 0 {
                return Err(FormatError::NotSupported(format!(
                    "decompressing PDZ (compressed PDB) files, only uncompressed streams can be read (stream {stream}, position {position:#x})"
                )));
            }

            let file_offset = checked_add(((high as u64) << 32) | low as u64, position)?;
            let read = self
                .reader
                .read_into(file_offset, &mut buffer[transferred..transferred + count])?;
            if read != count {
                return Err(FormatError::bad_format(format!(
                    "MSFZ fragment at {file_offset:#x} is truncated: expected {count} bytes, got {read}"
                )));
            }

            // Either the buffer is full or the next read starts at the next fragment's start.
            transferred += count;
            position = 0;
        }
        Ok(transferred)
    }
}

/// One stream of an MSFZ file as an address space.
pub struct MsfzStream {
    directory: Arc<StreamDirectory>,
    stream: u32,
    size: u64,
}

impl AddressSpace for MsfzStream {
    fn len(&self) -> u64 {
        self.size
    }

    fn read(&self, position: u64, buffer: &mut [u8]) -> Result<usize> {
        self.directory.read_stream(self.stream, position, buffer)
    }
}

pub struct MsfzFile {
    directory: Arc<StreamDirectory>,
    version: u64,
}

impl MsfzFile {
    /// None if the file isn't an MSFZ file or uses a version or stream directory encoding that
    /// isn't supported. Errors if the stream directory is malformed.
    pub fn open(data_source: SharedSpace) -> Result<Option<MsfzFile>> {
        let reader = Reader::new(data_source);
        let header: MsfzFileHeader = reader.read(0)?;
        if !header.is_magic_valid() {
            return Ok(None);
        }
        if header.version != VERSION_V0 {
            tracing::debug!(version = header.version, "unsupported MSFZ version");
            return Ok(None);
        }
        if header.stream_dir_compression != COMPRESSION_NONE
            || header.stream_dir_size_compressed != header.stream_dir_size_uncompressed
        {
            tracing::debug!(
                compression = header.stream_dir_compression,
                "compressed MSFZ stream directories are not supported"
            );
            return Ok(None);
        }
        if header.stream_dir_size_uncompressed % 4 != 0 {
            tracing::debug!(
                size = header.stream_dir_size_uncompressed,
                "MSFZ stream directory size is not a multiple of 4"
            );
            return Ok(None);
        }

        let words = reader.read_u32_array(
            header.stream_dir_offset,
            header.stream_dir_size_uncompressed as u64 / 4,
        )?;
        let starts = find_stream_starts(header.num_streams, &words)?;
        Ok(Some(MsfzFile {
            directory: Arc::new(StreamDirectory {
                reader,
                words,
                starts,
            }),
            version: header.version,
        }))
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn num_streams(&self) -> u32 {
        self.directory.starts.len() as u32
    }

    /// Stream 0 has no contents in MSFZ files.
    pub fn stream_size(&self, stream: u32) -> Result<u64> {
        self.check_stream(stream)?;
        Ok(self.directory.stream_size(stream))
    }

    pub fn get_stream(&self, stream: u32) -> Result<Reader> {
        let size = self.stream_size(stream)?;
        Ok(Reader::new(Arc::new(MsfzStream {
            directory: self.directory.clone(),
            stream,
            size,
        })))
    }

    fn check_stream(&self, stream: u32) -> Result<()> {
        if stream == 0 || stream >= self.num_streams() {
            return Err(FormatError::InvalidArgument(format!(
                "invalid MSFZ stream index {stream}"
            )));
        }
        Ok(())
    }
}

fn find_stream_starts(num_streams: u32, words: &[u32]) -> Result<Vec<usize>> {
    let too_short = || FormatError::bad_format("MSFZ stream directory is too short to be valid");
    let mut starts = Vec::new();
    let mut pos = 0;
    for _ in 0..num_streams {
        starts.push(pos);
        let Some(mut fragment_size) = words.get(pos).copied() else {
            return Err(too_short());
        };
        if fragment_size == NIL_FRAGMENT_SIZE {
            pos += 1;
            continue;
        }

        // Each fragment is followed by two location words and the next size.
        while fragment_size != 0 {
            if pos + WORDS_PER_FRAGMENT >= words.len() {
                return Err(too_short());
            }
            pos += WORDS_PER_FRAGMENT;
            fragment_size = words[pos];
        }
        pos += 1;
    }
    Ok(starts)
}
