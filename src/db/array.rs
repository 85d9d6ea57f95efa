// File-backed database: one directory, one file per artifact and tier.
//
//   <tier>.adb   solved records, split into independently compressed blocks
//   <tier>.ckpt  value-iteration checkpoint
//   <tier>.dmap  discovery map
//   <tier>.stat  analysis
//
// Every file is written to a temporary sibling and renamed into place, so a
// crash never leaves a half-written artifact under its final name.

use std::fs::{self, File};
use std::io::{BufWriter, Cursor, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::analysis::Analysis;
use crate::bitset::ConcurrentBitset;
use crate::config::SolveOptions;
use crate::db::codec::{self, Compression};
use crate::db::{CheckpointStatus, Database, Record, RecordArray, TierProbe, TierStatus};
use crate::error::{Result, SolverError};
use crate::memory::Allocator;
use crate::types::{Position, Tier, TierPosition};

const TIER_MAGIC: [u8; 8] = *b"TSARRAY1";
const CHECKPOINT_MAGIC: [u8; 8] = *b"TSCKPT01";
const DISCOVERY_MAGIC: [u8; 8] = *b"TSDMAP01";
const ANALYSIS_MAGIC: [u8; 8] = *b"TSSTAT01";

/// Checkpoint prefix: magic, version, step, remoteness, tier, size.
const CHECKPOINT_PREFIX_BYTES: u64 = 8 + 4 + 4 + 4 + 8 + 8;
/// Discovery map prefix: magic, tier, bit count.
const DISCOVERY_PREFIX_BYTES: u64 = 8 + 8 + 8;
/// Far above any encoded `Analysis`.
const MAX_ANALYSIS_BYTES: usize = 1 << 12;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TierHeader {
    version: u32,
    tier: Tier,
    size: u64,
    block_records: u64,
    compression: u8,
    blocks: Vec<BlockEntry>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct BlockEntry {
    /// Offset of the body from the end of the header.
    offset: u64,
    clen: u64,
    ulen: u64,
    crc: u32,
}

#[derive(Debug, Clone)]
pub struct ArrayDb {
    root: PathBuf,
    compression: Compression,
    block_records: usize,
}

impl ArrayDb {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| SolverError::fs(&root, e))?;
        Ok(Self { root, compression: Compression::Lz4, block_records: 1 << 16 })
    }

    pub fn from_options<P: AsRef<Path>>(root: P, options: &SolveOptions) -> Result<Self> {
        Ok(Self::open(root)?
            .with_compression(options.compression)
            .with_block_records(options.block_records))
    }

    #[must_use]
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    #[must_use]
    pub fn with_block_records(mut self, block_records: usize) -> Self {
        self.block_records = block_records.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, tier: Tier, ext: &str) -> PathBuf {
        self.root.join(format!("{tier}.{ext}"))
    }

    /// Size of a solved tier as recorded in its header.
    pub fn solved_tier_size(&self, tier: Tier) -> Result<u64> {
        let path = self.path(tier, "adb");
        let (mut file, len) = open_sized(&path)?;
        let (header, _) = read_tier_header(&mut file, len, &path)?;
        Ok(header.size)
    }

    fn check_tier_file(&self, tier: Tier) -> Result<()> {
        let path = self.path(tier, "adb");
        let (mut file, len) = open_sized(&path)?;
        let (header, _) = read_tier_header(&mut file, len, &path)?;
        if header.tier != tier {
            return Err(SolverError::corrupt(&path, format!("file holds tier {}", header.tier)));
        }
        Ok(())
    }

    /// SHA-256 over the decoded records of a solved tier, hex encoded.
    pub fn tier_digest(&self, tier: Tier) -> Result<String> {
        let size = self.solved_tier_size(tier)?;
        let records = self.load_tier(tier, size, &Allocator::unbounded())?;
        let mut hasher = Sha256::new();
        hasher.update(records.to_bytes());
        Ok(hex::encode(hasher.finalize()))
    }
}

fn write_atomically(path: &Path, write: impl FnOnce(&mut BufWriter<File>) -> Result<()>) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    let file = File::create(&tmp).map_err(|e| SolverError::fs(&tmp, e))?;
    let mut w = BufWriter::new(file);
    write(&mut w)?;
    w.flush().map_err(|e| SolverError::fs(&tmp, e))?;
    w.get_ref().sync_all().map_err(|e| SolverError::fs(&tmp, e))?;
    drop(w);
    fs::rename(&tmp, path).map_err(|e| SolverError::fs(path, e))
}

fn write_bytes(w: &mut impl Write, bytes: &[u8], path: &Path) -> Result<()> {
    w.write_all(bytes).map_err(|e| SolverError::fs(path, e))
}

/// Opens `path` for reading along with its length on disk.
fn open_sized(path: &Path) -> Result<(File, u64)> {
    let file = File::open(path).map_err(|e| SolverError::fs(path, e))?;
    let len = file.metadata().map_err(|e| SolverError::fs(path, e))?.len();
    Ok((file, len))
}

/// Reads and validates the header of a tier file `file_len` bytes long.
/// Returns the header and the offset of the first block body.
fn read_tier_header<R: Read>(r: &mut R, file_len: u64, path: &Path) -> Result<(TierHeader, u64)> {
    codec::expect_magic(r, &TIER_MAGIC, path)?;
    let len = u64::from(u32::from_le_bytes(codec::read_array(r, path)?));
    let data_offset = 8 + 4 + len;
    if data_offset > file_len {
        return Err(SolverError::corrupt(path, format!("header of {len} bytes runs past the end of the file")));
    }
    let mut bytes = Vec::new();
    r.by_ref().take(len).read_to_end(&mut bytes).map_err(|e| SolverError::fs(path, e))?;
    if bytes.len() as u64 != len {
        return Err(SolverError::corrupt(path, "truncated tier header"));
    }
    let header: TierHeader = bincode::deserialize(&bytes)
        .map_err(|e| SolverError::corrupt(path, format!("tier header decode error: {e}")))?;
    if header.version != FORMAT_VERSION {
        return Err(SolverError::corrupt(
            path,
            format!("version mismatch: got {}, expected {FORMAT_VERSION}", header.version),
        ));
    }
    if Compression::from_tag(header.compression).is_none() {
        return Err(SolverError::corrupt(path, format!("unknown compression tag: {}", header.compression)));
    }
    if header.block_records == 0 {
        return Err(SolverError::corrupt(path, "zero records per block"));
    }
    let expected_blocks = header.size.div_ceil(header.block_records);
    if header.blocks.len() as u64 != expected_blocks {
        return Err(SolverError::corrupt(
            path,
            format!("{} blocks for {} records, expected {expected_blocks}", header.blocks.len(), header.size),
        ));
    }
    let data_len = file_len - data_offset;
    let max_ulen = header.block_records.saturating_mul(2);
    for (i, b) in header.blocks.iter().enumerate() {
        if b.offset.checked_add(b.clen).map_or(true, |end| end > data_len) || b.ulen > max_ulen {
            return Err(SolverError::corrupt(
                path,
                format!("block {i} out of bounds: offset {} clen {} ulen {}", b.offset, b.clen, b.ulen),
            ));
        }
    }
    Ok((header, data_offset))
}

fn header_compression(header: &TierHeader) -> Compression {
    Compression::from_tag(header.compression).unwrap_or(Compression::None)
}

fn status_of(result: Result<()>) -> TierStatus {
    match result {
        Ok(()) => TierStatus::Solved,
        Err(SolverError::FileSystem { source, .. }) if source.kind() == ErrorKind::NotFound => TierStatus::Missing,
        Err(SolverError::FileSystem { source, .. }) if source.kind() == ErrorKind::UnexpectedEof => {
            TierStatus::Corrupted
        }
        Err(SolverError::FileSystem { .. }) => TierStatus::CheckError,
        Err(_) => TierStatus::Corrupted,
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(SolverError::fs(path, e)),
        _ => Ok(()),
    }
}

impl Database for ArrayDb {
    fn tier_status(&self, tier: Tier) -> TierStatus {
        status_of(self.check_tier_file(tier))
    }

    fn flush_solving_tier(&self, records: &RecordArray) -> Result<()> {
        let tier = records.tier();
        let path = self.path(tier, "adb");
        let compression = self.compression;
        let bytes = records.to_bytes();
        let bodies = bytes
            .par_chunks(self.block_records * 2)
            .map(|chunk| -> Result<(Vec<u8>, u64, u32)> {
                Ok((codec::compress(compression, chunk)?, chunk.len() as u64, codec::checksum(chunk)))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut offset = 0u64;
        let blocks = bodies
            .iter()
            .map(|(body, ulen, crc)| {
                let entry = BlockEntry { offset, clen: body.len() as u64, ulen: *ulen, crc: *crc };
                offset += body.len() as u64;
                entry
            })
            .collect();
        let header = TierHeader {
            version: FORMAT_VERSION,
            tier,
            size: records.size(),
            block_records: self.block_records as u64,
            compression: compression.tag(),
            blocks,
        };
        let header_bytes = bincode::serialize(&header)?;
        let header_len = u32::try_from(header_bytes.len())
            .map_err(|_| SolverError::Runtime(format!("tier {tier} header too large")))?;

        write_atomically(&path, |w| {
            write_bytes(w, &TIER_MAGIC, &path)?;
            write_bytes(w, &header_len.to_le_bytes(), &path)?;
            write_bytes(w, &header_bytes, &path)?;
            for (body, _, _) in &bodies {
                write_bytes(w, body, &path)?;
            }
            Ok(())
        })?;
        debug!("[db] flushed tier {tier}: {} records in {} blocks, {offset} bytes", records.size(), bodies.len());
        Ok(())
    }

    fn load_tier(&self, tier: Tier, size: u64, allocator: &Allocator) -> Result<RecordArray> {
        let path = self.path(tier, "adb");
        let mut records = RecordArray::new(tier, size, allocator)?;
        let bytes = fs::read(&path).map_err(|e| SolverError::fs(&path, e))?;
        let mut cursor = Cursor::new(bytes.as_slice());
        let (header, data_offset) = read_tier_header(&mut cursor, bytes.len() as u64, &path)?;
        if header.tier != tier || header.size != size {
            return Err(SolverError::corrupt(
                &path,
                format!("expected tier {tier} of size {size}, found tier {} of size {}", header.tier, header.size),
            ));
        }
        let compression = header_compression(&header);
        let decoded = header
            .blocks
            .par_iter()
            .map(|b| {
                let start = data_offset.checked_add(b.offset);
                let body = match (start, start.and_then(|s| s.checked_add(b.clen))) {
                    (Some(start), Some(end)) => bytes.get(start as usize..end as usize),
                    _ => None,
                }
                .ok_or_else(|| SolverError::corrupt(&path, "truncated block"))?;
                codec::decode_checked(compression, body, b.ulen as usize, b.crc, &path)
            })
            .collect::<Result<Vec<_>>>()?;
        let mut next = 0usize;
        for block in decoded {
            records.fill_from_bytes(next, &block)?;
            next += block.len() / 2;
        }
        if next as u64 != size {
            return Err(SolverError::corrupt(&path, format!("decoded {next} records, expected {size}")));
        }
        Ok(records)
    }

    fn probe(&self) -> Box<dyn TierProbe + Send + '_> {
        Box::new(ArrayProbe { db: self, open: None })
    }

    fn checkpoint_exists(&self, tier: Tier) -> bool {
        self.path(tier, "ckpt").is_file()
    }

    fn checkpoint_save(&self, records: &RecordArray, status: CheckpointStatus) -> Result<()> {
        let path = self.path(records.tier(), "ckpt");
        let payload = records.to_bytes();
        write_atomically(&path, |w| {
            write_bytes(w, &CHECKPOINT_MAGIC, &path)?;
            write_bytes(w, &FORMAT_VERSION.to_le_bytes(), &path)?;
            write_bytes(w, &status.step.to_le_bytes(), &path)?;
            write_bytes(w, &status.remoteness.to_le_bytes(), &path)?;
            write_bytes(w, &records.tier().to_le_bytes(), &path)?;
            write_bytes(w, &records.size().to_le_bytes(), &path)?;
            codec::write_frame(w, self.compression, &payload, &path)
        })
    }

    fn checkpoint_load(&self, tier: Tier, size: u64, allocator: &Allocator) -> Result<(RecordArray, CheckpointStatus)> {
        let path = self.path(tier, "ckpt");
        let mut records = RecordArray::new(tier, size, allocator)?;
        let (file, len) = open_sized(&path)?;
        let mut r = std::io::BufReader::new(file);
        codec::expect_magic(&mut r, &CHECKPOINT_MAGIC, &path)?;
        let version = u32::from_le_bytes(codec::read_array(&mut r, &path)?);
        if version != FORMAT_VERSION {
            return Err(SolverError::corrupt(&path, format!("checkpoint version {version}")));
        }
        let step = i32::from_le_bytes(codec::read_array(&mut r, &path)?);
        let remoteness = i32::from_le_bytes(codec::read_array(&mut r, &path)?);
        let stored_tier = u64::from_le_bytes(codec::read_array(&mut r, &path)?);
        let stored_size = u64::from_le_bytes(codec::read_array(&mut r, &path)?);
        if stored_tier != tier || stored_size != size {
            return Err(SolverError::corrupt(&path, "checkpoint belongs to a different tier"));
        }
        let available = len.saturating_sub(CHECKPOINT_PREFIX_BYTES);
        let payload = codec::read_frame(&mut r, available, RecordArray::memory_usage(size), &path)?;
        records.fill_from_bytes(0, &payload)?;
        Ok((records, CheckpointStatus { step, remoteness }))
    }

    fn checkpoint_remove(&self, tier: Tier) -> Result<()> {
        remove_if_exists(&self.path(tier, "ckpt"))
    }

    fn save_discovery_map(&self, tier: Tier, map: &ConcurrentBitset) -> Result<()> {
        let path = self.path(tier, "dmap");
        let payload = map.serialize();
        write_atomically(&path, |w| {
            write_bytes(w, &DISCOVERY_MAGIC, &path)?;
            write_bytes(w, &tier.to_le_bytes(), &path)?;
            write_bytes(w, &(map.num_bits() as u64).to_le_bytes(), &path)?;
            codec::write_frame(w, self.compression, &payload, &path)
        })
    }

    fn load_discovery_map(&self, tier: Tier, num_bits: usize, allocator: &Allocator) -> Result<Option<ConcurrentBitset>> {
        let path = self.path(tier, "dmap");
        let (file, len) = match open_sized(&path) {
            Ok(opened) => opened,
            Err(SolverError::FileSystem { source, .. }) if source.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let mut r = std::io::BufReader::new(file);
        codec::expect_magic(&mut r, &DISCOVERY_MAGIC, &path)?;
        let stored_tier = u64::from_le_bytes(codec::read_array(&mut r, &path)?);
        let stored_bits = u64::from_le_bytes(codec::read_array(&mut r, &path)?);
        if stored_tier != tier || stored_bits != num_bits as u64 {
            return Err(SolverError::corrupt(&path, format!("map holds {stored_bits} bits of tier {stored_tier}")));
        }
        let mut map = ConcurrentBitset::new_in(num_bits, allocator)?;
        let available = len.saturating_sub(DISCOVERY_PREFIX_BYTES);
        map.deserialize(&codec::read_frame(&mut r, available, ConcurrentBitset::memory_usage(num_bits), &path)?)?;
        Ok(Some(map))
    }

    fn analysis_status(&self, tier: Tier) -> TierStatus {
        status_of(self.load_analysis(tier).and_then(|a| {
            if a.tier == tier {
                Ok(())
            } else {
                Err(SolverError::Runtime(format!("analysis file holds tier {}", a.tier)))
            }
        }))
    }

    fn save_analysis(&self, analysis: &Analysis) -> Result<()> {
        let path = self.path(analysis.tier, "stat");
        let payload = bincode::serialize(analysis)?;
        write_atomically(&path, |w| {
            write_bytes(w, &ANALYSIS_MAGIC, &path)?;
            codec::write_frame(w, Compression::None, &payload, &path)
        })
    }

    fn load_analysis(&self, tier: Tier) -> Result<Analysis> {
        let path = self.path(tier, "stat");
        let (file, len) = open_sized(&path)?;
        let mut r = std::io::BufReader::new(file);
        codec::expect_magic(&mut r, &ANALYSIS_MAGIC, &path)?;
        let payload = codec::read_frame(&mut r, len.saturating_sub(8), MAX_ANALYSIS_BYTES, &path)?;
        bincode::deserialize(&payload).map_err(|e| SolverError::corrupt(&path, format!("analysis decode error: {e}")))
    }
}

struct ArrayProbe<'a> {
    db: &'a ArrayDb,
    open: Option<OpenTier>,
}

struct OpenTier {
    tier: Tier,
    path: PathBuf,
    file: File,
    header: TierHeader,
    data_offset: u64,
    cached: Option<usize>,
    block: Vec<u8>,
}

impl OpenTier {
    fn open(db: &ArrayDb, tier: Tier) -> Result<Self> {
        let path = db.path(tier, "adb");
        let (mut file, len) = open_sized(&path)?;
        let (header, data_offset) = read_tier_header(&mut file, len, &path)?;
        Ok(Self { tier, path, file, header, data_offset, cached: None, block: Vec::new() })
    }

    fn record(&mut self, position: Position) -> Result<Record> {
        if position >= self.header.size {
            return Err(SolverError::Runtime(format!(
                "probe of position {position} outside tier {} of size {}",
                self.tier, self.header.size
            )));
        }
        let index = (position / self.header.block_records) as usize;
        if self.cached != Some(index) {
            let entry = *self
                .header
                .blocks
                .get(index)
                .ok_or_else(|| SolverError::corrupt(&self.path, format!("missing block {index}")))?;
            self.file
                .seek(SeekFrom::Start(self.data_offset + entry.offset))
                .map_err(|e| SolverError::fs(&self.path, e))?;
            let mut body = vec![0u8; entry.clen as usize];
            self.file.read_exact(&mut body).map_err(|e| SolverError::fs(&self.path, e))?;
            self.block =
                codec::decode_checked(header_compression(&self.header), &body, entry.ulen as usize, entry.crc, &self.path)?;
            self.cached = Some(index);
        }
        let at = (position % self.header.block_records) as usize * 2;
        let pair = self
            .block
            .get(at..at + 2)
            .ok_or_else(|| SolverError::corrupt(&self.path, format!("short block {index}")))?;
        Ok(Record::from_raw(u16::from_le_bytes([pair[0], pair[1]])))
    }
}

impl TierProbe for ArrayProbe<'_> {
    fn record(&mut self, tp: TierPosition) -> Result<Record> {
        if !matches!(&self.open, Some(o) if o.tier == tp.tier) {
            self.open = Some(OpenTier::open(self.db, tp.tier)?);
        }
        match self.open.as_mut() {
            Some(open) => open.record(tp.position),
            None => Err(SolverError::Runtime("probe has no open tier".into())),
        }
    }
}
