//! Forest persistence (save/load).
//!
//! # File Layout
//!
//! ```text
//! ┌──────────────────────────────┐  0
//! │ header (bincode, padded)     │  magic, version, metric, dimensions,
//! │                              │  section sizes
//! ├──────────────────────────────┤  HEADER_LEN
//! │ item slots (u64 words)       │  presence word + vector, per id
//! ├──────────────────────────────┤
//! │ node arena (u32 words)       │  fixed-stride records
//! ├──────────────────────────────┤
//! │ roots (u32 words)            │
//! └──────────────────────────────┘
//! ```
//!
//! Sections are stored in native byte order so a loaded file is searched in
//! place through its mapping. The header is decoded and checked first, so a
//! file written for another metric or dimension is rejected before any
//! section is read.

use super::node::{NodeId, NodeView, SPLIT_TAG};
use super::store::{ItemTable, Section};
use super::{ForestIndex, Metric};
use crate::error::{Error, Result};
use crate::metric::MetricKind;
use memmap2::{Mmap, MmapOptions};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::mem::size_of;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File magic.
const MAGIC: [u8; 8] = *b"ARBORIDX";

/// Bumped whenever the layout changes.
const FORMAT_VERSION: u32 = 2;

/// Bytes reserved for the header; sections start here.
pub(super) const HEADER_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(super) struct Header {
    pub magic: [u8; 8],
    pub version: u32,
    pub metric: MetricKind,
    /// Stored elements per item.
    pub dimension: u64,
    /// Values per caller vector; differs from `dimension` for packed bits.
    pub external_dimension: u64,
    pub slot_words: u64,
    pub node_stride: u64,
    pub n_slots: u64,
    pub n_nodes: u64,
    pub n_roots: u64,
}

/// Byte ranges of the sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Layout {
    pub items: Range<usize>,
    pub nodes: Range<usize>,
    pub roots: Range<usize>,
}

impl Header {
    fn describe<M: Metric>(index: &ForestIndex<M>, n_slots: usize) -> Self {
        Self {
            magic: MAGIC,
            version: FORMAT_VERSION,
            metric: M::KIND,
            dimension: index.dimension as u64,
            external_dimension: index.external_dimension as u64,
            slot_words: ItemTable::<M::Element>::slot_words(index.dimension) as u64,
            node_stride: index.node_stride as u64,
            n_slots: n_slots as u64,
            n_nodes: index.n_nodes() as u64,
            n_roots: index.roots.len() as u64,
        }
    }

    fn encode(&self) -> Result<[u8; HEADER_LEN]> {
        let bytes = bincode::serialize(self)?;
        let mut out = [0u8; HEADER_LEN];
        out.get_mut(..bytes.len())
            .ok_or_else(|| Error::Serialization("index header too large".to_string()))?
            .copy_from_slice(&bytes);
        Ok(out)
    }

    /// Section ranges, or `None` if the sizes overflow.
    pub(super) fn layout(&self) -> Option<Layout> {
        let section = |start: usize, count: u64, word: usize| {
            let len = usize::try_from(count).ok()?.checked_mul(word)?;
            Some(start..start.checked_add(len)?)
        };
        let slot_bytes = usize::try_from(self.slot_words)
            .ok()?
            .checked_mul(size_of::<u64>())?;
        let node_bytes = usize::try_from(self.node_stride)
            .ok()?
            .checked_mul(size_of::<u32>())?;

        let items = section(HEADER_LEN, self.n_slots, slot_bytes)?;
        let nodes = section(items.end, self.n_nodes, node_bytes)?;
        let roots = section(nodes.end, self.n_roots, size_of::<NodeId>())?;
        Some(Layout {
            items,
            nodes,
            roots,
        })
    }
}

/// Contents of a mapped index file.
#[derive(Debug)]
pub(super) struct MappedForest {
    pub map: Arc<Mmap>,
    pub layout: Layout,
    pub roots: Vec<NodeId>,
}

/// Writes the forest to `path`, replacing any existing file.
///
/// The file is written next to `path` and renamed over it, so a mapping of
/// the old file stays valid until it is dropped.
pub(super) fn write_file<M: Metric>(index: &ForestIndex<M>, path: &Path) -> Result<()> {
    let tmp = temp_path(path);
    if let Err(err) = write_sections(index, &tmp) {
        let _ = std::fs::remove_file(&tmp);
        return Err(err);
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn write_sections<M: Metric>(index: &ForestIndex<M>, path: &Path) -> Result<()> {
    let header = Header::describe(index, index.items.len());
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&header.encode()?)?;
    writer.write_all(bytemuck::cast_slice(index.items.words()))?;
    writer.write_all(bytemuck::cast_slice(index.nodes.words()))?;
    writer.write_all(bytemuck::cast_slice(&index.roots))?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Completes an on-disk build: appends nodes and roots after the items
/// already in the file, then writes the header. Returns the final file
/// length; the caller trims the file to it.
pub(super) fn finish_on_disk<M: Metric>(index: &ForestIndex<M>) -> Result<u64> {
    let Section::File(region) = index.items.section() else {
        return Err(Error::InvalidState("no on-disk build in progress".to_string()));
    };
    region.flush()?;

    let header = Header::describe(index, index.items.len());
    let layout = header
        .layout()
        .ok_or_else(|| Error::Build("forest too large for this platform".to_string()))?;

    let mut writer = BufWriter::new(region.file());
    writer.seek(SeekFrom::Start(layout.nodes.start as u64))?;
    writer.write_all(bytemuck::cast_slice(index.nodes.words()))?;
    writer.write_all(bytemuck::cast_slice(&index.roots))?;
    writer.seek(SeekFrom::Start(0))?;
    writer.write_all(&header.encode()?)?;
    writer.flush()?;
    drop(writer);

    region.file().sync_all()?;
    Ok(layout.roots.end as u64)
}

/// Maps a forest written by [`write_file`] or an on-disk build.
pub(super) fn read_file<M: Metric>(
    index: &ForestIndex<M>,
    path: &Path,
    prefault: bool,
) -> Result<MappedForest> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    if len == 0 {
        return Err(Error::IndexFormat(format!("{} is empty", path.display())));
    }
    if len < HEADER_LEN as u64 {
        return Err(Error::IndexFormat(format!(
            "{} is not an index: too short",
            path.display()
        )));
    }

    let mut options = MmapOptions::new();
    if prefault {
        options.populate();
    }
    // SAFETY: the mapping is read-only and every section is validated below
    // before it is searched. Concurrent truncation of the file by another
    // process is outside this crate's contract; `save` replaces files by
    // rename, so a mapped file is never rewritten in place.
    let map = unsafe { options.map(&file)? };

    let header: Header = bincode::deserialize(&map[..HEADER_LEN])
        .map_err(|e| Error::IndexFormat(format!("{} is not an index: {e}", path.display())))?;
    validate_header(index, &header)?;

    let layout = header
        .layout()
        .ok_or_else(|| Error::IndexFormat(format!("{} is corrupted", path.display())))?;
    if layout.roots.end as u64 != len {
        return Err(Error::IndexFormat(format!(
            "{} is corrupted: expected {} bytes, found {len}",
            path.display(),
            layout.roots.end
        )));
    }

    let roots: Vec<NodeId> = bytemuck::cast_slice(&map[layout.roots.clone()]).to_vec();
    validate_sections(index, &map, &layout, &roots)?;
    Ok(MappedForest {
        map: Arc::new(map),
        layout,
        roots,
    })
}

pub(super) fn validate_header<M: Metric>(index: &ForestIndex<M>, header: &Header) -> Result<()> {
    if header.magic != MAGIC {
        return Err(Error::IndexFormat("bad magic".to_string()));
    }
    if header.version != FORMAT_VERSION {
        return Err(Error::IndexFormat(format!(
            "unsupported format version {} (expected {FORMAT_VERSION})",
            header.version
        )));
    }
    if header.metric != M::KIND {
        return Err(Error::IndexFormat(format!(
            "index was built with metric {}, this handle uses {}",
            header.metric,
            M::KIND
        )));
    }
    if header.external_dimension != index.external_dimension as u64 {
        return Err(Error::IndexFormat(format!(
            "index has dimension {}, this handle uses {}",
            header.external_dimension, index.external_dimension
        )));
    }
    if header.dimension != index.dimension as u64 {
        return Err(Error::IndexFormat(format!(
            "index stores {} elements per item, this handle uses {}",
            header.dimension, index.dimension
        )));
    }
    if header.slot_words != ItemTable::<M::Element>::slot_words(index.dimension) as u64
        || header.node_stride != index.node_stride as u64
    {
        return Err(Error::IndexFormat("unexpected record size".to_string()));
    }
    Ok(())
}

/// Checks the structural references a search relies on.
fn validate_sections<M: Metric>(
    index: &ForestIndex<M>,
    map: &[u8],
    layout: &Layout,
    roots: &[NodeId],
) -> Result<()> {
    let slot_words = ItemTable::<M::Element>::slot_words(index.dimension);
    let items: &[u64] = bytemuck::cast_slice(&map[layout.items.clone()]);
    if items.chunks_exact(slot_words).any(|slot| slot[0] > 1) {
        return Err(Error::IndexFormat("bad item slot".to_string()));
    }
    let n_slots = items.len() / slot_words;

    let nodes: &[u32] = bytemuck::cast_slice(&map[layout.nodes.clone()]);
    let n_nodes = nodes.len() / index.node_stride;
    if roots.iter().any(|&r| r as usize >= n_nodes) {
        return Err(Error::IndexFormat("root out of range".to_string()));
    }

    let split_words = M::split_words(index.dimension);
    for record in nodes.chunks_exact(index.node_stride) {
        if record[0] != SPLIT_TAG && record[0] as usize > index.leaf_size {
            return Err(Error::IndexFormat("leaf too large".to_string()));
        }
        match NodeView::decode(record, split_words) {
            NodeView::Split { children, split } => {
                if children.iter().any(|&c| c as usize >= n_nodes) {
                    return Err(Error::IndexFormat("child out of range".to_string()));
                }
                if !M::split_fits(split, index.dimension) {
                    return Err(Error::IndexFormat("split with wrong dimension".to_string()));
                }
            }
            NodeView::Leaf { items } => {
                if items.iter().any(|&i| i as usize >= n_slots) {
                    return Err(Error::IndexFormat("leaf item out of range".to_string()));
                }
            }
        }
    }
    Ok(())
}
