//! Word storage behind the item table and the node arena.
//!
//! A [`Section`] is a run of fixed-size words that lives on the heap while
//! building, inside a growing file mapping during an on-disk build, or inside
//! a read-only mapping of a loaded index file.

use crate::error::{Error, Result};
use bytemuck::Pod;
use memmap2::{Mmap, MmapMut};
use std::fs::File;
use std::marker::PhantomData;
use std::mem::size_of;
use std::ops::Range;
use std::sync::Arc;

/// First mapping size of an on-disk build (64 KiB).
const INITIAL_FILE_SIZE: u64 = 64 * 1024;

/// Smallest growth step of an on-disk build (256 KiB).
const MIN_GROWTH: u64 = 256 * 1024;

/// Growth factor for amortized remapping.
const GROWTH_FACTOR: u64 = 2;

/// Storage for a run of `W` words.
#[derive(Debug)]
pub(super) enum Section<W> {
    /// Owned buffer.
    Heap(Vec<W>),
    /// Read-only slice of a loaded file.
    Mapped {
        map: Arc<Mmap>,
        /// Byte range of the section within the file.
        range: Range<usize>,
    },
    /// Writable file mapping that grows on demand.
    File(FileRegion),
}

impl<W: Pod> Default for Section<W> {
    fn default() -> Self {
        Self::Heap(Vec::new())
    }
}

impl<W: Pod> Section<W> {
    /// Stored words.
    pub(super) fn words(&self) -> &[W] {
        match self {
            Self::Heap(words) => words,
            Self::Mapped { map, range } => bytemuck::cast_slice(&map[range.clone()]),
            Self::File(region) => bytemuck::cast_slice(region.bytes()),
        }
    }

    /// Number of stored words.
    pub(super) fn len(&self) -> usize {
        match self {
            Self::Heap(words) => words.len(),
            Self::Mapped { range, .. } => range.len() / size_of::<W>(),
            Self::File(region) => region.len / size_of::<W>(),
        }
    }

    /// Extends the section with zeroed words up to `len` and returns the
    /// writable words.
    ///
    /// # Errors
    ///
    /// Fails on a mapped section or if the backing file cannot grow.
    pub(super) fn grow_to(&mut self, len: usize) -> Result<&mut [W]> {
        match self {
            Self::Heap(words) => {
                if words.len() < len {
                    words.resize(len, W::zeroed());
                }
                Ok(words.as_mut_slice())
            }
            Self::Mapped { .. } => Err(Error::InvalidState(
                "a loaded index is read-only".to_string(),
            )),
            Self::File(region) => {
                region.grow_to(len.max(region.len / size_of::<W>()) * size_of::<W>())?;
                Ok(bytemuck::cast_slice_mut(region.bytes_mut()))
            }
        }
    }

    /// Resizes the backing file of a file section to exactly `len` bytes.
    /// Other sections are left alone.
    pub(super) fn set_file_len(&mut self, len: u64) -> Result<()> {
        match self {
            Self::File(region) => region.set_file_len(len),
            Self::Heap(_) | Self::Mapped { .. } => Ok(()),
        }
    }
}

/// Writable mapping of `file`, used from byte `offset` on.
///
/// The file is kept larger than the used length; `len` tracks the bytes
/// written so far.
#[derive(Debug)]
pub(super) struct FileRegion {
    file: File,
    map: MmapMut,
    offset: usize,
    len: usize,
}

impl FileRegion {
    /// Maps a freshly created `file`, reserving `offset` leading bytes.
    pub(super) fn create(file: File, offset: usize) -> Result<Self> {
        file.set_len(INITIAL_FILE_SIZE.max(offset as u64))?;

        // SAFETY: `file` was opened read-write by the caller and resized with
        // set_len() above, so the whole mapped range exists. The region owns
        // the file handle for as long as the mapping lives.
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self {
            file,
            map,
            offset,
            len: 0,
        })
    }

    pub(super) fn file(&self) -> &File {
        &self.file
    }

    /// Writes dirty pages back to the file.
    pub(super) fn flush(&self) -> Result<()> {
        self.map.flush()?;
        Ok(())
    }

    fn bytes(&self) -> &[u8] {
        &self.map[self.offset..self.offset + self.len]
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.map[self.offset..self.offset + self.len]
    }

    /// Trims or extends the file to `len` bytes and remaps it.
    fn set_file_len(&mut self, len: u64) -> Result<()> {
        if len < (self.offset + self.len) as u64 {
            return Err(Error::InvalidInput(format!(
                "file length {len} would cut off stored items"
            )));
        }
        self.map.flush()?;
        self.file.set_len(len)?;

        // SAFETY: the file now holds exactly `len` bytes, which covers the
        // used range checked above. The old mapping is dropped on assignment.
        self.map = unsafe { MmapMut::map_mut(&self.file)? };
        Ok(())
    }

    /// Grows the used length to `len` bytes, remapping when the file is full.
    fn grow_to(&mut self, len: usize) -> Result<()> {
        let required = (self.offset + len) as u64;
        let current = self.map.len() as u64;
        if required > current {
            self.map.flush()?;

            let doubled = current.saturating_mul(GROWTH_FACTOR);
            let with_headroom = required.saturating_add(MIN_GROWTH);
            let new_len = doubled.max(with_headroom);
            self.file.set_len(new_len)?;

            // SAFETY: the file was resized with set_len(new_len) above, so
            // the new mapping range is fully allocated. The old mapping is
            // dropped on assignment and no borrow of it outlives `&mut self`.
            self.map = unsafe { MmapMut::map_mut(&self.file)? };
            tracing::debug!(file_len = new_len, "on-disk item storage grown");
        }
        self.len = len;
        Ok(())
    }
}

/// Presence word of an occupied item slot.
const PRESENT: u64 = 1;

/// Item vectors in fixed-stride slots addressed by id.
///
/// Each slot is one presence word followed by the vector, padded to whole
/// `u64` words. Ids that were never added read as absent.
#[derive(Debug)]
pub(super) struct ItemTable<E> {
    dimension: usize,
    slot_words: usize,
    section: Section<u64>,
    _element: PhantomData<E>,
}

impl<E: Pod> ItemTable<E> {
    /// Creates an empty heap table.
    pub(super) fn new(dimension: usize) -> Self {
        Self {
            dimension,
            slot_words: Self::slot_words(dimension),
            section: Section::default(),
            _element: PhantomData,
        }
    }

    /// Words per slot for vectors of `dimension` elements.
    pub(super) fn slot_words(dimension: usize) -> usize {
        1 + (dimension * size_of::<E>()).div_ceil(size_of::<u64>())
    }

    /// Number of slots, i.e. highest added id plus one.
    pub(super) fn len(&self) -> usize {
        self.section.len() / self.slot_words
    }

    /// Vector stored in `slot`.
    pub(super) fn get(&self, slot: usize) -> Option<&[E]> {
        let start = slot.checked_mul(self.slot_words)?;
        let words = self.section.words().get(start..start + self.slot_words)?;
        if words[0] != PRESENT {
            return None;
        }
        let data: &[E] = bytemuck::cast_slice(&words[1..]);
        data.get(..self.dimension)
    }

    /// Stores `vector` in `slot`, growing the table as needed.
    pub(super) fn put(&mut self, slot: usize, vector: &[E]) -> Result<()> {
        let start = slot
            .checked_mul(self.slot_words)
            .ok_or_else(|| Error::InvalidInput(format!("item slot {slot} is out of range")))?;
        let end = start + self.slot_words;
        let words = self.section.grow_to(end)?;

        let slot_words = &mut words[start..end];
        slot_words[0] = PRESENT;
        let data: &mut [E] = bytemuck::cast_slice_mut(&mut slot_words[1..]);
        data[..vector.len()].copy_from_slice(vector);
        Ok(())
    }

    /// Ids of all present slots, ascending.
    pub(super) fn present_ids(&self) -> Vec<i32> {
        self.section
            .words()
            .chunks_exact(self.slot_words)
            .enumerate()
            .filter(|(_, slot)| slot[0] == PRESENT)
            .map(|(id, _)| id as i32)
            .collect()
    }

    /// Raw slot words, as written to an index file.
    pub(super) fn words(&self) -> &[u64] {
        self.section.words()
    }

    pub(super) fn section(&self) -> &Section<u64> {
        &self.section
    }

    pub(super) fn section_mut(&mut self) -> &mut Section<u64> {
        &mut self.section
    }

    /// Swaps the backing storage, dropping any previous mapping.
    pub(super) fn set_section(&mut self, section: Section<u64>) {
        self.section = section;
    }

    /// Drops all slots.
    pub(super) fn clear(&mut self) {
        self.section = Section::default();
    }
}
