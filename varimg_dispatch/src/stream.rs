//! Walk over the paired per-target clone streams.
//!
//! `jl_dispatch_fvars_idxs` is a stream of per-target records. Each starts
//! with a tag word: the high bit marks a clone-all target, the low 31 bits
//! give the record's index count. A clone-all record is followed by the
//! cloned-function indices; its offsets live in the paired
//! `jl_dispatch_fvars_offsets` stream as a full `nfuncs` block — except for
//! target 0, whose offsets are the image's default table and take no space
//! here. A sparse record carries a base-target word, then `len` indices
//! (high bit set on the ones overridden by this target), and `len` offsets
//! in the paired stream.

/// High bit of a tag word: the record is a full clone.
/// On an index entry of a sparse record: this function is overridden.
pub const TAG_MASK: u32 = 0x8000_0000;
/// The value bits of a tagged word.
pub const VAL_MASK: u32 = !TAG_MASK;

/// One target's view of the clone streams.
#[derive(Debug, Clone, Copy)]
pub struct CloneRecord {
    pub clone_all: bool,
    /// Number of entries behind `idxs`.
    pub len: u32,
    /// Sparse records name the clone-all target supplying unlisted
    /// functions.
    pub base_idx: Option<u32>,
    /// The record's function indices.
    pub idxs: *const u32,
    /// Clone-all: the target's full offset table (`nfuncs` entries).
    /// Sparse: `len` override offsets.
    pub offsets: *const i32,
}

/// Cursor pair over the clone streams. Yields records in target order;
/// the caller bounds the walk by the image's target count.
pub struct CloneWalk {
    idxs: *const u32,
    offsets: *const i32,
    default_offsets: *const i32,
    nfuncs: u32,
    index: u32,
}

impl CloneWalk {
    /// `idxs` and `offsets` point at the two dispatch streams,
    /// `default_offsets` at the image's default table of `nfuncs` entries.
    pub fn new(
        idxs: *const u32,
        offsets: *const i32,
        default_offsets: *const i32,
        nfuncs: u32,
    ) -> Self {
        Self { idxs, offsets, default_offsets, nfuncs, index: 0 }
    }

    /// Read the next target's record and advance both cursors past it.
    ///
    /// # Safety
    /// The streams must contain another record; walking past the image's
    /// target count reads out of bounds.
    pub unsafe fn next_target(&mut self) -> CloneRecord {
        let tag = self.idxs.read_unaligned();
        self.idxs = self.idxs.add(1);
        let clone_all = tag & TAG_MASK != 0;
        let len = tag & VAL_MASK;

        let (base_idx, offsets) = if clone_all {
            let offsets = if self.index == 0 {
                // Target 0's offsets are the default table.
                self.default_offsets
            } else {
                let cur = self.offsets;
                self.offsets = self.offsets.add(self.nfuncs as usize);
                cur
            };
            (None, offsets)
        } else {
            let base = self.idxs.read_unaligned();
            self.idxs = self.idxs.add(1);
            let cur = self.offsets;
            self.offsets = self.offsets.add(len as usize);
            (Some(base), cur)
        };

        let idxs = self.idxs;
        self.idxs = self.idxs.add(len as usize);
        self.index += 1;
        CloneRecord { clone_all, len, base_idx, idxs, offsets }
    }
}
