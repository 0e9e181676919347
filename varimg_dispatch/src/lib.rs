//! varimg_dispatch: startup-time dispatch over a multi-version image.
//!
//! An image carries one default set of function offsets plus, per embedded
//! target, either a full clone (every function recompiled) or a sparse set
//! of overrides layered on a previously declared clone-all base. Given the
//! selected target index, the loader walks the paired dispatch streams,
//! resolves the effective offset table, and patches the image's GOT-style
//! indirection slots so indirect calls land in the chosen variant.
//!
//! The loader runs once, single-threaded, before any worker thread exists.
//! Relocation writes into the image's data section happen-before any use of
//! the patched pointers; the [`install`] helper publishes the result with a
//! release/acquire handoff for late readers.

use std::ptr;
use std::sync::OnceLock;

use thiserror::Error;
use tracing::debug;
use varimg_target::{CodecError, SelectError, TargetData};

pub mod builder;
pub mod stream;


use crate::stream::{CloneWalk, TAG_MASK, VAL_MASK};

/// Exported symbol names, exactly as the image emitter writes them.
pub mod symbols {
    /// Data-section anchor; relocation offsets are relative to it.
    pub const GVARS_BASE: &str = "jl_sysimg_gvars_base";
    /// Text-section anchor; function offsets are relative to it.
    pub const FVARS_BASE: &str = "jl_sysimg_fvars_base";
    /// `[u32 count][i32 offsets[count]]` default function offsets.
    pub const FVARS_OFFSETS: &str = "jl_sysimg_fvars_offsets";
    /// Serialized target descriptions, decoded by the selector callback.
    pub const TARGET_IDS: &str = "jl_dispatch_target_ids";
    /// `[u32 count][(u32 fn_index, i32 data_offset)[count]]`, sorted.
    pub const RELOC_SLOTS: &str = "jl_dispatch_reloc_slots";
    /// Per-target tag/length words and cloned-function indices.
    pub const FVARS_IDXS: &str = "jl_dispatch_fvars_idxs";
    /// Per-target cloned-function offsets, paired with the index stream.
    pub const FVARS_CLONE_OFFSETS: &str = "jl_dispatch_fvars_offsets";
}

/// `dlsym`-style symbol lookup over a loaded image.
pub trait ImageSymbols {
    /// Resolve an exported symbol to its address, or `None` if the image
    /// does not export it.
    fn symbol(&self, name: &str) -> Option<*mut u8>;
}

/// A fatal defect in the loaded image. There is no recovery: a missing
/// symbol or table entry means the image is corrupt.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image is missing symbol {0}")]
    MissingSymbol(&'static str),
    #[error("first image target must be a full clone")]
    DefaultNotCloneAll,
    #[error("sparse target {target} names base {base}, which is not an earlier clone-all target")]
    BadBaseTarget { target: u32, base: u32 },
    #[error("no GOT entry for cloned function {0}")]
    MissingGotSlot(u32),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Select(#[from] SelectError),
}

/// The serialized target descriptions of an image, handed to the selector
/// callback during loading.
pub struct TargetIds {
    ptr: *const u8,
}

impl TargetIds {
    pub(crate) fn new(ptr: *const u8) -> Self {
        Self { ptr }
    }

    /// Decode the embedded target list.
    ///
    /// The blob's length is implicit in its contents; validity of the
    /// backing memory is part of [`load_image`]'s contract.
    pub fn decode<const N: usize>(&self) -> Result<Vec<TargetData<N>>, CodecError> {
        let len = unsafe { blob_len(self.ptr) };
        let bytes = unsafe { std::slice::from_raw_parts(self.ptr, len) };
        varimg_target::codec::deserialize_targets(bytes)
    }
}

/// Walk the serialized layout once to find the blob's byte length, using
/// the per-record feature count stored in the blob itself.
unsafe fn blob_len(ptr: *const u8) -> usize {
    let mut pos = 0usize;
    let ntarget = read_u32(ptr, &mut pos);
    for _ in 0..ntarget {
        pos += 4; // flags
        let nfeature = read_u32(ptr, &mut pos) as usize;
        pos += 8 * nfeature; // en + dis words
        let namelen = read_u32(ptr, &mut pos) as usize;
        pos += namelen;
        let extlen = read_u32(ptr, &mut pos) as usize;
        pos += extlen;
    }
    pos
}

unsafe fn read_u32(ptr: *const u8, pos: &mut usize) -> u32 {
    let v = ptr.add(*pos).cast::<u32>().read_unaligned();
    *pos += 4;
    v
}

/// The resolved function-pointer tables for the chosen target.
///
/// Created once at startup and immutable afterwards; every pointer aims
/// into the loaded image, which lives for the rest of the process.
#[derive(Debug, Clone, Copy)]
pub struct FnPtrs {
    /// Text anchor all code offsets are relative to.
    pub text_base: *const u8,
    /// Effective per-function offsets (the chosen clone-all table, or the
    /// sparse target's base table).
    pub offsets: *const i32,
    /// Number of functions in `offsets`.
    pub nfuncs: u32,
    /// Sparse override count; zero for clone-all targets.
    pub noverrides: u32,
    /// Override offsets, null unless sparse.
    pub override_offsets: *const i32,
    /// Override indices (tagged, see [`stream`]), null unless sparse.
    pub override_idxs: *const u32,
    /// The image's relocation table: `(u32 fn_index, i32 data_offset)`
    /// pairs relative to this base.
    pub reloc_slots: *const i32,
    /// Number of relocation pairs.
    pub nreloc: u32,
}

// Immutable after construction; the pointed-to image data is never freed
// and never written again once loading completes.
unsafe impl Send for FnPtrs {}
unsafe impl Sync for FnPtrs {}

impl FnPtrs {
    /// Code address of function `idx` under the chosen target.
    ///
    /// # Safety
    /// `idx` must be below `nfuncs` and the image must still be mapped.
    pub unsafe fn fn_addr(&self, idx: u32) -> *const u8 {
        for i in 0..self.noverrides {
            let raw = self.override_idxs.add(i as usize).read_unaligned();
            if raw & TAG_MASK != 0 && raw & VAL_MASK == idx {
                let off = self.override_offsets.add(i as usize).read_unaligned();
                return self.text_base.offset(off as isize);
            }
        }
        let off = self.offsets.add(idx as usize).read_unaligned();
        self.text_base.offset(off as isize)
    }
}

/// Load an image: resolve the dispatch symbols, let `select` pick the
/// target index from the embedded descriptions, then rewrite the GOT slots
/// of every function the chosen target clones.
///
/// # Safety
/// The image's exported symbols must follow the documented layout, its
/// data section must be writable, and nothing may be reading the affected
/// GOT slots concurrently.
pub unsafe fn load_image<S: ImageSymbols + ?Sized>(
    image: &S,
    select: impl FnOnce(&TargetIds) -> Result<u32, ImageError>,
) -> Result<FnPtrs, ImageError> {
    let gvars_base = resolve(image, symbols::GVARS_BASE)?;
    let text_base = resolve(image, symbols::FVARS_BASE)? as *const u8;

    // Count-prefixed blocks: the symbol points at the count word.
    let fvars = resolve(image, symbols::FVARS_OFFSETS)? as *const i32;
    let nfuncs = fvars.cast::<u32>().read_unaligned();
    let default_offsets = fvars.add(1);

    let ids = TargetIds::new(resolve(image, symbols::TARGET_IDS)? as *const u8);
    let target_idx = select(&ids)?;

    let reloc = resolve(image, symbols::RELOC_SLOTS)? as *const i32;
    let nreloc = reloc.cast::<u32>().read_unaligned();
    let reloc_slots = reloc.add(1);

    let idxs = resolve(image, symbols::FVARS_IDXS)? as *const u32;
    let clone_offsets = resolve(image, symbols::FVARS_CLONE_OFFSETS)? as *const i32;

    let mut walk = CloneWalk::new(idxs, clone_offsets, default_offsets, nfuncs);

    // Offsets of every clone-all target up to the selection, by index;
    // sparse targets resolve their base table from here.
    let mut base_offsets: Vec<Option<*const i32>> = Vec::with_capacity(target_idx as usize + 1);
    let mut selected = walk.next_target();
    if !selected.clone_all {
        return Err(ImageError::DefaultNotCloneAll);
    }
    base_offsets.push(Some(selected.offsets));
    for _ in 0..target_idx {
        selected = walk.next_target();
        base_offsets.push(selected.clone_all.then_some(selected.offsets));
    }

    let mut res = FnPtrs {
        text_base,
        offsets: default_offsets,
        nfuncs,
        noverrides: 0,
        override_offsets: ptr::null(),
        override_idxs: ptr::null(),
        reloc_slots,
        nreloc,
    };

    if selected.clone_all {
        if target_idx != 0 {
            res.offsets = selected.offsets;
        }
    } else {
        let base = selected.base_idx.expect("sparse record carries a base");
        let base_table = base_offsets
            .get(base as usize)
            .copied()
            .flatten()
            .filter(|_| base < target_idx)
            .ok_or(ImageError::BadBaseTarget { target: target_idx, base })?;
        res.offsets = base_table;
        res.noverrides = selected.len;
        res.override_offsets = selected.offsets;
        res.override_idxs = selected.idxs;
    }

    // Relocation pass. Both the clone list and the slot table are sorted by
    // function index, so one monotonic cursor over the slots suffices.
    let mut reloc_i = 0u32;
    for i in 0..selected.len {
        let raw = selected.idxs.add(i as usize).read_unaligned();
        let (idx, code_offset) = if selected.clone_all {
            (raw, res.offsets.add(raw as usize).read_unaligned())
        } else if raw & TAG_MASK != 0 {
            // Only entries flagged as overridden get fresh code here; the
            // rest keep the slot initialized for the default target.
            (raw & VAL_MASK, selected.offsets.add(i as usize).read_unaligned())
        } else {
            continue;
        };

        let mut found = false;
        while reloc_i < nreloc {
            let pair = reloc_slots.add(2 * reloc_i as usize);
            let slot_idx = pair.cast::<u32>().read_unaligned();
            if slot_idx > idx {
                break;
            }
            if slot_idx == idx {
                found = true;
                let data_offset = pair.add(1).read_unaligned();
                let slot = gvars_base.offset(data_offset as isize) as *mut *const u8;
                slot.write_unaligned(text_base.offset(code_offset as isize));
            }
            reloc_i += 1;
        }
        if !found {
            return Err(ImageError::MissingGotSlot(idx));
        }
    }

    debug!(
        selected = target_idx,
        nfuncs,
        noverrides = res.noverrides,
        "image dispatch resolved"
    );
    Ok(res)
}

fn resolve<S: ImageSymbols + ?Sized>(
    image: &S,
    name: &'static str,
) -> Result<*mut u8, ImageError> {
    image.symbol(name).ok_or(ImageError::MissingSymbol(name))
}

static FN_PTRS: OnceLock<FnPtrs> = OnceLock::new();

/// Publish the loaded tables as process-wide state. The `OnceLock` gives
/// later readers the release/acquire ordering they need; the first call
/// wins and the value is never replaced.
pub fn install(ptrs: FnPtrs) -> &'static FnPtrs {
    FN_PTRS.get_or_init(|| ptrs)
}

/// The installed tables, if [`install`] has run.
pub fn installed() -> Option<&'static FnPtrs> {
    FN_PTRS.get()
}
