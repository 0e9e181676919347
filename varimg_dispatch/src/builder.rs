//! Emitter-side composition of the dispatch tables.
//!
//! The compiler that produces a multi-version image writes the seven
//! dispatch symbols; [`ImageBuilder`] composes them bit-exactly in memory.
//! The loader tests drive [`load_image`](crate::load_image) against the
//! result, and tooling uses it to synthesize fixtures.

use std::cell::UnsafeCell;
use std::collections::HashMap;
use std::mem;

use varimg_target::codec::serialize_targets;
use varimg_target::{TargetData, TargetFlags};

use crate::stream::TAG_MASK;
use crate::{symbols, ImageSymbols};

/// One entry of a sparse target's clone list.
#[derive(Debug, Clone, Copy)]
pub struct SparseClone {
    /// Function index.
    pub idx: u32,
    /// Code offset from the text base. Only meaningful when `overridden`.
    pub offset: i32,
    /// Whether this target supplies its own code for the function; entries
    /// without it keep the slot initialized for the default target.
    pub overridden: bool,
}

/// Composes an in-memory image with the exact dispatch-symbol layout.
pub struct ImageBuilder<const N: usize> {
    nfuncs: u32,
    default_offsets: Vec<i32>,
    targets: Vec<TargetData<N>>,
    idxs_stream: Vec<u32>,
    offsets_stream: Vec<i32>,
    reloc_fns: Vec<u32>,
}

impl<const N: usize> ImageBuilder<N> {
    /// Start an image whose default target clones every function.
    ///
    /// `default_offsets` is the default per-function offset table;
    /// `cloned` lists the function indices relocated for target 0.
    pub fn new(mut target: TargetData<N>, default_offsets: Vec<i32>, cloned: &[u32]) -> Self {
        target.en.flags |= TargetFlags::CLONE_ALL;
        let mut cloned = cloned.to_vec();
        cloned.sort_unstable();
        let mut idxs_stream = vec![TAG_MASK | cloned.len() as u32];
        idxs_stream.extend_from_slice(&cloned);
        Self {
            nfuncs: default_offsets.len() as u32,
            default_offsets,
            targets: vec![target],
            idxs_stream,
            offsets_stream: Vec::new(),
            reloc_fns: cloned,
        }
    }

    /// Append a clone-all target with a full offset table.
    pub fn push_clone_all(
        &mut self,
        mut target: TargetData<N>,
        offsets: Vec<i32>,
        cloned: &[u32],
    ) -> &mut Self {
        assert_eq!(offsets.len() as u32, self.nfuncs, "clone-all table must cover every function");
        target.en.flags |= TargetFlags::CLONE_ALL;
        let mut cloned = cloned.to_vec();
        cloned.sort_unstable();
        self.idxs_stream.push(TAG_MASK | cloned.len() as u32);
        self.idxs_stream.extend_from_slice(&cloned);
        self.offsets_stream.extend_from_slice(&offsets);
        self.note_reloc_fns(&cloned);
        self.targets.push(target);
        self
    }

    /// Append a sparse target layered on the clone-all target `base`.
    pub fn push_sparse(
        &mut self,
        target: TargetData<N>,
        base: u32,
        clones: &[SparseClone],
    ) -> &mut Self {
        assert!((base as usize) < self.targets.len(), "base must be an earlier target");
        assert!(self.targets[base as usize].is_clone_all(), "base must be clone_all");
        let mut clones = clones.to_vec();
        clones.sort_unstable_by_key(|c| c.idx);

        self.idxs_stream.push(clones.len() as u32);
        self.idxs_stream.push(base);
        let overridden: Vec<u32> =
            clones.iter().filter(|c| c.overridden).map(|c| c.idx).collect();
        for c in &clones {
            let tagged = if c.overridden { c.idx | TAG_MASK } else { c.idx };
            self.idxs_stream.push(tagged);
            self.offsets_stream.push(c.offset);
        }
        self.note_reloc_fns(&overridden);
        self.targets.push(target);
        self
    }

    fn note_reloc_fns(&mut self, idxs: &[u32]) {
        for &idx in idxs {
            if !self.reloc_fns.contains(&idx) {
                self.reloc_fns.push(idx);
            }
        }
    }

    /// Lay the seven symbols out in one arena.
    pub fn build(&self) -> MemoryImage {
        const PTR: usize = mem::size_of::<*const u8>();
        let mut reloc_fns = self.reloc_fns.clone();
        reloc_fns.sort_unstable();

        let mut arena = Arena::default();

        // GOT region first: one pointer cell per relocated function, in
        // function-index order, anchored at gvars_base.
        let gvars = arena.pos();
        arena.symbols.insert(symbols::GVARS_BASE, gvars);
        let mut got = HashMap::new();
        for (rank, &fn_idx) in reloc_fns.iter().enumerate() {
            got.insert(fn_idx, gvars + rank * PTR);
        }
        arena.zeroes(reloc_fns.len() * PTR);

        // Text anchor: no bytes of its own, just an address.
        arena.align(16);
        arena.symbols.insert(symbols::FVARS_BASE, arena.pos());
        arena.zeroes(16);

        arena.align(4);
        arena.symbols.insert(symbols::FVARS_OFFSETS, arena.pos());
        arena.u32(self.nfuncs);
        for &off in &self.default_offsets {
            arena.i32(off);
        }

        arena.align(4);
        arena.symbols.insert(symbols::TARGET_IDS, arena.pos());
        arena.bytes(&serialize_targets(&self.targets));

        arena.align(4);
        arena.symbols.insert(symbols::RELOC_SLOTS, arena.pos());
        arena.u32(reloc_fns.len() as u32);
        for &fn_idx in &reloc_fns {
            arena.u32(fn_idx);
            arena.i32((got[&fn_idx] - gvars) as i32);
        }

        arena.align(4);
        arena.symbols.insert(symbols::FVARS_IDXS, arena.pos());
        for &w in &self.idxs_stream {
            arena.u32(w);
        }

        arena.align(4);
        arena.symbols.insert(symbols::FVARS_CLONE_OFFSETS, arena.pos());
        for &off in &self.offsets_stream {
            arena.i32(off);
        }

        let image = MemoryImage {
            data: arena.data.into_iter().map(UnsafeCell::new).collect(),
            symbols: arena.symbols,
            got,
        };

        // The static linker initializes every GOT cell to the default
        // target's code; model that so unrelocated slots read sensibly.
        let text_base = image.addr_of(symbols::FVARS_BASE).unwrap() as *const u8;
        for (&fn_idx, &off) in &image.got {
            let init = unsafe { text_base.offset(self.default_offsets[fn_idx as usize] as isize) };
            unsafe {
                image.base().add(off).cast::<*const u8>().write_unaligned(init);
            }
        }
        image
    }
}

#[derive(Default)]
struct Arena {
    data: Vec<u8>,
    symbols: HashMap<&'static str, usize>,
}

impl Arena {
    fn pos(&self) -> usize {
        self.data.len()
    }

    fn align(&mut self, to: usize) {
        while self.data.len() % to != 0 {
            self.data.push(0);
        }
    }

    fn zeroes(&mut self, n: usize) {
        self.data.extend(std::iter::repeat(0).take(n));
    }

    fn bytes(&mut self, b: &[u8]) {
        self.data.extend_from_slice(b);
    }

    fn u32(&mut self, v: u32) {
        self.bytes(&v.to_ne_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.bytes(&v.to_ne_bytes());
    }
}

/// A complete image held in one writable allocation.
pub struct MemoryImage {
    data: Box<[UnsafeCell<u8>]>,
    symbols: HashMap<&'static str, usize>,
    got: HashMap<u32, usize>,
}

impl MemoryImage {
    fn base(&self) -> *mut u8 {
        self.data.as_ptr() as *mut u8
    }

    /// Address of an exported symbol.
    pub fn addr_of(&self, name: &str) -> Option<*mut u8> {
        let &off = self.symbols.get(name)?;
        Some(unsafe { self.base().add(off) })
    }

    /// Current contents of a function's GOT cell.
    pub fn got_entry(&self, fn_idx: u32) -> Option<*const u8> {
        let &off = self.got.get(&fn_idx)?;
        Some(unsafe { self.base().add(off).cast::<*const u8>().read_unaligned() })
    }
}

impl ImageSymbols for MemoryImage {
    fn symbol(&self, name: &str) -> Option<*mut u8> {
        self.addr_of(name)
    }
}
