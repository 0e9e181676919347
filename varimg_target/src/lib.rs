//! varimg_target: target-spec parsing, serialization, and version selection.
//!
//! A CPU target string is a list of targets separated by `;`. Each target
//! starts with a CPU or architecture name followed by an optional list of
//! feature tokens separated by `,`. A `generic` or empty CPU name means the
//! basic required feature set of the target ISA.
//!
//! Two special tokens are supported:
//!
//! * `clone_all` forces every function in the image to be cloned for the
//!   target; `-clone_all` disables a full clone that is on by default.
//! * `base(k)` names the 0-based index of a previously declared target that
//!   supplies the functions this target does not clone. The index must be
//!   smaller than the current index and the referenced target must be
//!   `clone_all`.
//!
//! Feature tokens the tables do not recognize are not errors: they are kept
//! verbatim (with their sign) and forwarded to codegen, which may be newer
//! than the tables.

use bitflags::bitflags;
use thiserror::Error;
use varimg_features::FeatureSet;

pub mod codec;
pub mod parse;
pub mod select;

#[cfg(test)]
mod tests;

bitflags! {
    /// Per-target flags carried in the serialized image.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TargetFlags: u32 {
        /// Every function in the image is cloned for this target.
        const CLONE_ALL = 1 << 0;
    }
}

/// Features and flags in one polarity (enabling or disabling).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlagSet<const N: usize> {
    pub features: FeatureSet<N>,
    pub flags: TargetFlags,
}

/// One parsed entry of the `;`-separated target list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetData<const N: usize> {
    /// CPU name; `"generic"` or empty means the architecture baseline.
    pub name: String,
    /// Unrecognized feature tokens, comma separated, each with its `+`/`-`
    /// sign, passed through to codegen.
    pub ext_features: String,
    pub en: FlagSet<N>,
    pub dis: FlagSet<N>,
    /// 0-based index of the target this one derives from. 0 for the default.
    pub base: usize,
}

impl<const N: usize> Default for TargetData<N> {
    fn default() -> Self {
        Self {
            name: String::new(),
            ext_features: String::new(),
            en: FlagSet::default(),
            dis: FlagSet::default(),
            base: 0,
        }
    }
}

impl<const N: usize> TargetData<N> {
    /// Whether this target requests a full clone.
    pub fn is_clone_all(&self) -> bool {
        self.en.flags.contains(TargetFlags::CLONE_ALL)
            && !self.dis.flags.contains(TargetFlags::CLONE_ALL)
    }
}

/// Errors in the user-supplied target string. These abort startup; the
/// message is the user-visible diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid target option: empty CPU name")]
    EmptyCpuName,
    #[error("invalid target option: disabled base index")]
    DisabledBase,
    #[error("invalid target option: base index must refer to a previous target")]
    BaseOutOfRange,
    #[error("invalid target option: base target must be clone_all")]
    BaseNotCloneAll,
}

/// Errors decoding the serialized target descriptions of an image. These
/// mean the image is corrupt or was produced for a different architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("truncated target data")]
    UnexpectedEof,
    #[error("feature word count mismatch: image has {got}, architecture has {expected}")]
    FeatureCountMismatch { expected: u32, got: u32 },
    #[error("target name is not valid UTF-8")]
    BadName,
}

/// Selection cannot produce a runnable target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SelectError {
    #[error("no compatible sysimg target for this CPU")]
    NoCompatibleTarget,
    #[error("target requires features the host CPU does not support")]
    UnsatisfiableTarget,
}
