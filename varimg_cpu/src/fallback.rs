//! Trivial fallback tables for architectures without dispatch support.
//!
//! Every feature set is empty and the only CPU is `generic`, so a sysimg
//! built for such an architecture always selects its single default target.

use varimg_features::{FeatureDep, FeatureSet};

use crate::{CpuSpec, FeatureName, HostInfo, RegisterClass};

/// Feature bitset width for the fallback architecture.
pub const NWORDS: usize = 1;

pub static FEATURE_NAMES: &[FeatureName] = &[];

pub static FEATURE_DEPS: &[FeatureDep] = &[];

/// The only CPU the fallback architecture knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Cpu {
    Generic = 0,
}

type Set = FeatureSet<NWORDS>;

pub static CPUS: &[CpuSpec<Cpu, NWORDS>] = &[CpuSpec {
    name: "generic",
    cpu: Cpu::Generic,
    fallback: Cpu::Generic,
    min_ver: 0,
    features: Set::empty(),
}];

/// The fallback registry bundle.
pub static REGISTRY: crate::ArchRegistry<Cpu, NWORDS> = crate::ArchRegistry {
    cpus: CPUS,
    feature_names: FEATURE_NAMES,
    deps: FEATURE_DEPS,
    register_class,
};

/// A single register class; ranking never discriminates here.
pub fn register_class(_set: &Set) -> RegisterClass {
    RegisterClass(1)
}

pub fn probe_host() -> HostInfo<Cpu, NWORDS> {
    HostInfo { cpu: Cpu::Generic, features: Set::empty() }
}

/// Baseline features of a CPU id; always empty.
pub fn cpu_baseline(_cpu: Cpu) -> Set {
    Set::empty()
}
