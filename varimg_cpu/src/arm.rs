//! 32-bit ARM CPU and feature tables.
//!
//! Kept deliberately small: the dispatch machinery works the same as on the
//! 64-bit architectures, but runtime feature detection for 32-bit ARM is not
//! portably available, so the probe reports the architecture baseline.

use varimg_features::{FeatureDep, FeatureSet};

use crate::{find_cpu_by_id, CpuSpec, FeatureName, HostInfo, RegisterClass};

/// Feature bitset width for 32-bit ARM.
pub const NWORDS: usize = 1;

/// Feature bit indices.
pub mod feature {
    pub const VFP2: u32 = 0;
    pub const VFP3: u32 = 1;
    pub const VFP4: u32 = 2;
    pub const NEON: u32 = 3;
    pub const D32: u32 = 4;
    pub const HWDIV: u32 = 5;
    pub const CRC: u32 = 6;
    pub const AES: u32 = 7;
    pub const SHA2: u32 = 8;
}

use self::feature::*;

pub static FEATURE_NAMES: &[FeatureName] = &[
    FeatureName { name: "vfp2", bit: VFP2, min_ver: 0 },
    FeatureName { name: "vfp3", bit: VFP3, min_ver: 0 },
    FeatureName { name: "vfp4", bit: VFP4, min_ver: 0 },
    FeatureName { name: "neon", bit: NEON, min_ver: 0 },
    FeatureName { name: "d32", bit: D32, min_ver: 0 },
    FeatureName { name: "hwdiv", bit: HWDIV, min_ver: 0 },
    FeatureName { name: "crc", bit: CRC, min_ver: 0 },
    FeatureName { name: "aes", bit: AES, min_ver: 0 },
    FeatureName { name: "sha2", bit: SHA2, min_ver: 0 },
];

pub static FEATURE_DEPS: &[FeatureDep] = &[
    FeatureDep { feature: VFP3, dep: VFP2 },
    FeatureDep { feature: VFP4, dep: VFP3 },
    FeatureDep { feature: NEON, dep: VFP3 },
    FeatureDep { feature: AES, dep: NEON },
    FeatureDep { feature: SHA2, dep: NEON },
];

/// 32-bit ARM CPU identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Cpu {
    Generic = 0,
    CortexA7,
    CortexA8,
    CortexA9,
    CortexA15,
    CortexA17,
    CortexA53,
}

type Set = FeatureSet<NWORDS>;

const BASE_GENERIC: Set = Set::empty();
const BASE_CORTEX_A7: Set = Set::from_bits(&[VFP2, VFP3, VFP4, NEON, D32, HWDIV]);
const BASE_CORTEX_A8: Set = Set::from_bits(&[VFP2, VFP3, NEON, D32]);
const BASE_CORTEX_A9: Set = Set::from_bits(&[VFP2, VFP3, D32]);
const BASE_CORTEX_A15: Set = Set::from_bits(&[VFP2, VFP3, VFP4, NEON, D32, HWDIV]);
const BASE_CORTEX_A53: Set = BASE_CORTEX_A15.union(Set::from_bits(&[CRC]));

pub static CPUS: &[CpuSpec<Cpu, NWORDS>] = &[
    CpuSpec { name: "generic", cpu: Cpu::Generic, fallback: Cpu::Generic, min_ver: 0, features: BASE_GENERIC },
    CpuSpec { name: "cortex-a7", cpu: Cpu::CortexA7, fallback: Cpu::Generic, min_ver: 0, features: BASE_CORTEX_A7 },
    CpuSpec { name: "cortex-a8", cpu: Cpu::CortexA8, fallback: Cpu::Generic, min_ver: 0, features: BASE_CORTEX_A8 },
    CpuSpec { name: "cortex-a9", cpu: Cpu::CortexA9, fallback: Cpu::Generic, min_ver: 0, features: BASE_CORTEX_A9 },
    CpuSpec { name: "cortex-a15", cpu: Cpu::CortexA15, fallback: Cpu::CortexA9, min_ver: 0, features: BASE_CORTEX_A15 },
    CpuSpec { name: "cortex-a17", cpu: Cpu::CortexA17, fallback: Cpu::CortexA15, min_ver: 0, features: BASE_CORTEX_A15 },
    CpuSpec { name: "cortex-a53", cpu: Cpu::CortexA53, fallback: Cpu::CortexA15, min_ver: 0, features: BASE_CORTEX_A53 },
];

/// The 32-bit ARM registry bundle.
pub static REGISTRY: crate::ArchRegistry<Cpu, NWORDS> = crate::ArchRegistry {
    cpus: CPUS,
    feature_names: FEATURE_NAMES,
    deps: FEATURE_DEPS,
    register_class,
};

/// Vector-register width rank: NEON > VFP.
pub fn register_class(set: &Set) -> RegisterClass {
    if set.test(NEON) {
        RegisterClass(2)
    } else {
        RegisterClass(1)
    }
}

/// 32-bit ARM has no portable runtime feature detection; report baseline.
pub fn probe_host() -> HostInfo<Cpu, NWORDS> {
    HostInfo { cpu: Cpu::Generic, features: Set::empty() }
}

/// Baseline features of a CPU id, empty for unknown ids.
pub fn cpu_baseline(cpu: Cpu) -> Set {
    find_cpu_by_id(cpu, CPUS).map_or(Set::empty(), |spec| spec.features)
}
