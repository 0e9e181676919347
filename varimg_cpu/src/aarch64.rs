//! AArch64 CPU and feature tables.

use varimg_features::{FeatureDep, FeatureSet};

use crate::{find_cpu_by_id, CpuSpec, FeatureName, HostInfo, RegisterClass};

/// Feature bitset width for AArch64.
pub const NWORDS: usize = 2;

/// Feature bit indices.
pub mod feature {
    pub const CRC: u32 = 0;
    pub const LSE: u32 = 1;
    pub const RDM: u32 = 2;
    pub const RCPC: u32 = 3;
    pub const DOTPROD: u32 = 4;
    pub const FP16FML: u32 = 5;
    pub const FULLFP16: u32 = 6;
    pub const FCMA: u32 = 7;
    pub const JSCONV: u32 = 8;
    pub const AES: u32 = 9;
    pub const SHA2: u32 = 10;
    pub const SHA3: u32 = 11;
    pub const SM4: u32 = 12;
    pub const SSBS: u32 = 13;
    pub const SB: u32 = 14;
    pub const PREDRES: u32 = 15;
    pub const DCPOP: u32 = 16;
    pub const MTE: u32 = 17;
    pub const BTI: u32 = 18;
    pub const I8MM: u32 = 19;
    pub const BF16: u32 = 20;
    pub const RAND: u32 = 21;
    pub const TME: u32 = 22;
    pub const SVE: u32 = 23;
    pub const SVE2: u32 = 24;
    pub const SVE2_AES: u32 = 25;
    pub const SVE2_SM4: u32 = 26;
    pub const SVE2_SHA3: u32 = 27;
    pub const SVE2_BITPERM: u32 = 28;
    pub const F32MM: u32 = 29;
    pub const F64MM: u32 = 30;
    pub const PAUTH: u32 = 31;
    pub const SPE: u32 = 32;
    pub const ECV: u32 = 33;
}

use self::feature::*;

pub static FEATURE_NAMES: &[FeatureName] = &[
    FeatureName { name: "crc", bit: CRC, min_ver: 0 },
    FeatureName { name: "lse", bit: LSE, min_ver: 0 },
    FeatureName { name: "rdm", bit: RDM, min_ver: 0 },
    FeatureName { name: "rcpc", bit: RCPC, min_ver: 0 },
    FeatureName { name: "dotprod", bit: DOTPROD, min_ver: 0 },
    FeatureName { name: "fp16fml", bit: FP16FML, min_ver: 0 },
    FeatureName { name: "fullfp16", bit: FULLFP16, min_ver: 0 },
    FeatureName { name: "complxnum", bit: FCMA, min_ver: 0 },
    FeatureName { name: "jsconv", bit: JSCONV, min_ver: 0 },
    FeatureName { name: "aes", bit: AES, min_ver: 0 },
    FeatureName { name: "sha2", bit: SHA2, min_ver: 0 },
    FeatureName { name: "sha3", bit: SHA3, min_ver: 0 },
    FeatureName { name: "sm4", bit: SM4, min_ver: 0 },
    FeatureName { name: "ssbs", bit: SSBS, min_ver: 0 },
    FeatureName { name: "sb", bit: SB, min_ver: 80000 },
    FeatureName { name: "predres", bit: PREDRES, min_ver: 80000 },
    FeatureName { name: "ccpp", bit: DCPOP, min_ver: 0 },
    FeatureName { name: "mte", bit: MTE, min_ver: 90000 },
    FeatureName { name: "bti", bit: BTI, min_ver: 80000 },
    FeatureName { name: "i8mm", bit: I8MM, min_ver: 110000 },
    FeatureName { name: "bf16", bit: BF16, min_ver: 110000 },
    FeatureName { name: "rand", bit: RAND, min_ver: 90000 },
    FeatureName { name: "tme", bit: TME, min_ver: 100000 },
    FeatureName { name: "sve", bit: SVE, min_ver: 0 },
    FeatureName { name: "sve2", bit: SVE2, min_ver: 90000 },
    FeatureName { name: "sve2-aes", bit: SVE2_AES, min_ver: 90000 },
    FeatureName { name: "sve2-sm4", bit: SVE2_SM4, min_ver: 90000 },
    FeatureName { name: "sve2-sha3", bit: SVE2_SHA3, min_ver: 90000 },
    FeatureName { name: "sve2-bitperm", bit: SVE2_BITPERM, min_ver: 90000 },
    FeatureName { name: "f32mm", bit: F32MM, min_ver: 110000 },
    FeatureName { name: "f64mm", bit: F64MM, min_ver: 110000 },
    FeatureName { name: "pauth", bit: PAUTH, min_ver: 110000 },
    FeatureName { name: "spe", bit: SPE, min_ver: 0 },
    FeatureName { name: "ecv", bit: ECV, min_ver: 110000 },
];

pub static FEATURE_DEPS: &[FeatureDep] = &[
    FeatureDep { feature: FP16FML, dep: FULLFP16 },
    FeatureDep { feature: SHA3, dep: SHA2 },
    FeatureDep { feature: SVE, dep: FULLFP16 },
    FeatureDep { feature: SVE2, dep: SVE },
    FeatureDep { feature: SVE2_AES, dep: SVE2 },
    FeatureDep { feature: SVE2_AES, dep: AES },
    FeatureDep { feature: SVE2_SM4, dep: SVE2 },
    FeatureDep { feature: SVE2_SM4, dep: SM4 },
    FeatureDep { feature: SVE2_SHA3, dep: SVE2 },
    FeatureDep { feature: SVE2_SHA3, dep: SHA3 },
    FeatureDep { feature: SVE2_BITPERM, dep: SVE2 },
    FeatureDep { feature: F32MM, dep: SVE },
    FeatureDep { feature: F64MM, dep: SVE },
];

/// AArch64 CPU identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Cpu {
    Generic = 0,
    CortexA53,
    CortexA55,
    CortexA57,
    CortexA72,
    CortexA75,
    CortexA76,
    NeoverseN1,
    NeoverseV1,
    ThunderX2T99,
    Tsv110,
    Cyclone,
    AppleA12,
    AppleA14,
}

type Set = FeatureSet<NWORDS>;

const BASE_GENERIC: Set = Set::empty();
const BASE_CORTEX_A53: Set = Set::from_bits(&[CRC]);
const BASE_CORTEX_A55: Set = BASE_CORTEX_A53.union(Set::from_bits(&[AES, SHA2]));
const BASE_CORTEX_A57: Set = Set::from_bits(&[CRC, AES, SHA2]);
const BASE_CORTEX_A75: Set = BASE_CORTEX_A57.union(Set::from_bits(&[LSE, RDM, RCPC, DOTPROD]));
const BASE_CORTEX_A76: Set = BASE_CORTEX_A75.union(Set::from_bits(&[FULLFP16, SSBS]));
const BASE_NEOVERSE_N1: Set = BASE_CORTEX_A76.union(Set::from_bits(&[SPE]));
const BASE_NEOVERSE_V1: Set = BASE_NEOVERSE_N1.union(Set::from_bits(&[
    FP16FML, SVE, I8MM, BF16, RAND,
]));
const BASE_THUNDERX2T99: Set = Set::from_bits(&[CRC, AES, SHA2, LSE]);
const BASE_TSV110: Set = Set::from_bits(&[
    CRC, AES, SHA2, LSE, RDM, FULLFP16, DOTPROD, FP16FML, SPE,
]);
const BASE_CYCLONE: Set = Set::from_bits(&[AES, SHA2]);
const BASE_APPLE_A12: Set = BASE_CYCLONE.union(Set::from_bits(&[
    CRC, LSE, RDM, FULLFP16, FCMA, JSCONV, RCPC,
]));
const BASE_APPLE_A14: Set = BASE_APPLE_A12.union(Set::from_bits(&[
    DOTPROD, FP16FML, SHA3, SSBS,
]));

pub static CPUS: &[CpuSpec<Cpu, NWORDS>] = &[
    CpuSpec { name: "generic", cpu: Cpu::Generic, fallback: Cpu::Generic, min_ver: 0, features: BASE_GENERIC },
    CpuSpec { name: "cortex-a53", cpu: Cpu::CortexA53, fallback: Cpu::Generic, min_ver: 0, features: BASE_CORTEX_A53 },
    CpuSpec { name: "cortex-a55", cpu: Cpu::CortexA55, fallback: Cpu::CortexA53, min_ver: 80000, features: BASE_CORTEX_A55 },
    CpuSpec { name: "cortex-a57", cpu: Cpu::CortexA57, fallback: Cpu::CortexA53, min_ver: 0, features: BASE_CORTEX_A57 },
    CpuSpec { name: "cortex-a72", cpu: Cpu::CortexA72, fallback: Cpu::CortexA57, min_ver: 0, features: BASE_CORTEX_A57 },
    CpuSpec { name: "cortex-a75", cpu: Cpu::CortexA75, fallback: Cpu::CortexA57, min_ver: 60000, features: BASE_CORTEX_A75 },
    CpuSpec { name: "cortex-a76", cpu: Cpu::CortexA76, fallback: Cpu::CortexA75, min_ver: 80000, features: BASE_CORTEX_A76 },
    CpuSpec { name: "neoverse-n1", cpu: Cpu::NeoverseN1, fallback: Cpu::CortexA76, min_ver: 90000, features: BASE_NEOVERSE_N1 },
    CpuSpec { name: "neoverse-v1", cpu: Cpu::NeoverseV1, fallback: Cpu::NeoverseN1, min_ver: 110000, features: BASE_NEOVERSE_V1 },
    CpuSpec { name: "thunderx2t99", cpu: Cpu::ThunderX2T99, fallback: Cpu::CortexA57, min_ver: 0, features: BASE_THUNDERX2T99 },
    CpuSpec { name: "tsv110", cpu: Cpu::Tsv110, fallback: Cpu::CortexA75, min_ver: 90000, features: BASE_TSV110 },
    CpuSpec { name: "cyclone", cpu: Cpu::Cyclone, fallback: Cpu::Generic, min_ver: 0, features: BASE_CYCLONE },
    CpuSpec { name: "apple-a12", cpu: Cpu::AppleA12, fallback: Cpu::Cyclone, min_ver: 70000, features: BASE_APPLE_A12 },
    CpuSpec { name: "apple-a14", cpu: Cpu::AppleA14, fallback: Cpu::AppleA12, min_ver: 120000, features: BASE_APPLE_A14 },
];

/// The AArch64 registry bundle.
pub static REGISTRY: crate::ArchRegistry<Cpu, NWORDS> = crate::ArchRegistry {
    cpus: CPUS,
    feature_names: FEATURE_NAMES,
    deps: FEATURE_DEPS,
    register_class,
};

/// Vector-register width rank: SVE > ASIMD.
pub fn register_class(set: &Set) -> RegisterClass {
    if set.test(SVE) {
        RegisterClass(2)
    } else {
        RegisterClass(1)
    }
}

/// Probe the host's feature set via runtime feature detection.
#[cfg(target_arch = "aarch64")]
pub fn probe_host() -> HostInfo<Cpu, NWORDS> {
    use std::arch::is_aarch64_feature_detected;

    let mut features = Set::empty();
    macro_rules! detect {
        ($name:tt, $bit:expr) => {
            if is_aarch64_feature_detected!($name) {
                features.set($bit);
            }
        };
    }
    detect!("crc", CRC);
    detect!("lse", LSE);
    detect!("rdm", RDM);
    detect!("rcpc", RCPC);
    detect!("dotprod", DOTPROD);
    detect!("fhm", FP16FML);
    detect!("fp16", FULLFP16);
    detect!("fcma", FCMA);
    detect!("jsconv", JSCONV);
    detect!("aes", AES);
    detect!("sha2", SHA2);
    detect!("sha3", SHA3);
    detect!("sm4", SM4);
    detect!("ssbs", SSBS);
    detect!("sb", SB);
    detect!("dpb", DCPOP);
    detect!("mte", MTE);
    detect!("bti", BTI);
    detect!("i8mm", I8MM);
    detect!("bf16", BF16);
    detect!("rand", RAND);
    detect!("tme", TME);
    detect!("sve", SVE);
    detect!("sve2", SVE2);
    detect!("sve2-aes", SVE2_AES);
    detect!("sve2-sm4", SVE2_SM4);
    detect!("sve2-sha3", SVE2_SHA3);
    detect!("sve2-bitperm", SVE2_BITPERM);
    detect!("f32mm", F32MM);
    detect!("f64mm", F64MM);
    detect!("paca", PAUTH);

    HostInfo { cpu: guess_cpu(&features), features }
}

#[cfg(not(target_arch = "aarch64"))]
pub fn probe_host() -> HostInfo<Cpu, NWORDS> {
    HostInfo { cpu: Cpu::Generic, features: Set::empty() }
}

/// Best table match for a detected feature set.
pub fn guess_cpu(features: &Set) -> Cpu {
    let mut best = Cpu::Generic;
    let mut best_count = 0;
    for spec in CPUS {
        if spec.features.is_subset_of(features) && spec.features.count() >= best_count {
            best = spec.cpu;
            best_count = spec.features.count();
        }
    }
    best
}

/// Baseline features of a CPU id, empty for unknown ids.
pub fn cpu_baseline(cpu: Cpu) -> Set {
    find_cpu_by_id(cpu, CPUS).map_or(Set::empty(), |spec| spec.features)
}
