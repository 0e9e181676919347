//! x86 and x86-64 CPU and feature tables.
//!
//! Feature names and CPU names follow the backend compiler's spelling so the
//! composed target string can be handed to codegen verbatim. Baselines are
//! cumulative: each microarchitecture extends its predecessor's set.

use varimg_features::{FeatureDep, FeatureSet};

use crate::{find_cpu_by_id, CpuSpec, FeatureName, HostInfo, RegisterClass};

/// Feature bitset width for x86.
pub const NWORDS: usize = 2;

/// Feature bit indices.
pub mod feature {
    pub const SSE3: u32 = 0;
    pub const PCLMUL: u32 = 1;
    pub const SSSE3: u32 = 2;
    pub const FMA: u32 = 3;
    pub const CX16: u32 = 4;
    pub const SSE4_1: u32 = 5;
    pub const SSE4_2: u32 = 6;
    pub const MOVBE: u32 = 7;
    pub const POPCNT: u32 = 8;
    pub const AES: u32 = 9;
    pub const XSAVE: u32 = 10;
    pub const AVX: u32 = 11;
    pub const F16C: u32 = 12;
    pub const RDRND: u32 = 13;
    pub const FSGSBASE: u32 = 14;
    pub const BMI: u32 = 15;
    pub const AVX2: u32 = 16;
    pub const BMI2: u32 = 17;
    pub const RTM: u32 = 18;
    pub const AVX512F: u32 = 19;
    pub const AVX512DQ: u32 = 20;
    pub const RDSEED: u32 = 21;
    pub const ADX: u32 = 22;
    pub const AVX512IFMA: u32 = 23;
    pub const CLFLUSHOPT: u32 = 24;
    pub const CLWB: u32 = 25;
    pub const AVX512PF: u32 = 26;
    pub const AVX512ER: u32 = 27;
    pub const AVX512CD: u32 = 28;
    pub const SHA: u32 = 29;
    pub const AVX512BW: u32 = 30;
    pub const AVX512VL: u32 = 31;
    pub const AVX512VBMI: u32 = 32;
    pub const PKU: u32 = 33;
    pub const AVX512VPOPCNTDQ: u32 = 34;
    pub const AVX512VNNI: u32 = 35;
    pub const AVX512VBMI2: u32 = 36;
    pub const VAES: u32 = 37;
    pub const VPCLMULQDQ: u32 = 38;
    pub const AVX512BITALG: u32 = 39;
    pub const GFNI: u32 = 40;
    pub const LZCNT: u32 = 41;
    pub const PRFCHW: u32 = 42;
    pub const MWAITX: u32 = 43;
    pub const CLZERO: u32 = 44;
    pub const WBNOINVD: u32 = 45;
}

use self::feature::*;

/// Named features. `min_ver` is the backend compiler version that first
/// recognizes the name (VVMMPP, zero for the oldest supported).
pub static FEATURE_NAMES: &[FeatureName] = &[
    FeatureName { name: "sse3", bit: SSE3, min_ver: 0 },
    FeatureName { name: "pclmul", bit: PCLMUL, min_ver: 0 },
    FeatureName { name: "ssse3", bit: SSSE3, min_ver: 0 },
    FeatureName { name: "fma", bit: FMA, min_ver: 0 },
    FeatureName { name: "cx16", bit: CX16, min_ver: 0 },
    FeatureName { name: "sse4.1", bit: SSE4_1, min_ver: 0 },
    FeatureName { name: "sse4.2", bit: SSE4_2, min_ver: 0 },
    FeatureName { name: "movbe", bit: MOVBE, min_ver: 0 },
    FeatureName { name: "popcnt", bit: POPCNT, min_ver: 0 },
    FeatureName { name: "aes", bit: AES, min_ver: 0 },
    FeatureName { name: "xsave", bit: XSAVE, min_ver: 0 },
    FeatureName { name: "avx", bit: AVX, min_ver: 0 },
    FeatureName { name: "f16c", bit: F16C, min_ver: 0 },
    FeatureName { name: "rdrnd", bit: RDRND, min_ver: 0 },
    FeatureName { name: "fsgsbase", bit: FSGSBASE, min_ver: 0 },
    FeatureName { name: "bmi", bit: BMI, min_ver: 0 },
    FeatureName { name: "avx2", bit: AVX2, min_ver: 0 },
    FeatureName { name: "bmi2", bit: BMI2, min_ver: 0 },
    FeatureName { name: "rtm", bit: RTM, min_ver: 0 },
    FeatureName { name: "avx512f", bit: AVX512F, min_ver: 0 },
    FeatureName { name: "avx512dq", bit: AVX512DQ, min_ver: 0 },
    FeatureName { name: "rdseed", bit: RDSEED, min_ver: 0 },
    FeatureName { name: "adx", bit: ADX, min_ver: 0 },
    FeatureName { name: "avx512ifma", bit: AVX512IFMA, min_ver: 0 },
    FeatureName { name: "clflushopt", bit: CLFLUSHOPT, min_ver: 0 },
    FeatureName { name: "clwb", bit: CLWB, min_ver: 0 },
    FeatureName { name: "avx512pf", bit: AVX512PF, min_ver: 0 },
    FeatureName { name: "avx512er", bit: AVX512ER, min_ver: 0 },
    FeatureName { name: "avx512cd", bit: AVX512CD, min_ver: 0 },
    FeatureName { name: "sha", bit: SHA, min_ver: 0 },
    FeatureName { name: "avx512bw", bit: AVX512BW, min_ver: 0 },
    FeatureName { name: "avx512vl", bit: AVX512VL, min_ver: 0 },
    FeatureName { name: "avx512vbmi", bit: AVX512VBMI, min_ver: 0 },
    FeatureName { name: "pku", bit: PKU, min_ver: 0 },
    FeatureName { name: "avx512vpopcntdq", bit: AVX512VPOPCNTDQ, min_ver: 50000 },
    FeatureName { name: "avx512vnni", bit: AVX512VNNI, min_ver: 60000 },
    FeatureName { name: "avx512vbmi2", bit: AVX512VBMI2, min_ver: 60000 },
    FeatureName { name: "vaes", bit: VAES, min_ver: 60000 },
    FeatureName { name: "vpclmulqdq", bit: VPCLMULQDQ, min_ver: 60000 },
    FeatureName { name: "avx512bitalg", bit: AVX512BITALG, min_ver: 60000 },
    FeatureName { name: "gfni", bit: GFNI, min_ver: 60000 },
    FeatureName { name: "lzcnt", bit: LZCNT, min_ver: 0 },
    FeatureName { name: "prfchw", bit: PRFCHW, min_ver: 0 },
    FeatureName { name: "mwaitx", bit: MWAITX, min_ver: 0 },
    FeatureName { name: "clzero", bit: CLZERO, min_ver: 0 },
    FeatureName { name: "wbnoinvd", bit: WBNOINVD, min_ver: 80000 },
];

/// Dependency edges. Reverse-order fixpoint iteration closes these
/// transitively, so the SSE chain sits first and the AVX-512 leaves last.
pub static FEATURE_DEPS: &[FeatureDep] = &[
    FeatureDep { feature: SSSE3, dep: SSE3 },
    FeatureDep { feature: SSE4_1, dep: SSSE3 },
    FeatureDep { feature: SSE4_2, dep: SSE4_1 },
    FeatureDep { feature: AVX, dep: SSE4_2 },
    FeatureDep { feature: F16C, dep: AVX },
    FeatureDep { feature: FMA, dep: AVX },
    FeatureDep { feature: AVX2, dep: AVX },
    FeatureDep { feature: AVX512F, dep: AVX2 },
    FeatureDep { feature: AVX512DQ, dep: AVX512F },
    FeatureDep { feature: AVX512IFMA, dep: AVX512F },
    FeatureDep { feature: AVX512PF, dep: AVX512F },
    FeatureDep { feature: AVX512ER, dep: AVX512F },
    FeatureDep { feature: AVX512CD, dep: AVX512F },
    FeatureDep { feature: AVX512BW, dep: AVX512F },
    FeatureDep { feature: AVX512VL, dep: AVX512F },
    FeatureDep { feature: AVX512VNNI, dep: AVX512F },
    FeatureDep { feature: AVX512VPOPCNTDQ, dep: AVX512F },
    FeatureDep { feature: AVX512VBMI, dep: AVX512BW },
    FeatureDep { feature: AVX512VBMI2, dep: AVX512BW },
    FeatureDep { feature: AVX512BITALG, dep: AVX512BW },
    FeatureDep { feature: VAES, dep: AES },
    FeatureDep { feature: VPCLMULQDQ, dep: PCLMUL },
];

/// x86 CPU identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Cpu {
    Generic = 0,
    Bonnell,
    Silvermont,
    Goldmont,
    Tremont,
    Core2,
    Nehalem,
    Westmere,
    SandyBridge,
    IvyBridge,
    Haswell,
    Broadwell,
    Skylake,
    SkylakeAvx512,
    Cascadelake,
    IcelakeClient,
    IcelakeServer,
    Tigerlake,
    Znver1,
    Znver2,
    Znver3,
}

type Set = FeatureSet<NWORDS>;

const BASE_GENERIC: Set = Set::empty();
const BASE_BONNELL: Set = Set::from_bits(&[SSE3, SSSE3, CX16, MOVBE]);
const BASE_SILVERMONT: Set = BASE_BONNELL.union(Set::from_bits(&[
    SSE4_1, SSE4_2, POPCNT, PCLMUL, AES, RDRND, PRFCHW,
]));
const BASE_GOLDMONT: Set = BASE_SILVERMONT.union(Set::from_bits(&[
    SHA, RDSEED, XSAVE, CLFLUSHOPT, FSGSBASE,
]));
const BASE_TREMONT: Set = BASE_GOLDMONT.union(Set::from_bits(&[CLWB, GFNI]));
const BASE_CORE2: Set = Set::from_bits(&[SSE3, SSSE3, CX16]);
const BASE_NEHALEM: Set = BASE_CORE2.union(Set::from_bits(&[SSE4_1, SSE4_2, POPCNT]));
const BASE_WESTMERE: Set = BASE_NEHALEM.union(Set::from_bits(&[AES, PCLMUL]));
const BASE_SANDYBRIDGE: Set = BASE_WESTMERE.union(Set::from_bits(&[AVX, XSAVE]));
const BASE_IVYBRIDGE: Set = BASE_SANDYBRIDGE.union(Set::from_bits(&[RDRND, F16C, FSGSBASE]));
const BASE_HASWELL: Set = BASE_IVYBRIDGE.union(Set::from_bits(&[
    AVX2, BMI, BMI2, FMA, LZCNT, MOVBE,
]));
const BASE_BROADWELL: Set = BASE_HASWELL.union(Set::from_bits(&[ADX, RDSEED, PRFCHW]));
const BASE_SKYLAKE: Set = BASE_BROADWELL.union(Set::from_bits(&[RTM, CLFLUSHOPT]));
const BASE_SKYLAKE_AVX512: Set = BASE_SKYLAKE.union(Set::from_bits(&[
    AVX512F, AVX512DQ, AVX512CD, AVX512BW, AVX512VL, CLWB, PKU,
]));
const BASE_CASCADELAKE: Set = BASE_SKYLAKE_AVX512.union(Set::from_bits(&[AVX512VNNI]));
const BASE_ICELAKE_CLIENT: Set = BASE_SKYLAKE_AVX512.union(Set::from_bits(&[
    AVX512IFMA,
    AVX512VBMI,
    AVX512VBMI2,
    AVX512BITALG,
    AVX512VPOPCNTDQ,
    AVX512VNNI,
    VAES,
    VPCLMULQDQ,
    GFNI,
    SHA,
]));
const BASE_ICELAKE_SERVER: Set = BASE_ICELAKE_CLIENT.union(Set::from_bits(&[WBNOINVD]));
const BASE_TIGERLAKE: Set = BASE_ICELAKE_CLIENT.union(Set::from_bits(&[CLWB]));
const BASE_ZNVER1: Set = Set::from_bits(&[
    SSE3, PCLMUL, SSSE3, FMA, CX16, SSE4_1, SSE4_2, MOVBE, POPCNT, AES, XSAVE, AVX, F16C, RDRND,
    FSGSBASE, BMI, AVX2, BMI2, RDSEED, ADX, CLFLUSHOPT, SHA, LZCNT, PRFCHW, MWAITX, CLZERO,
]);
const BASE_ZNVER2: Set = BASE_ZNVER1.union(Set::from_bits(&[CLWB, WBNOINVD]));
const BASE_ZNVER3: Set = BASE_ZNVER2.union(Set::from_bits(&[VAES, VPCLMULQDQ, PKU]));

pub static CPUS: &[CpuSpec<Cpu, NWORDS>] = &[
    CpuSpec { name: "generic", cpu: Cpu::Generic, fallback: Cpu::Generic, min_ver: 0, features: BASE_GENERIC },
    CpuSpec { name: "bonnell", cpu: Cpu::Bonnell, fallback: Cpu::Generic, min_ver: 0, features: BASE_BONNELL },
    CpuSpec { name: "silvermont", cpu: Cpu::Silvermont, fallback: Cpu::Bonnell, min_ver: 0, features: BASE_SILVERMONT },
    CpuSpec { name: "goldmont", cpu: Cpu::Goldmont, fallback: Cpu::Silvermont, min_ver: 50000, features: BASE_GOLDMONT },
    CpuSpec { name: "tremont", cpu: Cpu::Tremont, fallback: Cpu::Goldmont, min_ver: 90000, features: BASE_TREMONT },
    CpuSpec { name: "core2", cpu: Cpu::Core2, fallback: Cpu::Generic, min_ver: 0, features: BASE_CORE2 },
    CpuSpec { name: "nehalem", cpu: Cpu::Nehalem, fallback: Cpu::Core2, min_ver: 0, features: BASE_NEHALEM },
    CpuSpec { name: "westmere", cpu: Cpu::Westmere, fallback: Cpu::Nehalem, min_ver: 0, features: BASE_WESTMERE },
    CpuSpec { name: "sandybridge", cpu: Cpu::SandyBridge, fallback: Cpu::Westmere, min_ver: 0, features: BASE_SANDYBRIDGE },
    CpuSpec { name: "ivybridge", cpu: Cpu::IvyBridge, fallback: Cpu::SandyBridge, min_ver: 0, features: BASE_IVYBRIDGE },
    CpuSpec { name: "haswell", cpu: Cpu::Haswell, fallback: Cpu::IvyBridge, min_ver: 0, features: BASE_HASWELL },
    CpuSpec { name: "broadwell", cpu: Cpu::Broadwell, fallback: Cpu::Haswell, min_ver: 0, features: BASE_BROADWELL },
    CpuSpec { name: "skylake", cpu: Cpu::Skylake, fallback: Cpu::Broadwell, min_ver: 0, features: BASE_SKYLAKE },
    CpuSpec { name: "skylake-avx512", cpu: Cpu::SkylakeAvx512, fallback: Cpu::Skylake, min_ver: 0, features: BASE_SKYLAKE_AVX512 },
    CpuSpec { name: "cascadelake", cpu: Cpu::Cascadelake, fallback: Cpu::SkylakeAvx512, min_ver: 80000, features: BASE_CASCADELAKE },
    CpuSpec { name: "icelake-client", cpu: Cpu::IcelakeClient, fallback: Cpu::SkylakeAvx512, min_ver: 60000, features: BASE_ICELAKE_CLIENT },
    CpuSpec { name: "icelake-server", cpu: Cpu::IcelakeServer, fallback: Cpu::IcelakeClient, min_ver: 80000, features: BASE_ICELAKE_SERVER },
    CpuSpec { name: "tigerlake", cpu: Cpu::Tigerlake, fallback: Cpu::IcelakeClient, min_ver: 100000, features: BASE_TIGERLAKE },
    CpuSpec { name: "znver1", cpu: Cpu::Znver1, fallback: Cpu::Broadwell, min_ver: 0, features: BASE_ZNVER1 },
    CpuSpec { name: "znver2", cpu: Cpu::Znver2, fallback: Cpu::Znver1, min_ver: 90000, features: BASE_ZNVER2 },
    CpuSpec { name: "znver3", cpu: Cpu::Znver3, fallback: Cpu::Znver2, min_ver: 120000, features: BASE_ZNVER3 },
];

/// The x86 registry bundle.
pub static REGISTRY: crate::ArchRegistry<Cpu, NWORDS> = crate::ArchRegistry {
    cpus: CPUS,
    feature_names: FEATURE_NAMES,
    deps: FEATURE_DEPS,
    register_class,
};

/// Vector-register width rank: AVX-512 > AVX/AVX2 > SSE.
pub fn register_class(set: &Set) -> RegisterClass {
    if set.test(AVX512F) {
        RegisterClass(3)
    } else if set.test(AVX) {
        RegisterClass(2)
    } else {
        RegisterClass(1)
    }
}

/// Probe the host's feature set via runtime feature detection.
///
/// The host CPU id is approximated as the table entry with the richest
/// baseline contained in the detected features; exact microarchitecture
/// identification from CPUID is owned by the caller's detection layer.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub fn probe_host() -> HostInfo<Cpu, NWORDS> {
    use std::arch::is_x86_feature_detected;

    let mut features = Set::empty();
    macro_rules! detect {
        ($name:tt, $bit:expr) => {
            if is_x86_feature_detected!($name) {
                features.set($bit);
            }
        };
    }
    detect!("sse3", SSE3);
    detect!("pclmulqdq", PCLMUL);
    detect!("ssse3", SSSE3);
    detect!("fma", FMA);
    detect!("cmpxchg16b", CX16);
    detect!("sse4.1", SSE4_1);
    detect!("sse4.2", SSE4_2);
    detect!("movbe", MOVBE);
    detect!("popcnt", POPCNT);
    detect!("aes", AES);
    detect!("xsave", XSAVE);
    detect!("avx", AVX);
    detect!("f16c", F16C);
    detect!("rdrand", RDRND);
    detect!("bmi1", BMI);
    detect!("avx2", AVX2);
    detect!("bmi2", BMI2);
    detect!("rtm", RTM);
    detect!("avx512f", AVX512F);
    detect!("avx512dq", AVX512DQ);
    detect!("rdseed", RDSEED);
    detect!("adx", ADX);
    detect!("avx512ifma", AVX512IFMA);
    detect!("avx512pf", AVX512PF);
    detect!("avx512er", AVX512ER);
    detect!("avx512cd", AVX512CD);
    detect!("sha", SHA);
    detect!("avx512bw", AVX512BW);
    detect!("avx512vl", AVX512VL);
    detect!("avx512vbmi", AVX512VBMI);
    detect!("avx512vpopcntdq", AVX512VPOPCNTDQ);
    detect!("avx512vnni", AVX512VNNI);
    detect!("avx512vbmi2", AVX512VBMI2);
    detect!("avx512bitalg", AVX512BITALG);
    detect!("lzcnt", LZCNT);

    HostInfo { cpu: guess_cpu(&features), features }
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
pub fn probe_host() -> HostInfo<Cpu, NWORDS> {
    HostInfo { cpu: Cpu::Generic, features: Set::empty() }
}

/// Best table match for a detected feature set: the CPU with the largest
/// baseline that the host fully covers.
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
