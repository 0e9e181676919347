//! varimg_cpu: per-architecture CPU and feature registries.
//!
//! Each supported architecture owns three constant tables: named CPUs with
//! their baseline feature sets and fallback chain, named feature bits, and
//! feature dependency edges. Lookups are linear scans; the tables are small
//! and live for the whole program.

use varimg_features::{FeatureSet, NO_FEATURE};

pub mod aarch64;
pub mod arm;
pub mod fallback;
pub mod x86;


/// The registry tables for whichever architecture this build targets.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub use self::x86 as native;
#[cfg(target_arch = "aarch64")]
pub use self::aarch64 as native;
#[cfg(target_arch = "arm")]
pub use self::arm as native;
#[cfg(not(any(
    target_arch = "x86",
    target_arch = "x86_64",
    target_arch = "aarch64",
    target_arch = "arm"
)))]
pub use self::fallback as native;

/// A named CPU feature bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureName {
    pub name: &'static str,
    /// Bit index into the architecture's [`FeatureSet`].
    pub bit: u32,
    /// Minimum backend compiler version that knows this feature.
    /// Zero means the oldest version we support already does.
    pub min_ver: u32,
}

/// A named CPU with its baseline feature set.
#[derive(Debug, Clone, Copy)]
pub struct CpuSpec<Cpu: 'static, const N: usize> {
    pub name: &'static str,
    pub cpu: Cpu,
    /// CPU to substitute when the backend compiler is older than `min_ver`.
    /// The chain terminates at a generic CPU whose fallback is itself.
    pub fallback: Cpu,
    pub min_ver: u32,
    /// Features implied simply by being this CPU.
    pub features: FeatureSet<N>,
}

/// Discrete vector-register width rank. The primary criterion when ranking
/// sysimg candidates: a wider class wins regardless of feature count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RegisterClass(pub u8);

/// The host CPU identity and feature set, as reported by the probe.
#[derive(Debug, Clone, Copy)]
pub struct HostInfo<Cpu: 'static, const N: usize> {
    pub cpu: Cpu,
    pub features: FeatureSet<N>,
}

/// One architecture's registry, bundled so parsing and selection receive
/// their tables explicitly instead of reaching for globals.
pub struct ArchRegistry<Cpu: 'static, const N: usize> {
    pub cpus: &'static [CpuSpec<Cpu, N>],
    pub feature_names: &'static [FeatureName],
    pub deps: &'static [varimg_features::FeatureDep],
    pub register_class: fn(&FeatureSet<N>) -> RegisterClass,
}

impl<Cpu: Copy + PartialEq, const N: usize> ArchRegistry<Cpu, N> {
    /// Baseline features implied by a CPU name. Unknown names (including
    /// `"generic"` and the empty name) imply the architecture baseline.
    pub fn baseline_by_name(&self, name: &str) -> FeatureSet<N> {
        find_cpu_by_name(name, self.cpus).map_or(FeatureSet::empty(), |spec| spec.features)
    }

    /// Name of a CPU id, `"generic"` if unknown.
    pub fn cpu_name(&self, cpu: Cpu) -> &'static str {
        cpu_name_or_generic(cpu, self.cpus)
    }
}

/// Find a CPU spec by id.
pub fn find_cpu_by_id<Cpu: Copy + PartialEq, const N: usize>(
    cpu: Cpu,
    cpus: &'static [CpuSpec<Cpu, N>],
) -> Option<&'static CpuSpec<Cpu, N>> {
    cpus.iter().find(|spec| spec.cpu == cpu)
}

/// Find a CPU spec by name.
pub fn find_cpu_by_name<Cpu: Copy + PartialEq, const N: usize>(
    name: &str,
    cpus: &'static [CpuSpec<Cpu, N>],
) -> Option<&'static CpuSpec<Cpu, N>> {
    cpus.iter().find(|spec| spec.name == name)
}

/// Name of a CPU id, or `"generic"` when the tables do not know it.
pub fn cpu_name_or_generic<Cpu: Copy + PartialEq, const N: usize>(
    cpu: Cpu,
    cpus: &'static [CpuSpec<Cpu, N>],
) -> &'static str {
    find_cpu_by_id(cpu, cpus).map_or("generic", |spec| spec.name)
}

/// Find a feature's bit index by name. Returns [`NO_FEATURE`] when the
/// tables do not know the name; callers forward such tokens to codegen.
pub fn find_feature_bit(features: &'static [FeatureName], name: &str) -> u32 {
    features
        .iter()
        .find(|f| f.name == name)
        .map_or(NO_FEATURE, |f| f.bit)
}

/// Resolve the CPU to hand a backend of version `backend_ver`: walk the
/// fallback chain until a spec the backend already knows.
pub fn resolve_for_backend<Cpu: Copy + PartialEq, const N: usize>(
    cpu: Cpu,
    backend_ver: u32,
    cpus: &'static [CpuSpec<Cpu, N>],
) -> Option<&'static CpuSpec<Cpu, N>> {
    let mut spec = find_cpu_by_id(cpu, cpus)?;
    while spec.min_ver > backend_ver {
        if spec.fallback == spec.cpu {
            break;
        }
        spec = find_cpu_by_id(spec.fallback, cpus)?;
    }
    Some(spec)
}

/// Mask of the features a backend of version `backend_ver` recognizes.
/// Intersect a resolved feature set with this before composing the
/// codegen feature string.
pub fn supported_mask<const N: usize>(
    features: &'static [FeatureName],
    backend_ver: u32,
) -> FeatureSet<N> {
    let mut mask = FeatureSet::empty();
    for f in features {
        if f.min_ver <= backend_ver {
            mask.set(f.bit);
        }
    }
    mask
}

/// Names of the set bits, in table order. Diagnostic output only.
pub fn feature_names_in<const N: usize>(
    set: &FeatureSet<N>,
    features: &'static [FeatureName],
) -> Vec<&'static str> {
    features
        .iter()
        .filter(|f| set.test(f.bit))
        .map(|f| f.name)
        .collect()
}
