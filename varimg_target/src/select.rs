//! Host composition and sysimg version selection.
//!
//! Selection runs in two stages. First the command-line target is composed
//! with the probed host to produce the maximum feature set the JIT may use.
//! Then every target embedded in the image is ranked against that set: drop
//! incompatible ones, prefer an exact CPU-name match, keep the widest
//! vector-register class, break ties by feature count and finally by
//! declaration order (later wins).

use tracing::debug;
use varimg_cpu::{feature_names_in, ArchRegistry, HostInfo};
use varimg_features::{disable_deps, enable_deps, FeatureSet};

use crate::{SelectError, TargetData};

/// A target composed with the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComposedTarget<const N: usize> {
    /// Effective enabled features: baseline and explicit enables, closed
    /// over dependencies, restricted to what the host supports.
    pub features: FeatureSet<N>,
    /// False when masking dropped a feature the target explicitly required;
    /// such a target cannot be used for image selection.
    pub eligible: bool,
}

impl<const N: usize> ComposedTarget<N> {
    /// The effective features, refusing a target that lost an explicitly
    /// requested feature to host masking. Callers feeding the image
    /// selector go through this so the request fails loudly instead of
    /// being silently narrowed to what the host supports.
    pub fn require_eligible(self) -> Result<FeatureSet<N>, SelectError> {
        if self.eligible {
            Ok(self.features)
        } else {
            Err(SelectError::UnsatisfiableTarget)
        }
    }
}

/// Compose one parsed target with the host: fold in the CPU baseline,
/// close over dependencies, subtract explicit disables, sweep away features
/// whose dependencies dropped, and restrict to what the host supports.
pub fn compose_with_host<Cpu: Copy + PartialEq, const N: usize>(
    reg: &ArchRegistry<Cpu, N>,
    target: &TargetData<N>,
    host: &HostInfo<Cpu, N>,
) -> ComposedTarget<N> {
    let baseline = if target.name == "native" {
        reg.baseline_by_name(reg.cpu_name(host.cpu))
    } else {
        reg.baseline_by_name(&target.name)
    };

    let mut features = (baseline | target.en.features) & host.features;
    enable_deps(&mut features, reg.deps);
    features = features & !target.dis.features;
    disable_deps(&mut features, reg.deps);
    features = features & host.features;

    let eligible = target.en.features.is_subset_of(&features);
    ComposedTarget { features, eligible }
}

/// Resolves CPU-name aliases during the exact-name preference step.
///
/// The backend compiler may recognize names the tables do not; an
/// implementation backed by it can widen the match. The default is identity.
pub trait CpuAliasResolver {
    fn names_match(&self, requested: &str, candidate: &str) -> bool {
        requested == candidate
    }
}

/// Identity resolver: names match only when equal.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactNameResolver;

impl CpuAliasResolver for ExactNameResolver {}

/// Pick the image target to run, given the JIT-max feature set.
///
/// The serialized `en.features` of image targets are fully resolved, so
/// they are compared directly against `jit_max`.
pub fn select_target<Cpu: Copy + PartialEq, const N: usize>(
    reg: &ArchRegistry<Cpu, N>,
    image_targets: &[TargetData<N>],
    host_cpu_name: &str,
    jit_max: &FeatureSet<N>,
    alias: &dyn CpuAliasResolver,
) -> Result<usize, SelectError> {
    let mut candidates: Vec<usize> = (0..image_targets.len())
        .filter(|&i| image_targets[i].en.features.is_subset_of(jit_max))
        .collect();
    if candidates.is_empty() {
        return Err(SelectError::NoCompatibleTarget);
    }

    let named: Vec<usize> = candidates
        .iter()
        .copied()
        .filter(|&i| alias.names_match(host_cpu_name, &image_targets[i].name))
        .collect();
    if !named.is_empty() {
        candidates = named;
    }

    let class_of = |i: usize| (reg.register_class)(&image_targets[i].en.features);
    let best_class = candidates.iter().map(|&i| class_of(i)).max().unwrap();
    candidates.retain(|&i| class_of(i) == best_class);

    let count_of = |i: usize| image_targets[i].en.features.count();
    let best_count = candidates.iter().map(|&i| count_of(i)).max().unwrap();
    candidates.retain(|&i| count_of(i) == best_count);

    // Later declaration wins the final tie.
    let chosen = *candidates.last().unwrap();
    debug!(
        index = chosen,
        name = %image_targets[chosen].name,
        "selected sysimg target"
    );
    Ok(chosen)
}

/// Compose the codegen feature string: every enabled feature as `+name`,
/// every explicitly disabled one as `-name`, then the pass-through tokens.
pub fn feature_string<Cpu: Copy + PartialEq, const N: usize>(
    reg: &ArchRegistry<Cpu, N>,
    en: &FeatureSet<N>,
    dis: &FeatureSet<N>,
    ext_features: &str,
) -> String {
    let mut parts: Vec<String> = Vec::new();
    for f in reg.feature_names {
        if en.test(f.bit) {
            parts.push(format!("+{}", f.name));
        } else if dis.test(f.bit) {
            parts.push(format!("-{}", f.name));
        }
    }
    let mut joined = parts.join(",");
    if !ext_features.is_empty() {
        if !joined.is_empty() {
            joined.push(',');
        }
        joined.push_str(ext_features);
    }
    joined
}

/// Log the resolved CPU and its enabled features. Diagnostic builds only
/// ever see this at `debug` level.
pub fn dump_selected<Cpu: Copy + PartialEq, const N: usize>(
    reg: &ArchRegistry<Cpu, N>,
    cpu: Cpu,
    features: &FeatureSet<N>,
) {
    let names = feature_names_in(features, reg.feature_names);
    debug!(cpu = reg.cpu_name(cpu), features = names.join(","), "resolved CPU target");
}
