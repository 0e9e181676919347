//! Tests for parsing, the codec, and version selection.

use varimg_cpu::x86::{self, feature as xf};
use varimg_cpu::HostInfo;
use varimg_features::FeatureSet;

use crate::codec::{deserialize_targets, serialize_targets};
use crate::parse::parse_with_table;
use crate::select::{
    compose_with_host, feature_string, select_target, CpuAliasResolver, ExactNameResolver,
};
use crate::{ParseError, SelectError, TargetData, TargetFlags};

const N: usize = x86::NWORDS;

fn parse(option: &str) -> Result<Vec<TargetData<N>>, ParseError> {
    parse_with_table(option, x86::FEATURE_NAMES)
}

fn icelake_host() -> HostInfo<x86::Cpu, N> {
    HostInfo {
        cpu: x86::Cpu::IcelakeClient,
        features: x86::cpu_baseline(x86::Cpu::IcelakeClient),
    }
}

#[test]
fn parse_simple_target() {
    let targets = parse("generic,+sse4.1,-avx2").unwrap();
    assert_eq!(targets.len(), 1);
    let t = &targets[0];
    assert_eq!(t.name, "generic");
    assert_eq!(t.en.features, FeatureSet::from_bits(&[xf::SSE4_1]));
    assert_eq!(t.dis.features, FeatureSet::from_bits(&[xf::AVX2]));
    assert_eq!(t.base, 0);
    assert!(t.ext_features.is_empty());
    assert!(t.en.flags.is_empty());
    assert!(t.dis.flags.is_empty());
}

#[test]
fn parse_sign_is_optional_for_enable() {
    let targets = parse("haswell,avx2,+fma").unwrap();
    let t = &targets[0];
    assert_eq!(t.en.features, FeatureSet::from_bits(&[xf::AVX2, xf::FMA]));
}

#[test]
fn parse_clone_all_and_base() {
    let targets = parse("generic,clone_all;haswell,base(0)").unwrap();
    assert_eq!(targets.len(), 2);
    assert!(targets[0].en.flags.contains(TargetFlags::CLONE_ALL));
    assert!(targets[0].is_clone_all());
    assert_eq!(targets[1].base, 0);
}

#[test]
fn parse_negative_clone_all_overrides() {
    let targets = parse("generic,clone_all,-clone_all").unwrap();
    let t = &targets[0];
    assert!(!t.en.flags.contains(TargetFlags::CLONE_ALL));
    assert!(t.dis.flags.contains(TargetFlags::CLONE_ALL));
    assert!(!t.is_clone_all());
}

#[test]
fn parse_base_out_of_range() {
    assert_eq!(
        parse("generic;haswell,base(5)").unwrap_err(),
        ParseError::BaseOutOfRange
    );
    // A target cannot base on itself.
    assert_eq!(
        parse("generic;haswell,base(1)").unwrap_err(),
        ParseError::BaseOutOfRange
    );
}

#[test]
fn parse_base_must_be_clone_all() {
    assert_eq!(
        parse("generic;haswell,base(0)").unwrap_err(),
        ParseError::BaseNotCloneAll
    );
    assert_eq!(
        parse("generic,clone_all,-clone_all;haswell,base(0)").unwrap_err(),
        ParseError::BaseNotCloneAll
    );
}

#[test]
fn parse_disabled_base_is_an_error() {
    assert_eq!(
        parse("generic,clone_all;haswell,-base(0)").unwrap_err(),
        ParseError::DisabledBase
    );
}

#[test]
fn parse_empty_cpu_name() {
    assert_eq!(parse("").unwrap_err(), ParseError::EmptyCpuName);
    assert_eq!(parse("generic;").unwrap_err(), ParseError::EmptyCpuName);
    assert_eq!(parse(";haswell").unwrap_err(), ParseError::EmptyCpuName);
}

#[test]
fn parse_unknown_feature_goes_to_ext() {
    let targets = parse("generic,+future_isa_x").unwrap();
    let t = &targets[0];
    assert!(t.en.features.is_empty());
    assert_eq!(t.ext_features, "+future_isa_x");
}

#[test]
fn parse_malformed_base_goes_to_ext() {
    // `base(x)` is not the base syntax; it falls through like any unknown
    // feature token.
    let targets = parse("generic,base(x),-base").unwrap();
    assert_eq!(targets[0].ext_features, "+base(x),-base");
}

#[test]
fn parse_unknown_cpu_name_is_kept() {
    let targets = parse("futurelake,+avx2").unwrap();
    assert_eq!(targets[0].name, "futurelake");
}

#[test]
fn codec_roundtrip() {
    let mut targets =
        parse("generic,clone_all;skylake,-rtm,+future_isa_x;icelake-client,base(0)").unwrap();
    // Give the serialized sets some resolved content.
    targets[1].en.features = x86::cpu_baseline(x86::Cpu::Skylake);

    let bytes = serialize_targets(&targets);
    let back: Vec<TargetData<N>> = deserialize_targets(&bytes).unwrap();

    assert_eq!(back.len(), targets.len());
    for (orig, round) in targets.iter().zip(back.iter()) {
        assert_eq!(round.name, orig.name);
        assert_eq!(round.ext_features, orig.ext_features);
        assert_eq!(round.en.features, orig.en.features);
        assert_eq!(round.dis.features, orig.dis.features);
        assert_eq!(round.en.flags, orig.en.flags);
        // Not carried on the wire; restored to defaults.
        assert!(round.dis.flags.is_empty());
        assert_eq!(round.base, 0);
    }
}

#[test]
fn codec_rejects_feature_count_mismatch() {
    let targets = parse("generic").unwrap();
    let mut bytes = serialize_targets(&targets);
    // Corrupt the nfeature word of the first record.
    bytes[8..12].copy_from_slice(&(N as u32 + 1).to_ne_bytes());
    assert!(matches!(
        deserialize_targets::<N>(&bytes),
        Err(crate::CodecError::FeatureCountMismatch { .. })
    ));
}

#[test]
fn codec_rejects_truncation() {
    let targets = parse("skylake,+avx2").unwrap();
    let bytes = serialize_targets(&targets);
    for len in 0..bytes.len() {
        assert!(
            deserialize_targets::<N>(&bytes[..len]).is_err(),
            "truncation to {len} bytes must not decode"
        );
    }
}

#[test]
fn compose_applies_enable_closure() {
    let targets = parse("generic,+avx2").unwrap();
    let composed = compose_with_host(&x86::REGISTRY, &targets[0], &icelake_host());
    assert!(composed.eligible);
    // The whole SSE/AVX chain under avx2 comes in via the dependency sweep.
    for bit in [xf::AVX, xf::SSE4_2, xf::SSE4_1, xf::SSSE3, xf::SSE3] {
        assert!(composed.features.test(bit));
    }
}

#[test]
fn compose_disable_cascades_to_dependents() {
    let targets = parse("haswell,-avx").unwrap();
    let composed = compose_with_host(&x86::REGISTRY, &targets[0], &icelake_host());
    assert!(!composed.features.test(xf::AVX));
    // Everything that needs AVX must fall with it.
    for bit in [xf::AVX2, xf::FMA, xf::F16C] {
        assert!(!composed.features.test(bit), "dependent bit {bit} survived");
    }
    // Unrelated features survive.
    assert!(composed.features.test(xf::SSE4_2));
}

#[test]
fn compose_marks_unsatisfiable_target_ineligible() {
    let haswell_host = HostInfo {
        cpu: x86::Cpu::Haswell,
        features: x86::cpu_baseline(x86::Cpu::Haswell),
    };
    let targets = parse("haswell,+avx512f").unwrap();
    let composed = compose_with_host(&x86::REGISTRY, &targets[0], &haswell_host);
    assert!(!composed.eligible);
    assert!(!composed.features.test(xf::AVX512F));
}

#[test]
fn require_eligible_accepts_satisfiable_targets() {
    let targets = parse("haswell,+avx2").unwrap();
    let composed = compose_with_host(&x86::REGISTRY, &targets[0], &icelake_host());
    assert_eq!(composed.require_eligible(), Ok(composed.features));
}

#[test]
fn require_eligible_rejects_masked_out_requests() {
    let haswell_host = HostInfo {
        cpu: x86::Cpu::Haswell,
        features: x86::cpu_baseline(x86::Cpu::Haswell),
    };
    let targets = parse("haswell,+avx512f").unwrap();
    let composed = compose_with_host(&x86::REGISTRY, &targets[0], &haswell_host);
    assert_eq!(composed.require_eligible(), Err(SelectError::UnsatisfiableTarget));
}

#[test]
fn compose_native_uses_host_baseline() {
    let targets = parse("native").unwrap();
    let host = icelake_host();
    let composed = compose_with_host(&x86::REGISTRY, &targets[0], &host);
    assert!(composed.eligible);
    assert_eq!(composed.features, host.features);
}

fn image_targets() -> Vec<TargetData<N>> {
    // generic carries many scalar features, the wider targets few: register
    // class must dominate feature count.
    let mut generic = TargetData::<N>::default();
    generic.name = "generic".into();
    generic.en.features = FeatureSet::from_bits(&[
        xf::SSE3,
        xf::SSSE3,
        xf::SSE4_1,
        xf::SSE4_2,
        xf::POPCNT,
        xf::AES,
        xf::PCLMUL,
    ]);

    let mut avx = TargetData::<N>::default();
    avx.name = "sandybridge".into();
    avx.en.features = FeatureSet::from_bits(&[xf::AVX, xf::XSAVE]);

    let mut avx512 = TargetData::<N>::default();
    avx512.name = "skylake-avx512".into();
    avx512.en.features = FeatureSet::from_bits(&[xf::AVX512F]);

    vec![generic, avx, avx512]
}

#[test]
fn select_prefers_widest_register_class() {
    let targets = image_targets();
    let jit_max = x86::cpu_baseline(x86::Cpu::IcelakeClient);
    let idx = select_target(&x86::REGISTRY, &targets, "icelake-client", &jit_max, &ExactNameResolver)
        .unwrap();
    assert_eq!(idx, 2);
}

#[test]
fn select_drops_targets_above_jit_max() {
    let targets = image_targets();
    // A Haswell-class host cannot run the AVX-512 variant.
    let jit_max = x86::cpu_baseline(x86::Cpu::Haswell);
    let idx =
        select_target(&x86::REGISTRY, &targets, "haswell", &jit_max, &ExactNameResolver).unwrap();
    assert_eq!(idx, 1);
}

#[test]
fn select_exact_name_beats_class() {
    let targets = image_targets();
    let jit_max = x86::cpu_baseline(x86::Cpu::IcelakeClient);
    // Host identifies as sandybridge: the name match restricts the candidate
    // set before class ranking can see the AVX-512 entry.
    let idx =
        select_target(&x86::REGISTRY, &targets, "sandybridge", &jit_max, &ExactNameResolver)
            .unwrap();
    assert_eq!(idx, 1);
}

#[test]
fn select_alias_resolver_widens_name_match() {
    struct Aliases;
    impl CpuAliasResolver for Aliases {
        fn names_match(&self, requested: &str, candidate: &str) -> bool {
            requested == candidate || (requested == "corei7-avx" && candidate == "sandybridge")
        }
    }
    let targets = image_targets();
    let jit_max = x86::cpu_baseline(x86::Cpu::IcelakeClient);
    let idx = select_target(&x86::REGISTRY, &targets, "corei7-avx", &jit_max, &Aliases).unwrap();
    assert_eq!(idx, 1);
}

#[test]
fn select_feature_count_breaks_class_ties() {
    let mut targets = image_targets();
    let mut rich_avx = TargetData::<N>::default();
    rich_avx.name = "ivybridge".into();
    rich_avx.en.features = FeatureSet::from_bits(&[xf::AVX, xf::XSAVE, xf::RDRND, xf::F16C]);
    targets.push(rich_avx);

    let jit_max = x86::cpu_baseline(x86::Cpu::Haswell);
    let idx =
        select_target(&x86::REGISTRY, &targets, "haswell", &jit_max, &ExactNameResolver).unwrap();
    assert_eq!(idx, 3);
}

#[test]
fn select_later_declaration_wins_ties() {
    let mut targets = image_targets();
    let dup = targets[1].clone();
    targets.push(dup);

    let jit_max = x86::cpu_baseline(x86::Cpu::Haswell);
    let idx =
        select_target(&x86::REGISTRY, &targets, "haswell", &jit_max, &ExactNameResolver).unwrap();
    assert_eq!(idx, 3);
}

#[test]
fn select_is_deterministic() {
    let targets = image_targets();
    let jit_max = x86::cpu_baseline(x86::Cpu::IcelakeClient);
    let first = select_target(&x86::REGISTRY, &targets, "generic", &jit_max, &ExactNameResolver);
    for _ in 0..16 {
        let again =
            select_target(&x86::REGISTRY, &targets, "generic", &jit_max, &ExactNameResolver);
        assert_eq!(again, first);
    }
}

#[test]
fn select_fails_with_no_candidates() {
    let targets = image_targets();
    let jit_max = FeatureSet::from_bits(&[xf::SSE3]);
    assert_eq!(
        select_target(&x86::REGISTRY, &targets, "generic", &jit_max, &ExactNameResolver),
        Err(SelectError::NoCompatibleTarget)
    );
}

#[test]
fn feature_string_lists_signs_and_ext() {
    let en = FeatureSet::from_bits(&[xf::SSE4_1, xf::AVX]);
    let dis = FeatureSet::from_bits(&[xf::AVX2]);
    let s = feature_string(&x86::REGISTRY, &en, &dis, "+future_isa_x");
    assert_eq!(s, "+sse4.1,+avx,-avx2,+future_isa_x");
}

#[test]
fn feature_string_empty_sets() {
    let empty = FeatureSet::empty();
    assert_eq!(feature_string(&x86::REGISTRY, &empty, &empty, ""), "");
    assert_eq!(feature_string(&x86::REGISTRY, &empty, &empty, "+x"), "+x");
}
