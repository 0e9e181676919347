//! Tests for the inspect report, against a synthesized ELF object.

use object::write::{Object, StandardSection, Symbol, SymbolSection};
use object::{Architecture, BinaryFormat, Endianness, SymbolFlags, SymbolKind, SymbolScope};
use varimg_cpu::x86;
use varimg_target::codec::serialize_targets;
use varimg_target::parse::parse_with_table;

use crate::report;

const N: usize = x86::NWORDS;

/// Emit an ELF object whose .data carries the serialized target blob.
fn elf_with_targets(option: &str) -> Vec<u8> {
    let mut targets = parse_with_table::<N>(option, x86::FEATURE_NAMES).unwrap();
    for t in &mut targets {
        // The emitter serializes resolved sets; fold in the CPU baseline.
        if let Some(spec) = varimg_cpu::find_cpu_by_name(&t.name, x86::CPUS) {
            t.en.features = t.en.features | spec.features;
        }
    }
    let blob = serialize_targets(&targets);

    let mut obj = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
    let data = obj.section_id(StandardSection::Data);
    let offset = obj.append_section_data(data, &blob, 4);
    obj.add_symbol(Symbol {
        name: b"jl_dispatch_target_ids".to_vec(),
        value: offset,
        size: blob.len() as u64,
        kind: SymbolKind::Data,
        scope: SymbolScope::Dynamic,
        weak: false,
        section: SymbolSection::Section(data),
        flags: SymbolFlags::None,
    });

    let mut buf = Vec::new();
    obj.emit(&mut buf).expect("failed to emit ELF object");
    buf
}

#[test]
fn report_names_targets_and_features() {
    let elf = elf_with_targets("generic,clone_all;haswell,+rtm,+future_isa_x");
    let report = report::inspect(&elf, Some("x86")).unwrap();

    assert_eq!(report.ntargets, 2);
    assert_eq!(report.targets[0].name, "generic");
    assert!(report.targets[0].clone_all);
    assert_eq!(report.targets[1].name, "haswell");
    assert!(!report.targets[1].clone_all);
    assert!(report.targets[1].features.iter().any(|f| f == "avx2"));
    assert!(report.targets[1].features.iter().any(|f| f == "rtm"));
    assert_eq!(report.targets[1].ext_features, "+future_isa_x");
}

#[test]
fn report_without_arch_prints_raw_bits() {
    let elf = elf_with_targets("generic,+avx2");
    let report = report::inspect(&elf, None).unwrap();
    assert_eq!(report.targets[0].features, vec![format!("bit{}", x86::feature::AVX2)]);
}

#[test]
fn unknown_arch_is_rejected() {
    let elf = elf_with_targets("generic");
    assert!(report::inspect(&elf, Some("riscv")).is_err());
}

#[test]
fn missing_symbol_is_reported() {
    let mut obj = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
    let data = obj.section_id(StandardSection::Data);
    obj.append_section_data(data, &[0u8; 16], 4);
    let mut buf = Vec::new();
    obj.emit(&mut buf).unwrap();

    let err = report::inspect(&buf, None).unwrap_err();
    assert!(err.contains("jl_dispatch_target_ids"));
}

#[test]
fn garbage_input_is_rejected() {
    assert!(report::inspect(b"not an elf at all", None).is_err());
}

#[test]
fn render_and_json_agree_on_names() {
    let elf = elf_with_targets("generic,clone_all;skylake,base(0)");
    let report = report::inspect(&elf, Some("x86")).unwrap();

    let text = report.render();
    assert!(text.contains("[0] generic (clone_all)"));
    assert!(text.contains("[1] skylake"));

    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("\"skylake\""));
}

#[test]
fn inspect_reads_from_disk_like_the_cli() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("image.o");
    std::fs::write(&path, elf_with_targets("generic")).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let report = report::inspect(&bytes, None).unwrap();
    assert_eq!(report.ntargets, 1);
}
