//! Locate the dispatch blob in an object file and shape the report.

use std::fmt::Write as _;

use object::{Object, ObjectSection, ObjectSymbol};
use serde::Serialize;
use varimg_cpu::{aarch64, arm, x86, FeatureName};
use varimg_target::codec::deserialize_raw_targets;
use varimg_target::TargetFlags;

const TARGET_IDS_SYMBOL: &str = "jl_dispatch_target_ids";

#[derive(Debug, Serialize)]
pub struct ImageReport {
    pub ntargets: usize,
    pub targets: Vec<TargetReport>,
}

#[derive(Debug, Serialize)]
pub struct TargetReport {
    pub index: usize,
    pub name: String,
    pub clone_all: bool,
    pub feature_words: usize,
    pub features: Vec<String>,
    pub disabled: Vec<String>,
    pub ext_features: String,
}

/// Decode the embedded target descriptions of `data` (an ELF image).
///
/// When `arch` names one of the known registries, feature bits are printed
/// by name; otherwise as raw bit positions.
pub fn inspect(data: &[u8], arch: Option<&str>) -> Result<ImageReport, String> {
    let file = object::File::parse(data).map_err(|e| format!("not an object file: {e}"))?;
    let blob = symbol_data(&file, TARGET_IDS_SYMBOL)?;
    let raw = deserialize_raw_targets(blob).map_err(|e| e.to_string())?;

    let table = feature_table(arch)?;
    let targets = raw
        .iter()
        .enumerate()
        .map(|(index, t)| TargetReport {
            index,
            name: t.name.clone(),
            clone_all: t.flags.contains(TargetFlags::CLONE_ALL),
            feature_words: t.en_words.len(),
            features: bit_names(&t.en_words, table),
            disabled: bit_names(&t.dis_words, table),
            ext_features: t.ext_features.clone(),
        })
        .collect::<Vec<_>>();

    Ok(ImageReport { ntargets: targets.len(), targets })
}

impl ImageReport {
    /// Plain-text rendering, one block per target.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} dispatch target(s)", self.ntargets);
        for t in &self.targets {
            let clone_all = if t.clone_all { " (clone_all)" } else { "" };
            let _ = writeln!(out, "  [{}] {}{}", t.index, t.name, clone_all);
            if !t.features.is_empty() {
                let _ = writeln!(out, "      features: {}", t.features.join(", "));
            }
            if !t.disabled.is_empty() {
                let _ = writeln!(out, "      disabled: {}", t.disabled.join(", "));
            }
            if !t.ext_features.is_empty() {
                let _ = writeln!(out, "      ext: {}", t.ext_features);
            }
        }
        out
    }
}

fn feature_table(arch: Option<&str>) -> Result<&'static [FeatureName], String> {
    match arch {
        None => Ok(&[]),
        Some("x86") | Some("x86_64") => Ok(x86::FEATURE_NAMES),
        Some("aarch64") => Ok(aarch64::FEATURE_NAMES),
        Some("arm") => Ok(arm::FEATURE_NAMES),
        Some(other) => Err(format!("unknown architecture {other}")),
    }
}

fn bit_names(words: &[u32], table: &'static [FeatureName]) -> Vec<String> {
    let mut out = Vec::new();
    for (wi, &w) in words.iter().enumerate() {
        for b in 0..32 {
            if w & (1 << b) == 0 {
                continue;
            }
            let bit = (wi * 32 + b) as u32;
            match table.iter().find(|f| f.bit == bit) {
                Some(f) => out.push(f.name.to_string()),
                None => out.push(format!("bit{bit}")),
            }
        }
    }
    out
}

/// Bytes of a named data symbol, from its defining section. The blob's own
/// length prefix bounds decoding, so the slice runs to the section's end.
fn symbol_data<'data>(
    file: &object::File<'data>,
    name: &str,
) -> Result<&'data [u8], String> {
    let sym = file
        .symbols()
        .chain(file.dynamic_symbols())
        .find(|s| s.name().map_or(false, |n| n == name))
        .ok_or_else(|| format!("image does not export {name}"))?;
    let section_index = sym
        .section_index()
        .ok_or_else(|| format!("{name} has no defining section"))?;
    let section = file
        .section_by_index(section_index)
        .map_err(|e| format!("bad section for {name}: {e}"))?;
    let data = section
        .data()
        .map_err(|e| format!("unreadable section for {name}: {e}"))?;
    let offset = sym
        .address()
        .checked_sub(section.address())
        .ok_or_else(|| format!("{name} lies outside its section"))? as usize;
    data.get(offset..)
        .ok_or_else(|| format!("{name} lies outside its section"))
}
