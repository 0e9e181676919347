//! Parser for the `cpu_target` option string.

use varimg_features::{FeatureSet, NO_FEATURE};
use varimg_cpu::{find_feature_bit, FeatureName};

use crate::{ParseError, TargetData, TargetFlags};

/// Parse a `;`-separated target list.
///
/// `feature_cb` resolves one feature token: it sets the matching bit in the
/// given set and returns `true`, or returns `false` for names the tables do
/// not know (those are forwarded to codegen via `ext_features`). Dependency
/// closure is not applied here; it runs after host masking.
pub fn parse_target_list<const N: usize>(
    option: &str,
    mut feature_cb: impl FnMut(&str, &mut FeatureSet<N>) -> bool,
) -> Result<Vec<TargetData<N>>, ParseError> {
    let mut res: Vec<TargetData<N>> = Vec::new();
    for target_str in option.split(';') {
        let mut arg = TargetData::default();
        for (i, tok) in target_str.split(',').enumerate() {
            if i == 0 {
                if tok.is_empty() {
                    return Err(ParseError::EmptyCpuName);
                }
                arg.name = tok.to_string();
            } else {
                parse_token(tok, &res, &mut arg, &mut feature_cb)?;
            }
        }
        res.push(arg);
    }
    Ok(res)
}

/// Convenience wrapper: parse with a plain feature-name table lookup.
pub fn parse_with_table<const N: usize>(
    option: &str,
    features: &'static [FeatureName],
) -> Result<Vec<TargetData<N>>, ParseError> {
    parse_target_list(option, |name, set| {
        let bit = find_feature_bit(features, name);
        if bit == NO_FEATURE {
            return false;
        }
        set.set(bit);
        true
    })
}

fn parse_token<const N: usize>(
    tok: &str,
    committed: &[TargetData<N>],
    arg: &mut TargetData<N>,
    feature_cb: &mut impl FnMut(&str, &mut FeatureSet<N>) -> bool,
) -> Result<(), ParseError> {
    let (disable, name) = match tok.as_bytes().first() {
        Some(b'-') => (true, &tok[1..]),
        Some(b'+') => (false, &tok[1..]),
        _ => (false, tok),
    };

    if name == "clone_all" {
        if disable {
            arg.dis.flags |= TargetFlags::CLONE_ALL;
            arg.en.flags -= TargetFlags::CLONE_ALL;
        } else {
            arg.en.flags |= TargetFlags::CLONE_ALL;
            arg.dis.flags -= TargetFlags::CLONE_ALL;
        }
        return Ok(());
    }

    if let Some(base) = parse_clone_base(name) {
        if disable {
            return Err(ParseError::DisabledBase);
        }
        if base >= committed.len() {
            return Err(ParseError::BaseOutOfRange);
        }
        if !committed[base].is_clone_all() {
            return Err(ParseError::BaseNotCloneAll);
        }
        arg.base = base;
        return Ok(());
    }

    let list = if disable {
        &mut arg.dis.features
    } else {
        &mut arg.en.features
    };
    if !feature_cb(name, list) {
        if !arg.ext_features.is_empty() {
            arg.ext_features.push(',');
        }
        arg.ext_features.push(if disable { '-' } else { '+' });
        arg.ext_features.push_str(name);
    }
    Ok(())
}

/// Match a `base(k)` token. A malformed form is not an error here; the token
/// falls through to the feature path and ends up in `ext_features`.
fn parse_clone_base(tok: &str) -> Option<usize> {
    let digits = tok.strip_prefix("base(")?.strip_suffix(')')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
