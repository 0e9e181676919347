//! Byte codec for the serialized target descriptions embedded in an image.
//!
//! Layout (host-endian, 4-byte aligned):
//!
//! ```text
//! u32 ntarget
//! per target:
//!   u32 flags
//!   u32 nfeature            (must equal the architecture's word count)
//!   u32 en[nfeature]
//!   u32 dis[nfeature]
//!   u32 namelen; u8 name[namelen]
//!   u32 extlen;  u8 ext[extlen]
//! ```
//!
//! The serialized feature sets are fully resolved: the image emitter has
//! already folded in CPU baselines and dependency closure.

use varimg_features::FeatureSet;

use crate::{CodecError, TargetData, TargetFlags};

/// Serialize one target record (without the leading flags word).
pub fn serialize_target<const N: usize>(
    name: &str,
    en: &FeatureSet<N>,
    dis: &FeatureSet<N>,
    ext_features: &str,
) -> Vec<u8> {
    let mut out = Vec::new();
    push_u32(&mut out, N as u32);
    for &w in en.words() {
        push_u32(&mut out, w);
    }
    for &w in dis.words() {
        push_u32(&mut out, w);
    }
    push_u32(&mut out, name.len() as u32);
    out.extend_from_slice(name.as_bytes());
    push_u32(&mut out, ext_features.len() as u32);
    out.extend_from_slice(ext_features.as_bytes());
    out
}

/// Serialize a full target list, flags words included.
pub fn serialize_targets<const N: usize>(targets: &[TargetData<N>]) -> Vec<u8> {
    let mut out = Vec::new();
    push_u32(&mut out, targets.len() as u32);
    for t in targets {
        push_u32(&mut out, t.en.flags.bits());
        out.extend_from_slice(&serialize_target(
            &t.name,
            &t.en.features,
            &t.dis.features,
            &t.ext_features,
        ));
    }
    out
}

/// One decoded target with its feature words kept at whatever width the
/// image was produced for. Offline tooling reads images cross-architecture
/// through this form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTargetData {
    pub name: String,
    pub ext_features: String,
    pub flags: TargetFlags,
    pub en_words: Vec<u32>,
    pub dis_words: Vec<u32>,
}

/// Decode a serialized target list without fixing the feature width.
pub fn deserialize_raw_targets(data: &[u8]) -> Result<Vec<RawTargetData>, CodecError> {
    let mut cur = Cursor { buf: data, pos: 0 };
    let ntarget = cur.u32()?;
    let mut res = Vec::with_capacity(ntarget as usize);
    for _ in 0..ntarget {
        let flags = TargetFlags::from_bits_retain(cur.u32()?);
        let nfeature = cur.u32()? as usize;
        let mut en_words = Vec::with_capacity(nfeature);
        for _ in 0..nfeature {
            en_words.push(cur.u32()?);
        }
        let mut dis_words = Vec::with_capacity(nfeature);
        for _ in 0..nfeature {
            dis_words.push(cur.u32()?);
        }
        let name = cur.string()?;
        let ext_features = cur.string()?;
        res.push(RawTargetData { name, ext_features, flags, en_words, dis_words });
    }
    Ok(res)
}

/// Decode a serialized target list.
///
/// The image's feature word count must match the architecture's. `base`
/// and the disabling flags are not carried in the wire format; they are
/// restored to their defaults (0 and empty).
pub fn deserialize_targets<const N: usize>(data: &[u8]) -> Result<Vec<TargetData<N>>, CodecError> {
    let raw = deserialize_raw_targets(data)?;
    let mut res = Vec::with_capacity(raw.len());
    for r in raw {
        if r.en_words.len() != N {
            return Err(CodecError::FeatureCountMismatch {
                expected: N as u32,
                got: r.en_words.len() as u32,
            });
        }
        let mut target = TargetData::<N>::default();
        target.en.flags = r.flags;
        target.en.features = FeatureSet::from_words(r.en_words.try_into().unwrap());
        target.dis.features = FeatureSet::from_words(r.dis_words.try_into().unwrap());
        target.name = r.name;
        target.ext_features = r.ext_features;
        res.push(target);
    }
    Ok(res)
}

fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_ne_bytes());
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(n).ok_or(CodecError::UnexpectedEof)?;
        if end > self.buf.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        let b = self.bytes(4)?;
        Ok(u32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let len = self.u32()? as usize;
        let bytes = self.bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::BadName)
    }
}
