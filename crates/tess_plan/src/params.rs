//! Bound parameter values and their wire codec.
//!
//! A `ParameterSet` is serialized once per plan vertex when fragment task
//! messages are assembled. The layout is length-prefixed big-endian with a
//! one-byte type tag per value; doubles round-trip bit-exactly.

use crate::wire::{read_bytes_at, read_i64_at, read_u32_at, read_u64_at, read_u8_at};

const TAG_NULL: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_DOUBLE: u8 = 2;
const TAG_TEXT: u8 = 3;
const TAG_BLOB: u8 = 4;

/// One bound value.
#[derive(Debug, Clone)]
pub enum ParamValue {
    Null,
    Int(i64),
    Double(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl PartialEq for ParamValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ParamValue::Null, ParamValue::Null) => true,
            (ParamValue::Int(a), ParamValue::Int(b)) => a == b,
            // Bit comparison so NaN payloads survive a codec round trip.
            (ParamValue::Double(a), ParamValue::Double(b)) => a.to_bits() == b.to_bits(),
            (ParamValue::Text(a), ParamValue::Text(b)) => a == b,
            (ParamValue::Blob(a), ParamValue::Blob(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ParamValue {}

/// Ordered bound values for one statement invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSet {
    values: Vec<ParamValue>,
}

impl ParameterSet {
    pub fn new(values: Vec<ParamValue>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[ParamValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Serialize into the wire layout.
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let count = u32::try_from(self.values.len())
            .map_err(|_| anyhow::anyhow!("parameter set exceeds wire count limit"))?;
        let mut out = Vec::with_capacity(4 + self.values.len() * 9);
        out.extend_from_slice(&count.to_be_bytes());
        for value in &self.values {
            match value {
                ParamValue::Null => out.push(TAG_NULL),
                ParamValue::Int(v) => {
                    out.push(TAG_INT);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                ParamValue::Double(v) => {
                    out.push(TAG_DOUBLE);
                    out.extend_from_slice(&v.to_bits().to_be_bytes());
                }
                ParamValue::Text(v) => {
                    out.push(TAG_TEXT);
                    let len = u32::try_from(v.len())
                        .map_err(|_| anyhow::anyhow!("text parameter exceeds wire length limit"))?;
                    out.extend_from_slice(&len.to_be_bytes());
                    out.extend_from_slice(v.as_bytes());
                }
                ParamValue::Blob(v) => {
                    out.push(TAG_BLOB);
                    let len = u32::try_from(v.len())
                        .map_err(|_| anyhow::anyhow!("blob parameter exceeds wire length limit"))?;
                    out.extend_from_slice(&len.to_be_bytes());
                    out.extend_from_slice(v);
                }
            }
        }
        Ok(out)
    }

    /// Decode one serialized parameter set, validating lengths.
    pub fn decode(buf: &[u8]) -> anyhow::Result<ParameterSet> {
        let mut offset = 0usize;
        let count = read_u32_at(buf, &mut offset)? as usize;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            let tag = read_u8_at(buf, &mut offset)?;
            let value = match tag {
                TAG_NULL => ParamValue::Null,
                TAG_INT => ParamValue::Int(read_i64_at(buf, &mut offset)?),
                TAG_DOUBLE => ParamValue::Double(f64::from_bits(read_u64_at(buf, &mut offset)?)),
                TAG_TEXT => {
                    let len = read_u32_at(buf, &mut offset)? as usize;
                    let bytes = read_bytes_at(buf, &mut offset, len)?;
                    ParamValue::Text(String::from_utf8(bytes.to_vec())?)
                }
                TAG_BLOB => {
                    let len = read_u32_at(buf, &mut offset)? as usize;
                    ParamValue::Blob(read_bytes_at(buf, &mut offset, len)?.to_vec())
                }
                other => anyhow::bail!("unknown parameter tag {other}"),
            };
            values.push(value);
        }
        anyhow::ensure!(offset == buf.len(), "trailing bytes after parameter set");
        Ok(ParameterSet { values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn round_trip(set: &ParameterSet) {
        let encoded = set.encode().expect("encode");
        let decoded = ParameterSet::decode(&encoded).expect("decode");
        assert_eq!(*set, decoded);
    }

    #[test]
    fn empty_set_round_trips() {
        round_trip(&ParameterSet::default());
    }

    #[test]
    fn mixed_values_round_trip() {
        round_trip(&ParameterSet::new(vec![
            ParamValue::Null,
            ParamValue::Int(-42),
            ParamValue::Double(3.5),
            ParamValue::Double(f64::NAN),
            ParamValue::Text("warehouse".to_string()),
            ParamValue::Blob(vec![0, 1, 2, 255]),
        ]));
    }

    #[test]
    fn random_sets_round_trip() {
        let mut rng = StdRng::seed_from_u64(0x7e55);
        for _ in 0..128 {
            let len = rng.gen_range(0..12);
            let values = (0..len)
                .map(|_| match rng.gen_range(0..5) {
                    0 => ParamValue::Null,
                    1 => ParamValue::Int(rng.gen()),
                    2 => ParamValue::Double(f64::from_bits(rng.gen())),
                    3 => {
                        let n = rng.gen_range(0..32);
                        ParamValue::Text(
                            (0..n).map(|_| rng.gen_range(b'a'..=b'z') as char).collect(),
                        )
                    }
                    _ => {
                        let n = rng.gen_range(0..32);
                        ParamValue::Blob((0..n).map(|_| rng.gen()).collect())
                    }
                })
                .collect();
            round_trip(&ParameterSet::new(values));
        }
    }

    #[test]
    fn decode_rejects_truncated_payload() {
        let encoded = ParameterSet::new(vec![ParamValue::Int(7)])
            .encode()
            .expect("encode");
        assert!(ParameterSet::decode(&encoded[..encoded.len() - 1]).is_err());
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let mut encoded = ParameterSet::new(vec![ParamValue::Null]).encode().expect("encode");
        encoded.push(0);
        assert!(ParameterSet::decode(&encoded).is_err());
    }
}
