use std::collections::HashSet;

/// Bytes of each variant that take part in its signature.
pub const SIGNATURE_PREFIX: usize = 16;

/// Cheap identity of an encoded variant: total length plus leading bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariantSignature {
    len: usize,
    prefix: Vec<u8>,
}

pub fn signature(bytes: &[u8]) -> VariantSignature {
    VariantSignature { len: bytes.len(), prefix: bytes[..bytes.len().min(SIGNATURE_PREFIX)].to_vec() }
}

/// Keeps the first variant of every signature, in input order.
pub fn dedup_variants(mut variants: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
    let mut seen = HashSet::with_capacity(variants.len());
    variants.retain(|v| seen.insert(signature(v)));
    variants
}
