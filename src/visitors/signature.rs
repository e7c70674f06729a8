/// Placeholder integrity signature for a `WipeReport`: an XOR-folded
/// hash of the sorted URI list plus a secret, rendered as hex.
///
/// This is explicitly a stand-in (spec.md §9 open question on wipe
/// signatures): production deployments must replace it with a real
/// MAC (e.g. HMAC-SHA256) before treating a signature as tamper
/// evidence rather than a plain checksum.
pub fn compute(uris: &[String], secret: &str) -> String {
    let mut sorted = uris.to_vec();
    sorted.sort_unstable();

    let mut acc: u64 = fnv_offset();
    for uri in &sorted {
        acc = fold(acc, uri.as_bytes());
    }
    acc = fold(acc, secret.as_bytes());
    format!("{acc:016x}")
}

fn fnv_offset() -> u64 {
    0xcbf29ce484222325
}

fn fold(mut acc: u64, bytes: &[u8]) -> u64 {
    const PRIME: u64 = 0x100000001b3;
    for &b in bytes {
        acc ^= b as u64;
        acc = acc.wrapping_mul(PRIME);
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_order_independent() {
        let a = compute(&["b".to_string(), "a".to_string()], "secret");
        let b = compute(&["a".to_string(), "b".to_string()], "secret");
        assert_eq!(a, b);
    }

    #[test]
    fn signature_changes_with_secret() {
        let a = compute(&["a".to_string()], "s1");
        let b = compute(&["a".to_string()], "s2");
        assert_ne!(a, b);
    }
}
