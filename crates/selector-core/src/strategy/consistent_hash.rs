//! Consistent Hash Function
//!
//! Maps call arguments to a server index with jump consistent hashing, so the
//! same arguments keep landing on the same server and growing the server list
//! by one only moves about `1 / (n + 1)` of the keys.

use blake3::Hasher;
use std::sync::Arc;

use crate::error::{Result, SelectorError};

/// Caller supplied hashing of call arguments into a jump-hash key
pub type ArgsHasher = Arc<dyn Fn(&[String]) -> u64 + Send + Sync>;

const JUMP_MULTIPLIER: u64 = 2862933555777941757;

/// Default argument hasher: blake3 over `/arg1/arg2/...`
pub fn hash_args(args: &[String]) -> u64 {
    let mut hasher = Hasher::new();
    for arg in args {
        hasher.update(b"/");
        hasher.update(arg.as_bytes());
    }
    let hash = hasher.finalize();
    let bytes = hash.as_bytes();
    u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3],
        bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

/// Jump consistent hash of `key` into `[0, buckets)`
pub fn jump_hash(mut key: u64, buckets: usize) -> Result<usize> {
    if buckets == 0 {
        return Err(SelectorError::UnsupportedMode(
            "consistent hash over zero servers".to_string(),
        ));
    }

    let buckets = buckets as i64;
    let mut b: i64 = -1;
    let mut j: i64 = 0;
    while j < buckets {
        b = j;
        key = key.wrapping_mul(JUMP_MULTIPLIER).wrapping_add(1);
        j = ((b + 1) as f64 * ((1i64 << 31) as f64 / ((key >> 33) + 1) as f64)) as i64;
    }

    Ok(b as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn keys(count: usize) -> Vec<u64> {
        (0..count)
            .map(|i| hash_args(&["Arith.Mul".to_string(), format!("arg-{}", i)]))
            .collect()
    }

    #[test]
    fn test_jump_hash_deterministic() {
        let key = hash_args(&["Arith.Mul".to_string(), "alice".to_string()]);
        let first = jump_hash(key, 12).unwrap();
        for _ in 0..10 {
            assert_eq!(jump_hash(key, 12).unwrap(), first);
        }
    }

    #[test]
    fn test_jump_hash_in_range() {
        for key in keys(2000) {
            for buckets in 1..20 {
                assert!(jump_hash(key, buckets).unwrap() < buckets);
            }
        }
    }

    #[test]
    fn test_jump_hash_single_bucket() {
        assert_eq!(jump_hash(0, 1).unwrap(), 0);
        assert_eq!(jump_hash(u64::MAX, 1).unwrap(), 0);
    }

    #[test]
    fn test_jump_hash_zero_buckets() {
        assert!(matches!(jump_hash(42, 0), Err(SelectorError::UnsupportedMode(_))));
    }

    #[test]
    fn test_growing_buckets_remaps_minority() {
        let sample = keys(10_000);
        for buckets in [3usize, 10, 25] {
            let mut moved = 0;
            for key in &sample {
                let before = jump_hash(*key, buckets).unwrap();
                let after = jump_hash(*key, buckets + 1).unwrap();
                if before != after {
                    // Keys only ever move into the new bucket
                    assert_eq!(after, buckets);
                    moved += 1;
                }
            }
            let ratio = moved as f64 / sample.len() as f64;
            let expected = 1.0 / (buckets + 1) as f64;
            assert!(ratio < 0.5, "ratio={} for {} buckets", ratio, buckets);
            assert!((ratio - expected).abs() < 0.05, "ratio={} expected~{}", ratio, expected);
        }
    }

    #[test]
    fn test_jump_hash_distribution() {
        let mut distribution = HashMap::new();
        for key in keys(6000) {
            *distribution.entry(jump_hash(key, 6).unwrap()).or_insert(0) += 1;
        }

        assert_eq!(distribution.len(), 6);
        for count in distribution.values() {
            assert!(*count > 700 && *count < 1300, "count={} is outside expected range", count);
        }
    }

    #[test]
    fn test_hash_args_depends_on_order() {
        let a = hash_args(&["x".to_string(), "y".to_string()]);
        let b = hash_args(&["y".to_string(), "x".to_string()]);
        assert_ne!(a, b);
        assert_eq!(a, hash_args(&["x".to_string(), "y".to_string()]));
    }
}
