use std::time::{SystemTime, UNIX_EPOCH};

use md5::{Digest, Md5};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// 64-bit fingerprint of a byte string: the first 8 digest bytes,
/// big-endian. Used for output sharding and derived RNG seeds.
pub fn fingerprint64(data: &[u8]) -> u64 {
    let digest: [u8; 16] = Md5::digest(data).into();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

/// RNG for a randomized kernel: hashed from an explicit seed string when
/// the host set one, otherwise from host identity, pid and wall clock.
pub(crate) fn rng_from_seed(seed: Option<&str>) -> StdRng {
    let seed = match seed {
        Some(s) => fingerprint64(s.as_bytes()),
        None => host_pid_time_seed(),
    };
    StdRng::seed_from_u64(seed)
}

fn host_pid_time_seed() -> u64 {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| String::from("localhost"));
    let pid = std::process::id();
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    fingerprint64(format!("{host}:{pid}:{now}").as_bytes())
}
