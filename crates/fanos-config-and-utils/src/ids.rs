//! Request identifiers.

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Mixed into the fallback seed so ids minted in the same nanosecond differ.
static FALLBACK_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a UUID v4 request id.
///
/// Uses the OS random source; if that is unavailable, falls back to a
/// time-seeded pseudo-random generator that still yields a well-formed v4 id.
pub fn generate_request_id() -> String {
    let mut bytes = [0u8; 16];
    match OsRng.try_fill_bytes(&mut bytes) {
        Ok(()) => uuid::Builder::from_random_bytes(bytes).into_uuid().to_string(),
        Err(e) => {
            debug!(error = %e, "OS randomness unavailable, using fallback id generator");
            fallback_request_id()
        }
    }
}

fn fallback_request_id() -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;
    let counter = FALLBACK_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut rng = StdRng::seed_from_u64(nanos ^ counter.rotate_left(32));

    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    uuid::Builder::from_random_bytes(bytes).into_uuid().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use uuid::Uuid;

    fn is_v4(id: &str) -> bool {
        Uuid::parse_str(id)
            .map(|u| u.get_version_num() == 4 && u.get_variant() == uuid::Variant::RFC4122)
            .unwrap_or(false)
    }

    #[test]
    fn generated_ids_are_v4() {
        let id = generate_request_id();
        assert!(is_v4(&id), "{id} is not a v4 uuid");
    }

    #[test]
    fn fallback_ids_are_v4() {
        let id = fallback_request_id();
        assert!(is_v4(&id), "{id} is not a v4 uuid");
    }

    #[test]
    fn fallback_ids_are_distinct() {
        let ids: HashSet<String> = (0..256).map(|_| fallback_request_id()).collect();
        assert_eq!(ids.len(), 256);
    }
}
