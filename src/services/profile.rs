//! Deterministic anonymous profiles.
//!
//! The same seed (usually a client IP) always yields the same username and
//! avatar, so an anonymous visitor sees a stable identity across requests
//! without any state being written first.

const ADJECTIVES: &[&str] = &[
    "Brave", "Calm", "Clever", "Curious", "Eager", "Gentle", "Happy", "Keen", "Lively", "Lucky",
    "Mighty", "Noble", "Quick", "Quiet", "Silent", "Smart", "Swift", "Warm", "Wise", "Witty",
];

const ANIMALS: &[&str] = &[
    "Badger", "Bear", "Beaver", "Dolphin", "Eagle", "Falcon", "Fox", "Hawk", "Heron", "Lynx",
    "Marten", "Otter", "Owl", "Panda", "Raven", "Seal", "Stork", "Tiger", "Walrus", "Wolf",
];

/// Multiplicative string hash folded to 32 bits. Stability matters more than
/// distribution here: profiles must never change for a returning seed.
fn seed_hash(seed: &str) -> u32 {
    let mut h: u32 = 0;
    for byte in seed.bytes() {
        h = h.wrapping_mul(31).wrapping_add(u32::from(byte));
    }
    h
}

/// Display name for a seed, e.g. "Swift Otter". An empty seed gets the
/// neutral fallback.
pub fn username_for_seed(seed: &str) -> String {
    if seed.is_empty() {
        return "Guest".to_string();
    }
    let h = seed_hash(seed);
    let adjective = ADJECTIVES[(h as usize) % ADJECTIVES.len()];
    let animal = ANIMALS[((h / 7) as usize) % ANIMALS.len()];
    format!("{adjective} {animal}")
}

/// Avatar id for a seed, 1-based into the avatar set.
pub fn avatar_id_for_seed(seed: &str) -> i64 {
    if seed.is_empty() {
        return 1;
    }
    let h = seed_hash(seed);
    ((h as usize) % ANIMALS.len()) as i64 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_profile() {
        let a = username_for_seed("203.0.113.7");
        let b = username_for_seed("203.0.113.7");
        assert_eq!(a, b);
        assert_eq!(
            avatar_id_for_seed("203.0.113.7"),
            avatar_id_for_seed("203.0.113.7")
        );
    }

    #[test]
    fn test_username_has_two_parts() {
        let name = username_for_seed("198.51.100.23");
        let parts: Vec<&str> = name.split(' ').collect();
        assert_eq!(parts.len(), 2);
        assert!(ADJECTIVES.contains(&parts[0]));
        assert!(ANIMALS.contains(&parts[1]));
    }

    #[test]
    fn test_avatar_id_in_range() {
        for seed in ["10.0.0.1", "10.0.0.2", "2001:db8::1", "x"] {
            let id = avatar_id_for_seed(seed);
            assert!(id >= 1 && id <= ANIMALS.len() as i64);
        }
    }

    #[test]
    fn test_empty_seed_fallback() {
        assert_eq!(username_for_seed(""), "Guest");
        assert_eq!(avatar_id_for_seed(""), 1);
    }
}
