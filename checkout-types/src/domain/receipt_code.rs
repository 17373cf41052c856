//! Guest receipt code generation and normalization.
//!
//! A receipt code is the human-typable secret proving ownership of an
//! unclaimed guest purchase. Codes are uppercase, grouped for
//! readability, and drawn from an alphabet without the look-alike
//! characters I, L, O, 0 and 1.

use rand::Rng;

/// 31 unambiguous symbols; 16 of them carry just over 79 bits of
/// entropy, comfortably above the 60-bit floor required of codes.
const ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

const GROUPS: usize = 4;
const GROUP_LEN: usize = 4;

/// Generates a fresh receipt code, e.g. `K7QF-2MWN-X9RA-EHT4`.
///
/// Collisions against the storage unique constraint are for the caller
/// to detect and retry with a fresh code.
pub fn generate() -> String {
    let mut rng = rand::rng();
    let mut groups = Vec::with_capacity(GROUPS);
    for _ in 0..GROUPS {
        let group: String = (0..GROUP_LEN)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect();
        groups.push(group);
    }
    groups.join("-")
}

/// Normalizes caller input to the stored canonical form: trimmed and
/// uppercased. Hyphens are kept; they are part of the stored code.
pub fn normalize(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

/// Returns true if the input looks like a receipt code (alphanumeric
/// plus hyphens). Used to reject junk before a storage lookup.
pub fn is_plausible(input: &str) -> bool {
    !input.is_empty()
        && input
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_code_shape() {
        let code = generate();
        assert_eq!(code.len(), GROUPS * GROUP_LEN + (GROUPS - 1));
        let groups: Vec<&str> = code.split('-').collect();
        assert_eq!(groups.len(), GROUPS);
        for group in groups {
            assert_eq!(group.len(), GROUP_LEN);
            assert!(group.bytes().all(|b| ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_generated_code_is_uppercase() {
        let code = generate();
        assert_eq!(code, code.to_ascii_uppercase());
    }

    #[test]
    fn test_codes_differ() {
        // 79 bits of entropy; two equal draws would indicate a broken rng.
        assert_ne!(generate(), generate());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  k7qf-2mwn-x9ra-eht4\n"), "K7QF-2MWN-X9RA-EHT4");
    }

    #[test]
    fn test_is_plausible() {
        assert!(is_plausible("K7QF-2MWN-X9RA-EHT4"));
        assert!(!is_plausible(""));
        assert!(!is_plausible("code with spaces"));
        assert!(!is_plausible("inject';--"));
    }
}
