//! Property-Based Tests for Cache Key Derivation
//!
//! Property: identical logical requests derive identical keys, and distinct
//! (path, size, variant) tuples never derive the same key.

use proptest::prelude::*;
use shutter_core::{derive_key, normalize_path, parse_size, Size, Variant};

// ============================================================================
// GENERATORS
// ============================================================================

/// A single path segment that survives normalization unchanged.
fn arb_segment() -> impl Strategy<Value = String> {
    "[a-z0-9_-]{1,8}(\\.[a-z]{2,4})?"
}

/// A normalized image path with one to four segments.
fn arb_path() -> impl Strategy<Value = String> {
    prop::collection::vec(arb_segment(), 1..5).prop_map(|segments| segments.join("/"))
}

fn arb_size() -> impl Strategy<Value = Size> {
    (0u64..5000, 0u64..5000).prop_map(|(w, h)| Size::new(w, h))
}

fn arb_variant() -> impl Strategy<Value = Variant> {
    prop_oneof![Just(Variant::Standard), Just(Variant::Hd)]
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: derivation is deterministic and ignores cosmetic path noise.
    #[test]
    fn prop_key_is_deterministic(
        path in arb_path(),
        size in arb_size(),
        variant in arb_variant(),
    ) {
        let first = derive_key(&path, size, variant);
        let second = derive_key(&path, size, variant);
        prop_assert_eq!(&first, &second);

        let noisy = format!("/./{}", path.replace('/', "//"));
        prop_assert_eq!(&first, &derive_key(&noisy, size, variant));

        prop_assert!(first.as_str().starts_with('/'));
    }

    /// Property: distinct tuples derive distinct keys.
    #[test]
    fn prop_key_is_injective(
        a in (arb_path(), arb_size(), arb_variant()),
        b in (arb_path(), arb_size(), arb_variant()),
    ) {
        prop_assume!(a != b);
        prop_assert_ne!(
            derive_key(&a.0, a.1, a.2),
            derive_key(&b.0, b.1, b.2)
        );
    }

    /// Property: the variant suffix is the only difference between variants.
    #[test]
    fn prop_hd_key_extends_standard_key(path in arb_path(), size in arb_size()) {
        let standard = derive_key(&path, size, Variant::Standard);
        let hd = derive_key(&path, size, Variant::Hd);
        prop_assert_eq!(format!("{}@hd", standard), hd.into_string());
    }

    /// Property: normalization is idempotent.
    #[test]
    fn prop_normalize_idempotent(raw in "[a-z./]{0,24}") {
        let once = normalize_path(&raw);
        prop_assert_eq!(normalize_path(&once), once.clone());
        prop_assert!(!once.starts_with('/'));
    }

    /// Property: any rendered size parses back to itself.
    #[test]
    fn prop_size_display_parses(size in arb_size()) {
        prop_assert_eq!(parse_size(&size.to_string()).ok(), Some(size));
    }
}
