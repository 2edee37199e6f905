use proptest::prelude::*;

use nexus_pages::identifier;

proptest! {
    /// Munging is idempotent: munging an already-munged identifier is a no-op.
    #[test]
    fn prop_munge_is_idempotent(raw in "[a-zA-Z0-9 _-]{1,40}") {
        if let Ok(once) = identifier::munge(&raw) {
            let twice = identifier::munge(once.as_str()).unwrap();
            prop_assert_eq!(once.as_str(), twice.as_str());
        }
    }

    /// Base32 on-disk keys round-trip through decode back to the lowercased
    /// bytes they were encoded from.
    #[test]
    fn prop_base32_round_trips(raw in "[a-zA-Z0-9 _-]{1,40}") {
        let key = identifier::encode_on_disk(&raw);
        let decoded = identifier::decode_on_disk(&key).unwrap();
        prop_assert_eq!(decoded, raw.to_lowercase());
    }

    /// A munged identifier never needs further migration.
    #[test]
    fn prop_munged_identifiers_never_need_migration(raw in "[a-zA-Z0-9 _-]{1,40}") {
        if let Ok(id) = identifier::munge(&raw) {
            prop_assert!(!identifier::needs_migration(id.as_str()).unwrap());
        }
    }
}
