//! Property-based round-trip tests for the codec.

use proptest::prelude::*;

use crate::message::WireMessage;

/// Printable entry text without the characters the escaper rewrites,
/// plus a separate case that includes them.
fn mod_entry() -> impl Strategy<Value = String> {
    "[a-z0-9_-]{1,16}(:[a-z0-9\\.\\+]{1,12})?"
}

fn token() -> impl Strategy<Value = String> {
    "[A-Za-z0-9+/=-]{1,24}"
}

proptest! {
    #[test]
    fn response_modlist_round_trips(
        check_id in proptest::option::of(token()),
        mods in proptest::collection::vec(mod_entry(), 0..12),
        signature in proptest::option::of(token()),
        timestamp in proptest::option::of(0i64..=2_000_000_000_000),
    ) {
        let msg = WireMessage::ResponseModList { check_id, mods, signature, timestamp };
        let decoded = WireMessage::decode(msg.encode().as_bytes()).unwrap();
        prop_assert_eq!(decoded, msg);
    }

    #[test]
    fn entries_with_quotes_and_backslashes_round_trip(
        prefix in "[a-z]{1,6}",
        suffix in "[a-z]{1,6}",
    ) {
        let tricky = format!("{}\"\\{}", prefix, suffix);
        let msg = WireMessage::ResponseModList {
            check_id: None,
            mods: vec![tricky],
            signature: None,
            timestamp: None,
        };
        let decoded = WireMessage::decode(msg.encode().as_bytes()).unwrap();
        prop_assert_eq!(decoded, msg);
    }

    #[test]
    fn announce_presence_round_trips(
        mod_id in proptest::option::of("[a-z0-9_]{1,16}"),
        version in proptest::option::of("[0-9]{1,2}\\.[0-9]{1,2}\\.[0-9]{1,2}"),
    ) {
        let msg = WireMessage::AnnouncePresence { mod_id, version };
        let decoded = WireMessage::decode(msg.encode().as_bytes()).unwrap();
        prop_assert_eq!(decoded, msg);
    }
}
