//! Unit tests for event typing and the enhanced field translation.

use serde_json::Value;

use transfer_agent::mgmt::event::{
    coerce_value, denormalize, denormalize_key, normalize_key, restore_value, Event, EventType,
    BOOL_FIELDS, FIELD_VOCABULARY, INT_FIELDS,
};

// ── Event type discriminator ────────────────────────────────────────────────

/// Wire values parse to their discriminators and back.
#[test]
fn event_type_wire_round_trip() {
    for wire in [
        "INIT",
        "SESSION",
        "NOTIFICATION",
        "STATS",
        "STOP",
        "DONE",
        "ERROR",
        "FILEERROR",
        "ARGSTOP",
        "QUERY",
        "QUERYRESPONSE",
        "SKIP",
        "PUT",
        "WRITE",
    ] {
        let parsed = EventType::from_wire(wire).expect("known wire value must parse");
        assert_eq!(parsed.as_wire(), wire);
    }
}

/// Only `DONE` and `ERROR` end a supervised execution.
#[test]
fn only_done_and_error_are_terminal() {
    assert!(EventType::Done.is_terminal());
    assert!(EventType::Error.is_terminal());
    assert!(!EventType::Init.is_terminal());
    assert!(!EventType::Stats.is_terminal());
    assert!(!EventType::Stop.is_terminal());
}

/// An unknown wire value parses to nothing rather than erroring.
#[test]
fn unknown_event_type_is_none() {
    assert!(EventType::from_wire("DSSTATUS").is_none());
    let event = Event::from_fields([("Type".to_owned(), "DSSTATUS".to_owned())]);
    assert!(event.event_type().is_none());
}

// ── Key normalization ───────────────────────────────────────────────────────

/// Camel-case wire keys fold to lower_snake, acronyms included.
#[test]
fn normalize_key_handles_camel_and_acronyms() {
    assert_eq!(normalize_key("FileBytes"), "file_bytes");
    assert_eq!(normalize_key("PreTransferBytes"), "pre_transfer_bytes");
    assert_eq!(normalize_key("PMTU"), "pmtu");
    assert_eq!(normalize_key("SessionId"), "session_id");
    assert_eq!(normalize_key("FaspFileID"), "fasp_file_id");
    assert_eq!(normalize_key("Bytescont"), "bytescont");
    assert_eq!(normalize_key("QueryResponse"), "query_response");
}

/// Denormalization is the exact inverse over the whole vocabulary.
#[test]
fn denormalize_inverts_normalize_over_vocabulary() {
    for wire in FIELD_VOCABULARY {
        let normalized = normalize_key(wire);
        assert_eq!(
            denormalize_key(&normalized),
            *wire,
            "vocabulary key {wire} must survive the round trip"
        );
    }
}

/// Unknown normalized keys capitalize per segment.
#[test]
fn denormalize_unknown_key_capitalizes_segments() {
    assert_eq!(denormalize_key("type"), "Type");
    assert_eq!(denormalize_key("custom_field"), "CustomField");
}

// ── Value coercion ──────────────────────────────────────────────────────────

/// Integer fields coerce to numbers, booleans to `Yes`-is-true, and the
/// rest pass through as strings.
#[test]
fn coercion_is_total_over_known_fields() {
    assert_eq!(coerce_value("Rate", "10000"), Value::from(10_000_u64));
    assert_eq!(coerce_value("Elapsedusec", "1500000"), Value::from(1_500_000_u64));
    assert_eq!(coerce_value("Encryption", "Yes"), Value::Bool(true));
    assert_eq!(coerce_value("Encryption", "No"), Value::Bool(false));
    assert_eq!(
        coerce_value("File", "/data/a.bin"),
        Value::String("/data/a.bin".into())
    );
}

/// An unparsable integer value falls back to its string form.
#[test]
fn unparsable_integer_passes_through() {
    assert_eq!(coerce_value("Rate", "fast"), Value::String("fast".into()));
}

/// Fields outside the vocabulary pass through untouched.
#[test]
fn unknown_field_is_identity() {
    assert_eq!(
        coerce_value("TotallyNew", "42"),
        Value::String("42".into()),
        "coercion applies only to the known subsets"
    );
}

/// Restoration inverts coercion: decimal integers, Yes/No booleans.
#[test]
fn restore_value_inverts_coercion() {
    assert_eq!(restore_value(&Value::from(10_000_u64)), "10000");
    assert_eq!(restore_value(&Value::Bool(true)), "Yes");
    assert_eq!(restore_value(&Value::Bool(false)), "No");
    assert_eq!(restore_value(&Value::String("x".into())), "x");
}

/// The integer and boolean subsets are drawn from the vocabulary.
#[test]
fn coercion_subsets_are_known_fields() {
    for field in INT_FIELDS {
        assert!(
            FIELD_VOCABULARY.contains(field),
            "integer field {field} missing from the vocabulary"
        );
    }
    for field in BOOL_FIELDS {
        assert!(
            FIELD_VOCABULARY.contains(field),
            "boolean field {field} missing from the vocabulary"
        );
    }
}

// ── Enhanced view ───────────────────────────────────────────────────────────

/// The enhanced map renames and coerces, and denormalize restores the
/// original wire fields exactly.
#[test]
fn enhanced_view_round_trips() {
    let event = Event::from_fields([
        ("Type".to_owned(), "STATS".to_owned()),
        ("TransferBytes".to_owned(), "2048".to_owned()),
        ("RateLock".to_owned(), "Yes".to_owned()),
        ("File".to_owned(), "/data/b.bin".to_owned()),
    ]);

    let enhanced = event.enhanced();
    assert_eq!(enhanced.get("transfer_bytes"), Some(&Value::from(2048_u64)));
    assert_eq!(enhanced.get("rate_lock"), Some(&Value::Bool(true)));
    assert_eq!(
        enhanced.get("file"),
        Some(&Value::String("/data/b.bin".into()))
    );

    assert_eq!(denormalize(&enhanced), event.fields);
}

/// Typed accessors read the raw wire fields.
#[test]
fn typed_accessors() {
    let event = Event::from_fields([
        ("Type".to_owned(), "ERROR".to_owned()),
        ("SessionId".to_owned(), "7".to_owned()),
        ("Description".to_owned(), "Server aborted session".to_owned()),
        ("Code".to_owned(), "44".to_owned()),
    ]);

    assert_eq!(event.event_type(), Some(EventType::Error));
    assert_eq!(event.session_id(), Some("7"));
    assert_eq!(event.description(), "Server aborted session");
    assert_eq!(event.u64_field("Code"), Some(44));
    assert_eq!(event.u64_field("Missing"), None);
}
