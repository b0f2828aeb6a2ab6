//! Decoded management events and the enhanced field translation.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::OnceLock;

use serde_json::{Map, Value};

/// Event type discriminator carried in the `Type` field of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Worker connected and announced its session.
    Init,
    /// Session parameters negotiated with the peer.
    Session,
    /// Out-of-band notice, e.g. the pre-transfer byte count.
    Notification,
    /// Periodic progress statistics.
    Stats,
    /// Transfer of one file stopped.
    Stop,
    /// Session finished successfully. Terminal.
    Done,
    /// Session failed. Terminal.
    Error,
    /// A single file failed without ending the session.
    FileError,
    /// One command-line source argument fully processed.
    ArgStop,
    /// Worker queries the manager.
    Query,
    /// Manager answers a query.
    QueryResponse,
    /// File skipped by policy.
    Skip,
    /// File creation announced by the receiver.
    Put,
    /// Write of received data acknowledged.
    Write,
}

impl EventType {
    /// Parse the wire value of the `Type` field.
    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        Some(match value {
            "INIT" => Self::Init,
            "SESSION" => Self::Session,
            "NOTIFICATION" => Self::Notification,
            "STATS" => Self::Stats,
            "STOP" => Self::Stop,
            "DONE" => Self::Done,
            "ERROR" => Self::Error,
            "FILEERROR" => Self::FileError,
            "ARGSTOP" => Self::ArgStop,
            "QUERY" => Self::Query,
            "QUERYRESPONSE" => Self::QueryResponse,
            "SKIP" => Self::Skip,
            "PUT" => Self::Put,
            "WRITE" => Self::Write,
            _ => return None,
        })
    }

    /// Wire value of the `Type` field.
    #[must_use]
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Session => "SESSION",
            Self::Notification => "NOTIFICATION",
            Self::Stats => "STATS",
            Self::Stop => "STOP",
            Self::Done => "DONE",
            Self::Error => "ERROR",
            Self::FileError => "FILEERROR",
            Self::ArgStop => "ARGSTOP",
            Self::Query => "QUERY",
            Self::QueryResponse => "QUERYRESPONSE",
            Self::Skip => "SKIP",
            Self::Put => "PUT",
            Self::Write => "WRITE",
        }
    }

    /// Whether this event ends a supervised execution.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// One decoded management frame: a flat field map with typed accessors.
///
/// Events are ephemeral: produced by the codec, consumed by the supervisor
/// and notifier, then discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    /// Raw wire fields, last write wins on duplicates.
    pub fields: BTreeMap<String, String>,
}

impl Event {
    /// Build an event from wire field pairs.
    #[must_use]
    pub fn from_fields<I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    /// Raw value of a wire field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Discriminator parsed from the `Type` field.
    #[must_use]
    pub fn event_type(&self) -> Option<EventType> {
        self.get("Type").and_then(EventType::from_wire)
    }

    /// A wire field parsed as an unsigned integer.
    #[must_use]
    pub fn u64_field(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|value| value.parse().ok())
    }

    /// Human-readable description, present on `ERROR` and `NOTIFICATION`.
    #[must_use]
    pub fn description(&self) -> &str {
        self.get("Description").unwrap_or_default()
    }

    /// Worker-assigned session id, present from `INIT` onward.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.get("SessionId")
    }

    /// Enhanced view: keys renamed to lower_snake form, the known integer
    /// and boolean subsets coerced, unknown fields passed through verbatim.
    #[must_use]
    pub fn enhanced(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|(key, value)| (normalize_key(key), coerce_value(key, value)))
            .collect()
    }
}

/// Fixed field vocabulary of the management protocol, as written on the wire.
///
/// The worker only ever emits keys from this set; unknown keys still decode
/// and pass through the enhanced translation untouched.
pub const FIELD_VOCABULARY: &[&str] = &[
    // Session identity and endpoints
    "Type",
    "SessionId",
    "User",
    "UserStr",
    "ClientUser",
    "Host",
    "Port",
    "RemoteAddress",
    "RemotePort",
    "ClusterNodeId",
    "ServerNodeId",
    "Direction",
    "Operation",
    "Transport",
    "ServiceLevel",
    "PeerPathSeparator",
    "SourcePrefix",
    "Tags",
    "Token",
    "Cookie",
    "XferId",
    "XferRetry",
    "Query",
    "QueryResponse",
    // Rate and policy
    "Rate",
    "MinRate",
    "TargetRate",
    "RateLock",
    "MinRateLock",
    "PolicyLock",
    "Policy",
    "Adaptive",
    "Priority",
    "Cipher",
    "Encryption",
    "DatagramSize",
    "ChunkSize",
    "PMTU",
    "Delay",
    "Loss",
    // File and progress
    "File",
    "Source",
    "Destination",
    "Size",
    "StartByte",
    "EndByte",
    "FileBytes",
    "TransferBytes",
    "PreTransferBytes",
    "Bytescont",
    "BytesLost",
    "BytesReceived",
    "BytesWritten",
    "Progress",
    "Remaining",
    "Elapsedusec",
    "FileCount",
    "FilesComplete",
    "FilesFailed",
    "FilesSkipped",
    // Pre-transfer scan counters
    "PreTransferFiles",
    "PreTransferDirs",
    "PreTransferSpecial",
    "PreTransferFailed",
    "ArgScansAttempted",
    "ArgScansCompleted",
    "PathScansAttempted",
    "PathScansFailed",
    "PathScansIrregular",
    "PathScansExcluded",
    "DirScansCompleted",
    "FileScansCompleted",
    "TransfersAttempted",
    "TransfersFailed",
    "TransfersPassed",
    "TransfersSkipped",
    "FaspFileArgIndex",
    "FaspFileID",
    // Errors and manifests
    "Code",
    "Description",
    "Severity",
    "ManifestFile",
    "RetransmitRequests",
];

/// Wire fields coerced to integers by the enhanced translation: byte
/// counters, rates, microsecond clocks, ports, and scan counters.
pub const INT_FIELDS: &[&str] = &[
    "ArgScansAttempted",
    "ArgScansCompleted",
    "Bytescont",
    "BytesLost",
    "BytesReceived",
    "BytesWritten",
    "ChunkSize",
    "Code",
    "DatagramSize",
    "Delay",
    "DirScansCompleted",
    "Elapsedusec",
    "EndByte",
    "FaspFileArgIndex",
    "FileBytes",
    "FileCount",
    "FileScansCompleted",
    "FilesComplete",
    "FilesFailed",
    "FilesSkipped",
    "Loss",
    "MinRate",
    "PMTU",
    "PathScansAttempted",
    "PathScansExcluded",
    "PathScansFailed",
    "PathScansIrregular",
    "Port",
    "PreTransferBytes",
    "PreTransferDirs",
    "PreTransferFailed",
    "PreTransferFiles",
    "PreTransferSpecial",
    "Priority",
    "Progress",
    "Rate",
    "Remaining",
    "RemotePort",
    "RetransmitRequests",
    "Size",
    "StartByte",
    "TargetRate",
    "TransferBytes",
    "TransfersAttempted",
    "TransfersFailed",
    "TransfersPassed",
    "TransfersSkipped",
    "XferRetry",
];

/// Wire fields coerced to booleans: the literal `Yes` is true, anything
/// else is false.
pub const BOOL_FIELDS: &[&str] = &[
    "Adaptive",
    "Encryption",
    "MinRateLock",
    "PolicyLock",
    "RateLock",
];

/// Rename a wire field to its lower_snake form.
///
/// Mechanical camel-to-snake with acronym folding: `FileBytes` →
/// `file_bytes`, `PMTU` → `pmtu`, `FaspFileID` → `fasp_file_id`.
#[must_use]
pub fn normalize_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev_lower = chars[i - 1].is_ascii_lowercase() || chars[i - 1].is_ascii_digit();
            let acronym_end = chars[i - 1].is_ascii_uppercase()
                && chars.get(i + 1).is_some_and(|next| next.is_ascii_lowercase());
            if prev_lower || acronym_end {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}

/// Exact inverse of [`normalize_key`] over the known vocabulary.
///
/// Unknown keys fall back to capitalizing each underscore-separated segment,
/// which is the shape the worker accepts for command fields.
#[must_use]
pub fn denormalize_key(key: &str) -> String {
    static REVERSE: OnceLock<HashMap<String, &'static str>> = OnceLock::new();
    let reverse = REVERSE.get_or_init(|| {
        FIELD_VOCABULARY
            .iter()
            .map(|wire| (normalize_key(wire), *wire))
            .collect()
    });

    if let Some(wire) = reverse.get(key) {
        return (*wire).to_owned();
    }

    key.split('_')
        .map(|segment| {
            let mut chars = segment.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_ascii_uppercase().to_string() + chars.as_str()
            })
        })
        .collect()
}

/// Coerce a wire value according to the field's known type.
///
/// Total over the known set; an unparsable value or an unknown field passes
/// through as a string.
#[must_use]
pub fn coerce_value(key: &str, value: &str) -> Value {
    if INT_FIELDS.contains(&key) {
        if let Ok(number) = value.parse::<u64>() {
            return Value::from(number);
        }
    } else if BOOL_FIELDS.contains(&key) {
        return Value::Bool(value == "Yes");
    }
    Value::String(value.to_owned())
}

/// Restore a coerced value to its wire string form.
///
/// Inverse of [`coerce_value`]: integers render in decimal, booleans as
/// `Yes`/`No`, strings pass through.
#[must_use]
pub fn restore_value(value: &Value) -> String {
    match value {
        Value::Bool(true) => "Yes".to_owned(),
        Value::Bool(false) => "No".to_owned(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Convert an enhanced field map back into wire field pairs.
///
/// Inverse of [`Event::enhanced`] modulo the documented coercions.
#[must_use]
pub fn denormalize(fields: &Map<String, Value>) -> BTreeMap<String, String> {
    fields
        .iter()
        .map(|(key, value)| (denormalize_key(key), restore_value(value)))
        .collect()
}
