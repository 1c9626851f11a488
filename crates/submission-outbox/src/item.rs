//! Submission item model.

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Base64 engine used for persisted payloads.
const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// Unique identifier for a submission (UUID string).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(pub String);

impl SubmissionId {
    /// Creates a new random submission ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the submission ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SubmissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SubmissionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SubmissionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Delivery state of a submission.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    /// Waiting for a dispatch cycle.
    Pending,
    /// Claimed by the dispatcher, send attempt outstanding.
    InFlight,
    /// Delivered. Terminal.
    Succeeded,
    /// Rejected or out of attempts. Terminal until a manual retry.
    Failed,
}

impl SubmissionState {
    /// Returns the string representation used in logs and the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionState::Pending => "pending",
            SubmissionState::InFlight => "in_flight",
            SubmissionState::Succeeded => "succeeded",
            SubmissionState::Failed => "failed",
        }
    }

    /// Parses a state from a string, accepting a few common spellings.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Some(SubmissionState::Pending),
            "in_flight" | "inflight" | "in-flight" | "uploading" => Some(SubmissionState::InFlight),
            "succeeded" | "success" => Some(SubmissionState::Succeeded),
            "failed" => Some(SubmissionState::Failed),
            _ => None,
        }
    }

    /// Whether no automatic transition leaves this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionState::Succeeded | SubmissionState::Failed)
    }

    /// Whether the dispatcher lifecycle allows moving to `next`.
    ///
    /// Failed -> Pending is not included; it only happens through
    /// `QueueStore::retry`.
    pub fn can_transition_to(&self, next: SubmissionState) -> bool {
        use SubmissionState::*;
        matches!(
            (self, next),
            (Pending, InFlight) | (InFlight, Succeeded) | (InFlight, Pending) | (InFlight, Failed)
        )
    }
}

impl std::fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque payload bytes. Persisted as base64.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Payload(Vec<u8>);

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map(Payload)
            .map_err(serde::de::Error::custom)
    }
}

/// One record awaiting delivery to the collection service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubmissionItem {
    pub id: SubmissionId,
    /// Category tag, e.g. `match-record` or `pit-record`.
    pub kind: String,
    pub payload: Payload,
    pub state: SubmissionState,
    /// Completed send attempts.
    pub attempts: u32,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Earliest time the dispatcher may claim the item again.
    pub next_eligible_at: DateTime<Utc>,
}

impl SubmissionItem {
    /// Creates a new pending item, eligible immediately.
    pub fn new(kind: impl Into<String>, payload: impl Into<Payload>, now: DateTime<Utc>) -> Self {
        Self {
            id: SubmissionId::new(),
            kind: kind.into(),
            payload: payload.into(),
            state: SubmissionState::Pending,
            attempts: 0,
            last_error: None,
            enqueued_at: now,
            last_attempt_at: None,
            next_eligible_at: now,
        }
    }

    /// Whether a dispatch cycle running at `now` may claim this item.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.state == SubmissionState::Pending && self.next_eligible_at <= now
    }

    /// Time used for retention decisions on terminal items.
    pub fn settled_at(&self) -> DateTime<Utc> {
        self.last_attempt_at.unwrap_or(self.enqueued_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_item_is_pending_and_eligible() {
        let now = Utc::now();
        let item = SubmissionItem::new("match-record", "team 254", now);

        assert_eq!(item.state, SubmissionState::Pending);
        assert_eq!(item.attempts, 0);
        assert!(item.is_eligible(now));
        assert!(!item.is_eligible(now - chrono::Duration::seconds(1)));
        assert_eq!(item.settled_at(), now);
    }

    #[test]
    fn ids_are_unique() {
        let now = Utc::now();
        let a = SubmissionItem::new("pit-record", "", now);
        let b = SubmissionItem::new("pit-record", "", now);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn allowed_transitions() {
        use SubmissionState::*;

        assert!(Pending.can_transition_to(InFlight));
        assert!(InFlight.can_transition_to(Succeeded));
        assert!(InFlight.can_transition_to(Pending));
        assert!(InFlight.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Succeeded));
        assert!(!Pending.can_transition_to(Failed));
        assert!(!Succeeded.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Pending));
        assert!(!InFlight.can_transition_to(InFlight));
    }

    #[test]
    fn state_parse_and_display() {
        for state in [
            SubmissionState::Pending,
            SubmissionState::InFlight,
            SubmissionState::Succeeded,
            SubmissionState::Failed,
        ] {
            assert_eq!(SubmissionState::parse(state.as_str()), Some(state));
        }
        assert_eq!(SubmissionState::parse("Uploading"), Some(SubmissionState::InFlight));
        assert_eq!(SubmissionState::parse("lost"), None);
    }

    #[test]
    fn payload_is_persisted_as_base64() {
        let item = SubmissionItem::new("match-record", vec![0u8, 255, 10], Utc::now());
        let json = serde_json::to_value(&item).unwrap();

        assert_eq!(json["payload"], "AP8K");
        assert_eq!(json["state"], "pending");

        let restored: SubmissionItem = serde_json::from_value(json).unwrap();
        assert_eq!(restored, item);
    }

    #[test]
    fn payload_rejects_invalid_base64() {
        let result: Result<Payload, _> = serde_json::from_str("\"not base64!\"");
        assert!(result.is_err());
    }
}
