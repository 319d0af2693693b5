//! Wire contract of the authoritative backend.
//!
//! Both transports (websocket push and HTTP fetch/roll responses)
//! carry the same JSON state payload. Every field is optional and
//! default-tolerant: a partial payload degrades, it never fails
//! deserialization.

use serde::{Deserialize, Serialize};

/// Match lifecycle status as reported by the backend.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Waiting,
    Active,
    Finished,
    #[serde(other)]
    Unknown,
}

/// Authoritative match state as pushed or fetched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatePayload {
    /// Box index per seat. Absent in partial pushes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positions: Option<Vec<u8>>,

    /// Die value of the most recent roll.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_roll: Option<u8>,

    /// Roll responses carry the die value under this name instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll: Option<u8>,

    /// Seat that performed the most recent action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<u8>,

    /// Seat whose turn it is now.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<u8>,

    /// True when the most recent action was a spawn onto box 0.
    #[serde(default)]
    pub spawn: bool,

    /// Seat that just forfeited, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forfeit_actor: Option<u8>,

    #[serde(default)]
    pub finished: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MatchStatus>,

    /// Account ids per seat; ids may arrive as numbers or strings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_ids: Option<Vec<serde_json::Value>>,

    /// The requester's own seat, present only on direct responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_index: Option<u8>,

    /// Forfeit responses: true when remaining seats keep playing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuing: Option<bool>,
}

impl StatePayload {
    /// Terminal either by explicit flag or by status.
    pub fn is_finished(&self) -> bool {
        self.finished || self.status == Some(MatchStatus::Finished)
    }

    /// Die value regardless of which field name carried it.
    pub fn roll_value(&self) -> Option<u8> {
        self.last_roll.or(self.roll)
    }

    /// Seat index of `player_id` within this payload's seat order,
    /// comparing stringified ids (the backend is loose about types).
    pub fn seat_of_player(&self, player_id: &str) -> Option<u8> {
        let ids = self.player_ids.as_ref()?;
        ids.iter().position(|id| match id {
            serde_json::Value::Null => false,
            serde_json::Value::String(s) => s == player_id,
            other => other.to_string() == player_id,
        }).map(|i| i as u8)
    }
}

/// Response of the create-match endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCreated {
    pub match_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_index: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_players: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_payload_deserializes_with_defaults() {
        let payload: StatePayload = serde_json::from_str(r#"{"turn": 1}"#).unwrap();
        assert_eq!(payload.turn, Some(1));
        assert!(payload.positions.is_none());
        assert!(!payload.spawn);
        assert!(!payload.is_finished());
    }

    #[test]
    fn finished_by_flag_or_status() {
        let by_flag: StatePayload =
            serde_json::from_str(r#"{"finished": true}"#).unwrap();
        assert!(by_flag.is_finished());

        let by_status: StatePayload =
            serde_json::from_str(r#"{"status": "FINISHED"}"#).unwrap();
        assert!(by_status.is_finished());

        let unknown: StatePayload =
            serde_json::from_str(r#"{"status": "SOMETHING_NEW"}"#).unwrap();
        assert_eq!(unknown.status, Some(MatchStatus::Unknown));
        assert!(!unknown.is_finished());
    }

    #[test]
    fn seat_lookup_tolerates_numeric_ids() {
        let payload: StatePayload =
            serde_json::from_str(r#"{"player_ids": [17, "abc", null]}"#).unwrap();
        assert_eq!(payload.seat_of_player("17"), Some(0));
        assert_eq!(payload.seat_of_player("abc"), Some(1));
        assert_eq!(payload.seat_of_player("zz"), None);
    }

    #[test]
    fn roll_value_prefers_last_roll() {
        let payload = StatePayload {
            last_roll: Some(3),
            roll: Some(5),
            ..StatePayload::default()
        };
        assert_eq!(payload.roll_value(), Some(3));
        let payload = StatePayload {
            roll: Some(5),
            ..StatePayload::default()
        };
        assert_eq!(payload.roll_value(), Some(5));
    }
}
