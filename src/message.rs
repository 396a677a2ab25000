use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid player number: {0}")]
    InvalidPlayer(u8),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// One of the two duel contestants. Serialized on the wire as the numbers
/// `1` and `2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Player {
    One,
    Two,
}

impl Player {
    pub fn other(self) -> Self {
        match self {
            Self::One => Self::Two,
            Self::Two => Self::One,
        }
    }
}

impl Default for Player {
    fn default() -> Self {
        Self::One
    }
}

impl From<Player> for u8 {
    fn from(player: Player) -> Self {
        match player {
            Player::One => 1,
            Player::Two => 2,
        }
    }
}

impl TryFrom<u8> for Player {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(ProtocolError::InvalidPlayer(other)),
        }
    }
}

impl Display for Player {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

/// The timer synchronization protocol. Commands travel Master to Audience,
/// broadcasts travel Audience to Master; exactly one side is the legitimate
/// sender of each tag. Times are non-negative seconds, timestamps are
/// wall-clock Unix milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TimerMessage {
    #[serde(rename = "TIMER_START", rename_all = "camelCase")]
    TimerStart {
        player1_time: f64,
        player2_time: f64,
        active_player: Player,
    },
    #[serde(rename = "TIMER_PAUSE")]
    TimerPause,
    #[serde(rename = "TIMER_RESUME", rename_all = "camelCase")]
    TimerResume { active_player: Player },
    #[serde(rename = "TIMER_SWITCH", rename_all = "camelCase")]
    TimerSwitch { active_player: Player },
    #[serde(rename = "SKIP_START", rename_all = "camelCase")]
    SkipStart { answer: String, active_player: Player },
    #[serde(rename = "DUEL_END")]
    DuelEnd,
    #[serde(rename = "MASTER_PING")]
    MasterPing,
    #[serde(rename = "TIMER_UPDATE", rename_all = "camelCase")]
    TimerUpdate {
        time1: f64,
        time2: f64,
        active_player: Player,
        timestamp: i64,
    },
    #[serde(rename = "SKIP_END", rename_all = "camelCase")]
    SkipEnd { switch_to_player: Player },
    #[serde(rename = "PLAYER_TIMEOUT")]
    PlayerTimeout { loser: Player },
    #[serde(rename = "AUDIENCE_HEARTBEAT")]
    AudienceHeartbeat,
}

impl TimerMessage {
    /// Master to Audience messages.
    pub fn is_command(&self) -> bool {
        matches!(
            self,
            Self::TimerStart { .. }
                | Self::TimerPause
                | Self::TimerResume { .. }
                | Self::TimerSwitch { .. }
                | Self::SkipStart { .. }
                | Self::DuelEnd
                | Self::MasterPing
        )
    }

    /// Audience to Master messages.
    pub fn is_broadcast(&self) -> bool {
        !self.is_command()
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a message from its JSON wire form. Callers bridging an external
    /// transport should log and drop failures rather than propagate them; a
    /// foreign or malformed payload is never fatal.
    pub fn decode(data: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(data)?)
    }
}

/// Current wall-clock time as Unix milliseconds.
pub(crate) fn unix_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_player_numbering() {
        assert_eq!(u8::from(Player::One), 1);
        assert_eq!(u8::from(Player::Two), 2);
        assert_eq!(Player::try_from(1).unwrap(), Player::One);
        assert_eq!(Player::try_from(2).unwrap(), Player::Two);
        assert!(matches!(
            Player::try_from(3),
            Err(ProtocolError::InvalidPlayer(3))
        ));
        assert_eq!(Player::One.other(), Player::Two);
        assert_eq!(Player::Two.other(), Player::One);
    }

    #[test]
    fn test_command_wire_shape() {
        let msg = TimerMessage::TimerStart {
            player1_time: 30.0,
            player2_time: 45.5,
            active_player: Player::One,
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "type": "TIMER_START",
                "player1Time": 30.0,
                "player2Time": 45.5,
                "activePlayer": 1,
            })
        );

        let msg = TimerMessage::SkipStart {
            answer: "Paris".to_string(),
            active_player: Player::Two,
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "type": "SKIP_START",
                "answer": "Paris",
                "activePlayer": 2,
            })
        );

        assert_eq!(
            serde_json::to_value(TimerMessage::TimerPause).unwrap(),
            json!({ "type": "TIMER_PAUSE" })
        );
    }

    #[test]
    fn test_broadcast_wire_shape() {
        let msg = TimerMessage::TimerUpdate {
            time1: 12.3,
            time2: 0.0,
            active_player: Player::Two,
            timestamp: 1_700_000_000_000,
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "type": "TIMER_UPDATE",
                "time1": 12.3,
                "time2": 0.0,
                "activePlayer": 2,
                "timestamp": 1_700_000_000_000_i64,
            })
        );

        assert_eq!(
            serde_json::to_value(TimerMessage::SkipEnd {
                switch_to_player: Player::One
            })
            .unwrap(),
            json!({ "type": "SKIP_END", "switchToPlayer": 1 })
        );

        assert_eq!(
            serde_json::to_value(TimerMessage::PlayerTimeout {
                loser: Player::Two
            })
            .unwrap(),
            json!({ "type": "PLAYER_TIMEOUT", "loser": 2 })
        );
    }

    #[test]
    fn test_decode_round_trip() {
        let messages = [
            TimerMessage::TimerResume {
                active_player: Player::Two,
            },
            TimerMessage::DuelEnd,
            TimerMessage::MasterPing,
            TimerMessage::AudienceHeartbeat,
        ];
        for msg in messages {
            let encoded = msg.encode().unwrap();
            assert_eq!(TimerMessage::decode(&encoded).unwrap(), msg);
        }
    }

    #[test]
    fn test_decode_rejects_foreign_payloads() {
        assert!(TimerMessage::decode(r#"{"type":"SCORE_UPDATE"}"#).is_err());
        assert!(TimerMessage::decode(r#"{"type":"TIMER_RESUME"}"#).is_err());
        assert!(
            TimerMessage::decode(r#"{"type":"TIMER_SWITCH","activePlayer":3}"#).is_err()
        );
        assert!(TimerMessage::decode("not json").is_err());
    }

    #[test]
    fn test_sender_classification() {
        assert!(
            TimerMessage::TimerStart {
                player1_time: 1.0,
                player2_time: 1.0,
                active_player: Player::One,
            }
            .is_command()
        );
        assert!(TimerMessage::MasterPing.is_command());
        assert!(TimerMessage::AudienceHeartbeat.is_broadcast());
        assert!(
            TimerMessage::PlayerTimeout {
                loser: Player::One
            }
            .is_broadcast()
        );
    }
}
