// match of tournament

use chrono::{DateTime, Utc};
use displaydoc::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// state machine of a single match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum MatchState {
    /// pending
    #[default]
    Pending,
    /// open
    Open,
    /// underway
    Underway,
    /// complete
    Complete,
}

impl FromStr for MatchState {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MatchState::Pending),
            "open" => Ok(MatchState::Open),
            "underway" => Ok(MatchState::Underway),
            "complete" => Ok(MatchState::Complete),
            other => Err(format!("unknown match state: {other}")),
        }
    }
}

/// match of tournament, an edge in the bracket DAG
///
/// `round` is positive for winners-bracket/linear rounds and negative for
/// losers-bracket rounds of a double elimination. Prerequisite links point at
/// the matches whose outcome fills the respective player slot; the loser
/// flags select the loser instead of the winner of the prerequisite.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    /// id of match
    pub id: Uuid,
    /// id of owning tournament
    pub tournament_id: Uuid,
    /// owning tenant
    pub user_id: i64,
    /// human identifier ("A", "B", ..., "AA", ...)
    pub identifier: String,
    /// round number; negative in the losers bracket
    pub round: i32,
    /// stable per-tournament play order, round-major
    pub suggested_play_order: u32,
    /// position within the round, counted from 0
    pub bracket_position: u32,
    /// true for losers-bracket matches
    pub losers_bracket: bool,
    pub player1_id: Option<Uuid>,
    pub player2_id: Option<Uuid>,
    pub player1_prereq_match_id: Option<Uuid>,
    pub player2_prereq_match_id: Option<Uuid>,
    /// slot 1 takes the loser of its prerequisite
    pub player1_is_prereq_loser: bool,
    /// slot 2 takes the loser of its prerequisite
    pub player2_is_prereq_loser: bool,
    pub winner_id: Option<Uuid>,
    pub loser_id: Option<Uuid>,
    pub player1_score: i32,
    pub player2_score: i32,
    /// display string, e.g. "2-1"
    pub score_text: Option<String>,
    pub forfeited: bool,
    pub forfeited_participant_id: Option<Uuid>,
    pub station_id: Option<Uuid>,
    pub underway_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub state: MatchState,
    /// auto-completed match with at most one real participant
    pub is_bye: bool,
}

impl Match {
    /// Both player slots filled.
    pub fn is_fully_seated(&self) -> bool {
        self.player1_id.is_some() && self.player2_id.is_some()
    }

    /// A match can take a result while open or underway.
    pub fn is_scorable(&self) -> bool {
        matches!(self.state, MatchState::Open | MatchState::Underway)
    }

    pub fn has_participant(&self, id: Uuid) -> bool {
        self.player1_id == Some(id) || self.player2_id == Some(id)
    }

    pub fn opponent_of(&self, id: Uuid) -> Option<Uuid> {
        if self.player1_id == Some(id) {
            self.player2_id
        } else if self.player2_id == Some(id) {
            self.player1_id
        } else {
            None
        }
    }

    /// True if `other` feeds one of this match's player slots.
    pub fn depends_on(&self, other: Uuid) -> bool {
        self.player1_prereq_match_id == Some(other) || self.player2_prereq_match_id == Some(other)
    }

    /// A grand-final reset takes winner and loser of the same match.
    pub fn is_reset_of(&self, other: Uuid) -> bool {
        self.player1_prereq_match_id == Some(other)
            && self.player2_prereq_match_id == Some(other)
            && self.player1_is_prereq_loser != self.player2_is_prereq_loser
    }

    /// Formats the display score, e.g. "2-1".
    pub fn format_score(player1_score: i32, player2_score: i32) -> String {
        format!("{player1_score}-{player2_score}")
    }
}

/// Alphabetic match identifier in generation order: "A".."Z", "AA", "AB", ...
pub fn match_identifier(index: usize) -> String {
    let mut n = index + 1;
    let mut out = Vec::new();
    while n > 0 {
        n -= 1;
        out.push(b'A' + (n % 26) as u8);
        n /= 26;
    }
    out.reverse();
    String::from_utf8(out).expect("ascii identifier")
}

/// Display label of a winners-bracket round.
pub fn round_label(round: i32, max_round: i32) -> String {
    match max_round - round {
        0 => "Finals".to_string(),
        1 => "Semifinals".to_string(),
        2 => "Quarterfinals".to_string(),
        _ => format!("Round {round}"),
    }
}
