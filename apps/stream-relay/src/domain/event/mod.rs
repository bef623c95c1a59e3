//! Domain Events
//!
//! The closed set of typed events produced by interpreting upstream feed
//! frames. Every inbound frame maps to exactly one variant; frames that match
//! no known shape become [`DomainEvent::Passthrough`] so raw traffic stays
//! observable downstream instead of being silently dropped.

use serde::{Deserialize, Serialize};

/// Pocket color on the roulette wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    /// The zero pocket.
    Green,
    /// Red pockets.
    Red,
    /// Black pockets.
    Black,
}

impl Color {
    /// Get the color name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Red => "red",
            Self::Black => "black",
        }
    }
}

/// Red pockets on a European wheel.
const RED_NUMBERS: [u8; 18] = [
    1, 3, 5, 7, 9, 12, 14, 16, 18, 19, 21, 23, 25, 27, 30, 32, 34, 36,
];

/// Map a winning number (0..=36) to its pocket color.
///
/// `0` is green; numbers outside the red set are black.
#[must_use]
pub const fn color_of(number: u8) -> Color {
    if number == 0 {
        return Color::Green;
    }
    let mut i = 0;
    while i < RED_NUMBERS.len() {
        if RED_NUMBERS[i] == number {
            return Color::Red;
        }
        i += 1;
    }
    Color::Black
}

/// One settled game from the provider's statistic history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Provider-assigned game identifier.
    pub game_id: String,
    /// Winning number.
    pub number: u8,
    /// Pocket color of the winning number.
    pub color: Color,
}

impl HistoryEntry {
    /// Create an entry, deriving the color from the number.
    #[must_use]
    pub fn new(game_id: impl Into<String>, number: u8) -> Self {
        Self {
            game_id: game_id.into(),
            number,
            color: color_of(number),
        }
    }
}

/// Typed event relayed to the downstream client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A new game round opened for bets.
    GameStarted {
        /// Provider-assigned game identifier.
        game_id: String,
    },
    /// Countdown until bets close.
    Timer {
        /// Seconds remaining in the betting window.
        seconds_left: u32,
    },
    /// The betting window is closing.
    BetsClosing,
    /// A game round settled.
    GameResult {
        /// Provider-assigned game identifier.
        game_id: String,
        /// Winning number.
        number: u8,
        /// Pocket color of the winning number.
        color: Color,
    },
    /// Dealer change or announcement.
    DealerInfo {
        /// Dealer display name.
        name: String,
    },
    /// Snapshot of recent settled games, most recent first.
    HistorySnapshot {
        /// Settled games.
        results: Vec<HistoryEntry>,
    },
    /// Frame that matched no known shape, forwarded verbatim.
    Passthrough {
        /// The raw frame text.
        raw: String,
    },
}
