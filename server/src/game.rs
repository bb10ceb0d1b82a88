use crate::coordinator::SessionConfig;
use crate::error::SessionError;
use crate::registry::ConnectionId;
use crate::vocabulary::Vocabulary;
use log::info;
use rand::Rng;
use shared::REVEAL_PLACEHOLDER;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Waiting,
    InProgress,
    Won,
    Lost,
}

/// What an accepted guess did to the round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuessOutcome {
    Hit {
        letter: char,
        mask: String,
        solved: bool,
    },
    Miss {
        letter: char,
        attempts_left: u32,
        exhausted: bool,
    },
}

impl GuessOutcome {
    pub fn ends_round(&self) -> bool {
        matches!(
            self,
            GuessOutcome::Hit { solved: true, .. } | GuessOutcome::Miss { exhausted: true, .. }
        )
    }
}

/// One round of hangman.
///
/// The session only knows roster positions; the coordinator passes the
/// current roster in whenever a guess has to be matched to a player.
#[derive(Debug, Clone)]
pub struct GameSession {
    secret_word: Vec<char>,
    reveal: Vec<char>,
    attempts_remaining: u32,
    used_letters: BTreeSet<char>,
    turn_index: usize,
    theme: String,
    status: SessionStatus,
}

impl GameSession {
    pub fn new(theme: &str, word: &str, attempts: u32) -> Self {
        let secret_word: Vec<char> = word.chars().map(fold_case).collect();
        Self {
            reveal: vec![REVEAL_PLACEHOLDER; secret_word.len()],
            secret_word,
            attempts_remaining: attempts,
            used_letters: BTreeSet::new(),
            turn_index: 0,
            theme: theme.to_string(),
            status: SessionStatus::InProgress,
        }
    }

    /// Opens a round with a random word, first turn to roster position 0.
    pub fn start<R: Rng>(
        roster_len: usize,
        vocabulary: &Vocabulary,
        rng: &mut R,
        config: &SessionConfig,
    ) -> Result<Self, SessionError> {
        if roster_len < config.min_players {
            return Err(SessionError::InsufficientPlayers {
                required: config.min_players,
                present: roster_len,
            });
        }

        let (theme, word) = vocabulary.choose(rng);
        info!(
            "Round started with {} players, theme {}, word {}",
            roster_len, theme, word
        );
        Ok(Self::new(theme, word, config.max_attempts))
    }

    /// Applies a guess from `player`.
    ///
    /// Rejections leave the session untouched. A repeated letter is only
    /// detected for the player whose turn it is, so it never costs a turn.
    pub fn guess(
        &mut self,
        roster: &[ConnectionId],
        player: ConnectionId,
        letter: char,
    ) -> Result<GuessOutcome, SessionError> {
        if self.status != SessionStatus::InProgress {
            return Err(SessionError::NoRoundInProgress);
        }
        if roster.get(self.turn_index) != Some(&player) {
            return Err(SessionError::NotYourTurn);
        }

        let letter = fold_case(letter);
        if !self.used_letters.insert(letter) {
            return Err(SessionError::RepeatedLetter(letter));
        }

        if self.secret_word.contains(&letter) {
            for (slot, actual) in self.reveal.iter_mut().zip(&self.secret_word) {
                if *actual == letter {
                    *slot = letter;
                }
            }
            let solved = self.reveal == self.secret_word;
            if solved {
                self.status = SessionStatus::Won;
            }
            Ok(GuessOutcome::Hit {
                letter,
                mask: self.mask(),
                solved,
            })
        } else {
            self.attempts_remaining = self.attempts_remaining.saturating_sub(1);
            let exhausted = self.attempts_remaining == 0;
            if exhausted {
                self.status = SessionStatus::Lost;
            }
            Ok(GuessOutcome::Miss {
                letter,
                attempts_left: self.attempts_remaining,
                exhausted,
            })
        }
    }

    /// Passes the turn to the next roster position and returns it.
    pub fn advance_turn(&mut self, roster_len: usize) -> usize {
        self.turn_index = (self.turn_index + 1) % roster_len.max(1);
        self.turn_index
    }

    /// Keeps the turn pointer on the right player after a roster removal.
    ///
    /// Returns true when the removed player held the turn, in which case the
    /// player who slid into that position (wrapping to the front) has it now.
    pub fn player_left(&mut self, roster_index: usize, remaining: usize) -> bool {
        if self.status != SessionStatus::InProgress {
            return false;
        }
        if roster_index < self.turn_index {
            self.turn_index -= 1;
            false
        } else if roster_index == self.turn_index {
            self.turn_index %= remaining.max(1);
            true
        } else {
            false
        }
    }

    pub fn mask(&self) -> String {
        self.reveal.iter().collect()
    }

    pub fn secret_word(&self) -> String {
        self.secret_word.iter().collect()
    }

    pub fn word_len(&self) -> usize {
        self.secret_word.len()
    }

    pub fn theme(&self) -> &str {
        &self.theme
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.attempts_remaining
    }

    pub fn used_letters(&self) -> &BTreeSet<char> {
        &self.used_letters
    }

    pub fn turn_index(&self) -> usize {
        self.turn_index
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == SessionStatus::InProgress
    }
}

/// Validates the raw text of a `GUESS` line.
pub fn parse_guess(raw: &str) -> Result<char, SessionError> {
    let mut chars = raw.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(letter), None) if letter.is_alphabetic() => Ok(fold_case(letter)),
        _ => Err(SessionError::InvalidLetter),
    }
}

fn fold_case(letter: char) -> char {
    letter.to_lowercase().next().unwrap_or(letter)
}
