//! Conversation context window.
//!
//! Keeps the most recent turns of the active session and renders them into
//! prompt text. Two limits apply: a turn-count window and a character
//! budget on the rendered output. Both drop whole turns oldest-first;
//! a turn is never rendered partially.

use std::collections::VecDeque;

use sahay_core::types::Turn;

/// Rolling window over the active session's turns.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    turns: VecDeque<Turn>,
    max_turns: usize,
    char_budget: usize,
}

impl ConversationContext {
    pub fn new(max_turns: usize, char_budget: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            max_turns,
            char_budget,
        }
    }

    /// Append a completed turn, evicting the oldest when the window is full.
    pub fn append(&mut self, turn: Turn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
    }

    /// Render the window into prompt text, newest turn last.
    ///
    /// Turns are dropped oldest-first until the rendered text fits the
    /// character budget.
    pub fn render(&self) -> String {
        let mut start = 0;
        loop {
            let rendered = self
                .turns
                .iter()
                .skip(start)
                .map(render_turn)
                .collect::<Vec<_>>()
                .join("\n\n");
            if rendered.chars().count() <= self.char_budget || start >= self.turns.len() {
                return rendered;
            }
            start += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }
}

fn render_turn(turn: &Turn) -> String {
    format!(
        "User: {}\nAssistant: {}",
        turn.user_text, turn.response_text
    )
}
