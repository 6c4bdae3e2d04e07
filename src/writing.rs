// src/writing.rs
use serde::Serialize;

use crate::gesture::GestureLabel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum WritingState {
    #[default]
    Idle,
    Writing,
}

/// Action requested of the stroke tracker on a stable gesture change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Command {
    StartStroke,
    EndStroke,
    AddSpace,
    ClearCanvas,
}

/// Pure transition table. Callers pass the label only when the stable
/// gesture changed, so a held gesture fires its action once.
pub fn transition(state: WritingState, label: GestureLabel) -> (WritingState, Option<Command>) {
    match (state, label) {
        (WritingState::Idle, GestureLabel::IndexUp) => {
            (WritingState::Writing, Some(Command::StartStroke))
        }
        (WritingState::Writing, GestureLabel::Fist) => {
            (WritingState::Idle, Some(Command::EndStroke))
        }
        (state, GestureLabel::TwoFingersUp) => (state, Some(Command::AddSpace)),
        (_, GestureLabel::Pinch) => (WritingState::Idle, Some(Command::ClearCanvas)),

        // Already writing, fist while idle, or a neutral pose.
        (state, _) => (state, None),
    }
}

#[derive(Debug, Clone, Default)]
pub struct WritingStateMachine {
    state: WritingState,
}

impl WritingStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> WritingState {
        self.state
    }

    pub fn is_writing(&self) -> bool {
        self.state == WritingState::Writing
    }

    pub fn on_stable_change(&mut self, label: GestureLabel) -> Option<Command> {
        let (next, command) = transition(self.state, label);
        self.state = next;
        command
    }

    /// Stops writing outside the gesture table (hand-dropout policy).
    pub fn force_idle(&mut self) {
        self.state = WritingState::Idle;
    }
}
