//! Serial line state machine
//!
//! Tracks the console line accumulator: bytes are collected until a line
//! terminator, the line is dispatched, and the buffer is reset before the
//! next line starts. A line that outgrows the buffer is discarded up to
//! its terminator so its tail is never taken as a fresh command.

use log::debug;

/// Line accumulator states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineState {
    /// Collecting characters of the current line
    Accumulating,
    /// A complete line is ready to be parsed and applied
    Dispatch,
    /// The line buffer is being cleared
    Reset,
    /// Dropping the rest of an over-long line
    Discarding,
}

/// Input events seen by the accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEvent {
    /// A byte to keep in the line
    Byte,
    /// `\r` or `\n`
    Terminator,
    /// The line buffer rejected a byte
    Overflow,
    /// The dispatched line has been handled, successfully or not
    Dispatched,
}

/// State transition result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTransition {
    /// Keep the current state
    Stay,
    /// Move to a new state
    Transition(LineState),
}

/// Line accumulator state machine
#[derive(Debug)]
pub struct LineStateMachine {
    current_state: LineState,
    previous_state: Option<LineState>,
    lines_dispatched: u32,
    lines_discarded: u32,
}

impl LineStateMachine {
    pub fn new() -> Self {
        Self {
            current_state: LineState::Accumulating,
            previous_state: None,
            lines_dispatched: 0,
            lines_discarded: 0,
        }
    }

    pub fn get_current_state(&self) -> LineState {
        self.current_state
    }

    pub fn get_previous_state(&self) -> Option<LineState> {
        self.previous_state
    }

    pub fn lines_dispatched(&self) -> u32 {
        self.lines_dispatched
    }

    pub fn lines_discarded(&self) -> u32 {
        self.lines_discarded
    }

    /// Feed one event, returning what happened to the state
    pub fn handle_event(&mut self, event: LineEvent) -> StateTransition {
        let transition = Self::get_state_transition(self.current_state, event);

        if let StateTransition::Transition(new_state) = transition {
            match (self.current_state, new_state) {
                (LineState::Accumulating, LineState::Dispatch) => self.lines_dispatched += 1,
                (LineState::Discarding, LineState::Reset) => self.lines_discarded += 1,
                _ => {}
            }
            debug!("[SERIAL] {:?} -> {:?} on {:?}", self.current_state, new_state, event);
            self.previous_state = Some(self.current_state);
            self.current_state = new_state;
        }

        transition
    }

    fn get_state_transition(current_state: LineState, event: LineEvent) -> StateTransition {
        match (current_state, event) {
            (LineState::Accumulating, LineEvent::Byte) => StateTransition::Stay,
            (LineState::Accumulating, LineEvent::Terminator) => {
                StateTransition::Transition(LineState::Dispatch)
            }
            (LineState::Accumulating, LineEvent::Overflow) => {
                StateTransition::Transition(LineState::Discarding)
            }

            // a dispatched line always resets, whatever its outcome
            (LineState::Dispatch, LineEvent::Dispatched) => {
                StateTransition::Transition(LineState::Reset)
            }

            // the buffer is already clear; the next byte starts a new line
            (LineState::Reset, LineEvent::Byte) => {
                StateTransition::Transition(LineState::Accumulating)
            }

            (LineState::Discarding, LineEvent::Terminator) => {
                StateTransition::Transition(LineState::Reset)
            }
            (LineState::Discarding, _) => StateTransition::Stay,

            _ => StateTransition::Stay,
        }
    }

    /// Whether incoming bytes should be stored in the line buffer
    pub fn is_accepting(&self) -> bool {
        matches!(self.current_state, LineState::Accumulating | LineState::Reset)
    }
}

impl Default for LineStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_cycle() {
        let mut sm = LineStateMachine::new();
        assert_eq!(sm.get_current_state(), LineState::Accumulating);

        assert_eq!(sm.handle_event(LineEvent::Byte), StateTransition::Stay);
        assert_eq!(
            sm.handle_event(LineEvent::Terminator),
            StateTransition::Transition(LineState::Dispatch)
        );
        assert!(!sm.is_accepting());
        sm.handle_event(LineEvent::Dispatched);
        assert_eq!(sm.get_current_state(), LineState::Reset);
        assert_eq!(sm.get_previous_state(), Some(LineState::Dispatch));
        assert_eq!(sm.handle_event(LineEvent::Terminator), StateTransition::Stay);
        sm.handle_event(LineEvent::Byte);
        assert_eq!(sm.get_current_state(), LineState::Accumulating);
        assert_eq!(sm.lines_dispatched(), 1);
    }

    #[test]
    fn overflow_discards_until_terminator() {
        let mut sm = LineStateMachine::new();
        sm.handle_event(LineEvent::Overflow);
        assert_eq!(sm.get_current_state(), LineState::Discarding);
        assert_eq!(sm.handle_event(LineEvent::Byte), StateTransition::Stay);
        assert_eq!(sm.handle_event(LineEvent::Overflow), StateTransition::Stay);
        sm.handle_event(LineEvent::Terminator);
        assert_eq!(sm.get_current_state(), LineState::Reset);
        assert!(sm.is_accepting());
        assert_eq!(sm.lines_dispatched(), 0);
        assert_eq!(sm.lines_discarded(), 1);
    }

    #[test]
    fn dispatch_ignores_input_until_handled() {
        let mut sm = LineStateMachine::new();
        sm.handle_event(LineEvent::Terminator);
        assert_eq!(sm.handle_event(LineEvent::Byte), StateTransition::Stay);
        assert_eq!(sm.handle_event(LineEvent::Terminator), StateTransition::Stay);
        assert_eq!(sm.get_current_state(), LineState::Dispatch);
    }
}
