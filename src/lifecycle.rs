//! Status state machines shared by every tracked record
//!
//! Each status enum lists the statuses it may move to. A request naming the
//! current status is a no-op, a request naming anything unreachable is a
//! conflict, and terminal statuses have no exits at all.
use super::error::RecordError;
use std::fmt::Debug;

pub trait Lifecycle: Copy + Eq + Debug + 'static {
    /// Record name used in conflict messages.
    const RECORD: &'static str;

    fn initial() -> Self;

    /// Statuses reachable in one step.
    fn targets(self) -> &'static [Self];

    fn label(self) -> &'static str;

    fn is_terminal(self) -> bool {
        self.targets().is_empty()
    }

    fn can_reach(self, target: Self) -> bool {
        self.targets().contains(&target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition<S> {
    /// Target equals the current status. Nothing is written.
    Unchanged(S),
    Advance { from: S, to: S },
}

impl<S: Lifecycle> Transition<S> {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Transition::Unchanged(_))
    }

    pub fn target(&self) -> S {
        match *self {
            Transition::Unchanged(s) => s,
            Transition::Advance { to, .. } => to,
        }
    }
}

pub fn plan_transition<S: Lifecycle>(current: S, target: S) -> Result<Transition<S>, RecordError> {
    if current == target {
        return Ok(Transition::Unchanged(current));
    }
    if current.can_reach(target) {
        return Ok(Transition::Advance {
            from: current,
            to: target,
        });
    }

    let reason = if current.is_terminal() {
        format!("{} is already {}", S::RECORD, current.label())
    } else {
        format!(
            "{} cannot move from {} to {}",
            S::RECORD,
            current.label(),
            target.label()
        )
    };
    Err(RecordError::Conflict(reason))
}
