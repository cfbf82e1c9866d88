//! Snapshot model. Domain-agnostic.

use std::collections::HashSet;
use std::hash::Hash;

/// Unordered set of effect descriptors produced by one step.
///
/// Iteration order carries no meaning. Nothing in the runtime depends on it
/// and neither should consumers.
pub type Commands<C> = HashSet<C>;

/// Unordered set of messages produced by resolving one command.
pub type Messages<M> = HashSet<M>;

/// One point in a component's timeline.
#[derive(Debug, Clone)]
pub enum Snapshot<M, S, C> {
    /// First snapshot of a generation, produced by the initializer.
    Initial { state: S, commands: Commands<C> },

    /// Every later snapshot of a generation, produced by one updater step.
    Regular {
        state: S,
        commands: Commands<C>,
        previous_state: S,
        message: M,
    },
}

impl<M, S, C> Snapshot<M, S, C> {
    /// The state after this snapshot was computed.
    pub fn state(&self) -> &S {
        match self {
            Snapshot::Initial { state, .. } | Snapshot::Regular { state, .. } => state,
        }
    }

    pub fn commands(&self) -> &Commands<C> {
        match self {
            Snapshot::Initial { commands, .. } | Snapshot::Regular { commands, .. } => commands,
        }
    }

    /// The message that caused this snapshot, `None` for `Initial`.
    pub fn message(&self) -> Option<&M> {
        match self {
            Snapshot::Initial { .. } => None,
            Snapshot::Regular { message, .. } => Some(message),
        }
    }

    pub fn previous_state(&self) -> Option<&S> {
        match self {
            Snapshot::Initial { .. } => None,
            Snapshot::Regular { previous_state, .. } => Some(previous_state),
        }
    }

    pub fn is_initial(&self) -> bool {
        matches!(self, Snapshot::Initial { .. })
    }

    /// Consume the snapshot, keeping only its state.
    pub fn into_state(self) -> S {
        match self {
            Snapshot::Initial { state, .. } | Snapshot::Regular { state, .. } => state,
        }
    }
}

/// What an initializer produces: the seed of a generation.
#[derive(Debug, Clone)]
pub struct Initial<S, C> {
    pub state: S,
    pub commands: Commands<C>,
}

impl<S, C> Initial<S, C> {
    pub fn new(state: S, commands: Commands<C>) -> Self {
        Self { state, commands }
    }

    /// A seed with no initial commands.
    pub fn from_state(state: S) -> Self {
        Self {
            state,
            commands: HashSet::new(),
        }
    }
}

impl<M, S, C> From<Initial<S, C>> for Snapshot<M, S, C> {
    fn from(initial: Initial<S, C>) -> Self {
        Snapshot::Initial {
            state: initial.state,
            commands: initial.commands,
        }
    }
}

// Commands are a `HashSet`, so equality needs `C: Eq + Hash` rather than the
// `C: PartialEq` a derive would ask for.

impl<M: PartialEq, S: PartialEq, C: Eq + Hash> PartialEq for Snapshot<M, S, C> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Snapshot::Initial { state, commands },
                Snapshot::Initial {
                    state: other_state,
                    commands: other_commands,
                },
            ) => state == other_state && commands == other_commands,
            (
                Snapshot::Regular {
                    state,
                    commands,
                    previous_state,
                    message,
                },
                Snapshot::Regular {
                    state: other_state,
                    commands: other_commands,
                    previous_state: other_previous,
                    message: other_message,
                },
            ) => {
                state == other_state
                    && commands == other_commands
                    && previous_state == other_previous
                    && message == other_message
            }
            _ => false,
        }
    }
}

impl<M: Eq, S: Eq, C: Eq + Hash> Eq for Snapshot<M, S, C> {}

impl<S: PartialEq, C: Eq + Hash> PartialEq for Initial<S, C> {
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state && self.commands == other.commands
    }
}

impl<S: Eq, C: Eq + Hash> Eq for Initial<S, C> {}
