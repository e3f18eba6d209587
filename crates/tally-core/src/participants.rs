//! The two tracked identities and their fixed user-id binding.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ids::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates the two tracked `Participant` slots.
pub enum Participant {
    A,
    B,
}

impl Participant {
    pub const ALL: [Participant; 2] = [Participant::A, Participant::B];

    /// Command alias used by the adjust command (`friend` / `me`).
    pub fn alias(self) -> &'static str {
        match self {
            Self::A => "friend",
            Self::B => "me",
        }
    }
}

impl Display for Participant {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.alias())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantBinding {
    pub user_id: UserId,
    pub label: String,
}

/// Immutable binding of both participants, built once from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedParticipants {
    a: ParticipantBinding,
    b: ParticipantBinding,
}

impl TrackedParticipants {
    pub fn new(a: ParticipantBinding, b: ParticipantBinding) -> Self {
        Self { a, b }
    }

    pub fn binding(&self, participant: Participant) -> &ParticipantBinding {
        match participant {
            Participant::A => &self.a,
            Participant::B => &self.b,
        }
    }

    pub fn user_id(&self, participant: Participant) -> UserId {
        self.binding(participant).user_id
    }

    pub fn label(&self, participant: Participant) -> &str {
        self.binding(participant).label.as_str()
    }

    /// Maps an author id onto a tracked slot; `None` for everybody else.
    pub fn resolve(&self, author: UserId) -> Option<Participant> {
        if author == self.a.user_id {
            Some(Participant::A)
        } else if author == self.b.user_id {
            Some(Participant::B)
        } else {
            None
        }
    }

    /// Resolves a command argument: slot alias, slot letter or configured label.
    pub fn parse_name(&self, raw: &str) -> Option<Participant> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }
        Participant::ALL.into_iter().find(|participant| {
            normalized == participant.alias()
                || normalized == format!("{participant:?}").to_lowercase()
                || normalized == self.label(*participant).to_lowercase()
        })
    }
}
