//! Shared types for the management protocol

use idlewatch_util::ParticipantId;
use serde::{Deserialize, Serialize};

/// A currently connected participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
}

impl Participant {
    pub fn new(id: impl Into<ParticipantId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Result of the participant listing call.
///
/// Servers answer with a bare array; some wrap it as `{"players": [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParticipantList {
    Bare(Vec<Participant>),
    Wrapped { players: Vec<Participant> },
}

impl ParticipantList {
    pub fn into_vec(self) -> Vec<Participant> {
        match self {
            ParticipantList::Bare(players) => players,
            ParticipantList::Wrapped { players } => players,
        }
    }
}

/// Display names of `participants`, in server order
pub fn participant_names(participants: &[Participant]) -> Vec<String> {
    participants.iter().map(|p| p.name.clone()).collect()
}
