//! Standings shown at the round lobby.
//!
//! Participants are ordered by eggs (desc), correct answers (desc), average
//! response time (asc, players who never answered last), display name (asc)
//! and finally participant id, so the order is total and identical on every
//! client.

use std::cmp::Ordering;

use crate::protocol::Participant;

/// One line of the standings.
#[derive(Debug, Clone, PartialEq)]
pub struct Standing {
    /// 1-based position.
    pub position: usize,
    pub participant: Participant,
    pub average_response_ms: Option<u64>,
}

fn compare(a: &Participant, b: &Participant) -> Ordering {
    b.eggs
        .cmp(&a.eggs)
        .then_with(|| b.correct_answers.cmp(&a.correct_answers))
        .then_with(|| {
            let (ra, rb) = (a.average_response_ms(), b.average_response_ms());
            match (ra, rb) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        })
        .then_with(|| a.display_name.cmp(&b.display_name))
        .then_with(|| a.id.cmp(&b.id))
}

/// Rank the non-spectator participants.
pub fn rank(participants: &[Participant]) -> Vec<Standing> {
    let mut players: Vec<&Participant> = participants.iter().filter(|p| !p.is_spectator).collect();
    players.sort_by(|a, b| compare(a, b));
    players
        .into_iter()
        .enumerate()
        .map(|(i, participant)| Standing {
            position: i + 1,
            average_response_ms: participant.average_response_ms(),
            participant: participant.clone(),
        })
        .collect()
}
