use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::PartyError;

/// Per-voter record of applied votes, enforcing one vote per (voter, song).
///
/// Records live as long as their song is queued or playing. Once a song is
/// retired it joins a bounded FIFO; when more than `retention` songs are
/// retired, the oldest one's records are dropped.
#[derive(Debug)]
pub struct VoteLedger {
    // song id -> voter -> delta
    votes: HashMap<String, HashMap<String, i64>>,
    retired: VecDeque<String>,
    retention: usize,
}

impl Default for VoteLedger {
    fn default() -> Self {
        Self::new(500)
    }
}

impl VoteLedger {
    pub fn new(retention: usize) -> Self {
        Self {
            votes: HashMap::new(),
            retired: VecDeque::new(),
            retention,
        }
    }

    pub fn has_voted(&self, voter: &str, song_id: &str) -> bool {
        self.votes
            .get(song_id)
            .is_some_and(|voters| voters.contains_key(voter))
    }

    /// Records the vote and returns the delta to apply to the song's score.
    pub fn apply_vote(&mut self, voter: &str, song_id: &str, delta: i64) -> Result<i64, PartyError> {
        if self.has_voted(voter, song_id) {
            return Err(PartyError::DuplicateVote(song_id.to_string()));
        }
        let delta = validate_delta(delta)?;
        self.votes
            .entry(song_id.to_string())
            .or_default()
            .insert(voter.to_string(), delta);
        Ok(delta)
    }

    /// Sum of recorded deltas for a song.
    pub fn tally(&self, song_id: &str) -> i64 {
        self.votes
            .get(song_id)
            .map(|voters| voters.values().sum())
            .unwrap_or(0)
    }

    /// Number of (voter, song) records currently held.
    pub fn len(&self) -> usize {
        self.votes.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Marks a song as no longer queued. Its records are kept until it ages out
    /// of the retention window.
    pub fn retire(&mut self, song_id: &str) {
        self.retired.retain(|id| id != song_id);
        self.retired.push_back(song_id.to_string());
        while self.retired.len() > self.retention {
            if let Some(expired) = self.retired.pop_front() {
                if let Some(voters) = self.votes.remove(&expired) {
                    debug!(song_id = %expired, records = voters.len(), "Pruned vote records");
                }
            }
        }
    }

    /// A retired song was queued again; keep its records out of pruning.
    pub fn reactivate(&mut self, song_id: &str) {
        self.retired.retain(|id| id != song_id);
    }
}

pub fn validate_delta(delta: i64) -> Result<i64, PartyError> {
    match delta {
        1 | -1 => Ok(delta),
        other => Err(PartyError::InvalidVote(other)),
    }
}
