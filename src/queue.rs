use crate::models::Song;
use crate::PartyError;

/// Pending songs plus the current track.
///
/// `pending` is kept in insertion order; ranking is derived on demand by a
/// stable sort on descending score, so equal scores keep their insertion order.
#[derive(Debug, Default)]
pub struct QueueStore {
    pending: Vec<Song>,
    current: Option<Song>,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, song_id: &str) -> bool {
        self.pending.iter().any(|song| song.id == song_id)
    }

    pub fn is_current(&self, song_id: &str) -> bool {
        self.current.as_ref().is_some_and(|song| song.id == song_id)
    }

    /// Adds a song with a zero score.
    pub fn enqueue(&mut self, mut song: Song) -> Result<(), PartyError> {
        if self.contains(&song.id) || self.is_current(&song.id) {
            return Err(PartyError::DuplicateSong(song.id));
        }
        song.votes = 0;
        self.pending.push(song);
        Ok(())
    }

    /// Adds `delta` to a pending song's score and returns the new score.
    pub fn record_vote(&mut self, song_id: &str, delta: i64) -> Result<i64, PartyError> {
        let song = self
            .pending
            .iter_mut()
            .find(|song| song.id == song_id)
            .ok_or_else(|| PartyError::SongNotFound(song_id.to_string()))?;
        song.votes += delta;
        Ok(song.votes)
    }

    pub fn sorted_view(&self) -> Vec<Song> {
        let mut ranked = self.pending.clone();
        ranked.sort_by(|a, b| b.votes.cmp(&a.votes));
        ranked
    }

    /// Moves the top-ranked pending song into the current slot. With nothing
    /// pending, clears the current slot and returns `None`.
    pub fn advance(&mut self) -> Option<Song> {
        let top = self.top_index();
        match top {
            Some(index) => {
                let song = self.pending.remove(index);
                self.current = Some(song.clone());
                Some(song)
            }
            None => {
                self.current = None;
                None
            }
        }
    }

    pub fn current(&self) -> Option<&Song> {
        self.current.as_ref()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    // First-inserted song among those with the highest score; same pick as
    // the head of `sorted_view`.
    fn top_index(&self) -> Option<usize> {
        let mut best: Option<(usize, i64)> = None;
        for (index, song) in self.pending.iter().enumerate() {
            match best {
                Some((_, votes)) if song.votes <= votes => {}
                _ => best = Some((index, song.votes)),
            }
        }
        best.map(|(index, _)| index)
    }
}
