//! Queue manager - the ordered list of upcoming tracks
//!
//! The head of the queue is always the next track to load. A track leaves the
//! queue when a deck reports it loaded (see [`QueueManager::consume_head`]),
//! so whatever is on a deck is never counted again in the remaining time.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::RandomQueueConfig;
use crate::track::{TrackMetadata, TrackMetadataProvider};
use crate::types::TrackId;

/// Ordered, mutable queue of track references
///
/// Entries are not unique; the same track may be queued several times.
pub struct QueueManager {
    entries: Vec<TrackId>,
    provider: Arc<dyn TrackMetadataProvider>,
    requeue: bool,
    random: RandomQueueConfig,
    /// Last (deck, track) removal, cleared by any other mutation
    last_consumed: Option<(String, TrackId)>,
}

impl QueueManager {
    pub fn new(provider: Arc<dyn TrackMetadataProvider>) -> Self {
        Self {
            entries: Vec::new(),
            provider,
            requeue: false,
            random: RandomQueueConfig::default(),
            last_consumed: None,
        }
    }

    /// Re-append consumed tracks to the end of the queue
    pub fn set_requeue(&mut self, requeue: bool) {
        self.requeue = requeue;
    }

    pub fn set_random_queue(&mut self, random: RandomQueueConfig) {
        self.random = random;
    }

    pub fn provider(&self) -> &Arc<dyn TrackMetadataProvider> {
        &self.provider
    }

    pub fn entries(&self) -> &[TrackId] {
        &self.entries
    }

    pub fn remaining_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn append<I: IntoIterator<Item = TrackId>>(&mut self, tracks: I) {
        self.entries.extend(tracks);
        self.last_consumed = None;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_consumed = None;
    }

    /// The next track to load, without touching the queue
    pub fn peek_next(&self) -> Option<TrackId> {
        self.entries.first().copied()
    }

    /// Head of the queue together with its metadata, ready to be loaded.
    ///
    /// Heads the provider knows nothing about (deleted or missing files) are
    /// dropped from the queue on the way.
    pub fn next_loadable(&mut self) -> Option<(TrackId, TrackMetadata)> {
        self.last_consumed = None;
        while let Some(track) = self.peek_next() {
            if let Some(metadata) = self.provider.metadata(track) {
                return Some((track, metadata));
            }
            log::warn!("queue: dropping {} from the queue, no metadata available", track);
            self.entries.remove(0);
        }
        None
    }

    /// Remove the head because `group` just loaded `track`.
    ///
    /// Only removes when the head actually is `track`; reporting the same
    /// load twice without another queue mutation in between is a no-op.
    /// Returns whether an entry was removed.
    pub fn consume_head(&mut self, group: &str, track: TrackId) -> bool {
        if self.peek_next() != Some(track) {
            return false;
        }
        if let Some((last_group, last_track)) = &self.last_consumed {
            if last_group == group && *last_track == track {
                return false;
            }
        }

        self.entries.remove(0);
        if self.requeue {
            self.entries.push(track);
        }
        self.last_consumed = Some((group.to_string(), track));
        log::debug!("queue: consumed {} loaded on {}", track, group);
        true
    }

    /// Shuffle a sub-range of the queue; an empty selection (`n..n`) shuffles
    /// everything.
    ///
    /// The range is clamped to the queue. Returns `false` if nothing was there
    /// to shuffle, or the range is inverted.
    pub fn shuffle(&mut self, range: Range<usize>) -> bool {
        self.shuffle_with(range, &mut rand::thread_rng())
    }

    /// [`QueueManager::shuffle`] with a caller-provided random source
    pub fn shuffle_with<R: Rng + ?Sized>(&mut self, range: Range<usize>, rng: &mut R) -> bool {
        let len = self.entries.len();
        if range.start > range.end {
            return false;
        }
        let range = if range.start == range.end {
            0..len
        } else {
            range.start.min(len)..range.end.min(len)
        };
        if range.is_empty() {
            return false;
        }
        self.entries[range].shuffle(rng);
        self.last_consumed = None;
        true
    }

    /// Number of random tracks to request so the queue stays above its minimum.
    ///
    /// `None` when random refill is off or the queue is long enough.
    pub fn request_more_if_empty(&self) -> Option<usize> {
        if !self.random.enabled {
            return None;
        }
        let minimum = self.random.minimum_tracks.max(1);
        (self.entries.len() < minimum).then(|| minimum - self.entries.len())
    }

    /// Summed play time of the queued tracks at normal speed.
    ///
    /// `exclude` is the track currently playing; if it still sits at the head
    /// (not consumed yet) that entry is skipped so it isn't counted twice.
    /// Tracks without metadata count as zero.
    pub fn remaining_duration(&self, exclude: Option<TrackId>) -> Duration {
        let skip = match (exclude, self.peek_next()) {
            (Some(playing), Some(head)) if playing == head => 1,
            _ => 0,
        };
        let secs: f64 = self
            .entries
            .iter()
            .skip(skip)
            .filter_map(|track| self.provider.metadata(*track))
            .filter_map(|metadata| metadata.duration_secs())
            .sum();
        Duration::from_secs_f64(secs.max(0.0))
    }
}

impl std::fmt::Debug for QueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueManager")
            .field("entries", &self.entries)
            .field("requeue", &self.requeue)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::TrackLibrary;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const DECK: &str = "[Channel1]";

    fn setup(durations: &[f64]) -> (Arc<TrackLibrary>, QueueManager, Vec<TrackId>) {
        let library = Arc::new(TrackLibrary::new());
        let ids: Vec<TrackId> = durations
            .iter()
            .enumerate()
            .map(|(i, secs)| library.add(TrackMetadata::new(format!("t{}", i), 44100.0, *secs)))
            .collect();
        let mut queue = QueueManager::new(library.clone());
        queue.append(ids.iter().copied());
        (library, queue, ids)
    }

    #[test]
    fn test_consume_head_is_idempotent() {
        let (_library, mut queue, ids) = setup(&[100.0, 120.0, 140.0]);

        assert!(queue.consume_head(DECK, ids[0]));
        assert!(!queue.consume_head(DECK, ids[0]));
        assert_eq!(queue.entries(), &ids[1..]);
    }

    #[test]
    fn test_consume_only_matching_head() {
        let (_library, mut queue, ids) = setup(&[100.0, 120.0]);
        assert!(!queue.consume_head(DECK, ids[1]));
        assert_eq!(queue.remaining_count(), 2);
    }

    #[test]
    fn test_duplicate_entries_consumed_by_other_deck() {
        let library = Arc::new(TrackLibrary::new());
        let id = library.add(TrackMetadata::new("dup", 44100.0, 60.0));
        let mut queue = QueueManager::new(library);
        queue.append([id, id]);

        assert!(queue.consume_head("[Channel1]", id));
        assert!(!queue.consume_head("[Channel1]", id));
        assert!(queue.consume_head("[Channel2]", id));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_requeue_appends_consumed_track() {
        let (_library, mut queue, ids) = setup(&[100.0, 120.0]);
        queue.set_requeue(true);
        assert!(queue.consume_head(DECK, ids[0]));
        assert_eq!(queue.entries(), &[ids[1], ids[0]]);
    }

    #[test]
    fn test_next_loadable_drops_missing_tracks() {
        let (library, mut queue, ids) = setup(&[100.0, 120.0, 140.0]);
        library.remove(ids[0]);
        library.remove(ids[1]);

        let (track, metadata) = queue.next_loadable().unwrap();
        assert_eq!(track, ids[2]);
        assert_eq!(metadata.title, "t2");
        assert_eq!(queue.remaining_count(), 1);

        library.remove(ids[2]);
        assert!(queue.next_loadable().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_remaining_duration_excludes_playing() {
        let (_library, mut queue, ids) = setup(&[100.0, 120.0, 140.0, 60.0]);
        assert_eq!(queue.remaining_duration(None), Duration::from_secs(420));
        assert_eq!(queue.remaining_duration(Some(ids[0])), Duration::from_secs(320));
        // Not at the head: nothing to exclude
        assert_eq!(queue.remaining_duration(Some(ids[2])), Duration::from_secs(420));

        queue.consume_head(DECK, ids[0]);
        queue.consume_head("[Channel2]", ids[1]);
        assert_eq!(queue.remaining_duration(None), Duration::from_secs(200));
    }

    #[test]
    fn test_shuffle_range_keeps_outside_entries() {
        let durations: Vec<f64> = (1..=20).map(|i| i as f64 * 10.0).collect();
        let (_library, mut queue, ids) = setup(&durations);
        let mut rng = StdRng::seed_from_u64(7);

        assert!(queue.shuffle_with(5..10, &mut rng));
        assert_eq!(&queue.entries()[..5], &ids[..5]);
        assert_eq!(&queue.entries()[10..], &ids[10..]);

        let mut middle = queue.entries()[5..10].to_vec();
        middle.sort();
        assert_eq!(middle, ids[5..10].to_vec());
    }

    #[test]
    fn test_shuffle_empty_range_means_whole_queue() {
        let durations: Vec<f64> = (1..=10).map(|i| i as f64).collect();
        let (_library, mut queue, ids) = setup(&durations);
        assert!(queue.shuffle(0..0));

        let mut all = queue.entries().to_vec();
        all.sort();
        assert_eq!(all, ids);
    }

    #[test]
    fn test_shuffle_nothing() {
        let (_library, mut queue, _ids) = setup(&[]);
        assert!(!queue.shuffle(0..0));
        let (_library, mut queue, _ids) = setup(&[10.0, 20.0]);
        assert!(!queue.shuffle(5..9));
    }

    #[test]
    #[allow(clippy::reversed_empty_ranges)]
    fn test_shuffle_inverted_range_is_rejected() {
        let durations: Vec<f64> = (1..=10).map(|i| i as f64).collect();
        let (_library, mut queue, ids) = setup(&durations);
        let mut rng = StdRng::seed_from_u64(3);
        assert!(!queue.shuffle_with(5..2, &mut rng));
        assert_eq!(queue.entries(), &ids[..]);
    }

    #[test]
    fn test_random_fill_request() {
        let (_library, mut queue, _ids) = setup(&[100.0, 120.0]);
        assert_eq!(queue.request_more_if_empty(), None);

        queue.set_random_queue(RandomQueueConfig {
            enabled: true,
            minimum_tracks: 5,
        });
        assert_eq!(queue.request_more_if_empty(), Some(3));

        queue.clear();
        assert_eq!(queue.request_more_if_empty(), Some(5));
    }
}
