//! Current-item tracking for the vertical byte feed.
//!
//! [`ViewportTracker`] turns visibility observations into a single current
//! index. [`ViewDebouncer`] holds back the view-tracking call until that index
//! has settled, so a fast swipe through several bytes only records the one the
//! reader stopped on. [`ByteFeedViewport`] ties both to the gateway.
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::task::JoinHandle;

use crate::api::{Article, ArticleId, RemoteEngagementGateway};
use crate::engagement::spawn_track_view;

/// Fraction of an item's area that must be on screen for it to become current.
pub const VISIBILITY_THRESHOLD: f32 = 0.6;

/// Outcome of one observation batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportUpdate {
    pub current_index: Option<usize>,
    /// Set when the current index moved to a different item.
    pub entered: Option<usize>,
}

/// Decides which byte is current from batches of visibility ratios.
///
/// A batch is everything the platform reported in one frame. The current item
/// stays current while it is at or above [`VISIBILITY_THRESHOLD`]. Once it
/// drops below, items crossing the threshold in the same batch compete and the
/// lowest index wins. With no crossing in the batch, the lowest
/// still-qualifying visible item takes over; with none at all, the current
/// item is kept.
#[derive(Debug, Default)]
pub struct ViewportTracker {
    current_index: Option<usize>,
    visible: BTreeMap<usize, f32>,
}

impl ViewportTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    /// Indices with any visible area, in ascending order.
    pub fn visible_candidates(&self) -> impl Iterator<Item = usize> + '_ {
        self.visible.keys().copied()
    }

    pub fn observe(&mut self, batch: &[(usize, f32)]) -> ViewportUpdate {
        let mut crossing: Option<usize> = None;
        for &(index, ratio) in batch {
            let ratio = if ratio.is_nan() { 0.0 } else { ratio.clamp(0.0, 1.0) };
            if ratio > 0.0 {
                self.visible.insert(index, ratio);
            } else {
                self.visible.remove(&index);
            }
            if ratio >= VISIBILITY_THRESHOLD {
                crossing = Some(crossing.map_or(index, |c| c.min(index)));
            }
        }

        let next = if self.current_qualifies() {
            self.current_index
        } else {
            crossing
                .or_else(|| {
                    self.visible
                        .iter()
                        .find(|(_, &ratio)| ratio >= VISIBILITY_THRESHOLD)
                        .map(|(&index, _)| index)
                })
                .or(self.current_index)
        };

        let entered = if next != self.current_index { next } else { None };
        if let Some(index) = entered {
            tracing::trace!(from = ?self.current_index, to = index, "Viewport current index changed");
        }
        self.current_index = next;

        ViewportUpdate {
            current_index: self.current_index,
            entered,
        }
    }

    fn current_qualifies(&self) -> bool {
        self.current_index
            .and_then(|index| self.visible.get(&index))
            .is_some_and(|&ratio| ratio >= VISIBILITY_THRESHOLD)
    }

    /// Forget everything, e.g. after the feed was replaced.
    pub fn reset(&mut self) {
        self.current_index = None;
        self.visible.clear();
    }
}

/// Delays view tracking until the current index has been stable for the
/// settle window.
///
/// Time is passed in by the caller so the policy is deterministic.
#[derive(Debug)]
pub struct ViewDebouncer {
    settle: Duration,
    pending: Option<(usize, Instant)>,
    last_tracked: Option<usize>,
}

impl ViewDebouncer {
    pub fn new(settle: Duration) -> Self {
        Self {
            settle,
            pending: None,
            last_tracked: None,
        }
    }

    /// Record that `index` became current at `now`, replacing any index that
    /// had not settled yet.
    pub fn schedule(&mut self, index: usize, now: Instant) {
        self.pending = Some((index, now));
    }

    /// When the pending index will be due, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|(_, since)| since + self.settle)
    }

    /// Return the index to track if it has settled by `now`.
    ///
    /// An index is not tracked twice in a row: the reader has to settle on a
    /// different item first.
    pub fn poll(&mut self, now: Instant) -> Option<usize> {
        let (index, since) = self.pending?;
        if now.saturating_duration_since(since) < self.settle {
            return None;
        }
        self.pending = None;
        if self.last_tracked == Some(index) {
            return None;
        }
        self.last_tracked = Some(index);
        Some(index)
    }

    pub fn reset(&mut self) {
        self.pending = None;
        self.last_tracked = None;
    }
}

/// The byte feed's viewport: current item plus view tracking.
pub struct ByteFeedViewport {
    articles: Vec<ArticleId>,
    tracker: ViewportTracker,
    debouncer: ViewDebouncer,
    remote: Arc<dyn RemoteEngagementGateway>,
    in_flight: Vec<JoinHandle<()>>,
}

impl ByteFeedViewport {
    pub fn new(remote: Arc<dyn RemoteEngagementGateway>, settle: Duration) -> Self {
        Self {
            articles: Vec::new(),
            tracker: ViewportTracker::new(),
            debouncer: ViewDebouncer::new(settle),
            remote,
            in_flight: Vec::new(),
        }
    }

    /// Replace the feed contents; tracking starts over.
    pub fn set_articles(&mut self, articles: &[Article]) {
        self.articles = articles.iter().map(|a| a.id.clone()).collect();
        self.tracker.reset();
        self.debouncer.reset();
    }

    pub fn current_viewport_index(&self) -> Option<usize> {
        self.tracker.current_index()
    }

    pub fn current_article(&self) -> Option<&ArticleId> {
        self.articles.get(self.tracker.current_index()?)
    }

    /// Feed one frame's visibility observations.
    pub fn on_visibility(&mut self, batch: &[(usize, f32)], now: Instant) -> ViewportUpdate {
        let update = self.tracker.observe(batch);
        if let Some(index) = update.entered {
            self.debouncer.schedule(index, now);
        }
        update
    }

    /// When [`tick`](Self::tick) should next be called, if anything is
    /// waiting to settle.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    /// Issue the view-tracking call for a settled index. Returns the tracked
    /// article, if any.
    pub fn tick(&mut self, now: Instant) -> Option<ArticleId> {
        let index = self.debouncer.poll(now)?;
        let Some(article_id) = self.articles.get(index).cloned() else {
            tracing::debug!(index, "Settled index outside the loaded feed");
            return None;
        };
        self.in_flight.retain(|handle| !handle.is_finished());
        self.in_flight
            .push(spawn_track_view(Arc::clone(&self.remote), article_id.clone()));
        Some(article_id)
    }

    /// Wait for view-tracking calls still in flight, e.g. before exiting.
    pub async fn flush(&mut self) {
        for result in join_all(self.in_flight.drain(..)).await {
            if let Err(e) = result {
                tracing::debug!(error = %e, "View tracking task did not complete");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[test]
    fn test_single_item_over_threshold_becomes_current() {
        let mut tracker = ViewportTracker::new();
        let update = tracker.observe(&[(0, 0.2), (1, 0.65), (2, 0.1)]);
        assert_eq!(update.current_index, Some(1));
        assert_eq!(update.entered, Some(1));
        assert_eq!(tracker.visible_candidates().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_moving_to_next_item_enters_once() {
        let mut tracker = ViewportTracker::new();
        tracker.observe(&[(0, 0.2), (1, 0.65), (2, 0.1)]);

        let update = tracker.observe(&[(1, 0.3), (2, 0.7)]);
        assert_eq!(update.current_index, Some(2));
        assert_eq!(update.entered, Some(2));

        // Same item reported again: no new entry
        let update = tracker.observe(&[(2, 0.9)]);
        assert_eq!(update.current_index, Some(2));
        assert_eq!(update.entered, None);
    }

    #[test]
    fn test_tie_resolves_to_lowest_index_in_batch() {
        let mut tracker = ViewportTracker::new();
        let update = tracker.observe(&[(5, 0.8), (3, 0.61), (4, 0.9)]);
        assert_eq!(update.current_index, Some(3));
    }

    #[test]
    fn test_qualifying_current_is_not_displaced_by_later_crossing() {
        let mut tracker = ViewportTracker::new();
        tracker.observe(&[(1, 0.9)]);

        let update = tracker.observe(&[(1, 0.9), (2, 0.7)]);
        assert_eq!(update.current_index, Some(1));
        assert_eq!(update.entered, None);

        let update = tracker.observe(&[(3, 0.65)]);
        assert_eq!(update.current_index, Some(1));
        assert_eq!(update.entered, None);

        // Dropping the current item hands over to the lowest crossing in the batch
        let update = tracker.observe(&[(1, 0.2), (3, 0.8), (2, 0.75)]);
        assert_eq!(update.current_index, Some(2));
        assert_eq!(update.entered, Some(2));
    }

    #[test]
    fn test_below_threshold_keeps_current_without_replacement() {
        let mut tracker = ViewportTracker::new();
        tracker.observe(&[(1, 0.9)]);

        let update = tracker.observe(&[(1, 0.5), (2, 0.5)]);
        assert_eq!(update.current_index, Some(1));
        assert_eq!(update.entered, None);
    }

    #[test]
    fn test_current_dropping_falls_back_to_qualifying_candidate() {
        let mut tracker = ViewportTracker::new();
        tracker.observe(&[(3, 0.7)]);
        tracker.observe(&[(4, 0.75)]);
        assert_eq!(tracker.current_index(), Some(3));

        let update = tracker.observe(&[(3, 0.0)]);
        assert_eq!(update.current_index, Some(4));
        assert_eq!(update.entered, Some(4));
        assert_eq!(tracker.visible_candidates().collect::<Vec<_>>(), vec![4]);
    }

    #[test]
    fn test_nan_and_out_of_range_ratios() {
        let mut tracker = ViewportTracker::new();
        assert_eq!(tracker.observe(&[(0, f32::NAN)]).current_index, None);
        assert_eq!(tracker.observe(&[(0, 1.7)]).current_index, Some(0));
    }

    #[test]
    fn test_debouncer_tracks_only_settled_index() {
        let start = Instant::now();
        let settle = Duration::from_millis(300);
        let mut debouncer = ViewDebouncer::new(settle);

        // Rapid scroll-through: 1, 2, 3 within the settle window
        debouncer.schedule(1, start);
        debouncer.schedule(2, start + Duration::from_millis(50));
        debouncer.schedule(3, start + Duration::from_millis(100));
        assert_eq!(debouncer.poll(start + Duration::from_millis(200)), None);
        assert_eq!(
            debouncer.deadline(),
            Some(start + Duration::from_millis(400))
        );
        assert_eq!(debouncer.poll(start + Duration::from_millis(400)), Some(3));
        assert_eq!(debouncer.poll(start + Duration::from_millis(900)), None);
    }

    #[test]
    fn test_debouncer_retracks_after_scrolling_away_and_back() {
        let start = Instant::now();
        let mut debouncer = ViewDebouncer::new(Duration::ZERO);

        debouncer.schedule(1, start);
        assert_eq!(debouncer.poll(start), Some(1));
        debouncer.schedule(1, start);
        assert_eq!(debouncer.poll(start), None);
        debouncer.schedule(2, start);
        assert_eq!(debouncer.poll(start), Some(2));
        debouncer.schedule(1, start);
        assert_eq!(debouncer.poll(start), Some(1));
    }

    #[derive(Default)]
    struct RecordingGateway {
        views: Mutex<Vec<ArticleId>>,
    }

    #[async_trait]
    impl RemoteEngagementGateway for RecordingGateway {
        async fn toggle_like(&self, _: &ArticleId) -> Result<(), ApiError> {
            Ok(())
        }
        async fn toggle_bookmark(&self, _: &ArticleId) -> Result<(), ApiError> {
            Ok(())
        }
        async fn track_view(&self, id: &ArticleId) -> Result<(), ApiError> {
            self.views.lock().unwrap().push(id.clone());
            Ok(())
        }
    }

    fn bytes(ids: &[&str]) -> Vec<Article> {
        ids.iter()
            .map(|id| serde_json::from_value(serde_json::json!({ "id": id })).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_byte_feed_tracks_exactly_one_view_per_settled_item() {
        let gateway = Arc::new(RecordingGateway::default());
        let mut viewport = ByteFeedViewport::new(gateway.clone(), Duration::ZERO);
        viewport.set_articles(&bytes(&["b0", "b1", "b2"]));
        let now = Instant::now();

        viewport.on_visibility(&[(0, 0.2), (1, 0.65), (2, 0.1)], now);
        assert_eq!(viewport.tick(now), Some(ArticleId::from("b1")));
        assert_eq!(viewport.current_viewport_index(), Some(1));

        viewport.on_visibility(&[(1, 0.3), (2, 0.7)], now);
        assert_eq!(viewport.tick(now), Some(ArticleId::from("b2")));
        assert_eq!(viewport.tick(now), None);
        assert_eq!(viewport.current_article(), Some(&ArticleId::from("b2")));

        viewport.flush().await;
        assert_eq!(
            gateway.views.lock().unwrap().as_slice(),
            &[ArticleId::from("b1"), ArticleId::from("b2")]
        );
    }

    #[tokio::test]
    async fn test_byte_feed_waits_for_configured_settle_window() {
        let config = crate::config::Config::default();
        let gateway = Arc::new(RecordingGateway::default());
        let mut viewport = ByteFeedViewport::new(gateway.clone(), config.view_settle());
        viewport.set_articles(&bytes(&["b0", "b1"]));
        let start = Instant::now();

        viewport.on_visibility(&[(0, 1.0)], start);
        assert_eq!(viewport.next_deadline(), Some(start + Duration::from_millis(300)));
        assert_eq!(viewport.tick(start + Duration::from_millis(299)), None);

        // Swiped on before b0 settled
        viewport.on_visibility(&[(0, 0.0), (1, 1.0)], start + Duration::from_millis(100));
        assert_eq!(viewport.tick(start + Duration::from_millis(350)), None);
        assert_eq!(
            viewport.tick(start + Duration::from_millis(400)),
            Some(ArticleId::from("b1"))
        );

        viewport.flush().await;
        assert_eq!(
            gateway.views.lock().unwrap().as_slice(),
            &[ArticleId::from("b1")]
        );
    }

    #[tokio::test]
    async fn test_set_articles_resets_tracking() {
        let gateway = Arc::new(RecordingGateway::default());
        let mut viewport = ByteFeedViewport::new(gateway, Duration::ZERO);
        viewport.set_articles(&bytes(&["b0"]));
        let now = Instant::now();
        viewport.on_visibility(&[(0, 1.0)], now);
        viewport.tick(now);

        viewport.set_articles(&bytes(&["c0"]));
        assert_eq!(viewport.current_viewport_index(), None);
        viewport.on_visibility(&[(0, 1.0)], now);
        assert_eq!(viewport.tick(now), Some(ArticleId::from("c0")));
    }
}
