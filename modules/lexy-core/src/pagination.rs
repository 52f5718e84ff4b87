//! Client-side paging over one fetched result batch.

use lexy_common::Post;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageState {
    #[default]
    Idle,
    LoadingMore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMore {
    /// Results `from..to` are newly visible.
    Revealed { from: usize, to: usize },
    /// Everything is already shown.
    Exhausted,
    /// A load is already in progress.
    Busy,
}

/// Tracks how many results are visible. `displayed` never decreases and
/// never exceeds the number of results.
#[derive(Debug, Clone)]
pub struct Paginator {
    results: Vec<Post>,
    page_size: usize,
    displayed: usize,
    state: PageState,
}

impl Paginator {
    pub fn new(results: Vec<Post>, page_size: usize) -> Self {
        let page_size = page_size.max(1);
        Self {
            displayed: page_size.min(results.len()),
            results,
            page_size,
            state: PageState::Idle,
        }
    }

    /// New result set: back to the first page.
    pub fn reset(&mut self, results: Vec<Post>) {
        *self = Self::new(results, self.page_size);
    }

    pub fn results(&self) -> &[Post] {
        &self.results
    }

    pub fn visible(&self) -> &[Post] {
        &self.results[..self.displayed]
    }

    pub fn displayed(&self) -> usize {
        self.displayed
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub fn has_more(&self) -> bool {
        self.displayed < self.results.len()
    }

    /// `Idle -> LoadingMore`, revealing the next slice. Must be followed by
    /// [`finish_load_more`](Self::finish_load_more).
    pub fn begin_load_more(&mut self) -> LoadMore {
        if self.state == PageState::LoadingMore {
            return LoadMore::Busy;
        }
        if !self.has_more() {
            return LoadMore::Exhausted;
        }
        self.state = PageState::LoadingMore;
        let from = self.displayed;
        self.displayed = (self.displayed + self.page_size).min(self.results.len());
        LoadMore::Revealed {
            from,
            to: self.displayed,
        }
    }

    pub fn finish_load_more(&mut self) {
        self.state = PageState::Idle;
    }

    pub fn load_more(&mut self) -> LoadMore {
        let outcome = self.begin_load_more();
        if matches!(outcome, LoadMore::Revealed { .. }) {
            self.finish_load_more();
        }
        outcome
    }
}

/// Rising-edge detector for the sentinel at the bottom of the result list.
///
/// Fires once when the sentinel comes within `margin_px` of the viewport and
/// re-arms only after it leaves that zone.
#[derive(Debug, Clone, Copy)]
pub struct SentinelTrigger {
    margin_px: u32,
    in_view: bool,
}

impl Default for SentinelTrigger {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl SentinelTrigger {
    pub fn new(margin_px: u32) -> Self {
        Self {
            margin_px,
            in_view: false,
        }
    }

    /// `distance_px` is how far below the viewport bottom the sentinel sits
    /// (zero or negative once visible). Returns true when a load should start.
    pub fn observe(&mut self, distance_px: i64) -> bool {
        let near = distance_px <= i64::from(self.margin_px);
        let fire = near && !self.in_view;
        self.in_view = near;
        fire
    }

    /// Drive a paginator from a scroll observation.
    pub fn poll(&mut self, distance_px: i64, paginator: &mut Paginator) -> Option<LoadMore> {
        self.observe(distance_px).then(|| paginator.load_more())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posts(n: usize) -> Vec<Post> {
        (0..n)
            .map(|i| Post::new(format!("t{i}"), format!("https://x.example/{i}"), ""))
            .collect()
    }

    #[test]
    fn twenty_five_results_in_pages_of_ten() {
        let mut p = Paginator::new(posts(25), 10);
        assert_eq!(p.displayed(), 10);
        assert!(p.has_more());

        assert_eq!(p.load_more(), LoadMore::Revealed { from: 10, to: 20 });
        assert_eq!(p.displayed(), 20);

        assert_eq!(p.load_more(), LoadMore::Revealed { from: 20, to: 25 });
        assert_eq!(p.displayed(), 25);
        assert!(!p.has_more());

        assert_eq!(p.load_more(), LoadMore::Exhausted);
        assert_eq!(p.displayed(), 25);
    }

    #[test]
    fn fewer_results_than_a_page() {
        let p = Paginator::new(posts(3), 10);
        assert_eq!(p.displayed(), 3);
        assert!(!p.has_more());
        assert_eq!(p.visible().len(), 3);
    }

    #[test]
    fn concurrent_load_is_rejected() {
        let mut p = Paginator::new(posts(30), 10);
        assert!(matches!(p.begin_load_more(), LoadMore::Revealed { .. }));
        assert_eq!(p.state(), PageState::LoadingMore);
        assert_eq!(p.begin_load_more(), LoadMore::Busy);
        p.finish_load_more();
        assert!(matches!(p.begin_load_more(), LoadMore::Revealed { .. }));
    }

    #[test]
    fn displayed_never_exceeds_results() {
        for n in 0..40 {
            for size in [1, 7, 10, 25] {
                let mut p = Paginator::new(posts(n), size);
                loop {
                    assert!(p.displayed() <= n);
                    assert_eq!(p.has_more(), p.displayed() < n);
                    if p.load_more() == LoadMore::Exhausted {
                        break;
                    }
                }
            }
        }
    }

    #[test]
    fn reset_returns_to_first_page() {
        let mut p = Paginator::new(posts(25), 10);
        p.load_more();
        p.reset(posts(12));
        assert_eq!(p.displayed(), 10);
        assert_eq!(p.results().len(), 12);
    }

    #[test]
    fn sentinel_fires_once_per_approach() {
        let mut trigger = SentinelTrigger::new(1000);
        assert!(!trigger.observe(5000));
        assert!(trigger.observe(900));
        assert!(!trigger.observe(200));
        assert!(!trigger.observe(4000));
        assert!(trigger.observe(-10));
    }

    #[test]
    fn sentinel_drives_paginator() {
        let mut p = Paginator::new(posts(15), 10);
        let mut trigger = SentinelTrigger::default();
        assert_eq!(trigger.poll(3000, &mut p), None);
        assert_eq!(trigger.poll(0, &mut p), Some(LoadMore::Revealed { from: 10, to: 15 }));
        assert_eq!(trigger.poll(0, &mut p), None);
    }
}
