// In crates/engine/src/conductor.rs

use core_types::Side;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// The debounced action kinds. One mark slot per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebounceKind {
    EntryLong,
    EntryShort,
    Conduct,
    TradeClosed,
}

impl DebounceKind {
    pub fn entry(side: Side) -> Self {
        match side {
            Side::Long => DebounceKind::EntryLong,
            Side::Short => DebounceKind::EntryShort,
        }
    }
}

/// Remembers the last bar that triggered each action kind, so the same bar
/// never triggers the same kind twice no matter how many ticks land inside
/// it.
#[derive(Debug, Default)]
pub struct DebounceMarks {
    last_bar: HashMap<DebounceKind, i64>,
}

impl DebounceMarks {
    /// Records `bar` for `kind`. Returns false when that bar already
    /// triggered the kind.
    pub fn try_mark(&mut self, kind: DebounceKind, bar: i64) -> bool {
        if self.last_bar.get(&kind) == Some(&bar) {
            return false;
        }
        self.last_bar.insert(kind, bar);
        true
    }

    pub fn is_marked(&self, kind: DebounceKind, bar: i64) -> bool {
        self.last_bar.get(&kind) == Some(&bar)
    }
}

/// Decides, per tick, whether the trade conductor or entry evaluator may
/// be invoked.
///
/// The conductor runs when no invocation has happened for the current
/// position yet, or when the configured interval has elapsed, and at most
/// once per bar. Entry evaluation runs at most once per bar per side, and
/// never on a bar that closed a trade.
#[derive(Debug)]
pub struct AdvisoryScheduler {
    interval: Duration,
    last_invocation: Option<Instant>,
    marks: DebounceMarks,
}

impl AdvisoryScheduler {
    pub fn new(interval: Duration, conduct_immediately: bool) -> Self {
        Self {
            interval,
            // With no immediate-conduct request, a position inherited at
            // startup waits a full interval like any other.
            last_invocation: (!conduct_immediately).then(Instant::now),
            marks: DebounceMarks::default(),
        }
    }

    fn conduct_due(&self) -> bool {
        match self.last_invocation {
            None => true,
            Some(at) => at.elapsed() >= self.interval,
        }
    }

    /// Claims a conductor invocation for `bar`. Returns false when the
    /// interval has not elapsed or the bar already conducted. Claiming
    /// stamps the invocation clock, so a failed call still waits out the
    /// interval before the next attempt.
    pub fn begin_conduct(&mut self, bar: i64) -> bool {
        if !self.conduct_due() {
            return false;
        }
        if !self.marks.try_mark(DebounceKind::Conduct, bar) {
            return false;
        }
        self.last_invocation = Some(Instant::now());
        true
    }

    /// Claims an entry evaluation for `side` on `bar`. At most one per bar
    /// per side, and never on the bar a trade closed.
    pub fn begin_entry(&mut self, side: Side, bar: i64) -> bool {
        if self.marks.is_marked(DebounceKind::TradeClosed, bar) {
            return false;
        }
        self.marks.try_mark(DebounceKind::entry(side), bar)
    }

    /// A new position starts a fresh invocation interval.
    pub fn note_position_opened(&mut self) {
        self.last_invocation = Some(Instant::now());
    }

    /// A close (target, stop, manual or advisory) marks the bar so entry
    /// evaluation cannot refire on it, and clears the invocation clock for
    /// the next position.
    pub fn note_position_closed(&mut self, bar: i64) {
        self.marks.try_mark(DebounceKind::TradeClosed, bar);
        self.last_invocation = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const BAR: i64 = 1_700_000_000_000;

    #[tokio::test(start_paused = true)]
    async fn first_conduct_fires_immediately_when_requested() {
        let mut scheduler = AdvisoryScheduler::new(Duration::from_secs(900), true);
        assert!(scheduler.begin_conduct(BAR));
    }

    #[tokio::test(start_paused = true)]
    async fn without_the_flag_the_first_conduct_waits_an_interval() {
        let mut scheduler = AdvisoryScheduler::new(Duration::from_secs(900), false);
        assert!(!scheduler.begin_conduct(BAR));

        tokio::time::advance(Duration::from_secs(901)).await;
        assert!(scheduler.begin_conduct(BAR));
    }

    #[tokio::test(start_paused = true)]
    async fn a_bar_conducts_at_most_once() {
        let mut scheduler = AdvisoryScheduler::new(Duration::from_secs(1), true);
        assert!(scheduler.begin_conduct(BAR));

        // Interval elapses, but we are still inside the same bar.
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(!scheduler.begin_conduct(BAR));
        // The next bar is free to conduct again.
        assert!(scheduler.begin_conduct(BAR + 300_000));
    }

    #[tokio::test(start_paused = true)]
    async fn conducts_are_interval_gated() {
        let mut scheduler = AdvisoryScheduler::new(Duration::from_secs(900), true);
        assert!(scheduler.begin_conduct(BAR));
        assert!(!scheduler.begin_conduct(BAR + 300_000));

        tokio::time::advance(Duration::from_secs(901)).await;
        assert!(scheduler.begin_conduct(BAR + 600_000));
    }

    #[tokio::test(start_paused = true)]
    async fn a_new_position_restarts_the_interval() {
        let mut scheduler = AdvisoryScheduler::new(Duration::from_secs(900), true);
        assert!(scheduler.begin_conduct(BAR));

        tokio::time::advance(Duration::from_secs(901)).await;
        scheduler.note_position_opened();
        // The elapsed time before the open no longer counts.
        assert!(!scheduler.begin_conduct(BAR + 600_000));
        tokio::time::advance(Duration::from_secs(901)).await;
        assert!(scheduler.begin_conduct(BAR + 900_000));
    }

    #[tokio::test(start_paused = true)]
    async fn entries_fire_once_per_bar_per_side() {
        let mut scheduler = AdvisoryScheduler::new(Duration::from_secs(900), false);
        assert!(scheduler.begin_entry(Side::Long, BAR));
        assert!(!scheduler.begin_entry(Side::Long, BAR));
        // The other side keeps its own mark.
        assert!(scheduler.begin_entry(Side::Short, BAR));
        // A new bar resets both.
        assert!(scheduler.begin_entry(Side::Long, BAR + 300_000));
    }

    #[tokio::test(start_paused = true)]
    async fn the_closing_bar_never_reenters() {
        // A close and a re-entry can never share a bar.
        let mut scheduler = AdvisoryScheduler::new(Duration::from_secs(900), false);
        scheduler.note_position_closed(BAR);
        assert!(!scheduler.begin_entry(Side::Long, BAR));
        assert!(!scheduler.begin_entry(Side::Short, BAR));
        assert!(scheduler.begin_entry(Side::Long, BAR + 300_000));
    }
}
