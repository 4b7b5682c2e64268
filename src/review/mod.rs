//! Interactive review over a fixed snapshot of due cards.
//!
//! The session is a pure state machine: it never touches storage while it
//! runs. When it ends, [`write_back`] consumes it and persists the outcome of
//! every card that was actually answered. Cards the reviewer never reached are
//! left exactly as they were.

pub mod terminal;

use tracing::warn;

use crate::db::{Flashcard, Store};
use crate::error::Error;
use crate::schedule::{Interval, INCORRECT_INTERVAL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Unanswered,
    Correct(Interval),
    Incorrect,
}

impl Outcome {
    /// Value to persist, or `None` when the card must not be written.
    pub fn revisit_in(self) -> Option<i64> {
        match self {
            Outcome::Unanswered => None,
            Outcome::Correct(interval) => Some(interval.days()),
            Outcome::Incorrect => Some(INCORRECT_INTERVAL),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CardRecord {
    pub card: Flashcard,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Question,
    Answer,
    IntervalChoice,
    Done,
    Quit,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Quit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Reveal,
    MarkCorrect,
    MarkIncorrect,
    Choose(Interval),
    Quit,
}

#[derive(Debug)]
pub struct ReviewSession {
    records: Vec<CardRecord>,
    position: usize,
    phase: Phase,
}

impl ReviewSession {
    /// Start on the first card. An empty snapshot has nothing to review.
    pub fn start(cards: Vec<Flashcard>) -> Option<Self> {
        if cards.is_empty() {
            return None;
        }
        let records = cards
            .into_iter()
            .map(|card| CardRecord {
                card,
                outcome: Outcome::Unanswered,
            })
            .collect();
        Some(Self {
            records,
            position: 0,
            phase: Phase::Question,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Card under review, if the session is still running.
    pub fn current(&self) -> Option<&Flashcard> {
        if self.is_finished() {
            None
        } else {
            self.records.get(self.position).map(|r| &r.card)
        }
    }

    /// 1-based position and total, for progress display.
    pub fn progress(&self) -> (usize, usize) {
        let total = self.records.len();
        ((self.position + 1).min(total), total)
    }

    pub fn records(&self) -> &[CardRecord] {
        &self.records
    }

    pub fn correct_count(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Correct(_)))
    }

    pub fn incorrect_count(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Incorrect))
    }

    fn count(&self, pred: impl Fn(Outcome) -> bool) -> usize {
        self.records.iter().filter(|r| pred(r.outcome)).count()
    }

    /// Apply one input event. Events that make no sense in the current phase
    /// are ignored.
    pub fn handle(&mut self, event: Event) -> Phase {
        self.phase = match (self.phase, event) {
            (p, _) if p.is_terminal() => p,
            (_, Event::Quit) => Phase::Quit,
            (Phase::Question, Event::Reveal) => Phase::Answer,
            (Phase::Answer, Event::MarkCorrect) => Phase::IntervalChoice,
            (Phase::Answer, Event::MarkIncorrect) => self.advance(Outcome::Incorrect),
            (Phase::IntervalChoice, Event::Choose(interval)) => {
                self.advance(Outcome::Correct(interval))
            }
            (p, _) => p,
        };
        self.phase
    }

    fn advance(&mut self, outcome: Outcome) -> Phase {
        self.records[self.position].outcome = outcome;
        if self.position + 1 < self.records.len() {
            self.position += 1;
            Phase::Question
        } else {
            Phase::Done
        }
    }
}

#[derive(Debug, Default)]
pub struct WriteBackReport {
    pub correct: usize,
    pub incorrect: usize,
    pub unanswered: usize,
    pub failed: Vec<(i64, Error)>,
}

/// Persist answered cards. Consuming the session means no card can be written
/// twice. A failed update is recorded and the remaining cards are still
/// written.
pub fn write_back(store: &Store, session: ReviewSession) -> WriteBackReport {
    let mut report = WriteBackReport::default();
    for record in session.records {
        let Some(revisit_in) = record.outcome.revisit_in() else {
            report.unanswered += 1;
            continue;
        };
        match store.update(record.card.id, revisit_in) {
            Ok(()) => match record.outcome {
                Outcome::Incorrect => report.incorrect += 1,
                _ => report.correct += 1,
            },
            Err(e) => {
                warn!(id = record.card.id, "review update failed: {}", e);
                report.failed.push((record.card.id, e));
            }
        }
    }
    report
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewFlashcard;

    fn seeded(n: usize) -> Store {
        let store = Store::open_in_memory().unwrap();
        for i in 0..n {
            store
                .insert(&NewFlashcard {
                    file: "/notes/a.md".into(),
                    question: format!("q{}", i),
                    answer: format!("a{}", i),
                    revisit_in: 0,
                })
                .unwrap();
        }
        store
    }

    fn session(store: &Store) -> ReviewSession {
        ReviewSession::start(store.query_due().unwrap()).unwrap()
    }

    fn answer_correct(s: &mut ReviewSession, interval: Interval) {
        s.handle(Event::Reveal);
        s.handle(Event::MarkCorrect);
        s.handle(Event::Choose(interval));
    }

    fn answer_incorrect(s: &mut ReviewSession) {
        s.handle(Event::Reveal);
        s.handle(Event::MarkIncorrect);
    }

    #[test]
    fn empty_snapshot_never_starts() {
        assert!(ReviewSession::start(Vec::new()).is_none());
    }

    #[test]
    fn walks_question_answer_interval_then_done() {
        let store = seeded(1);
        let mut s = session(&store);
        assert_eq!(s.phase(), Phase::Question);
        assert_eq!(s.handle(Event::Reveal), Phase::Answer);
        assert_eq!(s.handle(Event::MarkCorrect), Phase::IntervalChoice);
        assert_eq!(s.handle(Event::Choose(Interval::ThreeDays)), Phase::Done);
        assert!(s.current().is_none());
        assert_eq!(s.records()[0].outcome, Outcome::Correct(Interval::ThreeDays));
    }

    #[test]
    fn incorrect_skips_interval_choice() {
        let store = seeded(2);
        let mut s = session(&store);
        s.handle(Event::Reveal);
        assert_eq!(s.handle(Event::MarkIncorrect), Phase::Question);
        assert_eq!(s.current().unwrap().question, "q1");
        assert_eq!(s.progress(), (2, 2));
    }

    #[test]
    fn out_of_phase_events_are_ignored() {
        let store = seeded(1);
        let mut s = session(&store);
        assert_eq!(s.handle(Event::MarkCorrect), Phase::Question);
        assert_eq!(s.handle(Event::Choose(Interval::OneDay)), Phase::Question);
        s.handle(Event::Reveal);
        assert_eq!(s.handle(Event::Reveal), Phase::Answer);
        assert_eq!(s.handle(Event::Choose(Interval::OneDay)), Phase::Answer);
        assert_eq!(s.records()[0].outcome, Outcome::Unanswered);
    }

    #[test]
    fn quit_is_terminal_from_any_running_phase() {
        for steps in 0..3 {
            let store = seeded(2);
            let mut s = session(&store);
            let script = [Event::Reveal, Event::MarkCorrect];
            for e in script.iter().take(steps) {
                s.handle(*e);
            }
            assert_eq!(s.handle(Event::Quit), Phase::Quit);
            assert_eq!(s.handle(Event::Reveal), Phase::Quit);
            assert!(s.records().iter().all(|r| r.outcome == Outcome::Unanswered));
        }
    }

    #[test]
    fn counts_track_outcomes() {
        let store = seeded(3);
        let mut s = session(&store);
        answer_correct(&mut s, Interval::SevenDays);
        answer_incorrect(&mut s);
        assert_eq!((s.correct_count(), s.incorrect_count()), (1, 1));
        assert_eq!(s.progress(), (3, 3));
    }

    #[test]
    fn incorrect_persists_one_day() {
        let store = seeded(1);
        let mut s = session(&store);
        answer_incorrect(&mut s);
        assert_eq!(s.phase(), Phase::Done);

        let report = write_back(&store, s);
        assert_eq!(report.incorrect, 1);
        assert_eq!(store.query_all().unwrap()[0].revisit_in, 1);
    }

    #[test]
    fn correct_persists_chosen_interval() {
        let store = seeded(1);
        let mut s = session(&store);
        answer_correct(&mut s, Interval::SevenDays);

        let report = write_back(&store, s);
        assert_eq!(report.correct, 1);
        assert_eq!(store.query_all().unwrap()[0].revisit_in, 7);
    }

    #[test]
    fn quit_leaves_unreached_cards_untouched() {
        let store = seeded(4);
        let before = store.query_due().unwrap();
        let mut s = ReviewSession::start(before.clone()).unwrap();
        answer_correct(&mut s, Interval::NineDays);
        answer_incorrect(&mut s);
        s.handle(Event::Reveal);
        s.handle(Event::Quit);

        let report = write_back(&store, s);
        assert_eq!((report.correct, report.incorrect, report.unanswered), (1, 1, 2));
        assert!(report.failed.is_empty());

        let after = store.query_all().unwrap();
        let by_id = |id: i64| after.iter().find(|c| c.id == id).unwrap().clone();
        assert_eq!(by_id(before[0].id).revisit_in, 9);
        assert_eq!(by_id(before[1].id).revisit_in, 1);
        assert_eq!(by_id(before[2].id), before[2]);
        assert_eq!(by_id(before[3].id), before[3]);
    }

    #[test]
    fn snapshot_is_authoritative_and_failures_do_not_block_others() {
        let store = seeded(3);
        let mut s = session(&store);
        let gone = s.records()[1].card.id;
        // Deleted behind the session's back: its update fails, the rest land.
        store.delete(gone).unwrap();
        answer_correct(&mut s, Interval::ThreeDays);
        answer_incorrect(&mut s);
        answer_correct(&mut s, Interval::OneDay);

        let report = write_back(&store, s);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, gone);
        assert_eq!((report.correct, report.incorrect), (2, 0));

        let revisits: Vec<i64> = store
            .query_all()
            .unwrap()
            .iter()
            .map(|c| c.revisit_in)
            .collect();
        assert_eq!(revisits, vec![1, 3]);
    }
}
