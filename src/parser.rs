//! Tolerant Q:/A: extraction from model output.
//!
//! Models rarely follow the requested format exactly: they bold the markers,
//! add blank lines, repeat a question, or emit stray answers. The scan below
//! is a two-state automaton that keeps whatever pairs it can and drops the
//! rest. It never fails.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    NoPendingQuestion,
    PendingQuestion(String),
}

enum Line<'a> {
    Question(&'a str),
    Answer(&'a str),
    Other,
}

pub fn parse_flashcards(text: &str) -> Vec<QaPair> {
    let mut pairs = Vec::new();
    let mut state = State::NoPendingQuestion;

    for raw in text.lines() {
        state = match (classify(raw), state) {
            // A new question replaces any unmatched one.
            (Line::Question(q), _) => State::PendingQuestion(q.to_string()),
            (Line::Answer(a), State::PendingQuestion(q)) if !a.is_empty() => {
                pairs.push(QaPair {
                    question: q,
                    answer: a.to_string(),
                });
                State::NoPendingQuestion
            }
            (_, s) => s,
        };
    }

    pairs
}

fn strip_decoration(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_whitespace() || c == '*' || c == ':')
}

fn classify(raw: &str) -> Line<'_> {
    let line = strip_decoration(raw);
    if line.chars().count() < 2 {
        return Line::Other;
    }
    if let Some(rest) = line.strip_prefix("Q:") {
        Line::Question(strip_decoration(rest))
    } else if let Some(rest) = line.strip_prefix("A:") {
        Line::Answer(strip_decoration(rest))
    } else {
        Line::Other
    }
}
