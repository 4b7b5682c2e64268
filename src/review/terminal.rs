use std::io::{self, Write};

use anyhow::Result;
use crossterm::event::{self, Event as TermEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor};
use crossterm::terminal::{
    self, disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::{cursor, execute, queue};

use super::{Event, Outcome, Phase, ReviewSession};
use crate::schedule::Interval;

/// Drive `session` from keyboard input until it reaches a terminal phase.
pub fn run(session: &mut ReviewSession) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

    let result = run_loop(&mut stdout, session);

    execute!(stdout, cursor::Show, LeaveAlternateScreen)?;
    disable_raw_mode()?;
    result
}

fn run_loop(out: &mut impl Write, session: &mut ReviewSession) -> Result<()> {
    loop {
        draw(out, session)?;

        // Blocks until the next input event; the session has no timeout.
        let TermEvent::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        if session.is_finished() {
            return Ok(());
        }
        if let Some(e) = event_for_key(session.phase(), key) {
            if session.handle(e) == Phase::Quit {
                return Ok(());
            }
        }
    }
}

/// Key bindings: Enter/space reveals, `c`/`i` mark correct or incorrect,
/// `1` `3` `7` `9` pick the interval, `q`/Esc/Ctrl-C quit.
pub fn event_for_key(phase: Phase, key: KeyEvent) -> Option<Event> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(Event::Quit);
    }
    match (phase, key.code) {
        (_, KeyCode::Char('q')) | (_, KeyCode::Esc) => Some(Event::Quit),
        (Phase::Question, KeyCode::Enter | KeyCode::Char(' ')) => Some(Event::Reveal),
        (Phase::Answer, KeyCode::Char('c')) => Some(Event::MarkCorrect),
        (Phase::Answer, KeyCode::Char('i')) => Some(Event::MarkIncorrect),
        (Phase::IntervalChoice, KeyCode::Char(k)) => Interval::from_key(k).map(Event::Choose),
        _ => None,
    }
}

fn draw(out: &mut impl Write, session: &ReviewSession) -> Result<()> {
    queue!(
        out,
        terminal::Clear(terminal::ClearType::All),
        cursor::MoveTo(0, 0)
    )?;

    let (pos, total) = session.progress();
    match (session.phase(), session.current()) {
        (Phase::Question, Some(card)) => {
            heading(out, "Question:", Color::Blue)?;
            line(out, &card.question)?;
            line(out, "")?;
            hint(out, "Press Enter to reveal the answer")?;
        }
        (Phase::Answer, Some(card)) => {
            heading(out, "Question:", Color::Blue)?;
            line(out, &card.question)?;
            line(out, "")?;
            heading(out, "Answer:", Color::Cyan)?;
            line(out, &card.answer)?;
            line(out, "")?;
            hint(out, "Was your answer correct? [c]orrect / [i]ncorrect")?;
        }
        (Phase::IntervalChoice, Some(_)) => {
            let choices: Vec<String> = Interval::ALL
                .iter()
                .map(|i| format!("[{}]", i.days()))
                .collect();
            heading(out, "Revisit in (days):", Color::Blue)?;
            line(out, &choices.join("  "))?;
        }
        _ => {
            let answered = session
                .records()
                .iter()
                .filter(|r| r.outcome != Outcome::Unanswered)
                .count();
            heading(out, "Review complete", Color::Green)?;
            line(out, &format!("{} of {} flashcards answered", answered, total))?;
            line(out, "")?;
            hint(out, "Press any key to exit")?;
        }
    }

    line(out, "")?;
    line(
        out,
        &format!(
            "correct {}   {}/{}   incorrect {}",
            session.correct_count(),
            pos,
            total,
            session.incorrect_count()
        ),
    )?;
    hint(out, "Press q to exit at any time")?;
    out.flush()?;
    Ok(())
}

// Raw mode: every line needs an explicit carriage return.
fn line(out: &mut impl Write, text: &str) -> Result<()> {
    for l in text.lines() {
        queue!(out, Print(l), Print("\r\n"))?;
    }
    if text.is_empty() {
        queue!(out, Print("\r\n"))?;
    }
    Ok(())
}

fn heading(out: &mut impl Write, text: &str, color: Color) -> Result<()> {
    queue!(
        out,
        SetAttribute(Attribute::Bold),
        SetForegroundColor(color),
        Print(text),
        ResetColor,
        SetAttribute(Attribute::Reset),
        Print("\r\n\r\n")
    )?;
    Ok(())
}

fn hint(out: &mut impl Write, text: &str) -> Result<()> {
    queue!(
        out,
        SetForegroundColor(Color::DarkGrey),
        Print(text),
        ResetColor,
        Print("\r\n")
    )?;
    Ok(())
}
