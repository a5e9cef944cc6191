//! # Terminal output
//!
//! Colored rendering of search answers, ingest summaries and model tables
//! with `crossterm`. Each function writes to any [`Write`] so the output can
//! be captured in tests; the CLI passes `stdout()`.

use crossterm::{
    QueueableCommand,
    style::{Attribute, Color, Print, SetAttribute, SetForegroundColor},
};
use std::io::{self, Write};

use crate::{
    llm::LlmModel,
    llm::registry::ModelSelector,
    search::{SearchOutcome, SyncResults},
};

fn heading<W: Write>(out: &mut W, text: &str, color: Color) -> io::Result<()> {
    out.queue(SetForegroundColor(color))?;
    out.queue(SetAttribute(Attribute::Bold))?;
    out.queue(Print(text))?;
    out.queue(SetAttribute(Attribute::Reset))?;
    out.queue(SetForegroundColor(Color::Reset))?;
    out.queue(Print("\n"))?;
    Ok(())
}

fn field<W: Write>(out: &mut W, label: &str, value: &str) -> io::Result<()> {
    if value.is_empty() {
        return Ok(());
    }
    out.queue(SetForegroundColor(Color::DarkGrey))?;
    out.queue(Print(format!("  {label:<10} ")))?;
    out.queue(SetForegroundColor(Color::Reset))?;
    out.queue(Print(value))?;
    out.queue(Print("\n"))?;
    Ok(())
}

/// Green from 80%, yellow from 50%, red below.
fn score_color(score: u32) -> Color {
    match score {
        80.. => Color::Green,
        50..=79 => Color::Yellow,
        _ => Color::Red,
    }
}

pub fn print_search_outcome<W: Write>(out: &mut W, outcome: &SearchOutcome) -> io::Result<()> {
    heading(out, &format!("Search: {}", outcome.query), Color::Cyan)?;
    out.queue(Print(format!("{}\n\n", outcome.final_answer.trim())))?;

    heading(
        out,
        &format!(
            "{} match(es) in {}ms",
            outcome.total_found, outcome.processing_time_ms
        ),
        Color::Blue,
    )?;

    for hit in &outcome.results {
        out.queue(SetForegroundColor(score_color(hit.match_score)))?;
        out.queue(Print(format!("{:>3}% ", hit.match_score)))?;
        out.queue(SetForegroundColor(Color::Reset))?;
        out.queue(SetAttribute(Attribute::Bold))?;
        out.queue(Print(&hit.name))?;
        out.queue(SetAttribute(Attribute::Reset))?;
        out.queue(Print("\n"))?;

        field(out, "Role", hit.role.as_deref().unwrap_or_default())?;
        field(out, "Location", hit.location.as_deref().unwrap_or_default())?;
        field(out, "Email", hit.email.as_deref().unwrap_or_default())?;
        field(out, "Skills", &hit.skills.join(", "))?;
        field(out, "Why", &hit.match_reason)?;
        out.queue(Print("\n"))?;
    }

    out.flush()
}

pub fn print_sync_results<W: Write>(out: &mut W, results: &SyncResults) -> io::Result<()> {
    let color = if results.failed == 0 {
        Color::Green
    } else {
        Color::Yellow
    };
    heading(
        out,
        &format!(
            "Ingested {} of {} profile(s), {} failed",
            results.plain_text, results.total, results.failed
        ),
        color,
    )?;
    out.flush()
}

pub fn print_models<W: Write>(out: &mut W, models: &[&LlmModel]) -> io::Result<()> {
    heading(
        out,
        &format!(
            "{:<24} {:<10} {:>9} {:>11} {:>8}",
            "MODEL", "PROVIDER", "CONTEXT", "$/1K TOKENS", "SCORE"
        ),
        Color::Cyan,
    )?;
    for model in models {
        let context = model
            .context_window
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        out.queue(Print(format!(
            "{:<24} {:<10} {:>9} {:>11.5} {:>8.1}\n",
            model.id,
            model.provider.as_str(),
            context,
            model.total_cost(),
            ModelSelector::score(model)
        )))?;
    }
    if models.is_empty() {
        out.queue(SetForegroundColor(Color::Yellow))?;
        out.queue(Print("No model matches.\n"))?;
        out.queue(SetForegroundColor(Color::Reset))?;
    }
    out.flush()
}
