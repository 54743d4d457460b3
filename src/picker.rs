//! Interactive selection of one item from a candidate list.

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Context, Result};
use async_trait::async_trait;

/// Picks one of several labelled candidates.
#[async_trait]
pub trait Picker: Send + Sync {
    /// Returns the chosen index, or `None` when nothing was chosen.
    async fn pick(&self, prompt: &str, labels: &[String]) -> Result<Option<usize>>;

    /// Reads a free-text answer; `None` when nothing was entered.
    async fn ask(&self, prompt: &str) -> Result<Option<String>>;
}

/// Numbered prompt on stderr, answer read from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPicker;

#[async_trait]
impl Picker for StdinPicker {
    async fn pick(&self, prompt: &str, labels: &[String]) -> Result<Option<usize>> {
        match labels.len() {
            0 => return Ok(None),
            1 => return Ok(Some(0)),
            _ => {}
        }
        if !io::stdin().is_terminal() {
            return Ok(None);
        }

        let mut menu = format!("{prompt}\n");
        for (index, label) in labels.iter().enumerate() {
            menu.push_str(&format!("  {:>3}) {label}\n", index + 1));
        }
        menu.push_str(&format!("Select [1-{}]: ", labels.len()));

        let answer = read_line(menu).await?;
        Ok(parse_choice(&answer, labels.len()))
    }

    async fn ask(&self, prompt: &str) -> Result<Option<String>> {
        if !io::stdin().is_terminal() {
            return Ok(None);
        }
        let answer = read_line(format!("{prompt}: ")).await?;
        let answer = answer.trim();
        Ok(if answer.is_empty() {
            None
        } else {
            Some(answer.to_string())
        })
    }
}

async fn read_line(prompt: String) -> Result<String> {
    tokio::task::spawn_blocking(move || -> Result<String> {
        let mut stderr = io::stderr().lock();
        stderr.write_all(prompt.as_bytes())?;
        stderr.flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line)
    })
    .await
    .context("prompt task failed")?
    .context("failed to read answer from stdin")
}

/// Parses a 1-based answer into a 0-based index.
fn parse_choice(answer: &str, count: usize) -> Option<usize> {
    let choice = answer.trim().parse::<usize>().ok()?;
    choice.checked_sub(1).filter(|&index| index < count)
}
