//! Interactive decisions on the terminal

use std::io::{self, BufRead, Write};

use tracing::warn;

use crate::app::integrity::{CollisionDecision, CollisionPrompt};
use crate::app::models::Item;

/// Line-based prompt over any reader and writer; stdin/stdout in the CLI
pub struct LinePrompt<R, W> {
    input: R,
    output: W,
}

impl LinePrompt<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> LinePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, question: &str) -> io::Result<String> {
        write!(self.output, "{}", question)?;
        self.output.flush()?;
        let mut answer = String::new();
        self.input.read_line(&mut answer)?;
        Ok(answer.trim().to_lowercase())
    }

    /// Yes/no question defaulting to no
    pub fn confirm(&mut self, question: &str) -> io::Result<bool> {
        let answer = self.ask(&format!("{} [y/N]: ", question))?;
        Ok(matches!(answer.as_str(), "y" | "yes"))
    }

    fn describe(&mut self, tag: &str, item: &Item) -> io::Result<()> {
        writeln!(
            self.output,
            "  [{}] {} | guid {} | #{} | {} | downloaded: {}",
            tag,
            item.label(),
            item.guid,
            item.episode_count,
            item.pub_date
                .map(|date| date.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "undated".to_string()),
            item.downloaded
        )
    }

    fn try_decide(&mut self, first: &Item, second: &Item) -> io::Result<CollisionDecision> {
        writeln!(self.output, "Items share filename {}:", first.filename)?;
        self.describe("1", first)?;
        self.describe("2", second)?;
        loop {
            let answer = self.ask("Keep [1], keep [2] or [s]kip? ")?;
            match answer.as_str() {
                "1" => return Ok(CollisionDecision::KeepFirst),
                "2" => return Ok(CollisionDecision::KeepSecond),
                "s" | "" => return Ok(CollisionDecision::Skip),
                _ => writeln!(self.output, "Please answer 1, 2 or s")?,
            }
        }
    }
}

impl<R: BufRead, W: Write> CollisionPrompt for LinePrompt<R, W> {
    fn decide(&mut self, first: &Item, second: &Item) -> CollisionDecision {
        self.try_decide(first, second).unwrap_or_else(|e| {
            warn!("Prompt failed, skipping collision: {}", e);
            CollisionDecision::Skip
        })
    }
}
