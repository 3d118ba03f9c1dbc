//! Terminal prompt surface: agent text to stdout, confirmations and
//! questions over stdin. Reads run on the blocking pool so the runtime
//! stays responsive.

use crate::domain::traits::{Approval, UserPrompt};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::Write;

pub struct Console;

impl Console {
    pub fn new() -> Self {
        Self
    }

    async fn read_line(prompt: String) -> Result<Option<String>> {
        let line = tokio::task::spawn_blocking(move || -> Result<Option<String>> {
            let mut stdout = std::io::stdout();
            write!(stdout, "{}", prompt)?;
            stdout.flush()?;
            let mut input = String::new();
            let read = std::io::stdin()
                .read_line(&mut input)
                .context("Failed to read from stdin")?;
            if read == 0 {
                return Ok(None);
            }
            Ok(Some(input.trim().to_string()))
        })
        .await
        .context("Input task failed")??;
        Ok(line)
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserPrompt for Console {
    async fn say(&self, text: &str) -> Result<()> {
        println!("\n{}\n", text);
        Ok(())
    }

    async fn ask(&self, prompt: &str) -> Result<Option<String>> {
        let answer = Self::read_line(format!("{} ", prompt)).await?;
        match answer {
            Some(line) if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") => {
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn confirm(&self, prompt: &str, allow_session: bool) -> Result<Approval> {
        let options = if allow_session {
            "[y]es / [a]lways this session / [n]o"
        } else {
            "[y]es / [n]o"
        };
        loop {
            let answer = Self::read_line(format!("{} {} ", prompt, options)).await?;
            let Some(answer) = answer else {
                return Ok(Approval::No);
            };
            match answer.to_lowercase().as_str() {
                "y" | "yes" => return Ok(Approval::Yes),
                "a" | "always" if allow_session => return Ok(Approval::YesForSession),
                "n" | "no" | "" => return Ok(Approval::No),
                _ => println!("Please answer {}", options),
            }
        }
    }
}
