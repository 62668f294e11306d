// 👆 Interactive selection
// Picking one metro area or zip code out of a listing. Anything that can
// answer "which index?" plugs in behind the `Selector` trait.

use std::collections::VecDeque;
use std::io::{BufRead, Write};
use tracing::warn;

pub trait Selector {
    /// Index of the chosen option, or `None` when the user declines
    fn select(&mut self, options: &[String]) -> Option<usize>;
}

// ============================================================================
// PROMPT SELECTOR
// ============================================================================

/// Line-oriented prompt. `q`/`Q` quits; anything that is not a valid index
/// asks again with the accepted range.
pub struct PromptSelector<R, W> {
    input: R,
    output: W,
    pub prompt: String,
}

impl<R: BufRead, W: Write> PromptSelector<R, W> {
    pub fn new(input: R, output: W, prompt: impl Into<String>) -> Self {
        PromptSelector {
            input,
            output,
            prompt: prompt.into(),
        }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn ask(&mut self, options: &[String]) -> std::io::Result<Option<usize>> {
        for (i, option) in options.iter().enumerate() {
            writeln!(self.output, "{:>4}  {}", i, option)?;
        }

        let mut text = format!("{}\nEnter 'Q/q' to quit\n", self.prompt);
        loop {
            write!(self.output, "{}", text)?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            let answer = line.trim();

            if answer.eq_ignore_ascii_case("q") {
                writeln!(self.output, "No selection made")?;
                return Ok(None);
            }
            if let Some(index) = answer.parse::<usize>().ok().filter(|i| *i < options.len()) {
                writeln!(self.output, "{} has been selected", options[index])?;
                return Ok(Some(index));
            }

            text = format!(
                "Please enter a valid index between 0 and {}\n{}\nEnter 'Q/q' to quit\n",
                options.len().saturating_sub(1),
                self.prompt
            );
        }
    }
}

impl<R: BufRead, W: Write> Selector for PromptSelector<R, W> {
    fn select(&mut self, options: &[String]) -> Option<usize> {
        if options.is_empty() {
            return None;
        }
        self.ask(options).unwrap_or_else(|err| {
            warn!(error = %err, "selection prompt failed");
            None
        })
    }
}

// ============================================================================
// CANNED SELECTOR
// ============================================================================

/// Replays fixed answers; out-of-range answers and an exhausted script decline
#[derive(Debug, Clone, Default)]
pub struct CannedSelector {
    answers: VecDeque<Option<usize>>,
}

impl CannedSelector {
    pub fn new(answers: impl IntoIterator<Item = Option<usize>>) -> Self {
        CannedSelector {
            answers: answers.into_iter().collect(),
        }
    }

    /// Pick the option equal to `value` if present
    pub fn by_value(options: &[String], value: &str) -> Self {
        Self::new([options.iter().position(|o| o == value)])
    }
}

impl Selector for CannedSelector {
    fn select(&mut self, options: &[String]) -> Option<usize> {
        self.answers
            .pop_front()
            .flatten()
            .filter(|i| *i < options.len())
    }
}
