use std::io::{BufRead, Write};
use std::time::Instant;

use anyhow::Result;

use crate::chatbot::Chatbot;

pub const BANNER: &str =
    "Advanced Chatbot with Long-term Memory is initialized. Type 'exit' to end the conversation.";

/// Terminal chat loop. Reads one message per line until `exit` or EOF;
/// blank lines are skipped.
pub fn run_repl<R: BufRead, W: Write>(bot: &mut Chatbot, mut input: R, mut out: W) -> Result<()> {
    writeln!(out, "{BANNER}")?;

    loop {
        write!(out, "\nYou: ")?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(out, "\nGoodbye!")?;
            break;
        }
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if message.eq_ignore_ascii_case("exit") {
            writeln!(out, "Goodbye!")?;
            break;
        }

        writeln!(out, "\nThinking...")?;
        let start = Instant::now();
        let response = bot.chat(message);
        let secs = start.elapsed().as_secs_f64();
        writeln!(out, "\nAssistant ({secs:.2}s): {response}")?;
    }
    out.flush()?;
    Ok(())
}
