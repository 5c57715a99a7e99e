//! Stdin prompts.

use std::io::{self, BufRead, Write};

use meal_planner::sync::{ConflictChoice, ConflictInfo, ConflictResolver};

/// Asks a `[y/N]` question. Anything but "y"/"yes" is a no.
pub fn confirm(question: &str) -> io::Result<bool> {
    print!("{} [y/N] ", question);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(parse_yes(&input))
}

fn parse_yes(input: &str) -> bool {
    let input = input.trim();
    input.eq_ignore_ascii_case("y") || input.eq_ignore_ascii_case("yes")
}

fn parse_choice(input: &str) -> Option<ConflictChoice> {
    match input.trim().to_lowercase().as_str() {
        "m" | "merge" => Some(ConflictChoice::Merge),
        "o" | "overwrite" => Some(ConflictChoice::Overwrite),
        "c" | "cancel" | "" => Some(ConflictChoice::Cancel),
        _ => None,
    }
}

/// Asks on the terminal how to resolve a conflicting save.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinResolver;

impl StdinResolver {
    fn ask<R: BufRead, W: Write>(
        &self,
        conflict: &ConflictInfo,
        input: &mut R,
        output: &mut W,
    ) -> io::Result<ConflictChoice> {
        writeln!(output, "The shared plan was changed by another session.")?;
        if let Some(ts) = conflict.remote_timestamp {
            writeln!(output, "  Remote updated: {}", ts)?;
        }
        writeln!(
            output,
            "  Local: {} meals, remote: {} meals ({} only on the remote)",
            conflict.local.meals.len(),
            conflict.remote.meals.len(),
            conflict.remote_only_meals
        )?;

        loop {
            write!(output, "[m]erge / [o]verwrite / [c]ancel? ")?;
            output.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                return Ok(ConflictChoice::Cancel);
            }
            match parse_choice(&line) {
                Some(choice) => return Ok(choice),
                None => writeln!(output, "Please answer m, o or c.")?,
            }
        }
    }
}

impl ConflictResolver for StdinResolver {
    fn resolve(&self, conflict: &ConflictInfo) -> ConflictChoice {
        // The shell owns stdin while a timer-started save runs; leave the
        // changes pending for the next foreground save instead of prompting.
        if conflict.background {
            tracing::warn!("Background save hit a conflict; changes stay pending");
            return ConflictChoice::Cancel;
        }
        let stdin = io::stdin();
        let mut input = stdin.lock();
        self.ask(conflict, &mut input, &mut io::stdout())
            .unwrap_or_else(|e| {
                tracing::warn!("Could not read conflict choice, cancelling save: {}", e);
                ConflictChoice::Cancel
            })
    }
}
