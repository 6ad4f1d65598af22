//! The command dispatcher: reads lines, validates them, and hands them to
//! registered command handlers.

use std::sync::Arc;

use drover_core::{Error, Result};

use crate::command::Command;
use crate::editor::Terminal;
use crate::parse::parse_line;

impl Terminal {
    /// Read-eval loop over the operator's input. Unknown commands,
    /// rejected flags, and handler failures are printed to the operator
    /// and the loop continues; only end-of-input (Ctrl-D on an empty
    /// line, or a handler returning it) ends the loop.
    pub async fn run(&self) -> Result<()> {
        let user = self
            .user
            .clone()
            .ok_or_else(|| Error::NotFound("operator user".to_string()))?;

        loop {
            let line = match self.read_line().await {
                Ok(line) => line,
                Err(Error::EndOfInput) => return Ok(()),
                Err(err) => return Err(err),
            };

            // Bracketed pastes are delivered, not executed.
            if line.pasted {
                self.write_str("ignoring pasted input, type commands to run them\n")
                    .await?;
                continue;
            }

            let parsed = parse_line(&line.text, 0);
            let Some(command_node) = parsed.command.clone() else {
                continue;
            };

            let handler: Option<Arc<dyn Command>> = {
                let regs = self.registries.read().expect("registry lock poisoned");
                regs.commands.get(&command_node.value).cloned()
            };
            let Some(handler) = handler else {
                let err = Error::UnknownCommand(command_node.value);
                self.write_str(&format!("{err}\n")).await?;
                continue;
            };

            if parsed.flags.contains_key("h") || parsed.flags.contains_key("help") {
                self.write_str(&handler.help(false)).await?;
                continue;
            }

            let valid = handler.valid_args();
            let mut failed: Vec<&String> = parsed
                .flags
                .keys()
                .filter(|name| {
                    !valid.contains_key(name.as_str())
                        && name.as_str() != "h"
                        && name.as_str() != "help"
                })
                .collect();

            if !failed.is_empty() {
                failed.sort();
                failed.dedup();
                let err = Error::InvalidFlag {
                    names: format!(
                        "\"{}\"",
                        failed
                            .iter()
                            .map(|s| s.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                    count: failed.len(),
                };
                self.write_str(&format!("{err}\n\n")).await?;
                self.write_str(&handler.help(false)).await?;
                continue;
            }

            match handler.run(&user, self, parsed).await {
                Ok(()) => {}
                Err(Error::EndOfInput) => return Ok(()),
                Err(err) => self.write_str(&format!("{err}\n")).await?,
            }
        }
    }
}
