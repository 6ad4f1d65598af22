//! Tab-completion orchestration.
//!
//! The first Tab snapshots the line and cursor as the completion base;
//! candidates are always computed against that base, while the
//! replacement is rebuilt from the live line, so cycling through
//! candidates replaces the previous suggestion instead of accumulating.

use crate::editor::Terminal;
use crate::parse::{parse_line, Node, NodeKind};

/// Well-known value-trie tags.
pub mod tags {
    /// Registered command names. Wired up by the editor itself.
    pub const COMMANDS: &str = "<commands>";

    /// Controllee ids and aliases, as registered by the server when it
    /// hands a user's autocomplete index to the editor.
    pub const CLIENTS: &str = "<clients>";
}

/// Completion state between keystrokes. Any non-Tab key resets it.
#[derive(Debug, Default)]
pub(crate) struct AutoCompleteState {
    pub(crate) active: bool,
    /// Cycle position within the sorted candidate list.
    pub(crate) index: usize,
    /// The line as it was when completion started.
    pub(crate) pending: String,
    /// Byte cursor position within `pending`.
    pub(crate) pos: usize,
}

impl AutoCompleteState {
    pub(crate) fn reset(&mut self) {
        self.active = false;
        self.index = 0;
        self.pending.clear();
        self.pos = 0;
    }

    fn start(&mut self, line: &str, pos: usize) {
        self.active = true;
        self.index = 0;
        self.pending = line.to_string();
        self.pos = pos;
    }
}

impl Terminal {
    /// Handle one Tab press. `line`/`pos_chars` describe the live input;
    /// the return value is the replacement line and cursor (as code-point
    /// index), or `None` when there is nothing to complete.
    pub(crate) fn autocomplete_tab(
        &self,
        line: &str,
        pos_chars: usize,
    ) -> Option<(Vec<char>, usize)> {
        let pos_bytes = byte_offset(line, pos_chars);

        let mut auto = self.auto.lock().expect("autocomplete lock poisoned");
        if !auto.active {
            auto.start(line, pos_bytes);
        }

        let base = parse_line(&auto.pending, auto.pos);
        let regs = self.registries.read().expect("registry lock poisoned");

        let mut matches: Vec<String> = match (&base.command, &base.focus) {
            // Nothing typed yet: offer every command.
            (None, _) => regs.command_index.prefix_match(""),
            // Completing the command token itself.
            (Some(_), Some(focus)) if focus.start == 0 => {
                regs.command_index.prefix_match(&focus.value)
            }
            // Delegate to the command's declared expectations.
            (Some(command), _) => {
                let mut out = Vec::new();
                if let Some(handler) = regs.commands.get(&command.value) {
                    if let Some(expected) = handler.expect(&base) {
                        out = expected;
                        // A single <tag> placeholder pulls candidates from
                        // the registered value tries instead.
                        if out.len() == 1 && is_placeholder(&out[0]) {
                            if let Some(tries) = regs.value_tries.get(&out[0]) {
                                let search = base
                                    .focus
                                    .as_ref()
                                    .map(|f| f.value.clone())
                                    .unwrap_or_default();
                                out = tries
                                    .iter()
                                    .flat_map(|t| t.prefix_match(&search))
                                    .collect();
                            }
                        }
                    }
                }
                out
            }
        };
        drop(regs);

        matches.sort();

        // Replacements splice into the live line, not the base.
        let current = parse_line(line, pos_bytes);

        if matches.len() == 1 {
            auto.reset();
            let (mut output, mut new_pos) =
                build_display_line(current.focus.as_ref(), line, &matches[0], pos_bytes);
            if current
                .focus
                .as_ref()
                .is_some_and(|f| f.kind == NodeKind::Command)
            {
                output.push(' ');
                new_pos += 1;
            }
            return Some(to_char_line(output, new_pos));
        }

        if matches.len() > 1 {
            let candidate = matches[auto.index % matches.len()].clone();
            auto.index = (auto.index + 1) % matches.len();
            let (output, new_pos) =
                build_display_line(current.focus.as_ref(), line, &candidate, pos_bytes);
            return Some(to_char_line(output, new_pos));
        }

        None
    }
}

fn is_placeholder(s: &str) -> bool {
    s.len() > 1 && s.starts_with('<') && s.ends_with('>')
}

/// Splice `candidate` into `line`, replacing the focused token (or
/// inserting at the cursor when nothing is focused). Returns the new
/// line and the byte cursor position just after the candidate.
pub(crate) fn build_display_line(
    focus: Option<&Node>,
    line: &str,
    candidate: &str,
    cursor: usize,
) -> (String, usize) {
    let Some(focus) = focus else {
        let mut output = line[..cursor].to_string();
        output.push_str(candidate);
        let new_pos = output.len();
        output.push_str(&line[cursor..]);
        return (output, new_pos);
    };

    let mut output = match focus.kind {
        NodeKind::Command | NodeKind::Argument => line[..focus.start].to_string(),
        // Flags keep their own text; the candidate lands after them.
        NodeKind::Flag => format!("{} ", &line[..focus.end]),
    };
    output.push_str(candidate);
    let new_pos = output.len();
    output.push_str(&line[focus.end..]);
    (output, new_pos)
}

fn byte_offset(line: &str, pos_chars: usize) -> usize {
    line.char_indices()
        .nth(pos_chars)
        .map(|(i, _)| i)
        .unwrap_or(line.len())
}

fn to_char_line(line: String, pos_bytes: usize) -> (Vec<char>, usize) {
    // Count without slicing: the position may sit inside a rune when a
    // committed candidate pushed the cursor past multibyte trailing text.
    let pos_chars = line
        .char_indices()
        .take_while(|(i, _)| *i < pos_bytes)
        .count();
    (line.chars().collect(), pos_chars)
}
