//! Tokenises an operator line into command, flags, and arguments.
//!
//! Every node carries its byte span in the raw line so the autocomplete
//! engine can splice replacements without re-deriving offsets. The parser
//! also locates the node under the cursor (`focus`) and the nearest
//! enclosing node (`section`).

use std::collections::HashMap;

/// What a token is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Command,
    Flag,
    Argument,
}

/// One token, with its byte span `[start, end)` in the raw line. For
/// flags, `value` is the flag name (dashes and any `=value` stripped)
/// while the span covers the whole token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    pub value: String,
    pub start: usize,
    pub end: usize,
}

/// A tokenised line plus cursor context.
#[derive(Debug, Clone, Default)]
pub struct ParsedLine {
    /// First token, when the line has non-whitespace content.
    pub command: Option<Node>,
    /// Flag name to bound value (`--key=value`) or `None` for boolean
    /// presence. Later bindings win.
    pub flags: HashMap<String, Option<String>>,
    /// Non-flag tokens after the command, in order.
    pub arguments: Vec<Node>,
    /// The node whose span contains or abuts the cursor.
    pub focus: Option<Node>,
    /// The focus when there is one, else the nearest node ending at or
    /// before the cursor. `None` at the leading line edge.
    pub section: Option<Node>,
    /// The line as given.
    pub raw: String,
}

impl ParsedLine {
    /// The argument at `index`, when present.
    pub fn argument(&self, index: usize) -> Option<&Node> {
        self.arguments.get(index)
    }
}

/// Parse `line` with the cursor at byte offset `cursor`.
pub fn parse_line(line: &str, cursor: usize) -> ParsedLine {
    let mut parsed = ParsedLine {
        raw: line.to_string(),
        ..ParsedLine::default()
    };

    let mut nodes: Vec<Node> = Vec::new();
    let mut start: Option<usize> = None;

    let push_token = |nodes: &mut Vec<Node>, parsed: &mut ParsedLine, s: usize, e: usize| {
        let text = &line[s..e];
        let node = if nodes.is_empty() {
            Node {
                kind: NodeKind::Command,
                value: text.to_string(),
                start: s,
                end: e,
            }
        } else if text.starts_with('-') {
            let body = text.trim_start_matches('-');
            let (name, value) = match body.split_once('=') {
                Some((name, value)) => (name, Some(value.to_string())),
                None => (body, None),
            };
            parsed.flags.insert(name.to_string(), value);
            Node {
                kind: NodeKind::Flag,
                value: name.to_string(),
                start: s,
                end: e,
            }
        } else {
            Node {
                kind: NodeKind::Argument,
                value: text.to_string(),
                start: s,
                end: e,
            }
        };
        nodes.push(node);
    };

    for (i, c) in line.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                push_token(&mut nodes, &mut parsed, s, i);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        push_token(&mut nodes, &mut parsed, s, line.len());
    }

    for node in &nodes {
        match node.kind {
            NodeKind::Command => parsed.command = Some(node.clone()),
            NodeKind::Argument => parsed.arguments.push(node.clone()),
            NodeKind::Flag => {}
        }
    }

    // The cursor focuses a token when it sits inside it or immediately
    // after its last character (where typing extends the token).
    parsed.focus = nodes
        .iter()
        .find(|n| n.start <= cursor && cursor <= n.end)
        .cloned();

    parsed.section = match &parsed.focus {
        Some(focus) => Some(focus.clone()),
        None => nodes.iter().filter(|n| n.end <= cursor).next_back().cloned(),
    };

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_and_whitespace_lines_have_no_command() {
        assert!(parse_line("", 0).command.is_none());
        let parsed = parse_line("   ", 1);
        assert!(parsed.command.is_none());
        assert!(parsed.focus.is_none());
        assert!(parsed.section.is_none());
    }

    #[test]
    fn first_token_is_the_command() {
        let parsed = parse_line("kill alpha", 0);
        let cmd = parsed.command.unwrap();
        assert_eq!(cmd.kind, NodeKind::Command);
        assert_eq!(cmd.value, "kill");
        assert_eq!((cmd.start, cmd.end), (0, 4));
    }

    #[test]
    fn flags_bind_equals_values_and_default_to_presence() {
        let parsed = parse_line("connect --user=alice -v target", 0);
        assert_eq!(
            parsed.flags.get("user"),
            Some(&Some("alice".to_string()))
        );
        assert_eq!(parsed.flags.get("v"), Some(&None));
        assert_eq!(parsed.arguments.len(), 1);
        assert_eq!(parsed.arguments[0].value, "target");
    }

    #[test]
    fn flag_nodes_span_the_whole_token() {
        let parsed = parse_line("connect --user=alice", 10);
        let focus = parsed.focus.unwrap();
        assert_eq!(focus.kind, NodeKind::Flag);
        assert_eq!(focus.value, "user");
        assert_eq!((focus.start, focus.end), (8, 20));
    }

    #[test]
    fn arguments_keep_their_order() {
        let parsed = parse_line("ls one two three", 0);
        let values: Vec<&str> = parsed.arguments.iter().map(|a| a.value.as_str()).collect();
        assert_eq!(values, vec!["one", "two", "three"]);
    }

    #[test]
    fn cursor_at_token_end_focuses_the_token() {
        // Completing "hel<tab>" must see "hel" as the focused command.
        let parsed = parse_line("hel", 3);
        let focus = parsed.focus.unwrap();
        assert_eq!(focus.kind, NodeKind::Command);
        assert_eq!(focus.value, "hel");
    }

    #[test]
    fn cursor_in_whitespace_has_no_focus_but_a_section() {
        let parsed = parse_line("kill ", 5);
        assert!(parsed.focus.is_none());
        let section = parsed.section.unwrap();
        assert_eq!(section.value, "kill");
    }

    #[test]
    fn cursor_between_tokens_keeps_the_preceding_section() {
        let parsed = parse_line("kill  alpha", 5);
        assert!(parsed.focus.is_none());
        assert_eq!(parsed.section.unwrap().value, "kill");
    }

    #[test]
    fn cursor_at_leading_edge_has_neither() {
        let parsed = parse_line("  kill", 1);
        assert!(parsed.focus.is_none());
        assert!(parsed.section.is_none());
    }

    #[test]
    fn token_slices_reassemble_the_line() {
        let line = "connect --user=alice -v  host-1  host-2";
        let parsed = parse_line(line, 0);

        let mut nodes: Vec<&Node> = Vec::new();
        if let Some(cmd) = &parsed.command {
            nodes.push(cmd);
        }
        // Re-derive flag and argument nodes by span from the raw line.
        for arg in &parsed.arguments {
            nodes.push(arg);
        }
        for node in nodes {
            assert_eq!(
                &line[node.start..node.end],
                line[node.start..node.end].trim(),
                "spans never include whitespace"
            );
        }
        assert_eq!(&line[0..7], "connect");
        assert_eq!(parsed.raw, line);
    }

    proptest! {
        /// Tokens never overlap, appear in order, carry exact slices of the
        /// raw line, and the focus span contains the cursor only when the
        /// cursor touches a token.
        #[test]
        fn spans_are_consistent(line in "[ a-z=-]{0,24}", cursor in 0usize..25) {
            let cursor = cursor.min(line.len());
            let parsed = parse_line(&line, cursor);

            let mut all: Vec<Node> = Vec::new();
            all.extend(parsed.command.clone());
            // flags are not individually exposed with spans here, but every
            // argument and the command must slice cleanly.
            all.extend(parsed.arguments.iter().cloned());

            let mut last_end = 0;
            for node in &all {
                prop_assert!(node.start >= last_end);
                prop_assert!(node.end <= line.len());
                let text = &line[node.start..node.end];
                prop_assert!(!text.is_empty());
                prop_assert!(!text.chars().any(char::is_whitespace));
                if node.kind != NodeKind::Flag {
                    prop_assert_eq!(text, node.value.as_str());
                }
                last_end = node.end;
            }

            if let Some(focus) = &parsed.focus {
                prop_assert!(focus.start <= cursor && cursor <= focus.end);
                // A focused cursor is inside or adjacent to non-whitespace.
                if cursor > 0 {
                    let before = line[..cursor].chars().next_back();
                    let at = line[cursor..].chars().next();
                    prop_assert!(
                        before.is_some_and(|c| !c.is_whitespace())
                            || at.is_some_and(|c| !c.is_whitespace())
                    );
                }
            }
        }
    }
}
