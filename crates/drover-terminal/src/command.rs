//! The capability contract command implementations satisfy.

use std::collections::BTreeMap;

use async_trait::async_trait;

use drover_core::Result;
use drover_users::User;

use crate::editor::Terminal;
use crate::parse::ParsedLine;

/// One operator command. The dispatcher owns lookup, help, and flag
/// validation; implementations only see fully parsed lines.
#[async_trait]
pub trait Command: Send + Sync {
    /// The expected completions at the parsed cursor position: literal
    /// candidate strings, or a single `<tag>` placeholder resolved
    /// through the tries registered with
    /// [`Terminal::add_value_autocomplete`]. `None` disables completion.
    fn expect(&self, _line: &ParsedLine) -> Option<Vec<String>> {
        None
    }

    /// Execute. `term` supports both read and write on the operator's
    /// session. Returning [`drover_core::Error::EndOfInput`] terminates
    /// the dispatcher loop.
    async fn run(&self, user: &User, term: &Terminal, line: ParsedLine) -> Result<()>;

    /// Usage text. `verbose` selects the long form.
    fn help(&self, verbose: bool) -> String;

    /// Flag schema: name to description. Flags outside this map (other
    /// than `h`/`help`) are rejected before `run` is called.
    fn valid_args(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}
