//! The VT100 line editor.
//!
//! One editor instance sits on an operator's SSH channel. A single async
//! mutex guards the entire paint state (line, cursor, prompt, pending
//! output); `read_line` holds it for the whole read loop except while
//! blocked on the channel read and across the autocomplete computation.
//! Both release points are load-bearing: they are what lets `write` from
//! other tasks drain while the foreground task waits for keys.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use drover_core::constants::{
    DEFAULT_TERM_HEIGHT, DEFAULT_TERM_WIDTH, INPUT_BUFFER_SIZE, MAX_LINE_LENGTH,
    WINDOW_CHANGE_REQUEST,
};
use drover_core::ssh::parse_dims;
use drover_core::{Error, Result, Trie};
use drover_users::{OperatorSession, User};

use crate::autocomplete::{tags, AutoCompleteState};
use crate::command::Command;
use crate::history::RingHistory;
use crate::keys::{decode, Decoded, Key};

/// Escape sequences that can be written to the terminal to achieve
/// different styles of text.
pub struct EscapeCodes {
    pub black: &'static [u8],
    pub red: &'static [u8],
    pub green: &'static [u8],
    pub yellow: &'static [u8],
    pub blue: &'static [u8],
    pub magenta: &'static [u8],
    pub cyan: &'static [u8],
    pub white: &'static [u8],
    /// Reset all attributes.
    pub reset: &'static [u8],
}

pub static VT100_ESCAPE_CODES: EscapeCodes = EscapeCodes {
    black: b"\x1b[30m",
    red: b"\x1b[31m",
    green: b"\x1b[32m",
    yellow: b"\x1b[33m",
    blue: b"\x1b[34m",
    magenta: b"\x1b[35m",
    cyan: b"\x1b[36m",
    white: b"\x1b[37m",
    reset: b"\x1b[0m",
};

/// A committed input line. `pasted` is true when the whole line arrived
/// inside a bracketed paste; dispatchers may refuse to execute such
/// lines as commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub text: String,
    pub pasted: bool,
}

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Command and value-trie registries consulted by autocomplete and the
/// dispatcher.
pub(crate) struct Registries {
    pub(crate) commands: HashMap<String, Arc<dyn Command>>,
    pub(crate) command_index: Arc<Trie>,
    pub(crate) value_tries: HashMap<String, Vec<Arc<Trie>>>,
}

#[derive(Default)]
struct Overflow {
    /// Set while leaving raw mode with capture requested.
    armed: bool,
    /// Bytes a pending raw read consumed after the mode flipped.
    data: Option<Vec<u8>>,
}

#[derive(Default)]
struct WorkerState {
    cancel: StdMutex<Option<mpsc::UnboundedSender<()>>>,
    handle: StdMutex<Option<JoinHandle<()>>>,
}

impl Drop for WorkerState {
    fn drop(&mut self) {
        if let Ok(mut handle) = self.handle.lock() {
            if let Some(handle) = handle.take() {
                handle.abort();
            }
        }
    }
}

/// A VT100 terminal capable of reading lines of input. Cheap to clone;
/// clones share all state, which is how command handlers and background
/// tasks write through the editor while `read_line` runs.
#[derive(Clone)]
pub struct Terminal {
    reader: Arc<AsyncMutex<BoxedReader>>,
    inner: Arc<AsyncMutex<Inner>>,
    pub(crate) registries: Arc<RwLock<Registries>>,
    pub(crate) auto: Arc<StdMutex<AutoCompleteState>>,
    raw: Arc<AtomicBool>,
    overflow: Arc<StdMutex<Overflow>>,
    session: Option<Arc<OperatorSession>>,
    pub(crate) user: Option<User>,
    worker: Arc<WorkerState>,
    pub(crate) autocomplete_enabled: bool,
    /// Style escape codes for this terminal.
    pub escape: &'static EscapeCodes,
}

impl Terminal {
    /// Run a plain editor on the given channel: no session, no user, no
    /// autocomplete, no background request handling.
    pub fn new<C>(channel: C, prompt: &str) -> Self
    where
        C: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        Self::build(channel, prompt, None, None)
    }

    /// Run a full operator editor: autocomplete is enabled and a
    /// background worker consumes the session's request queue, applying
    /// `window-change` resizes.
    pub fn advanced<C>(
        channel: C,
        user: User,
        session: Arc<OperatorSession>,
        prompt: &str,
    ) -> Self
    where
        C: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let term = Self::build(channel, prompt, Some(user), Some(session));
        term.spawn_request_worker();
        term
    }

    fn build<C>(
        channel: C,
        prompt: &str,
        user: Option<User>,
        session: Option<Arc<OperatorSession>>,
    ) -> Self
    where
        C: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, write_half) = tokio::io::split(channel);

        let command_index = Arc::new(Trie::new());
        let mut value_tries: HashMap<String, Vec<Arc<Trie>>> = HashMap::new();
        value_tries.insert(tags::COMMANDS.to_string(), vec![Arc::clone(&command_index)]);

        let autocomplete_enabled = session.is_some();

        Self {
            reader: Arc::new(AsyncMutex::new(Box::new(read_half))),
            inner: Arc::new(AsyncMutex::new(Inner::new(Box::new(write_half), prompt))),
            registries: Arc::new(RwLock::new(Registries {
                commands: HashMap::new(),
                command_index,
                value_tries,
            })),
            auto: Arc::new(StdMutex::new(AutoCompleteState::default())),
            raw: Arc::new(AtomicBool::new(false)),
            overflow: Arc::new(StdMutex::new(Overflow::default())),
            session,
            user,
            worker: Arc::new(WorkerState::default()),
            autocomplete_enabled,
            escape: &VT100_ESCAPE_CODES,
        }
    }

    /// The user driving this terminal, for advanced terminals.
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Replace the command registry. Single-shot registration: the new
    /// map supersedes any previous one, though names already fed into
    /// the completion index remain there.
    pub fn add_commands(&self, commands: HashMap<String, Arc<dyn Command>>) {
        let mut regs = self.registries.write().expect("registry lock poisoned");
        for name in commands.keys() {
            regs.command_index.add(name);
        }
        regs.commands = commands;
    }

    /// Register the value tries consulted when a command's `expect`
    /// yields the `<tag>` placeholder.
    pub fn add_value_autocomplete(&self, tag: &str, tries: Vec<Arc<Trie>>) -> Result<()> {
        let mut regs = self.registries.write().expect("registry lock poisoned");
        if regs.value_tries.contains_key(tag) {
            return Err(Error::TagExists(tag.to_string()));
        }
        regs.value_tries.insert(tag.to_string(), tries);
        Ok(())
    }

    /// Current terminal width in cells.
    pub async fn width(&self) -> usize {
        self.inner.lock().await.term_width
    }

    /// Set the prompt written at the start of each input line.
    pub async fn set_prompt(&self, prompt: &str) {
        self.inner.lock().await.prompt = prompt.chars().collect();
    }

    /// Resize the terminal. A width of zero is clamped to one cell.
    /// On shrink the editor assumes a wrapping terminal and repaints
    /// doubled rows; on grow it repaints from the top of the logical
    /// line.
    pub async fn set_size(&self, width: usize, height: usize) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.apply_set_size(width, height);
        inner.flush().await?;
        Ok(())
    }

    /// Erase the screen, home the cursor, and repaint the prompt and any
    /// pending input.
    pub async fn clear(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.clear_screen();
        inner.flush().await?;
        Ok(())
    }

    /// Ask the peer terminal to bracket paste operations with markers.
    pub async fn set_bracketed_paste_mode(&self, on: bool) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let seq: &[u8] = if on { b"\x1b[?2004h" } else { b"\x1b[?2004l" };
        inner.writer.write_all(seq).await?;
        inner.writer.flush().await?;
        Ok(())
    }

    /// Write through the editor. The prompt and any pending input are
    /// moved out of the way, the bytes are written (LF becomes CRLF),
    /// and the prompt, line, and cursor are repainted — one atomic
    /// repaint as far as any other writer can observe. In raw mode the
    /// bytes pass through untouched.
    pub async fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        if self.raw.load(Ordering::SeqCst) {
            inner.writer.write_all(buf).await?;
            inner.writer.flush().await?;
            return Ok(buf.len());
        }
        Ok(inner.write_buffered(buf).await?)
    }

    /// Convenience for text output; see [`Terminal::write`].
    pub async fn write_str(&self, s: &str) -> Result<()> {
        self.write(s.as_bytes()).await.map(|_| ())
    }

    /// Pass-through read, only meaningful in raw mode: outside raw mode
    /// it reports end-of-input immediately. When raw mode was left with
    /// capture enabled while this read was in flight, the consumed bytes
    /// are stashed for the next `read_line`.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if !self.raw.load(Ordering::SeqCst) {
            return Ok(0);
        }
        let mut reader = self.reader.lock().await;
        let n = reader.read(buf).await?;
        if !self.raw.load(Ordering::SeqCst) {
            let mut overflow = self.overflow.lock().expect("overflow lock poisoned");
            if overflow.armed {
                overflow.armed = false;
                overflow.data = Some(buf[..n].to_vec());
            }
        }
        Ok(n)
    }

    /// Enter raw mode: stop the background request worker and let the
    /// caller own the channel through [`Terminal::read`] and
    /// [`Terminal::write`]. Waits for the worker to release the request
    /// queue before returning.
    pub async fn enable_raw(&self) {
        if !self.raw.swap(true, Ordering::SeqCst) {
            self.stop_request_worker().await;
        }
    }

    /// Leave raw mode and restart the request worker. With
    /// `capture_overflow`, bytes already consumed by a raw read that
    /// completes after this call are replayed into the next
    /// `read_line`.
    pub fn disable_raw(&self, capture_overflow: bool) {
        if self.raw.swap(false, Ordering::SeqCst) {
            if capture_overflow {
                self.overflow.lock().expect("overflow lock poisoned").armed = true;
            }
            self.spawn_request_worker();
        }
    }

    /// Splice bytes into the pending input, replacing whatever partial
    /// sequence was there. At most [`INPUT_BUFFER_SIZE`] bytes are kept.
    pub async fn replay_input(&self, data: &[u8]) {
        let mut inner = self.inner.lock().await;
        inner.replace_remainder(data);
    }

    /// Stop the background request worker and wait for it to exit.
    pub async fn shutdown(&self) {
        self.stop_request_worker().await;
    }

    /// Temporarily change the prompt and read a line without echo.
    pub async fn read_password(&self, prompt: &str) -> Result<String> {
        let (old_prompt, old_echo) = {
            let mut inner = self.inner.lock().await;
            let old = (inner.prompt.clone(), inner.echo);
            inner.prompt = prompt.chars().collect();
            inner.echo = false;
            old
        };

        let result = self.read_line().await;

        {
            let mut inner = self.inner.lock().await;
            inner.prompt = old_prompt;
            inner.echo = old_echo;
        }

        result.map(|line| line.text)
    }

    /// Read one line of input. Fails with [`Error::EndOfInput`] when
    /// Ctrl-D arrives on an empty line. The terminating CR/LF is
    /// stripped; `Line::pasted` marks lines that arrived entirely inside
    /// a paste bracket.
    pub async fn read_line(&self) -> Result<Line> {
        let mut reader = self.reader.lock().await;
        let mut inner = self.inner.lock().await;

        if inner.cursor_x == 0 && inner.cursor_y == 0 {
            let prompt = inner.prompt.clone();
            inner.write_line(&prompt);
            inner.flush().await?;
        }

        let mut line_is_pasted = inner.paste_active;

        let captured = self
            .overflow
            .lock()
            .expect("overflow lock poisoned")
            .data
            .take();
        if let Some(data) = captured {
            inner.replace_remainder(&data);
        }

        loop {
            let mut done: Option<String> = None;

            loop {
                let (decoded, consumed) = decode(&inner.remainder, inner.paste_active);
                let key = match decoded {
                    Decoded::Incomplete => break,
                    Decoded::Key(key) => key,
                };
                inner.remainder.drain(..consumed);

                if !inner.paste_active {
                    if key == Key::Eof && inner.line.is_empty() {
                        return Err(Error::EndOfInput);
                    }
                    if key == Key::PasteStart {
                        inner.paste_active = true;
                        if inner.line.is_empty() {
                            line_is_pasted = true;
                        }
                        continue;
                    }
                } else if key == Key::PasteEnd {
                    inner.paste_active = false;
                    continue;
                }

                if !inner.paste_active {
                    line_is_pasted = false;
                }

                // Paste mode: everything but Enter is inserted literally.
                if inner.paste_active && key != Key::Enter {
                    self.reset_autocomplete();
                    if let Key::Char(c) = key {
                        if inner.line.len() < MAX_LINE_LENGTH {
                            inner.add_key_to_line(c);
                        }
                    }
                    continue;
                }

                if key == Key::Char('\t') && self.autocomplete_enabled {
                    // Release the editor across the completion so
                    // concurrent writes can drain.
                    let snapshot: String = inner.line.iter().collect();
                    let pos = inner.pos;
                    drop(inner);
                    let completion = self.autocomplete_tab(&snapshot, pos);
                    inner = self.inner.lock().await;
                    if let Some((new_line, new_pos)) = completion {
                        inner.set_line(new_line, new_pos);
                    }
                    continue;
                }

                if key != Key::Char('\t') {
                    self.reset_autocomplete();
                }

                if let Some(text) = inner.handle_key(key) {
                    done = Some(text);
                    break;
                }
            }

            inner.flush().await?;

            if let Some(text) = done {
                if inner.echo {
                    inner.history_index = None;
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        inner.history.add(trimmed);
                    }
                }
                return Ok(Line {
                    text,
                    pasted: line_is_pasted,
                });
            }

            let want = INPUT_BUFFER_SIZE
                .saturating_sub(inner.remainder.len())
                .max(1);
            let mut read_buf = [0u8; INPUT_BUFFER_SIZE];

            // Release the editor while blocked on the channel so
            // concurrent writes can drain.
            drop(inner);
            let n = reader.read(&mut read_buf[..want]).await?;
            inner = self.inner.lock().await;

            if n == 0 {
                return Err(Error::Io(io::ErrorKind::UnexpectedEof.into()));
            }
            inner.remainder.extend_from_slice(&read_buf[..n]);
        }
    }

    pub(crate) fn reset_autocomplete(&self) {
        self.auto.lock().expect("autocomplete lock poisoned").reset();
    }

    fn spawn_request_worker(&self) {
        let Some(session) = self.session.clone() else {
            return;
        };
        let inner = Arc::clone(&self.inner);
        let (cancel_tx, mut cancel_rx) = mpsc::unbounded_channel::<()>();
        *self.worker.cancel.lock().expect("worker lock poisoned") = Some(cancel_tx);

        let handle = tokio::spawn(async move {
            let mut queue = session.requests().lock().await;
            loop {
                tokio::select! {
                    _ = cancel_rx.recv() => return,
                    req = queue.recv() => {
                        let Some(mut req) = req else { return };
                        if req.ty == WINDOW_CHANGE_REQUEST {
                            match parse_dims(&req.payload) {
                                Some((columns, rows)) => {
                                    {
                                        let mut inner = inner.lock().await;
                                        inner.apply_set_size(columns as usize, rows as usize);
                                        if let Err(err) = inner.flush().await {
                                            warn!(error = %err, "resize repaint failed");
                                        }
                                    }
                                    session.update_size(columns, rows);
                                }
                                None => warn!("short window-change payload"),
                            }
                        } else {
                            debug!(ty = %req.ty, "unhandled session request");
                            if req.want_reply {
                                req.reply(false);
                            }
                        }
                    }
                }
            }
        });

        *self.worker.handle.lock().expect("worker lock poisoned") = Some(handle);
    }

    async fn stop_request_worker(&self) {
        let cancel = self.worker.cancel.lock().expect("worker lock poisoned").take();
        if let Some(cancel) = cancel {
            let _ = cancel.send(());
        }
        let handle = self.worker.handle.lock().expect("worker lock poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

// =============================================================================
// Editor state
// =============================================================================

struct Inner {
    writer: BoxedWriter,
    prompt: Vec<char>,
    /// The line being entered.
    line: Vec<char>,
    /// Logical cursor position as a code-point index into `line`.
    pos: usize,
    echo: bool,
    paste_active: bool,
    /// Cursor cell, where column 0 is the left edge and row 0 is the
    /// first row of the current logical line.
    cursor_x: usize,
    cursor_y: usize,
    /// Greatest row reached by the current logical line.
    max_line: usize,
    term_width: usize,
    term_height: usize,
    /// Terminal data waiting to be sent.
    out_buf: Vec<u8>,
    /// Partial key sequence carried between reads.
    remainder: Vec<u8>,
    history: RingHistory,
    /// Currently accessed history entry; `None` when not navigating.
    history_index: Option<usize>,
    /// The incomplete line squirrelled away while navigating history.
    history_pending: String,
}

impl Inner {
    fn new(writer: BoxedWriter, prompt: &str) -> Self {
        Self {
            writer,
            prompt: prompt.chars().collect(),
            line: Vec::new(),
            pos: 0,
            echo: true,
            paste_active: false,
            cursor_x: 0,
            cursor_y: 0,
            max_line: 0,
            term_width: DEFAULT_TERM_WIDTH,
            term_height: DEFAULT_TERM_HEIGHT,
            out_buf: Vec::new(),
            remainder: Vec::new(),
            history: RingHistory::new(),
            history_index: None,
            history_pending: String::new(),
        }
    }

    async fn flush(&mut self) -> io::Result<()> {
        if self.out_buf.is_empty() {
            return Ok(());
        }
        let buf = std::mem::take(&mut self.out_buf);
        self.writer.write_all(&buf).await?;
        self.writer.flush().await
    }

    fn queue_str(&mut self, s: &str) {
        self.out_buf.extend_from_slice(s.as_bytes());
    }

    fn queue_chars(&mut self, chars: &[char]) {
        let mut buf = [0u8; 4];
        for &c in chars {
            self.out_buf
                .extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
    }

    fn replace_remainder(&mut self, data: &[u8]) {
        // Keep at most one read buffer's worth.
        let n = data.len().min(INPUT_BUFFER_SIZE);
        self.remainder.clear();
        self.remainder.extend_from_slice(&data[..n]);
    }

    /// Queue cursor movement to the given logical position in the text.
    fn move_cursor_to_pos(&mut self, pos: usize) {
        if !self.echo {
            return;
        }
        let total = visual_length(&self.prompt) + pos;
        let y = total / self.term_width;
        let x = total % self.term_width;

        let up = self.cursor_y.saturating_sub(y);
        let down = y.saturating_sub(self.cursor_y);
        let left = self.cursor_x.saturating_sub(x);
        let right = x.saturating_sub(self.cursor_x);

        self.cursor_x = x;
        self.cursor_y = y;
        self.move_ops(up, down, left, right);
    }

    fn move_ops(&mut self, up: usize, down: usize, left: usize, right: usize) {
        // One cell is CSI A, n cells CSI nA, and so on for B/C/D.
        for (n, dir) in [(up, 'A'), (down, 'B'), (right, 'C'), (left, 'D')] {
            match n {
                0 => {}
                1 => self.queue_str(&format!("\x1b[{dir}")),
                n => self.queue_str(&format!("\x1b[{n}{dir}")),
            }
        }
    }

    fn clear_line_to_right(&mut self) {
        self.queue_str("\x1b[K");
    }

    /// Account for `places` printed cells, wrapping the bookkeeping at
    /// the terminal edge. Terminals do not advance past the last cell of
    /// a row on their own, so landing exactly on a boundary emits an
    /// explicit CRLF.
    fn advance_cursor(&mut self, places: usize) {
        self.cursor_x += places;
        self.cursor_y += self.cursor_x / self.term_width;
        if self.cursor_y > self.max_line {
            self.max_line = self.cursor_y;
        }
        self.cursor_x %= self.term_width;

        if places > 0 && self.cursor_x == 0 {
            self.out_buf.extend_from_slice(b"\r\n");
        }
    }

    /// Paint `line` from the current cursor, wrapping at the terminal
    /// width.
    fn write_line(&mut self, mut line: &[char]) {
        while !line.is_empty() {
            let remaining = self.term_width - self.cursor_x;
            let todo = line.len().min(remaining);
            self.queue_chars(&line[..todo]);
            self.advance_cursor(visual_length(&line[..todo]));
            line = &line[todo..];
        }
    }

    /// Replace the displayed line and cursor with fresh content.
    fn set_line(&mut self, new_line: Vec<char>, new_pos: usize) {
        if self.echo {
            self.move_cursor_to_pos(0);
            self.write_line(&new_line);
            for _ in new_line.len()..self.line.len() {
                self.write_line(&[' ']);
            }
            self.move_cursor_to_pos(new_pos);
        }
        self.line = new_line;
        self.pos = new_pos;
    }

    fn add_key_to_line(&mut self, c: char) {
        self.line.insert(self.pos, c);
        if self.echo {
            let tail: Vec<char> = self.line[self.pos..].to_vec();
            self.write_line(&tail);
        }
        self.pos += 1;
        self.move_cursor_to_pos(self.pos);
    }

    fn erase_n_previous_chars(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        let n = n.min(self.pos);
        self.pos -= n;
        self.move_cursor_to_pos(self.pos);

        self.line.drain(self.pos..self.pos + n);
        if self.echo {
            let tail: Vec<char> = self.line[self.pos..].to_vec();
            self.write_line(&tail);
            for _ in 0..n {
                self.queue_str(" ");
            }
            self.advance_cursor(n);
            self.move_cursor_to_pos(self.pos);
        }
    }

    /// Characters from the cursor back to the start of the previous word.
    fn count_to_left_word(&self) -> usize {
        if self.pos == 0 {
            return 0;
        }
        let mut pos = self.pos - 1;
        while pos > 0 {
            if self.line[pos] != ' ' {
                break;
            }
            pos -= 1;
        }
        while pos > 0 {
            if self.line[pos] == ' ' {
                pos += 1;
                break;
            }
            pos -= 1;
        }
        self.pos - pos
    }

    /// Characters from the cursor forward to the start of the next word.
    fn count_to_right_word(&self) -> usize {
        let mut pos = self.pos;
        while pos < self.line.len() {
            if self.line[pos] == ' ' {
                break;
            }
            pos += 1;
        }
        while pos < self.line.len() {
            if self.line[pos] != ' ' {
                break;
            }
            pos += 1;
        }
        pos - self.pos
    }

    fn clear_screen(&mut self) {
        // Erase the screen, home the cursor, repaint prompt and line.
        self.queue_str("\x1b[2J\x1b[H");
        let prompt = self.prompt.clone();
        self.queue_chars(&prompt);
        self.cursor_x = 0;
        self.cursor_y = 0;
        self.advance_cursor(visual_length(&prompt));
        let line = self.line.clone();
        let pos = self.pos;
        self.set_line(line, pos);
    }

    /// Process one key; returns the completed line on Enter.
    fn handle_key(&mut self, key: Key) -> Option<String> {
        match key {
            Key::Delete => {
                if self.pos >= self.line.len() || self.line.is_empty() {
                    return None;
                }
                self.pos += 1;
                self.erase_n_previous_chars(1);
            }
            Key::Backspace => {
                if self.pos == 0 {
                    return None;
                }
                self.erase_n_previous_chars(1);
            }
            Key::AltLeft => {
                self.pos -= self.count_to_left_word();
                self.move_cursor_to_pos(self.pos);
            }
            Key::AltRight => {
                self.pos += self.count_to_right_word();
                self.move_cursor_to_pos(self.pos);
            }
            Key::Left => {
                if self.pos == 0 {
                    return None;
                }
                self.pos -= 1;
                self.move_cursor_to_pos(self.pos);
            }
            Key::Right => {
                if self.pos == self.line.len() {
                    return None;
                }
                self.pos += 1;
                self.move_cursor_to_pos(self.pos);
            }
            Key::Home => {
                if self.pos == 0 {
                    return None;
                }
                self.pos = 0;
                self.move_cursor_to_pos(self.pos);
            }
            Key::End => {
                if self.pos == self.line.len() {
                    return None;
                }
                self.pos = self.line.len();
                self.move_cursor_to_pos(self.pos);
            }
            Key::Up => {
                let nth = self.history_index.map_or(0, |i| i + 1);
                let entry = self.history.nth_previous(nth)?.to_string();
                if self.history_index.is_none() {
                    self.history_pending = self.line.iter().collect();
                }
                self.history_index = Some(nth);
                let chars: Vec<char> = entry.chars().collect();
                let len = chars.len();
                self.set_line(chars, len);
            }
            Key::Down => match self.history_index {
                None => {}
                Some(0) => {
                    let chars: Vec<char> = self.history_pending.chars().collect();
                    let len = chars.len();
                    self.set_line(chars, len);
                    self.history_index = None;
                }
                Some(i) => {
                    if let Some(entry) = self.history.nth_previous(i - 1) {
                        let entry = entry.to_string();
                        self.history_index = Some(i - 1);
                        let chars: Vec<char> = entry.chars().collect();
                        let len = chars.len();
                        self.set_line(chars, len);
                    }
                }
            },
            Key::Enter => {
                let end = self.line.len();
                self.move_cursor_to_pos(end);
                self.queue_str("\r\n");
                let text: String = self.line.iter().collect();
                self.line.clear();
                self.pos = 0;
                self.cursor_x = 0;
                self.cursor_y = 0;
                self.max_line = 0;
                return Some(text);
            }
            Key::DeleteWord => {
                // Delete zero or more spaces and then one or more
                // characters.
                let n = self.count_to_left_word();
                self.erase_n_previous_chars(n);
            }
            Key::DeleteLine => {
                // Blank everything from the cursor to the end of line.
                for _ in self.pos..self.line.len() {
                    self.queue_str(" ");
                    self.advance_cursor(1);
                }
                self.line.truncate(self.pos);
                self.move_cursor_to_pos(self.pos);
            }
            Key::Eof => {
                // Erase the character under the cursor; the end-of-input
                // case on an empty line is handled by read_line.
                if self.pos < self.line.len() {
                    self.pos += 1;
                    self.erase_n_previous_chars(1);
                }
            }
            Key::DeleteToStart => {
                self.erase_n_previous_chars(self.pos);
            }
            Key::ClearScreen => {
                self.clear_screen();
            }
            Key::Interrupt => {
                self.queue_str("^C\r\n");
                let prompt = self.prompt.clone();
                self.queue_chars(&prompt);
                self.cursor_x = 0;
                self.cursor_y = 0;
                self.advance_cursor(visual_length(&prompt));
                self.set_line(Vec::new(), 0);
            }
            Key::Char(c) => {
                if !is_printable(c) {
                    return None;
                }
                if self.line.len() >= MAX_LINE_LENGTH {
                    return None;
                }
                self.add_key_to_line(c);
            }
            Key::PasteStart | Key::PasteEnd | Key::Unknown => {}
        }
        None
    }

    fn apply_set_size(&mut self, width: usize, height: usize) {
        let width = width.max(1);
        let old_width = self.term_width;
        self.term_width = width;
        self.term_height = height;

        if width == old_width {
            return;
        }
        if self.line.is_empty() && self.cursor_x == 0 && self.cursor_y == 0 {
            // Nothing on screen yet.
            return;
        }

        if width < old_width {
            // Wrapping terminals double every previously full row when
            // shrinking; adjust for that before repainting. Truncating
            // terminals get a slightly high prompt, which beats the
            // alternative mess.
            if self.cursor_x >= self.term_width {
                self.cursor_x = self.term_width - 1;
            }
            self.cursor_y *= 2;
            let rows = self.max_line * 2;
            self.clear_and_repaint_line_plus_n_previous(rows);
        } else {
            // The position stays correct until the cursor moves, so go
            // back to the beginning and repaint everything.
            let rows = self.max_line;
            self.clear_and_repaint_line_plus_n_previous(rows);
        }
    }

    fn clear_and_repaint_line_plus_n_previous(&mut self, num_prev_lines: usize) {
        // Move to column zero at the start of the line.
        self.move_ops(self.cursor_y, 0, self.cursor_x, 0);
        self.cursor_x = 0;
        self.cursor_y = 0;
        self.clear_line_to_right();
        while self.cursor_y < num_prev_lines {
            self.move_ops(0, 1, 0, 0);
            self.cursor_y += 1;
            self.clear_line_to_right();
        }
        // And back to the beginning.
        self.move_ops(self.cursor_y, 0, 0, 0);
        self.cursor_x = 0;
        self.cursor_y = 0;

        let prompt = self.prompt.clone();
        self.queue_chars(&prompt);
        self.advance_cursor(visual_length(&prompt));
        let line = self.line.clone();
        self.write_line(&line);
        self.move_cursor_to_pos(self.pos);
    }

    /// The atomic-repaint write path; see [`Terminal::write`].
    async fn write_buffered(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.cursor_x == 0 && self.cursor_y == 0 {
            // Nothing on the screen to move out of the way.
            return self.write_with_crlf(buf).await;
        }

        self.move_ops(0, 0, self.cursor_x, 0);
        self.cursor_x = 0;
        self.clear_line_to_right();
        while self.cursor_y > 0 {
            self.move_ops(1, 0, 0, 0);
            self.cursor_y -= 1;
            self.clear_line_to_right();
        }
        self.flush().await?;

        let n = self.write_with_crlf(buf).await?;

        let prompt = self.prompt.clone();
        self.write_line(&prompt);
        if self.echo {
            let line = self.line.clone();
            self.write_line(&line);
        }
        self.move_cursor_to_pos(self.pos);
        self.flush().await?;

        Ok(n)
    }

    /// Write `buf`, replacing every LF with CRLF.
    async fn write_with_crlf(&mut self, mut buf: &[u8]) -> io::Result<usize> {
        let mut written = 0;
        while !buf.is_empty() {
            match buf.iter().position(|&b| b == b'\n') {
                Some(i) => {
                    self.writer.write_all(&buf[..i]).await?;
                    self.writer.write_all(b"\r\n").await?;
                    written += i + 1;
                    buf = &buf[i + 1..];
                }
                None => {
                    self.writer.write_all(buf).await?;
                    written += buf.len();
                    break;
                }
            }
        }
        self.writer.flush().await?;
        Ok(written)
    }
}

fn is_printable(c: char) -> bool {
    c >= ' '
}

/// The number of visible glyphs in `runes`: code points outside ANSI CSI
/// escape runs, which begin at 0x1b and end at the next alphabetic byte.
pub(crate) fn visual_length(runes: &[char]) -> usize {
    let mut in_escape = false;
    let mut length = 0;
    for &r in runes {
        if in_escape {
            if r.is_ascii_alphabetic() {
                in_escape = false;
            }
        } else if r == '\x1b' {
            in_escape = true;
        } else {
            length += 1;
        }
    }
    length
}
