//! End-to-end editor flows over an in-memory channel.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;

use common::{advanced_terminal, install_commands, StubCommand};
use drover_core::ssh::{encode_dims, SessionRequest};
use drover_core::{Error, Trie};
use drover_terminal::tags;
use drover_test_utils::read_available;

const SETTLE: Duration = Duration::from_millis(100);

async fn drain(client: &mut tokio::io::DuplexStream) -> String {
    String::from_utf8_lossy(&read_available(client, SETTLE).await).into_owned()
}

#[tokio::test]
async fn line_is_echoed_and_returned() {
    let mut ts = advanced_terminal("> ");

    let term = ts.term.clone();
    let reader = tokio::spawn(async move { term.read_line().await });

    ts.client.write_all(b"whoami\r").await.unwrap();
    let line = reader.await.unwrap().unwrap();
    assert_eq!(line.text, "whoami");
    assert!(!line.pasted);

    let painted = drain(&mut ts.client).await;
    assert!(painted.contains("> "), "prompt painted: {painted:?}");
    assert!(painted.contains("whoami"), "input echoed: {painted:?}");
}

#[tokio::test]
async fn tab_cycles_command_candidates() {
    let mut ts = advanced_terminal("> ");
    install_commands(
        &ts.term,
        vec![
            StubCommand::new("help"),
            StubCommand::new("hello"),
            StubCommand::new("exit"),
        ],
    );

    let term = ts.term.clone();
    let reader = tokio::spawn(async move { term.read_line().await });

    // Candidates cycle in sorted order: "hello" sorts before "help".
    ts.client.write_all(b"hel\t").await.unwrap();
    let first = drain(&mut ts.client).await;
    assert!(
        first.contains("hello"),
        "first tab completes hello: {first:?}"
    );

    ts.client.write_all(b"\t").await.unwrap();
    let second = drain(&mut ts.client).await;
    assert!(
        second.contains("help"),
        "second tab cycles to help: {second:?}"
    );

    ts.client.write_all(b"\t\r").await.unwrap();
    let line = reader.await.unwrap().unwrap();
    // Third tab wraps back to the first candidate; the line is replaced,
    // never appended to.
    assert_eq!(line.text, "hello");
}

#[tokio::test]
async fn single_candidate_commits_with_a_trailing_space() {
    let mut ts = advanced_terminal("> ");
    install_commands(
        &ts.term,
        vec![StubCommand::new("kill"), StubCommand::new("help")],
    );

    let term = ts.term.clone();
    let reader = tokio::spawn(async move { term.read_line().await });

    ts.client.write_all(b"ki\t\r").await.unwrap();
    let line = reader.await.unwrap().unwrap();
    assert_eq!(line.text, "kill ");
}

#[tokio::test]
async fn tag_placeholder_draws_candidates_from_registered_tries() {
    let mut ts = advanced_terminal("> ");
    install_commands(
        &ts.term,
        vec![StubCommand::new("kill").expecting(&[tags::CLIENTS])],
    );

    let clients = Arc::new(Trie::new());
    for id in ["alpha", "beta", "alpine"] {
        clients.add(id);
    }
    ts.term
        .add_value_autocomplete(tags::CLIENTS, vec![clients])
        .unwrap();

    let term = ts.term.clone();
    let reader = tokio::spawn(async move { term.read_line().await });

    // Candidates cycle in sorted order: alpha, alpine, beta.
    ts.client.write_all(b"kill \t").await.unwrap();
    let first = drain(&mut ts.client).await;
    assert!(first.contains("alpha"), "first candidate: {first:?}");

    ts.client.write_all(b"\t").await.unwrap();
    let second = drain(&mut ts.client).await;
    assert!(second.contains("alpine"), "second candidate: {second:?}");

    ts.client.write_all(b"\t\r").await.unwrap();
    let line = reader.await.unwrap().unwrap();
    assert_eq!(line.text, "kill beta");
}

#[tokio::test]
async fn narrowed_fragment_prefix_matches_the_tries() {
    let mut ts = advanced_terminal("> ");
    install_commands(
        &ts.term,
        vec![StubCommand::new("kill").expecting(&[tags::CLIENTS])],
    );
    let clients = Arc::new(Trie::new());
    for id in ["alpha", "beta", "alpine"] {
        clients.add(id);
    }
    ts.term
        .add_value_autocomplete(tags::CLIENTS, vec![clients])
        .unwrap();

    let term = ts.term.clone();
    let reader = tokio::spawn(async move { term.read_line().await });

    // "alp" narrows to alpha/alpine; beta never appears.
    ts.client.write_all(b"kill alp\t\t\r").await.unwrap();
    let line = reader.await.unwrap().unwrap();
    assert_eq!(line.text, "kill alpine");
}

#[tokio::test]
async fn bracketed_paste_sets_the_indicator() {
    let mut ts = advanced_terminal("> ");

    let term = ts.term.clone();
    let reader = tokio::spawn(async move { term.read_line().await });

    ts.client
        .write_all(b"\x1b[200~echo hi\r\x1b[201~")
        .await
        .unwrap();
    let line = reader.await.unwrap().unwrap();
    assert_eq!(line.text, "echo hi");
    assert!(line.pasted, "fully pasted line carries the indicator");

    // A typed line afterwards is not marked.
    let term = ts.term.clone();
    let reader = tokio::spawn(async move { term.read_line().await });
    ts.client.write_all(b"typed\r").await.unwrap();
    let line = reader.await.unwrap().unwrap();
    assert_eq!(line.text, "typed");
    assert!(!line.pasted);
}

#[tokio::test]
async fn paste_bypasses_autocomplete() {
    let mut ts = advanced_terminal("> ");
    install_commands(&ts.term, vec![StubCommand::new("help")]);

    let term = ts.term.clone();
    let reader = tokio::spawn(async move { term.read_line().await });

    // The tab inside the paste is inserted literally instead of
    // completing "hel" to "help".
    ts.client
        .write_all(b"\x1b[200~hel\tp\r\x1b[201~")
        .await
        .unwrap();
    let line = reader.await.unwrap().unwrap();
    assert_eq!(line.text, "hel\tp");
    assert!(line.pasted);
}

#[tokio::test]
async fn ctrl_d_on_empty_line_ends_input() {
    let mut ts = advanced_terminal("> ");

    let term = ts.term.clone();
    let reader = tokio::spawn(async move { term.read_line().await });

    ts.client.write_all(&[0x04]).await.unwrap();
    match reader.await.unwrap() {
        Err(Error::EndOfInput) => {}
        other => panic!("expected end of input, got {other:?}"),
    }
}

#[tokio::test]
async fn ctrl_d_mid_line_deletes_forward() {
    let mut ts = advanced_terminal("> ");

    let term = ts.term.clone();
    let reader = tokio::spawn(async move { term.read_line().await });

    // "ab", Home, ^D deletes the character under the cursor.
    ts.client.write_all(b"ab").await.unwrap();
    ts.client.write_all(&[0x01, 0x04]).await.unwrap();
    ts.client.write_all(b"\r").await.unwrap();

    let line = reader.await.unwrap().unwrap();
    assert_eq!(line.text, "b");
}

#[tokio::test]
async fn ctrl_c_discards_the_line_and_keeps_reading() {
    let mut ts = advanced_terminal("> ");

    let term = ts.term.clone();
    let reader = tokio::spawn(async move { term.read_line().await });

    ts.client.write_all(b"droppe").await.unwrap();
    ts.client.write_all(&[0x03]).await.unwrap();
    ts.client.write_all(b"kept\r").await.unwrap();

    let line = reader.await.unwrap().unwrap();
    assert_eq!(line.text, "kept");

    let painted = drain(&mut ts.client).await;
    assert!(painted.contains("^C\r\n"), "interrupt echoed: {painted:?}");
}

#[tokio::test]
async fn history_recalls_previous_lines() {
    let mut ts = advanced_terminal("> ");

    for expected in ["first", "second"] {
        let term = ts.term.clone();
        let reader = tokio::spawn(async move { term.read_line().await });
        ts.client
            .write_all(format!("{expected}\r").as_bytes())
            .await
            .unwrap();
        assert_eq!(reader.await.unwrap().unwrap().text, expected);
    }

    let term = ts.term.clone();
    let reader = tokio::spawn(async move { term.read_line().await });
    // Up twice recalls the oldest, then Enter commits it.
    ts.client.write_all(b"\x1b[A\x1b[A\r").await.unwrap();
    assert_eq!(reader.await.unwrap().unwrap().text, "first");
}

#[tokio::test]
async fn whitespace_only_lines_stay_out_of_history() {
    let mut ts = advanced_terminal("> ");

    for input in ["   ", "real"] {
        let term = ts.term.clone();
        let reader = tokio::spawn(async move { term.read_line().await });
        ts.client
            .write_all(format!("{input}\r").as_bytes())
            .await
            .unwrap();
        reader.await.unwrap().unwrap();
    }

    let term = ts.term.clone();
    let reader = tokio::spawn(async move { term.read_line().await });
    ts.client.write_all(b"\x1b[A\x1b[A\r").await.unwrap();
    // Only "real" was recorded; the second Up had nowhere to go.
    assert_eq!(reader.await.unwrap().unwrap().text, "real");
}

#[tokio::test]
async fn concurrent_writes_preserve_bytes_and_lines() {
    let mut ts = advanced_terminal("> ");

    let term = ts.term.clone();
    let reader = tokio::spawn(async move { term.read_line().await });

    let writer_term = ts.term.clone();
    let writer = tokio::spawn(async move {
        for i in 0..5 {
            writer_term
                .write_str(&format!("event-{i}\n"))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    for chunk in [&b"sta"[..], &b"tus"[..]] {
        ts.client.write_all(chunk).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    writer.await.unwrap();
    ts.client.write_all(b"\r").await.unwrap();

    let line = reader.await.unwrap().unwrap();
    assert_eq!(line.text, "status", "keystrokes survive interleaved writes");

    let painted = drain(&mut ts.client).await;
    for i in 0..5 {
        assert!(
            painted.contains(&format!("event-{i}")),
            "write {i} present: {painted:?}"
        );
    }
}

#[tokio::test]
async fn window_change_requests_resize_the_editor() {
    let ts = advanced_terminal("> ");
    assert_eq!(ts.term.width().await, 80);

    ts.session
        .request_sender()
        .expect("queue open")
        .send(SessionRequest::new("window-change", encode_dims(120, 40)))
        .unwrap();
    tokio::time::sleep(SETTLE).await;

    assert_eq!(ts.term.width().await, 120);
    let pty = ts.session.pty().expect("pty attrs recorded");
    assert_eq!((pty.columns, pty.rows), (120, 40));
}

#[tokio::test]
async fn unknown_requests_are_refused_when_a_reply_is_wanted() {
    let ts = advanced_terminal("> ");

    let (req, reply) = SessionRequest::with_reply("x11-req", vec![]);
    ts.session.request_sender().expect("queue open").send(req).unwrap();

    assert_eq!(reply.await, Ok(false));
}

#[tokio::test]
async fn shutdown_stops_the_request_worker() {
    let ts = advanced_terminal("> ");
    ts.term.shutdown().await;

    ts.session
        .request_sender()
        .expect("queue open")
        .send(SessionRequest::new("window-change", encode_dims(132, 50)))
        .unwrap();
    tokio::time::sleep(SETTLE).await;

    assert_eq!(ts.term.width().await, 80, "no worker left to resize");
}

#[tokio::test]
async fn raw_mode_passes_bytes_through_and_replays_overflow() {
    let mut ts = advanced_terminal("> ");

    ts.term.enable_raw().await;

    // Writes pass through without repaint framing.
    ts.term.write(b"raw-out").await.unwrap();
    let passed = drain(&mut ts.client).await;
    assert_eq!(passed, "raw-out");

    // Reads pass through too.
    ts.client.write_all(b"raw-in").await.unwrap();
    let mut buf = [0u8; 16];
    let n = ts.term.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"raw-in");

    // Leave raw mode with capture while a read is pending: the bytes the
    // read swallows are replayed into the next read_line.
    let term = ts.term.clone();
    let pending = tokio::spawn(async move {
        let mut buf = [0u8; 16];
        let n = term.read(&mut buf).await.unwrap();
        buf[..n].to_vec()
    });
    tokio::time::sleep(SETTLE).await;
    ts.term.disable_raw(true);
    ts.client.write_all(b"late").await.unwrap();
    let swallowed = pending.await.unwrap();
    assert_eq!(swallowed, b"late");

    let term = ts.term.clone();
    let reader = tokio::spawn(async move { term.read_line().await });
    ts.client.write_all(b"\r").await.unwrap();
    let line = reader.await.unwrap().unwrap();
    assert_eq!(line.text, "late", "captured overflow fed the editor");
}

#[tokio::test]
async fn read_outside_raw_mode_reports_eof() {
    use futures::FutureExt;

    let ts = advanced_terminal("> ");
    let mut buf = [0u8; 8];
    // Completes without ever touching the channel.
    let n = ts
        .term
        .read(&mut buf)
        .now_or_never()
        .expect("non-raw read never blocks")
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn read_password_suppresses_echo_and_restores_the_prompt() {
    let mut ts = advanced_terminal("> ");

    let term = ts.term.clone();
    let reader = tokio::spawn(async move { term.read_password("password: ").await });

    tokio::time::sleep(SETTLE).await;
    ts.client.write_all(b"hunter2\r").await.unwrap();
    let password = reader.await.unwrap().unwrap();
    assert_eq!(password, "hunter2");

    let painted = drain(&mut ts.client).await;
    assert!(painted.contains("password: "));
    assert!(
        !painted.contains("hunter2"),
        "no echo while reading a password: {painted:?}"
    );

    // The next read uses the original prompt again.
    let term = ts.term.clone();
    let reader = tokio::spawn(async move { term.read_line().await });
    ts.client.write_all(b"back\r").await.unwrap();
    assert_eq!(reader.await.unwrap().unwrap().text, "back");
    let painted = drain(&mut ts.client).await;
    assert!(painted.contains("> "));
}

#[tokio::test]
async fn bracketed_paste_mode_toggles_are_written_to_the_peer() {
    let mut ts = advanced_terminal("> ");

    ts.term.set_bracketed_paste_mode(true).await.unwrap();
    let on = read_available(&mut ts.client, SETTLE).await;
    assert_eq!(on, b"\x1b[?2004h");

    ts.term.set_bracketed_paste_mode(false).await.unwrap();
    let off = read_available(&mut ts.client, SETTLE).await;
    assert_eq!(off, b"\x1b[?2004l");
}

#[tokio::test]
async fn clear_homes_the_cursor_and_repaints() {
    let mut ts = advanced_terminal("> ");
    ts.term.clear().await.unwrap();
    let painted = drain(&mut ts.client).await;
    assert!(painted.contains("\x1b[2J\x1b[H"), "clear + home: {painted:?}");
    assert!(painted.contains("> "), "prompt repainted: {painted:?}");
}
