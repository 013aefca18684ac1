#[allow(dead_code, unused_imports)]
mod helpers;

use helpers::*;
use russh::ChannelMsg;
use tokio::time::{sleep, Duration};

// ---------------------------------------------------------------------------
// Test 1: pty shell session streams both ways and reports the exit code
// ---------------------------------------------------------------------------
#[tokio::test]
async fn test_shell_session_round_trip() {
    let script = write_entrypoint(
        r#"printf 'term=%s\n' "$TERM"
read line
printf 'got=%s\n' "$line"
exit 7"#,
    );
    let port = free_port().await;
    let key = gen_key();
    let gw = start_gateway(gateway_config(port, &script, false), &[&key]).await;

    let handle = login(gw.port, "bob", &key).await;
    let mut channel = handle.channel_open_session().await.unwrap();
    channel
        .request_pty(true, "xterm-256color", 80, 24, 0, 0, &[])
        .await
        .unwrap();
    channel.request_shell(true).await.unwrap();

    read_until(&mut channel, "term=xterm-256color").await;
    channel.data(&b"hello\n"[..]).await.unwrap();

    let session = collect(&mut channel).await;
    assert!(session.output.contains("got=hello"), "output: {:?}", session.output);
    assert_eq!(session.exit_status, Some(7));
}

// ---------------------------------------------------------------------------
// Test 2: window changes reach the child's terminal
// ---------------------------------------------------------------------------
#[tokio::test]
async fn test_window_change_resizes_terminal() {
    let script = write_entrypoint(
        r#"read a
printf 'size=%s\n' "$(stty size)"
read b
printf 'size=%s\n' "$(stty size)""#,
    );
    let port = free_port().await;
    let key = gen_key();
    let gw = start_gateway(gateway_config(port, &script, false), &[&key]).await;

    let handle = login(gw.port, "bob", &key).await;
    let mut channel = handle.channel_open_session().await.unwrap();
    channel.request_pty(true, "vt100", 80, 24, 0, 0, &[]).await.unwrap();
    channel.request_shell(true).await.unwrap();

    channel.data(&b"one\n"[..]).await.unwrap();
    read_until(&mut channel, "size=24 80").await;

    channel.window_change(100, 40, 0, 0).await.unwrap();
    sleep(Duration::from_millis(200)).await;
    channel.data(&b"two\n"[..]).await.unwrap();
    read_until(&mut channel, "size=40 100").await;

    let session = collect(&mut channel).await;
    assert_eq!(session.exit_status, Some(0));
}

// ---------------------------------------------------------------------------
// Test 3: child sees TERM and nothing from the server environment
// ---------------------------------------------------------------------------
#[tokio::test]
async fn test_child_environment_is_term_only() {
    let script = write_entrypoint("/usr/bin/env");
    let port = free_port().await;
    let key = gen_key();
    let gw = start_gateway(gateway_config(port, &script, false), &[&key]).await;

    let handle = login(gw.port, "bob", &key).await;
    let mut channel = handle.channel_open_session().await.unwrap();
    channel.request_pty(true, "screen", 80, 24, 0, 0, &[]).await.unwrap();
    channel.request_shell(true).await.unwrap();

    let session = collect(&mut channel).await;
    assert!(session.output.contains("TERM=screen"), "output: {:?}", session.output);
    assert!(!session.output.contains("HOME="), "output: {:?}", session.output);
    assert!(!session.output.contains("CARGO"), "output: {:?}", session.output);
    assert_eq!(session.exit_status, Some(0));
}

// ---------------------------------------------------------------------------
// Test 4: a session without a pty is refused with a message
// ---------------------------------------------------------------------------
#[tokio::test]
async fn test_session_without_pty_refused() {
    let script = write_entrypoint("echo should-not-run");
    let port = free_port().await;
    let key = gen_key();
    let gw = start_gateway(gateway_config(port, &script, false), &[&key]).await;

    let handle = login(gw.port, "bob", &key).await;
    let mut channel = handle.channel_open_session().await.unwrap();
    channel.request_shell(true).await.unwrap();

    let session = collect(&mut channel).await;
    assert_eq!(session.output, "No PTY requested.\n");
    assert_eq!(session.exit_status, Some(1));
}

// ---------------------------------------------------------------------------
// Test 5: exec requests land in the entrypoint too
// ---------------------------------------------------------------------------
#[tokio::test]
async fn test_exec_runs_entrypoint() {
    let script = write_entrypoint("echo entrypoint-ran");
    let port = free_port().await;
    let key = gen_key();
    let gw = start_gateway(gateway_config(port, &script, false), &[&key]).await;

    let handle = login(gw.port, "bob", &key).await;
    let mut channel = handle.channel_open_session().await.unwrap();
    channel.request_pty(true, "xterm", 80, 24, 0, 0, &[]).await.unwrap();
    channel.exec(true, "rm -rf /").await.unwrap();

    let session = collect(&mut channel).await;
    assert!(session.output.contains("entrypoint-ran"), "output: {:?}", session.output);
    assert_eq!(session.exit_status, Some(0));
}

// ---------------------------------------------------------------------------
// Test 6: entrypoint removed after startup is reported per session
// ---------------------------------------------------------------------------
#[tokio::test]
async fn test_entrypoint_removed_after_startup() {
    let script = write_entrypoint("echo should-not-run");
    let port = free_port().await;
    let key = gen_key();
    let gw = start_gateway(gateway_config(port, &script, false), &[&key]).await;
    script.close().unwrap();

    let handle = login(gw.port, "bob", &key).await;
    let mut channel = handle.channel_open_session().await.unwrap();
    channel.request_pty(true, "xterm", 80, 24, 0, 0, &[]).await.unwrap();
    channel.request_shell(true).await.unwrap();

    let session = collect(&mut channel).await;
    assert_eq!(session.output, "Invalid SSH Entrypoint\n");
    assert_eq!(session.exit_status, Some(1));
}

// ---------------------------------------------------------------------------
// Test 7: a second shell/exec on a running channel is refused
// ---------------------------------------------------------------------------
#[tokio::test]
async fn test_second_session_request_on_channel_refused() {
    let runs = tempfile::NamedTempFile::new().unwrap();
    let script = write_entrypoint(&format!(
        "echo run >> {}\nread x\necho marker-once",
        runs.path().display()
    ));
    let port = free_port().await;
    let key = gen_key();
    let gw = start_gateway(gateway_config(port, &script, false), &[&key]).await;

    let handle = login(gw.port, "bob", &key).await;
    let mut channel = handle.channel_open_session().await.unwrap();
    channel.request_pty(true, "xterm", 80, 24, 0, 0, &[]).await.unwrap();
    channel.request_shell(true).await.unwrap();
    channel.exec(true, "second").await.unwrap();
    channel.data(&b"go\n"[..]).await.unwrap();

    let mut output = Vec::new();
    let mut exit_status = None;
    let mut failures = 0;
    let drained = tokio::time::timeout(Duration::from_secs(15), async {
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => output.extend_from_slice(&data),
                ChannelMsg::ExitStatus { exit_status: s } => exit_status = Some(s),
                ChannelMsg::Failure => failures += 1,
                ChannelMsg::Close => break,
                _ => {}
            }
        }
    })
    .await;
    assert!(drained.is_ok(), "session did not close in time");

    let output = String::from_utf8_lossy(&output);
    assert_eq!(failures, 1, "exec on a running channel must fail");
    assert_eq!(output.matches("marker-once").count(), 1, "output: {output:?}");
    assert_eq!(exit_status, Some(0));
    let runs = std::fs::read_to_string(runs.path()).unwrap();
    assert_eq!(runs.lines().count(), 1, "entrypoint runs: {runs:?}");
}
