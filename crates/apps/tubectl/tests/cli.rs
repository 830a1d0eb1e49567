use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

#[tokio::test]
async fn spawn_session_exits_while_stdin_is_still_open() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_tubectl"))
        .args(["spawn", "echo", "hi"])
        .env("RUST_LOG", "off")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .unwrap();
    // Held open for the whole test; tubectl must not wait for it to close.
    let _stdin = child.stdin.take().unwrap();

    let output = tokio::time::timeout(Duration::from_secs(10), child.wait_with_output())
        .await
        .expect("tubectl kept running after the session ended")
        .unwrap();

    assert!(output.status.success());
    let shown = String::from_utf8(output.stdout).unwrap();
    assert!(shown.contains("Switching to interactive mode..."));
    assert!(shown.contains("hi\n"));
}

#[tokio::test]
async fn invalid_protocol_is_reported() {
    let output = Command::new(env!("CARGO_BIN_EXE_tubectl"))
        .args(["connect", "127.0.0.1", "9", "--proto", "xxx"])
        .env("RUST_LOG", "off")
        .stdin(Stdio::null())
        .output()
        .await
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("invalid protocol"), "stderr: {stderr}");
}
