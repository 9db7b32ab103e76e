use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use orwell_core::agent::LivenessCheck;
use orwell_core::storage::{log_file_name, INDEX_FILE_NAME};
use orwell_core::{AppConfig, ClientAgent, ClientArgs, LoggerServer};
use tokio::sync::watch;

fn test_config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.general.log_root = dir.join("logged");
    config.server.socket_path = dir.join("logger.sock");
    config.server.max_connections = 2;
    config.client.marker_dir = dir.to_path_buf();
    config.client.retry_interval_ms = 20;
    config.client.watchdog_interval_ms = 20;
    config
}

fn args(session: &str) -> ClientArgs {
    ClientArgs {
        session: session.to_string(),
        token1: "0".to_string(),
        token2: "1".to_string(),
        pane_pid: std::process::id(),
    }
}

async fn wait_for_file(path: &Path, expected: &[u8]) -> bool {
    for _ in 0..100 {
        if std::fs::read(path).map(|b| b == expected).unwrap_or(false) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_agent_commands_land_in_session_dir() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let server = Arc::new(LoggerServer::new(&config));
    let listener = server.bind().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_task = {
        let server = server.clone();
        tokio::spawn(async move { server.serve(listener, shutdown_rx).await })
    };

    let input: &[u8] = b"ack\n~/src : ls -la\nhello\n::end_cmd::\n\
                         ack\n~/src : make\nok\nbuilt\n::end_cmd::\n";
    let alive: LivenessCheck = Arc::new(|_: u32| true);
    let agent = ClientAgent::setup_with_check(args("mysession"), &config, input, alive).unwrap();
    let marker = agent.marker_path().to_path_buf();
    agent.run().await.unwrap();
    assert!(!marker.exists());

    let session_dir = config.session_dir("mysession");
    assert!(wait_for_file(&session_dir.join(log_file_name(b"ls -la")), b"hello\n").await);
    assert!(wait_for_file(&session_dir.join(log_file_name(b"make")), b"ok\nbuilt\n").await);
    assert!(wait_for_file(&session_dir.join(INDEX_FILE_NAME), b"ls -la\nmake\n").await);

    // The final connection carried only a handshake, producing an empty-command log
    assert!(wait_for_file(&session_dir.join(log_file_name(b"")), b"").await);

    shutdown_tx.send(true).unwrap();
    server_task.await.unwrap().unwrap();
    assert!(!config.socket_path().exists());
}

#[tokio::test]
async fn test_daemon_survives_garbage_connections() {
    use tokio::io::AsyncWriteExt;
    use tokio::net::UnixStream;

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    std::fs::write(config.socket_path(), b"left over from a crash").unwrap();

    let server = Arc::new(LoggerServer::new(&config));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_task = {
        let server = server.clone();
        tokio::spawn(async move { server.run(shutdown_rx).await })
    };

    let mut ready = false;
    for _ in 0..100 {
        if UnixStream::connect(config.socket_path()).await.is_ok() {
            ready = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(ready);

    let junk_frames: [&[u8]; 3] = [
        b"hello\n",
        b"",
        b"::new_cmd:: abcd1234 ../escape\nack\nx : y\n",
    ];
    for junk in junk_frames {
        let mut stream = UnixStream::connect(config.socket_path()).await.unwrap();
        stream.write_all(junk).await.unwrap();
    }

    let mut stream = UnixStream::connect(config.socket_path()).await.unwrap();
    stream
        .write_all(b"::new_cmd:: abcd1234 after\nack\n$ : uptime\nup 3 days\n")
        .await
        .unwrap();
    drop(stream);

    let session_dir = config.session_dir("after");
    assert!(wait_for_file(&session_dir.join(log_file_name(b"uptime")), b"up 3 days\n").await);
    assert!(!dir.path().join("escape").exists());

    let entries: Vec<_> = std::fs::read_dir(config.log_root())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(entries, vec![std::ffi::OsString::from("after")]);

    shutdown_tx.send(true).unwrap();
    server_task.await.unwrap().unwrap();
}
