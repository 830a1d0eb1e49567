use tokio::net::{TcpListener, UdpSocket};
use tubes::{Protocol, Remote, TubeError};

const HOST: &str = "127.0.0.1";

async fn run_echo_server() -> u16 {
    let listener = TcpListener::bind((HOST, 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let (mut conn, _) = listener.accept().await.unwrap();
            tokio::spawn(async move {
                let (mut reader, mut writer) = conn.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    port
}

async fn run_udp_echo_server() -> u16 {
    let socket = UdpSocket::bind((HOST, 0)).await.unwrap();
    let port = socket.local_addr().unwrap().port();
    tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        loop {
            let (n, from) = socket.recv_from(&mut buf).await.unwrap();
            socket.send_to(&buf[..n], from).await.unwrap();
        }
    });
    port
}

#[tokio::test]
async fn tcp_line_round_trip() {
    let port = run_echo_server().await;

    let mut remote = Remote::connect(HOST, port, "tcp").await.unwrap();
    assert_eq!(remote.protocol(), Protocol::Tcp);
    assert_eq!(remote.peer_addr().port(), port);

    const EXPECTED: &str = "hello world";
    let sent = remote.send_line(EXPECTED).await.unwrap();
    assert_eq!(sent, format!("{EXPECTED}\n").as_bytes());

    let line = remote.recv_line(false).await.unwrap();
    assert_eq!(line, EXPECTED.as_bytes());

    remote.close().await.unwrap();
}

#[tokio::test]
async fn tcp_send_then_recv_n() {
    let port = run_echo_server().await;
    let mut remote = Remote::connect(HOST, port, "tcp").await.unwrap();

    let payload: Vec<u8> = (0..=255u8).collect();
    let sent = remote.send(&payload).await.unwrap();
    assert_eq!(sent, payload);
    assert_eq!(remote.recv_n(payload.len(), None).await.unwrap(), payload);

    remote.send_line("keep").await.unwrap();
    assert_eq!(remote.recv_line(true).await.unwrap(), b"keep\n");

    let reply = remote.send_line_then('\n', "prompt> ").await.unwrap();
    assert_eq!(reply, b"prompt> \n");

    remote.close().await.unwrap();
}

#[tokio::test]
async fn close_releases_only_that_connection() {
    let port = run_echo_server().await;
    let mut remote = Remote::connect(HOST, port, "tcp").await.unwrap();

    remote.send("last words").await.unwrap();
    remote.close().await.unwrap();

    // A fresh connection still works; the server only lost the closed one.
    let mut again = Remote::connect(HOST, port, "tcp").await.unwrap();
    again.send_line("still here").await.unwrap();
    assert_eq!(again.recv_line(false).await.unwrap(), b"still here");
}

#[tokio::test]
async fn recv_all_after_peer_shutdown() {
    let listener = TcpListener::bind((HOST, 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        use tokio::io::AsyncWriteExt;
        let (mut conn, _) = listener.accept().await.unwrap();
        conn.write_all(b"banner\npayload").await.unwrap();
        conn.shutdown().await.unwrap();
    });

    let mut remote = Remote::connect(HOST, port, "tcp").await.unwrap();
    assert_eq!(remote.recv_line(false).await.unwrap(), b"banner");
    assert_eq!(remote.recv_all().await.unwrap(), b"payload");
}

#[tokio::test]
async fn udp_round_trip() {
    let port = run_udp_echo_server().await;

    let mut remote = Remote::connect(HOST, port, "udp").await.unwrap();
    assert_eq!(remote.protocol(), Protocol::Udp);

    remote.send_line("ping").await.unwrap();
    assert_eq!(remote.recv_line(false).await.unwrap(), b"ping");

    remote.close().await.unwrap();
}

#[tokio::test]
async fn invalid_protocol_fails_before_dialing() {
    // Nothing listens on port 1; a dial attempt would fail differently.
    let err = Remote::connect(HOST, 1, "xxx").await.unwrap_err();
    assert!(matches!(err, TubeError::InvalidProtocol(ref name) if name == "xxx"));
}

#[tokio::test]
async fn port_zero_is_a_dial_error() {
    let err = Remote::connect(HOST, 0, "tcp").await.unwrap_err();
    assert!(matches!(err, TubeError::Dial { protocol: "tcp", .. }), "got {err}");
}

#[tokio::test]
async fn refused_connection_is_a_dial_error() {
    let listener = TcpListener::bind((HOST, 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = Remote::connect(HOST, port, "tcp").await.unwrap_err();
    match err {
        TubeError::Dial { addr, source, .. } => {
            assert_eq!(addr, format!("{HOST}:{port}"));
            assert_eq!(source.kind(), std::io::ErrorKind::ConnectionRefused);
        }
        other => panic!("unexpected error: {other}"),
    }
}
