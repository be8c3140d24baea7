use ssgd::{Config, Server, ServerError, Shutdown};
use std::fs;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const INDEX: &str = "<html><body>home</body></html>";

struct Running {
    root: TempDir,
    address: SocketAddr,
    shutdown: Shutdown,
    done: mpsc::Receiver<Result<(), ServerError>>,
}

impl Running {
    fn stop(self) {
        self.shutdown.trigger();
        let result = self
            .done
            .recv_timeout(Duration::from_secs(10))
            .expect("server did not stop");
        assert!(result.is_ok(), "server failed: {result:?}");
    }
}

fn start(idle_timeout: Duration) -> Running {
    start_with(2, idle_timeout)
}

fn start_with(workers: usize, idle_timeout: Duration) -> Running {
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("index.html"), INDEX).unwrap();
    fs::write(root.path().join("about.html"), "about").unwrap();
    fs::create_dir_all(root.path().join("static")).unwrap();
    fs::write(root.path().join("static/site.css"), "body {}").unwrap();

    let server = Server::builder()
        .port(0)
        .workers(workers)
        .document_root(root.path())
        .idle_timeout(idle_timeout)
        .slot_interval(Duration::from_millis(50))
        .bind()
        .unwrap();

    let port = server.local_addr().unwrap().port();
    let shutdown = server.shutdown_handle();

    let (tx, done) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(server.run());
    });

    Running {
        root,
        address: SocketAddr::from(([127, 0, 0, 1], port)),
        shutdown,
        done,
    }
}

fn connect(address: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(address).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream
}

/// Reads one response, using `Content-Length` to find its end.
fn read_response(stream: &mut TcpStream) -> (String, Vec<u8>) {
    let mut received = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        if let Some(end) = received.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&received[..end + 4]).into_owned();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("Content-Length: "))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);

            if received.len() >= end + 4 + length {
                let body = received[end + 4..end + 4 + length].to_vec();
                return (head, body);
            }
        }

        let n = stream.read(&mut chunk).unwrap();
        assert!(n > 0, "connection closed mid-response");
        received.extend_from_slice(&chunk[..n]);
    }
}

fn assert_closed(stream: &mut TcpStream) {
    let mut buffer = [0u8; 16];
    match stream.read(&mut buffer) {
        Ok(0) => {}
        Ok(n) => panic!("expected EOF, read {n} bytes"),
        Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => {}
        Err(e) => panic!("expected EOF, got {e}"),
    }
}

#[test]
fn test_get_root_serves_index() {
    let server = start(Duration::from_secs(30));
    let mut client = connect(server.address);

    client
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .unwrap();
    let (head, body) = read_response(&mut client);

    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(head.contains(&format!("Content-Length: {}\r\n", INDEX.len())));
    assert!(head.contains("Content-Type: text/html\r\n"));
    assert!(head.contains("X-Content-Type-Options: nosniff\r\n"));
    assert!(head.contains("X-Frame-Options: DENY\r\n"));
    assert_eq!(body, INDEX.as_bytes());

    drop(client);
    server.stop();
}

#[test]
fn test_slow_reader_does_not_stall_its_worker() {
    let server = start_with(1, Duration::from_secs(30));

    let content = vec![b'z'; 32 * 1024 * 1024];
    fs::write(server.root.path().join("big.bin"), &content).unwrap();

    let mut slow = connect(server.address);
    slow.write_all(b"GET /big.bin HTTP/1.1\r\n\r\n").unwrap();

    // Give the worker time to fill the slow client's socket buffers.
    thread::sleep(Duration::from_millis(300));

    let mut fast = connect(server.address);
    let started = Instant::now();
    fast.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();
    let (head, body) = read_response(&mut fast);
    let waited = started.elapsed();

    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body, INDEX.as_bytes());
    assert!(waited < Duration::from_secs(1), "waited {waited:?}");

    let (head, body) = read_response(&mut slow);
    assert!(head.contains(&format!("Content-Length: {}\r\n", content.len())));
    assert_eq!(body.len(), content.len());
    assert!(body == content);

    drop(slow);
    drop(fast);
    server.stop();
}

#[test]
fn test_request_with_trailing_payload_gets_full_response() {
    let server = start(Duration::from_secs(30));
    let mut client = connect(server.address);

    let mut request = b"GET / HTTP/1.1\r\n\r\n".to_vec();
    request.extend(std::iter::repeat_n(b'x', 12 * 1024));
    client.write_all(&request).unwrap();

    let (head, body) = read_response(&mut client);
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body, INDEX.as_bytes());

    drop(client);
    server.stop();
}

#[test]
fn test_keep_alive_serves_sequential_requests() {
    let server = start(Duration::from_secs(30));
    let mut client = connect(server.address);

    for (uri, expected) in [("/about", "about"), ("/static/site.css", "body {}"), ("/", INDEX)] {
        let request = format!("GET {uri} HTTP/1.1\r\n\r\n");
        client.write_all(request.as_bytes()).unwrap();

        let (head, body) = read_response(&mut client);
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"), "{uri}: {head}");
        assert_eq!(body, expected.as_bytes());
    }

    drop(client);
    server.stop();
}

#[test]
fn test_post_is_rejected_and_closed() {
    let server = start(Duration::from_secs(30));
    let mut client = connect(server.address);

    client.write_all(b"POST / HTTP/1.1\r\n\r\n").unwrap();
    let (head, _) = read_response(&mut client);

    assert!(head.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));
    assert!(head.contains("Connection: close\r\n"));
    assert_closed(&mut client);

    server.stop();
}

#[test]
fn test_traversal_is_forbidden() {
    let server = start(Duration::from_secs(30));

    for uri in ["/static/../../../etc/passwd", "/../../etc/passwd"] {
        let mut client = connect(server.address);
        let request = format!("GET {uri} HTTP/1.1\r\n\r\n");
        client.write_all(request.as_bytes()).unwrap();

        let (head, body) = read_response(&mut client);
        assert!(head.starts_with("HTTP/1.1 403 Forbidden\r\n"), "{uri}: {head}");
        assert!(!String::from_utf8_lossy(&body).contains("root:"));
        assert_closed(&mut client);
    }

    server.stop();
}

#[test]
fn test_missing_file_is_not_found() {
    let server = start(Duration::from_secs(30));
    let mut client = connect(server.address);

    client.write_all(b"GET /nowhere HTTP/1.1\r\n\r\n").unwrap();
    let (head, _) = read_response(&mut client);

    assert!(head.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert_closed(&mut client);

    server.stop();
}

#[test]
fn test_silent_connection_is_closed_after_idle_timeout() {
    let server = start(Duration::from_millis(300));
    let mut client = connect(server.address);

    let started = Instant::now();
    assert_closed(&mut client);

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(200), "closed too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "closed too late: {elapsed:?}");

    server.stop();
}

#[test]
fn test_connections_spread_over_workers() {
    let server = start(Duration::from_secs(30));

    let mut clients: Vec<TcpStream> = (0..6).map(|_| connect(server.address)).collect();
    for client in &mut clients {
        client.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();
    }
    for client in &mut clients {
        let (head, body) = read_response(client);
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert_eq!(body, INDEX.as_bytes());
    }

    drop(clients);
    server.stop();
}

#[test]
fn test_shutdown_closes_open_connections() {
    let server = start(Duration::from_secs(30));
    let mut client = connect(server.address);

    client.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();
    read_response(&mut client);

    server.stop();
    assert_closed(&mut client);
}

#[test]
fn test_bind_from_config() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("index.html"), INDEX).unwrap();

    let config = Config {
        port: 0,
        num_workers: 1,
        document_root: dir.path().to_path_buf(),
        ..Config::default()
    };

    let server = Server::bind(&config).unwrap();
    let address = SocketAddr::from(([127, 0, 0, 1], server.local_addr().unwrap().port()));
    let shutdown = server.shutdown_handle();
    let handle = thread::spawn(move || server.run());

    let mut client = connect(address);
    client.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();
    let (head, body) = read_response(&mut client);
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body, INDEX.as_bytes());

    drop(client);
    shutdown.trigger();
    assert!(handle.join().unwrap().is_ok());
}

#[test]
fn test_missing_document_root_is_fatal() {
    let dir = tempfile::tempdir().unwrap();

    let result = Server::builder()
        .port(0)
        .document_root(dir.path().join("missing"))
        .bind();

    assert!(matches!(result, Err(ServerError::DocumentRoot { .. })));
}

#[test]
fn test_zero_workers_is_rejected() {
    let dir = tempfile::tempdir().unwrap();

    let result = Server::builder()
        .port(0)
        .workers(0)
        .document_root(dir.path())
        .bind();

    assert!(matches!(result, Err(ServerError::Settings(_))));
}

#[test]
fn test_port_in_use_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let holder = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
    let port = holder.local_addr().unwrap().port();

    let result = Server::builder()
        .port(port)
        .document_root(dir.path())
        .bind();

    assert!(matches!(result, Err(ServerError::Bind { .. })));
}
