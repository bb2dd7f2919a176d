use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use rax_ftp_core::transfer::ModePolicy;
use rax_ftp_core::{FtpServerError, Server, ServerConfig};

const STEP: Duration = Duration::from_secs(10);

struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<Result<(), FtpServerError>>,
    passive_range: (u16, u16),
    root: TempDir,
}

impl TestServer {
    fn root(&self) -> &Path {
        self.root.path()
    }
}

fn free_port() -> u16 {
    let scratch = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    scratch.local_addr().unwrap().port()
}

async fn start_server(configure: impl FnOnce(&mut ServerConfig)) -> TestServer {
    let root = TempDir::new().unwrap();
    let passive = free_port();
    let mut config = ServerConfig {
        port: 0,
        server_root: root.path().to_path_buf(),
        passive_port_min: passive,
        passive_port_max: passive.saturating_add(50),
        port_bind_retries: 10,
        connection_timeout_ms: 5_000,
        grace_period_ms: 500,
        ..ServerConfig::default()
    };
    configure(&mut config);
    let passive_range = (config.passive_port_min, config.passive_port_max);

    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = server.shutdown_token();
    let handle = tokio::spawn(server.run());
    TestServer {
        addr,
        shutdown,
        handle,
        passive_range,
        root,
    }
}

struct Control {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Control {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, writer) = stream.into_split();
        let mut control = Self {
            reader: BufReader::new(read_half),
            writer,
        };
        let greeting = control.reply().await;
        assert!(greeting.starts_with("220 "), "greeting: {greeting}");
        control
    }

    async fn reply(&mut self) -> String {
        let mut line = String::new();
        timeout(STEP, self.reader.read_line(&mut line))
            .await
            .expect("reply timed out")
            .unwrap();
        line
    }

    async fn send(&mut self, command: &str) {
        self.writer
            .write_all(format!("{command}\r\n").as_bytes())
            .await
            .unwrap();
    }

    async fn command(&mut self, command: &str) -> String {
        self.send(command).await;
        self.reply().await
    }

    async fn login(&mut self) {
        assert!(self.command("USER alice").await.starts_with("331 "));
        assert!(self.command("PASS alice123").await.starts_with("230 "));
    }

    async fn passive(&mut self) -> TcpStream {
        let reply = self.command("PASV").await;
        let target = parse_pasv(&reply);
        TcpStream::connect(target).await.unwrap()
    }
}

fn parse_pasv(reply: &str) -> SocketAddr {
    assert!(reply.starts_with("227 Entering Passive Mode ("), "{reply}");
    assert!(reply.ends_with(").\r\n"), "{reply}");
    let start = reply.find('(').unwrap() + 1;
    let end = reply.find(')').unwrap();
    let fields: Vec<u16> = reply[start..end]
        .split(',')
        .map(|field| field.parse().unwrap())
        .collect();
    assert_eq!(fields.len(), 6);
    let ip = format!("{}.{}.{}.{}", fields[0], fields[1], fields[2], fields[3]);
    SocketAddr::new(ip.parse().unwrap(), fields[4] * 256 + fields[5])
}

async fn read_all(mut stream: TcpStream) -> Vec<u8> {
    let mut data = Vec::new();
    timeout(STEP, stream.read_to_end(&mut data))
        .await
        .expect("data timed out")
        .unwrap();
    data
}

#[tokio::test]
async fn test_login_and_noop() {
    let server = start_server(|_| {}).await;
    let mut control = Control::connect(server.addr).await;
    assert!(control.command("NOOP").await.starts_with("200 "));
    control.login().await;
    assert!(control.command("FEAT").await.starts_with("502 "));
    assert!(control.command("QUIT").await.starts_with("221 "));
}

#[tokio::test]
async fn test_commands_before_login_are_refused() {
    let server = start_server(|_| {}).await;
    let mut control = Control::connect(server.addr).await;
    assert_eq!(control.command("PASV").await, "530 Not logged in\r\n");
    assert_eq!(control.command("LIST").await, "530 Not logged in\r\n");
}

#[tokio::test]
async fn test_pasv_reply_encodes_bound_port() {
    let server = start_server(|_| {}).await;
    let mut control = Control::connect(server.addr).await;
    control.login().await;

    let reply = control.command("PASV").await;
    let target = parse_pasv(&reply);
    assert_eq!(target.ip().to_string(), "127.0.0.1");
    let (min, max) = server.passive_range;
    assert!((min..=max).contains(&target.port()));
    assert!(TcpStream::connect(target).await.is_ok());
}

#[tokio::test]
async fn test_pasv_with_argument_is_rejected() {
    let server = start_server(|_| {}).await;
    let mut control = Control::connect(server.addr).await;
    control.login().await;
    assert_eq!(
        control.command("PASV 127,0,0,1,4,1").await,
        "501 No argument allowed\r\n"
    );
}

#[tokio::test]
async fn test_passive_refused_by_active_only_server() {
    let server = start_server(|config| config.mode_policy = ModePolicy::Active).await;
    let mut control = Control::connect(server.addr).await;
    control.login().await;
    assert_eq!(
        control.command("PASV").await,
        "501 Passive mode not allowed\r\n"
    );
    assert!(control.command("PORT").await.starts_with("200 "));
}

#[tokio::test]
async fn test_port_with_foreign_address_is_rejected() {
    let server = start_server(|_| {}).await;
    let mut control = Control::connect(server.addr).await;
    control.login().await;
    assert_eq!(
        control.command("PORT 10,1,2,3,4,1").await,
        "501 Given Inet Address mismatches actual client Address\r\n"
    );
    assert_eq!(
        control.command("PORT not-an-address").await,
        "501 Need correct Inet Address as argument\r\n"
    );
}

#[tokio::test]
async fn test_list_over_passive_connection() {
    let server = start_server(|_| {}).await;
    std::fs::write(server.root().join("hello.txt"), b"hi").unwrap();
    std::fs::create_dir(server.root().join("docs")).unwrap();

    let mut control = Control::connect(server.addr).await;
    control.login().await;
    let data = control.passive().await;
    assert!(control.command("LIST").await.starts_with("150 "));

    let listing = String::from_utf8(read_all(data).await).unwrap();
    let lines: Vec<&str> = listing.split("\r\n").filter(|l| !l.is_empty()).collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("docs/|0|"));
    assert!(lines[1].starts_with("hello.txt|2|"));
    assert_eq!(control.reply().await, "226 Transfer complete\r\n");
}

#[tokio::test]
async fn test_empty_listing_sends_single_terminator() {
    let server = start_server(|_| {}).await;
    let mut control = Control::connect(server.addr).await;
    control.login().await;
    let data = control.passive().await;
    assert!(control.command("NLST").await.starts_with("150 "));
    assert_eq!(read_all(data).await, b"\r\n");
    assert_eq!(control.reply().await, "226 Transfer complete\r\n");
}

#[tokio::test]
async fn test_retrieve_missing_file() {
    let server = start_server(|_| {}).await;
    let mut control = Control::connect(server.addr).await;
    control.login().await;
    let data = control.passive().await;
    assert!(control.command("RETR nope.txt").await.starts_with("150 "));
    assert_eq!(control.reply().await, "550 File not found\r\n");
    // the data connection is closed rather than left hanging
    assert!(read_all(data).await.is_empty());

    // the connection keeps serving commands
    assert!(control.command("NOOP").await.starts_with("200 "));
}

#[tokio::test]
async fn test_store_then_retrieve() {
    let server = start_server(|_| {}).await;
    let mut control = Control::connect(server.addr).await;
    control.login().await;

    let mut data = control.passive().await;
    assert!(control.command("STOR upload.bin").await.starts_with("150 "));
    data.write_all(b"some uploaded bytes").await.unwrap();
    drop(data);
    assert_eq!(control.reply().await, "226 Transfer complete\r\n");
    assert_eq!(
        std::fs::read(server.root().join("upload.bin")).unwrap(),
        b"some uploaded bytes"
    );

    let data = control.passive().await;
    assert!(control.command("RETR upload.bin").await.starts_with("150 "));
    assert_eq!(read_all(data).await, b"some uploaded bytes");
    assert_eq!(control.reply().await, "226 Transfer complete\r\n");
}

#[tokio::test]
async fn test_list_over_active_connection() {
    let server = start_server(|_| {}).await;
    std::fs::write(server.root().join("a.txt"), b"a").unwrap();

    let mut control = Control::connect(server.addr).await;
    control.login().await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let reply = control
        .command(&format!("PORT 127,0,0,1,{},{}", port >> 8, port & 0xff))
        .await;
    assert!(reply.starts_with("200 "), "{reply}");

    control.send("NLST").await;
    let (data, _) = timeout(STEP, listener.accept()).await.unwrap().unwrap();
    assert!(control.reply().await.starts_with("150 "));
    assert_eq!(read_all(data).await, b"a.txt\r\n");
    assert_eq!(control.reply().await, "226 Transfer complete\r\n");
}

#[tokio::test]
async fn test_graceful_shutdown_closes_control_connections() {
    let server = start_server(|_| {}).await;
    let mut control = Control::connect(server.addr).await;
    control.login().await;
    assert!(control.command("PORT").await.starts_with("200 "));

    server.shutdown.cancel();
    assert!(control.reply().await.starts_with("421 "));
    timeout(STEP, server.handle).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_idle_connection_is_swept() {
    let server = start_server(|config| {
        config.idle_timeout_ms = 200;
        config.sweep_interval_ms = 50;
    })
    .await;
    let mut control = Control::connect(server.addr).await;
    control.login().await;
    assert!(control.reply().await.starts_with("421 "));
}
