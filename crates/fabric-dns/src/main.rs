use bytes::BytesMut;
use clap::Parser;
use std::collections::HashSet;
use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tracing::Instrument;
use tracing_subscriber::EnvFilter;

use dns_types::protocol::serialise::Transport;
use dns_types::protocol::types::*;

use fabric_dns::answers::StaticAnswers;
use fabric_dns::metrics::*;
use fabric_dns::net_util::{read_tcp_bytes, send_tcp_bytes, send_udp_bytes_to, TcpError};
use fabric_dns::server::{handle_raw_message, record_response};
use fabric_dns::settings::Settings;

const PRODUCTION_PORT: u16 = 53;
const DEVELOPMENT_PORT: u16 = 1053;

/// Largest datagram read from a client.
const UDP_READ_LIMIT: usize = 512;

async fn listen_tcp_task(answers: Arc<StaticAnswers>, socket: TcpListener) {
    loop {
        match socket.accept().await {
            Ok((stream, peer)) => {
                let answers = answers.clone();
                tokio::spawn(
                    async move {
                        TCP_CONNECTIONS_OPEN.inc();
                        serve_tcp_connection(&answers, stream).await;
                        TCP_CONNECTIONS_OPEN.dec();
                    }
                    .instrument(tracing::error_span!("tcp", %peer)),
                );
            }
            Err(error) => tracing::debug!(?error, "could not accept TCP connection"),
        }
    }
}

/// Answer queries on one connection until the client hangs up or
/// sends something which isn't a DNS message.
async fn serve_tcp_connection(answers: &StaticAnswers, mut stream: TcpStream) {
    loop {
        let bytes = match read_tcp_bytes(&mut stream).await {
            Ok(bytes) => bytes,
            Err(TcpError::Closed) => return,
            Err(error) => {
                tracing::debug!(%error, "TCP read error");
                return;
            }
        };

        let start = Instant::now();
        DNS_REQUESTS_TOTAL.with_label_values(&[PROTOCOL_TCP]).inc();

        let response = match handle_raw_message(answers, bytes.as_ref()) {
            Ok(response) => response,
            Err(error) => {
                DNS_REQUESTS_MALFORMED_TOTAL
                    .with_label_values(&[PROTOCOL_TCP])
                    .inc();
                tracing::debug!(%error, "malformed message, closing connection");
                return;
            }
        };

        if !send_response(&mut stream, &response).await {
            return;
        }

        DNS_RESPONSE_TIME_SECONDS
            .with_label_values(&[PROTOCOL_TCP])
            .observe(start.elapsed().as_secs_f64());
    }
}

async fn send_response(stream: &mut TcpStream, response: &Message) -> bool {
    let serialised = match response.to_octets(Transport::Tcp) {
        Ok(serialised) => serialised,
        Err(error) => {
            tracing::error!(?response, %error, "could not serialise message");
            return false;
        }
    };

    if let Err(error) = send_tcp_bytes(stream, &serialised).await {
        tracing::debug!(%error, "TCP send error");
        return false;
    }

    record_response(response);
    true
}

async fn listen_udp_task(answers: Arc<StaticAnswers>, socket: UdpSocket) {
    let (tx, mut rx) = mpsc::channel(32);
    let mut buf = vec![0u8; UDP_READ_LIMIT];

    loop {
        tokio::select! {
            Ok((size, peer)) = socket.recv_from(&mut buf) => {
                let bytes = BytesMut::from(&buf[..size]);
                let reply = tx.clone();
                let answers = answers.clone();
                let span = tracing::error_span!("udp", %peer);
                tokio::spawn(async move {
                    let start = Instant::now();
                    DNS_REQUESTS_TOTAL.with_label_values(&[PROTOCOL_UDP]).inc();

                    let response = match handle_raw_message(answers.as_ref(), bytes.as_ref()) {
                        Ok(response) => response,
                        Err(error) => {
                            DNS_REQUESTS_MALFORMED_TOTAL.with_label_values(&[PROTOCOL_UDP]).inc();
                            tracing::debug!(%error, "malformed message");
                            match error.id() {
                                Some(id) => Message::make_format_error_response(id),
                                None => return,
                            }
                        }
                    };

                    if let Err(error) = reply.send((response, peer, start)).await {
                        tracing::debug!(%error, "UDP reply error");
                    }
                }.instrument(span));
            }

            Some((response, peer, start)) = rx.recv() => {
                match response.to_octets(Transport::Udp) {
                    Ok(serialised) => {
                        if let Err(error) = send_udp_bytes_to(&socket, peer, &serialised).await {
                            tracing::debug!(%peer, %error, "UDP send error");
                        } else {
                            record_response(&response);
                            DNS_RESPONSE_TIME_SECONDS
                                .with_label_values(&[PROTOCOL_UDP])
                                .observe(start.elapsed().as_secs_f64());
                        }
                    }
                    Err(error) => {
                        tracing::error!(?response, %error, "could not serialise message");
                    }
                }
            }
        }
    }
}

fn begin_logging() {
    let log_format = if let Ok(var) = env::var("RUST_LOG_FORMAT") {
        let mut set = HashSet::new();
        for s in var.split(',') {
            set.insert(s.trim().to_lowercase());
        }
        set
    } else {
        HashSet::new()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let logger = tracing_subscriber::fmt().with_env_filter(filter);

    if log_format.contains("json") {
        logger.json().init();
    } else if log_format.contains("compact") {
        logger.compact().init();
    } else {
        logger.init();
    }
}

// the doc comments for this struct turn into the CLI help text
#[derive(Debug, Parser)]
/// A small authoritative DNS server.
///
/// Answers A, AAAA, MX, and NS questions from a fixed set of records,
/// over UDP and TCP.  It does not recurse, cache, or load zone files.
struct Args {
    /// Interface to listen on
    #[clap(
        short,
        long,
        default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        env = "FABRIC_DNS_INTERFACE"
    )]
    interface: IpAddr,

    /// Listen on port 53 rather than 1053
    #[clap(long, env = "FABRIC_DNS_PRODUCTION")]
    production: bool,

    /// Port to listen on, overriding --production
    #[clap(short, long, env = "FABRIC_DNS_PORT")]
    port: Option<u16>,

    /// Path to a settings file listing the records to serve
    #[clap(short, long, env = "FABRIC_DNS_CONFIG")]
    config: Option<PathBuf>,

    /// Address to serve Prometheus metrics on, at `/metrics`
    #[clap(short = 'm', long, env = "FABRIC_DNS_METRICS_ADDRESS")]
    metrics_address: Option<SocketAddr>,
}

impl Args {
    fn port(&self) -> u16 {
        match self.port {
            Some(port) => port,
            None if self.production => PRODUCTION_PORT,
            None => DEVELOPMENT_PORT,
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    begin_logging();

    let settings = match &args.config {
        Some(path) => match Settings::new(path) {
            Ok(settings) => settings,
            Err(error) => {
                tracing::error!(?path, %error, "could not read settings");
                process::exit(1);
            }
        },
        None => Settings::default(),
    };

    let answers = Arc::new(StaticAnswers::new(&settings));
    tracing::info!(names = answers.len(), "loaded records");

    let port = args.port();
    tracing::info!(interface = %args.interface, %port, "binding DNS sockets");

    let udp = match UdpSocket::bind((args.interface, port)).await {
        Ok(s) => s,
        Err(error) => {
            tracing::error!(%error, "could not bind UDP socket");
            process::exit(1);
        }
    };

    let tcp = match TcpListener::bind((args.interface, port)).await {
        Ok(s) => s,
        Err(error) => {
            tracing::error!(%error, "could not bind TCP socket");
            process::exit(1);
        }
    };

    if let Some(address) = args.metrics_address {
        tracing::info!(%address, "binding metrics endpoint");
        tokio::spawn(async move {
            if let Err(error) = serve_prometheus_endpoint_task(address).await {
                tracing::error!(%error, "metrics endpoint stopped");
            }
        });
    }

    tokio::spawn(listen_tcp_task(answers.clone(), tcp));
    tokio::spawn(listen_udp_task(answers, udp));

    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "could not wait for shutdown signal");
        process::exit(1);
    }

    tracing::info!("shutting down");
}
