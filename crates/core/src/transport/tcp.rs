use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crate::protocol::Request;
use crate::protocol::SessionHandler;
use crate::server::ServerConfig;

/// Non-blocking TCP accept loop.
///
/// Checks the `running` flag between accepts with the configured poll
/// interval so [`crate::server::Server::stop`] can terminate it promptly.
/// Each accepted connection gets its own worker thread owning one session.
pub fn accept_loop(listener: TcpListener, config: Arc<ServerConfig>, running: Arc<AtomicBool>) {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                if stream.set_nonblocking(false).is_err() {
                    continue;
                }
                let c = config.clone();
                let r = running.clone();
                thread::spawn(move || {
                    Connection::handle(stream, c, r);
                });
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(config.poll_interval);
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
    tracing::debug!("accept loop exited");
}

/// A single control connection with its own session lifecycle.
struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    handler: SessionHandler,
    peer_addr: SocketAddr,
}

impl Connection {
    /// Entry point: set up a connection and run its request loop.
    pub fn handle(stream: TcpStream, config: Arc<ServerConfig>, running: Arc<AtomicBool>) {
        let peer_addr = match stream.peer_addr() {
            Ok(addr) => addr,
            Err(_) => return,
        };

        tracing::info!(%peer_addr, "client connected");

        let reader_stream = match stream.try_clone() {
            Ok(s) => s,
            Err(_) => return,
        };

        let mut conn = Connection {
            reader: BufReader::new(reader_stream),
            writer: stream,
            handler: SessionHandler::new(peer_addr, config),
            peer_addr,
        };

        let reason = conn.run(&running);
        conn.handler.shutdown();

        tracing::info!(%peer_addr, reason, "client disconnected");
    }

    /// Request/response loop. Returns the reason for exiting.
    fn run(&mut self, running: &Arc<AtomicBool>) -> &'static str {
        while running.load(Ordering::SeqCst) {
            let mut request_text = String::new();
            loop {
                let mut line = String::new();
                match self.reader.read_line(&mut line) {
                    Ok(0) => return "connection closed by client",
                    Ok(_) => {
                        request_text.push_str(&line);
                        if line == "\r\n" || line == "\n" {
                            break;
                        }
                    }
                    Err(_) => return "read error",
                }
            }

            if request_text.trim().is_empty() {
                continue;
            }

            match Request::parse(&request_text) {
                Ok(request) => {
                    tracing::debug!(
                        peer = %self.peer_addr,
                        method = %request.method,
                        resource = %request.resource,
                        "request"
                    );

                    match self.handler.handle(&request) {
                        Some(response) => {
                            tracing::debug!(
                                peer = %self.peer_addr,
                                status = response.status_code,
                                "response"
                            );

                            if self
                                .writer
                                .write_all(response.serialize().as_bytes())
                                .is_err()
                            {
                                return "write error";
                            }
                        }
                        None => {
                            tracing::debug!(
                                peer = %self.peer_addr,
                                method = %request.method,
                                "verb illegal in current state, ignored"
                            );
                        }
                    }
                }
                Err(e) => {
                    // Malformed control message: dropped, no reply, no crash.
                    tracing::warn!(peer = %self.peer_addr, error = %e, "dropping unparseable request");
                }
            }
        }

        "server shutting down"
    }
}
