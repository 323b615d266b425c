//! ZeroMQ PUSH socket.
//!
//! Downstream controllers connect a PULL socket to the bound endpoint. Every
//! message is handed to one connected peer in round-robin order; sends never
//! wait, so a message that cannot be queued right now is dropped.

use std::fmt;

use super::sink::{MessageSink, SendOutcome, SinkError};

/// Messages queued per peer before further sends are dropped.
pub const DEFAULT_SEND_HWM: i32 = 1000;

/// `host:port` becomes `tcp://host:port`; full endpoints pass through.
fn endpoint(addr: &str) -> String {
    if addr.contains("://") {
        addr.to_string()
    } else {
        format!("tcp://{addr}")
    }
}

/// Bound PUSH endpoint.
pub struct PushSocket {
    socket: zmq::Socket,
    // keeps the I/O threads alive for as long as the socket
    _context: zmq::Context,
    endpoint: String,
}

impl PushSocket {
    /// Bind on `addr` (`tcp://*:7777` or `host:port`).
    pub fn bind(addr: &str) -> Result<Self, SinkError> {
        Self::bind_with(addr, DEFAULT_SEND_HWM)
    }

    /// Bind with an explicit per-peer send queue limit.
    pub fn bind_with(addr: &str, send_hwm: i32) -> Result<Self, SinkError> {
        let bind_err = |source| SinkError::Bind {
            addr: addr.to_string(),
            source,
        };
        let context = zmq::Context::new();
        let socket = context.socket(zmq::PUSH).map_err(bind_err)?;
        // unsent telemetry is stale; never hold up shutdown for it
        socket.set_linger(0).map_err(bind_err)?;
        socket.set_sndhwm(send_hwm).map_err(bind_err)?;
        socket.bind(&endpoint(addr)).map_err(bind_err)?;

        let endpoint = match socket.get_last_endpoint().map_err(bind_err)? {
            Ok(ep) => ep,
            Err(raw) => String::from_utf8_lossy(&raw).into_owned(),
        };
        log::info!("push socket bound on {endpoint}");
        Ok(Self {
            socket,
            _context: context,
            endpoint,
        })
    }

    /// Resolved endpoint, with the actual port when bound on `*`.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl fmt::Debug for PushSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushSocket")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl MessageSink for PushSocket {
    fn try_send(&mut self, payload: &[u8]) -> Result<SendOutcome, SinkError> {
        match self.socket.send(payload, zmq::DONTWAIT) {
            Ok(()) => Ok(SendOutcome::Delivered),
            // no peer, or every peer's queue is full
            Err(zmq::Error::EAGAIN) | Err(zmq::Error::EINTR) => Ok(SendOutcome::Dropped),
            Err(err) => Err(SinkError::Send(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};

    fn pull(endpoint: &str, rcv_hwm: i32) -> (zmq::Context, zmq::Socket) {
        let ctx = zmq::Context::new();
        let sock = ctx.socket(zmq::PULL).expect("pull socket");
        sock.set_linger(0).expect("linger");
        sock.set_rcvhwm(rcv_hwm).expect("rcvhwm");
        sock.set_rcvtimeo(2000).expect("rcvtimeo");
        sock.connect(endpoint).expect("connect");
        (ctx, sock)
    }

    /// Send `payload` until a peer takes it; the connect handshake is asynchronous.
    fn send_when_connected(push: &mut PushSocket, payload: &[u8]) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if push.try_send(payload).expect("send") == SendOutcome::Delivered {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("peer never connected to {}", push.endpoint());
    }

    #[test]
    fn host_port_is_a_tcp_endpoint() {
        assert_eq!(endpoint("0.0.0.0:7777"), "tcp://0.0.0.0:7777");
        assert_eq!(endpoint("tcp://*:7777"), "tcp://*:7777");
        assert_eq!(endpoint("ipc:///tmp/relay"), "ipc:///tmp/relay");
    }

    #[test]
    fn drops_without_peers() {
        let mut push = PushSocket::bind("tcp://127.0.0.1:*").expect("bind");
        assert!(push.endpoint().starts_with("tcp://127.0.0.1:"));
        assert_eq!(push.try_send(b"hello").expect("send"), SendOutcome::Dropped);
    }

    #[test]
    fn pull_peer_receives_the_exact_payload() {
        let mut push = PushSocket::bind("tcp://127.0.0.1:*").expect("bind");
        let (_ctx, peer) = pull(push.endpoint(), 1000);

        let msg = br#"{"pos": [0.000000, 0.000000, 0.000000], "angle": 0.000000, "detect": false}"#;
        send_when_connected(&mut push, msg);
        assert_eq!(peer.recv_bytes(0).expect("recv"), msg.to_vec());
    }

    #[test]
    fn idle_peer_never_blocks_and_messages_stay_whole() {
        let mut push = PushSocket::bind_with("tcp://127.0.0.1:*", 8).expect("bind");
        let (_ctx, peer) = pull(push.endpoint(), 8);
        send_when_connected(&mut push, b"ready");

        let body = vec![b'x'; 4096];
        let (mut delivered, mut dropped) = (0u64, 0u64);
        let started = Instant::now();
        for i in 0..5000u32 {
            let mut payload = i.to_be_bytes().to_vec();
            payload.extend_from_slice(&body);
            match push.try_send(&payload).expect("send") {
                SendOutcome::Delivered => delivered += 1,
                SendOutcome::Dropped => dropped += 1,
            }
        }
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "sends blocked for {:?}",
            started.elapsed()
        );
        assert!(dropped > 0, "a peer that never reads must cause drops");
        assert!(delivered > 0);

        assert_eq!(peer.recv_bytes(0).expect("first"), b"ready".to_vec());
        let mut received = 0u64;
        let mut last_index = None;
        while let Ok(msg) = peer.recv_bytes(0) {
            assert_eq!(msg.len(), 4 + body.len());
            assert!(msg[4..].iter().all(|&b| b == b'x'));
            let index = u32::from_be_bytes([msg[0], msg[1], msg[2], msg[3]]);
            assert!(last_index.map_or(true, |last| index > last), "out of order");
            last_index = Some(index);
            received += 1;
        }
        assert_eq!(received, delivered);
    }

    #[test]
    fn bind_failure_names_the_address() {
        let err = PushSocket::bind("not an address").expect_err("bad address");
        assert!(matches!(err, SinkError::Bind { .. }));
        assert!(err.to_string().contains("not an address"));
    }
}
