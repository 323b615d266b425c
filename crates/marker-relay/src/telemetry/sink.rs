/// Result of a single best-effort send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to a subscriber.
    Delivered,
    /// No subscriber was ready; the message is gone.
    Dropped,
}

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("failed to bind push socket on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: zmq::Error,
    },
    #[error("push socket on {addr} is not bound")]
    Unbound { addr: String },
    #[error("push socket send failed: {0}")]
    Send(#[from] zmq::Error),
}

/// Non-blocking message transport.
///
/// Implementations must return promptly: a sink that cannot deliver right
/// now reports [`SendOutcome::Dropped`] instead of waiting.
pub trait MessageSink {
    fn try_send(&mut self, payload: &[u8]) -> Result<SendOutcome, SinkError>;
}

impl<S: MessageSink + ?Sized> MessageSink for Box<S> {
    fn try_send(&mut self, payload: &[u8]) -> Result<SendOutcome, SinkError> {
        (**self).try_send(payload)
    }
}

/// In-memory sink that records every delivered payload.
#[derive(Debug, Default)]
pub struct MemorySink {
    ready: bool,
    messages: Vec<String>,
    attempts: usize,
}

impl MemorySink {
    /// A sink with a subscriber that is always ready.
    pub fn new() -> Self {
        Self {
            ready: true,
            ..Self::default()
        }
    }

    /// A sink whose subscriber never becomes ready; every send is dropped.
    pub fn unready() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }
}

impl MessageSink for MemorySink {
    fn try_send(&mut self, payload: &[u8]) -> Result<SendOutcome, SinkError> {
        self.attempts += 1;
        if !self.ready {
            return Ok(SendOutcome::Dropped);
        }
        self.messages
            .push(String::from_utf8_lossy(payload).into_owned());
        Ok(SendOutcome::Delivered)
    }
}

/// Stand-in used when the push socket could not be bound; every send fails.
#[derive(Debug)]
pub struct UnboundSink {
    addr: String,
}

impl UnboundSink {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

impl MessageSink for UnboundSink {
    fn try_send(&mut self, _payload: &[u8]) -> Result<SendOutcome, SinkError> {
        Err(SinkError::Unbound {
            addr: self.addr.clone(),
        })
    }
}
