//! Callback dispatch from engine threads to the session
//!
//! Engines report discovery and connection progress from arbitrary threads.
//! [`EngineCallbacks`] is the cloneable, thread-safe handle they hold: every
//! callback becomes an [`EngineEvent`] pushed into a FIFO queue without
//! blocking. The session drains that queue once per host loop iteration, so
//! all state mutation happens on the host's execution context.
//!
//! Only received payloads count against the configured capacity. Lifecycle
//! callbacks (found, lost, initiated, established, disconnected) are always
//! queued, in order with the payloads around them.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use nearby_core::{
    AuthStatus, ChannelConfig, ChannelError, EndpointId, EngineEvent, PeerNotification,
};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, warn};

pub type CallbackSender = mpsc::UnboundedSender<EngineEvent>;
pub type NotificationSender = mpsc::Sender<PeerNotification>;
pub type NotificationReceiver = mpsc::Receiver<PeerNotification>;

// ----------------------------------------------------------------------------
// Channel Creation Utilities
// ----------------------------------------------------------------------------

/// Create the callback queue (Engine → Session), capping queued payloads
pub fn create_callback_channel(config: &ChannelConfig) -> (EngineCallbacks, CallbackReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let stats = Arc::new(ChannelStats::new("engine_callbacks", config.callback_buffer_size));
    let queued_payloads = Arc::new(AtomicUsize::new(0));
    (
        EngineCallbacks {
            sender,
            stats,
            queued_payloads: queued_payloads.clone(),
        },
        CallbackReceiver {
            receiver,
            queued_payloads,
        },
    )
}

/// Create the bounded notification channel (Session → UI)
pub fn create_notification_channel(
    config: &ChannelConfig,
) -> (NotificationSender, NotificationReceiver) {
    mpsc::channel(config.notification_buffer_size)
}

// ----------------------------------------------------------------------------
// Non-blocking Send Utilities
// ----------------------------------------------------------------------------

/// Non-blocking send so engine threads and the host loop never wait
pub trait NonBlockingSend<T> {
    fn try_send_non_blocking(&self, message: T) -> Result<(), ChannelError>;
}

impl<T> NonBlockingSend<T> for mpsc::Sender<T> {
    fn try_send_non_blocking(&self, message: T) -> Result<(), ChannelError> {
        self.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ChannelError::ChannelFull,
            mpsc::error::TrySendError::Closed(_) => ChannelError::ChannelClosed,
        })
    }
}

impl<T> NonBlockingSend<T> for mpsc::UnboundedSender<T> {
    fn try_send_non_blocking(&self, message: T) -> Result<(), ChannelError> {
        self.send(message).map_err(|_| ChannelError::ChannelClosed)
    }
}

// ----------------------------------------------------------------------------
// Channel Statistics
// ----------------------------------------------------------------------------

/// Delivery counters for one channel, safe to update from any thread
#[derive(Debug)]
pub struct ChannelStats {
    pub channel_type: &'static str,
    pub buffer_size: usize,
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

impl ChannelStats {
    pub fn new(channel_type: &'static str, buffer_size: usize) -> Self {
        Self {
            channel_type,
            buffer_size,
            messages_sent: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        }
    }

    pub fn record_send_success(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }

    /// Fraction of messages dropped so far
    pub fn drop_rate(&self) -> f32 {
        let sent = self.messages_sent();
        let dropped = self.messages_dropped();

        if sent + dropped == 0 {
            0.0
        } else {
            dropped as f32 / (sent + dropped) as f32
        }
    }
}

// ----------------------------------------------------------------------------
// Engine Callbacks
// ----------------------------------------------------------------------------

/// Thread-safe handle through which an engine reports events
///
/// Callbacks never fail and never block. A payload arriving while the queue
/// already holds `buffer_size` payloads is dropped with a warning; a closed
/// queue (session gone) drops everything silently.
#[derive(Debug, Clone)]
pub struct EngineCallbacks {
    sender: CallbackSender,
    stats: Arc<ChannelStats>,
    queued_payloads: Arc<AtomicUsize>,
}

impl EngineCallbacks {
    pub fn peer_found(&self, endpoint: impl Into<EndpointId>, name: impl Into<String>) {
        self.deliver(EngineEvent::PeerFound {
            endpoint: endpoint.into(),
            name: name.into(),
        });
    }

    pub fn peer_lost(&self, endpoint: impl Into<EndpointId>) {
        self.deliver(EngineEvent::PeerLost {
            endpoint: endpoint.into(),
        });
    }

    /// `auth_status` is the engine's raw value; 0 means awaiting confirmation
    pub fn connection_initiated(
        &self,
        endpoint: impl Into<EndpointId>,
        name: impl Into<String>,
        auth_code: impl Into<String>,
        auth_status: i32,
    ) {
        self.deliver(EngineEvent::ConnectionInitiated {
            endpoint: endpoint.into(),
            name: name.into(),
            auth_code: auth_code.into(),
            auth_status: AuthStatus::from_raw(auth_status),
        });
    }

    pub fn connection_established(&self, endpoint: impl Into<EndpointId>) {
        self.deliver(EngineEvent::ConnectionEstablished {
            endpoint: endpoint.into(),
        });
    }

    pub fn connection_disconnected(&self, endpoint: impl Into<EndpointId>) {
        self.deliver(EngineEvent::ConnectionDisconnected {
            endpoint: endpoint.into(),
        });
    }

    pub fn payload_received(&self, endpoint: impl Into<EndpointId>, payload: impl Into<Vec<u8>>) {
        self.deliver(EngineEvent::PayloadReceived {
            endpoint: endpoint.into(),
            payload: payload.into(),
        });
    }

    /// Enqueue an already-built event
    pub fn deliver(&self, event: EngineEvent) {
        let kind = event.kind();
        let is_payload = matches!(event, EngineEvent::PayloadReceived { .. });
        if is_payload && !self.reserve_payload_slot() {
            self.stats.record_send_dropped();
            warn!(
                kind,
                capacity = self.stats.buffer_size,
                "Callback queue full, dropping payload"
            );
            return;
        }

        match self.sender.try_send_non_blocking(event) {
            Ok(()) => self.stats.record_send_success(),
            Err(error) => {
                if is_payload {
                    self.queued_payloads.fetch_sub(1, Ordering::AcqRel);
                }
                self.stats.record_send_dropped();
                debug!(kind, %error, "Session gone, dropping engine event");
            }
        }
    }

    fn reserve_payload_slot(&self) -> bool {
        let capacity = self.stats.buffer_size;
        self.queued_payloads
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |queued| {
                (queued < capacity).then_some(queued + 1)
            })
            .is_ok()
    }

    /// Payloads currently waiting in the queue
    pub fn queued_payloads(&self) -> usize {
        self.queued_payloads.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    /// Whether the owning session still exists
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

// ----------------------------------------------------------------------------
// Callback Receiver
// ----------------------------------------------------------------------------

/// Session side of the callback queue
#[derive(Debug)]
pub struct CallbackReceiver {
    receiver: mpsc::UnboundedReceiver<EngineEvent>,
    queued_payloads: Arc<AtomicUsize>,
}

impl CallbackReceiver {
    /// Next queued callback, freeing its payload slot
    pub fn try_recv(&mut self) -> Result<EngineEvent, TryRecvError> {
        let event = self.receiver.try_recv()?;
        if matches!(event, EngineEvent::PayloadReceived { .. }) {
            self.queued_payloads.fetch_sub(1, Ordering::AcqRel);
        }
        Ok(event)
    }

    /// Drop everything queued; returns how many callbacks were discarded
    pub fn discard_pending(&mut self) -> usize {
        let mut discarded = 0;
        while self.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
