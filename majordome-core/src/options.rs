//! Protocol timing and resource options.
//!
//! One options struct is shared by the broker, workers and clients; each
//! component reads the knobs that concern its role.

use std::time::Duration;

/// Timing and resource options.
///
/// # Examples
///
/// ```
/// use majordome_core::options::MqOptions;
/// use std::time::Duration;
///
/// let opts = MqOptions::default()
///     .with_hb_interval(Duration::from_millis(200))
///     .with_worker_liveness(3);
/// ```
#[derive(Debug, Clone)]
pub struct MqOptions {
    /// Heartbeat interval.
    ///
    /// Drives the broker's liveness sweep and every worker's outbound
    /// heartbeat cadence. Default: 1 second.
    pub hb_interval: Duration,

    /// Missed heartbeat intervals before a worker presumes the broker dead
    /// and reconnects. Default: 3.
    pub worker_liveness: u32,

    /// Missed heartbeat intervals before the broker purges a silent
    /// worker. Default: 5.
    pub broker_liveness: u32,

    /// Initial reconnection delay after a worker loses its broker.
    /// Default: 5 seconds.
    pub reconnect_ivl: Duration,

    /// Maximum reconnection delay for exponential backoff. With the
    /// default (equal to `reconnect_ivl`) the backoff stays fixed.
    pub reconnect_ivl_max: Duration,

    /// Read buffer size in bytes for connection pumps. Default: 8 KiB.
    pub read_buffer_size: usize,

    /// Maximum size of a single wire frame. Default: 8 MiB.
    pub max_frame_size: usize,

    /// Maximum frames per multipart message. Default: 128.
    pub max_frames: usize,
}

impl Default for MqOptions {
    fn default() -> Self {
        Self {
            hb_interval: Duration::from_millis(1000),
            worker_liveness: 3,
            broker_liveness: 5,
            reconnect_ivl: Duration::from_millis(5000),
            reconnect_ivl_max: Duration::from_millis(5000),
            read_buffer_size: 8192,
            max_frame_size: 8 * 1024 * 1024,
            max_frames: 128,
        }
    }
}

impl MqOptions {
    /// Set the heartbeat interval.
    #[must_use]
    pub const fn with_hb_interval(mut self, interval: Duration) -> Self {
        self.hb_interval = interval;
        self
    }

    /// Set the worker-side liveness (missed intervals before reconnect).
    #[must_use]
    pub const fn with_worker_liveness(mut self, liveness: u32) -> Self {
        self.worker_liveness = liveness;
        self
    }

    /// Set the broker-side liveness (missed intervals before purge).
    #[must_use]
    pub const fn with_broker_liveness(mut self, liveness: u32) -> Self {
        self.broker_liveness = liveness;
        self
    }

    /// Set the initial reconnection delay.
    #[must_use]
    pub const fn with_reconnect_ivl(mut self, interval: Duration) -> Self {
        self.reconnect_ivl = interval;
        self
    }

    /// Set the maximum reconnection delay.
    #[must_use]
    pub const fn with_reconnect_ivl_max(mut self, interval: Duration) -> Self {
        self.reconnect_ivl_max = interval;
        self
    }

    /// Set the read buffer size.
    #[must_use]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Set the maximum wire frame size.
    #[must_use]
    pub const fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Set the maximum frames per multipart message.
    #[must_use]
    pub const fn with_max_frames(mut self, count: usize) -> Self {
        self.max_frames = count;
        self
    }

    /// How long a peer stays live without traffic, broker side.
    #[must_use]
    pub fn broker_expiry(&self) -> Duration {
        self.hb_interval * self.broker_liveness
    }

    /// How long the broker stays live without traffic, worker side.
    #[must_use]
    pub fn worker_expiry(&self) -> Duration {
        self.hb_interval * self.worker_liveness
    }
}
