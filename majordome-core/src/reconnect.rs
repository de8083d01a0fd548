//! Reconnection backoff for workers that lost their broker.
//!
//! With the default options the delay is a fixed 5 seconds; configuring
//! `reconnect_ivl_max` above `reconnect_ivl` turns on exponential backoff.

use crate::options::MqOptions;
use std::time::Duration;

/// Tracks reconnection attempts and computes the next backoff delay.
///
/// # Example
///
/// ```rust
/// use majordome_core::reconnect::ReconnectState;
/// use majordome_core::options::MqOptions;
/// use std::time::Duration;
///
/// let options = MqOptions::default()
///     .with_reconnect_ivl(Duration::from_millis(100))
///     .with_reconnect_ivl_max(Duration::from_secs(10));
///
/// let mut reconnect = ReconnectState::new(&options);
/// assert_eq!(reconnect.next_delay(), Duration::from_millis(100));
/// assert_eq!(reconnect.next_delay(), Duration::from_millis(200));
///
/// // Reset on successful connection
/// reconnect.reset();
/// assert_eq!(reconnect.next_delay(), Duration::from_millis(100));
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectState {
    base_interval: Duration,
    max_interval: Duration,
    attempt: u32,
    current_interval: Duration,
}

impl ReconnectState {
    /// Create a reconnection tracker from the shared options.
    pub const fn new(options: &MqOptions) -> Self {
        Self {
            base_interval: options.reconnect_ivl,
            max_interval: options.reconnect_ivl_max,
            attempt: 0,
            current_interval: options.reconnect_ivl,
        }
    }

    /// Delay to wait before the next reconnection attempt.
    ///
    /// Doubles with each attempt until `reconnect_ivl_max`.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current_interval;

        self.attempt += 1;
        self.current_interval = self.base_interval * (1_u32 << self.attempt.min(10));
        if self.current_interval > self.max_interval {
            self.current_interval = self.max_interval;
        }

        delay
    }

    /// Reset after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.current_interval = self.base_interval;
    }

    /// Number of attempts since the last reset.
    #[inline]
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_mean_fixed_backoff() {
        let mut state = ReconnectState::new(&MqOptions::default());
        assert_eq!(state.next_delay(), Duration::from_millis(5000));
        assert_eq!(state.next_delay(), Duration::from_millis(5000));
        assert_eq!(state.next_delay(), Duration::from_millis(5000));
    }

    #[test]
    fn exponential_backoff_caps_at_max() {
        let options = MqOptions::default()
            .with_reconnect_ivl(Duration::from_millis(100))
            .with_reconnect_ivl_max(Duration::from_millis(500));
        let mut state = ReconnectState::new(&options);

        assert_eq!(state.next_delay(), Duration::from_millis(100));
        assert_eq!(state.next_delay(), Duration::from_millis(200));
        assert_eq!(state.next_delay(), Duration::from_millis(400));
        assert_eq!(state.next_delay(), Duration::from_millis(500));
        assert_eq!(state.next_delay(), Duration::from_millis(500));
    }

    #[test]
    fn reset_restores_base_interval() {
        let options = MqOptions::default()
            .with_reconnect_ivl(Duration::from_millis(100))
            .with_reconnect_ivl_max(Duration::from_secs(10));
        let mut state = ReconnectState::new(&options);

        state.next_delay();
        state.next_delay();
        assert_eq!(state.attempt(), 2);

        state.reset();
        assert_eq!(state.attempt(), 0);
        assert_eq!(state.next_delay(), Duration::from_millis(100));
    }
}
