use std::time::Duration;

use crate::Error;

/// Smallest MTU we accept. Anything below can't hold a realistic flight.
const MIN_MTU: usize = 256;

/// Driver configuration
#[derive(Debug, Clone)]
pub struct Config {
    connection_timeout: Duration,
    max_connections_per_ip: usize,
    cookie_rotation_interval: Duration,
    handshake_retry_ceiling: Duration,
    flight_start_rto: Duration,
    hello_request_interval: Duration,
    mtu: usize,
    max_queue_tx: usize,
    max_queue_rx: usize,
    tick_resolution: Duration,
}

impl Config {
    /// Create a new configuration builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            connection_timeout: Duration::from_secs(10),
            max_connections_per_ip: 8,
            cookie_rotation_interval: Duration::from_secs(30),
            handshake_retry_ceiling: Duration::from_secs(1),
            flight_start_rto: Duration::from_millis(250),
            hello_request_interval: Duration::from_millis(50),
            mtu: 1150,
            max_queue_tx: 64,
            max_queue_rx: 256,
            tick_resolution: Duration::from_millis(15),
        }
    }

    /// Timeout for connections not claimed by a higher level session.
    ///
    /// Measured from connection creation. Also bounds the handshake and the
    /// window in which an established connection resends its final flight.
    #[inline(always)]
    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    /// Max simultaneous connections from one source IP.
    #[inline(always)]
    pub fn max_connections_per_ip(&self) -> usize {
        self.max_connections_per_ip
    }

    /// How often the cookie secret is replaced.
    #[inline(always)]
    pub fn cookie_rotation_interval(&self) -> Duration {
        self.cookie_rotation_interval
    }

    /// Upper bound for a single handshake retry interval.
    #[inline(always)]
    pub fn handshake_retry_ceiling(&self) -> Duration {
        self.handshake_retry_ceiling
    }

    /// Effective per-attempt retry ceiling.
    ///
    /// The connection timeout divided into ten attempts, but never more than
    /// [`Config::handshake_retry_ceiling`].
    #[inline(always)]
    pub fn retry_ceiling(&self) -> Duration {
        (self.connection_timeout / 10).min(self.handshake_retry_ceiling)
    }

    /// Time of first handshake retry.
    ///
    /// Doubled for every retry up to [`Config::retry_ceiling`].
    #[inline(always)]
    pub fn flight_start_rto(&self) -> Duration {
        self.flight_start_rto
    }

    /// Time of first HelloRequest resend.
    ///
    /// Doubled for every resend up to one second.
    #[inline(always)]
    pub fn hello_request_interval(&self) -> Duration {
        self.hello_request_interval
    }

    /// Max transmission unit handed to the engines.
    #[inline(always)]
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Max amount of outgoing plaintext datagrams to buffer per connection.
    #[inline(always)]
    pub fn max_queue_tx(&self) -> usize {
        self.max_queue_tx
    }

    /// Max amount of decrypted datagrams to buffer before dropping.
    #[inline(always)]
    pub fn max_queue_rx(&self) -> usize {
        self.max_queue_rx
    }

    /// Minimum spacing between two timeout passes in [`crate::Driver::update`].
    #[inline(always)]
    pub fn tick_resolution(&self) -> Duration {
        self.tick_resolution
    }
}

/// Builder for driver configuration.
pub struct ConfigBuilder {
    connection_timeout: Duration,
    max_connections_per_ip: usize,
    cookie_rotation_interval: Duration,
    handshake_retry_ceiling: Duration,
    flight_start_rto: Duration,
    hello_request_interval: Duration,
    mtu: usize,
    max_queue_tx: usize,
    max_queue_rx: usize,
    tick_resolution: Duration,
}

impl ConfigBuilder {
    /// Set the unbound/idle connection timeout.
    ///
    /// Defaults to 10 seconds.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the max simultaneous connections from one source IP.
    ///
    /// Defaults to 8.
    pub fn max_connections_per_ip(mut self, max: usize) -> Self {
        self.max_connections_per_ip = max;
        self
    }

    /// Set how often the cookie secret is rotated.
    ///
    /// Defaults to 30 seconds.
    pub fn cookie_rotation_interval(mut self, interval: Duration) -> Self {
        self.cookie_rotation_interval = interval;
        self
    }

    /// Set the upper bound for a single handshake retry interval.
    ///
    /// Defaults to 1 second.
    pub fn handshake_retry_ceiling(mut self, ceiling: Duration) -> Self {
        self.handshake_retry_ceiling = ceiling;
        self
    }

    /// Set the time of first handshake retry.
    ///
    /// Defaults to 250 milliseconds.
    pub fn flight_start_rto(mut self, rto: Duration) -> Self {
        self.flight_start_rto = rto;
        self
    }

    /// Set the time of first HelloRequest resend.
    ///
    /// Defaults to 50 milliseconds.
    pub fn hello_request_interval(mut self, interval: Duration) -> Self {
        self.hello_request_interval = interval;
        self
    }

    /// Set the max transmission unit (MTU).
    ///
    /// Clamped to the socket's max send size by the driver.
    /// Defaults to 1150.
    pub fn mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    /// Set the max amount of outgoing plaintext datagrams per connection.
    ///
    /// Defaults to 64.
    pub fn max_queue_tx(mut self, max_queue_tx: usize) -> Self {
        self.max_queue_tx = max_queue_tx;
        self
    }

    /// Set the max amount of decrypted datagrams to buffer.
    ///
    /// Defaults to 256.
    pub fn max_queue_rx(mut self, max_queue_rx: usize) -> Self {
        self.max_queue_rx = max_queue_rx;
        self
    }

    /// Set the minimum spacing between timeout passes.
    ///
    /// Defaults to 15 milliseconds.
    pub fn tick_resolution(mut self, resolution: Duration) -> Self {
        self.tick_resolution = resolution;
        self
    }

    /// Build the configuration.
    ///
    /// Returns `Error::ConfigError` for zero timeouts, a zero per-IP cap, zero
    /// queues or an MTU below 256.
    pub fn build(self) -> Result<Config, Error> {
        let nonzero = [
            ("connection_timeout", self.connection_timeout),
            ("cookie_rotation_interval", self.cookie_rotation_interval),
            ("handshake_retry_ceiling", self.handshake_retry_ceiling),
            ("flight_start_rto", self.flight_start_rto),
            ("hello_request_interval", self.hello_request_interval),
        ];
        for (name, value) in nonzero {
            if value.is_zero() {
                return Err(Error::ConfigError(format!("{} must be non-zero", name)));
            }
        }

        if self.max_connections_per_ip == 0 {
            return Err(Error::ConfigError(
                "max_connections_per_ip must be non-zero".into(),
            ));
        }

        if self.max_queue_tx == 0 || self.max_queue_rx == 0 {
            return Err(Error::ConfigError("queue sizes must be non-zero".into()));
        }

        if self.mtu < MIN_MTU {
            return Err(Error::ConfigError(format!(
                "mtu {} below minimum {}",
                self.mtu, MIN_MTU
            )));
        }

        if self.connection_timeout / 10 > self.handshake_retry_ceiling {
            warn!(
                "Handshake retry interval capped at {:?} (connection timeout {:?})",
                self.handshake_retry_ceiling, self.connection_timeout
            );
        }

        Ok(Config {
            connection_timeout: self.connection_timeout,
            max_connections_per_ip: self.max_connections_per_ip,
            cookie_rotation_interval: self.cookie_rotation_interval,
            handshake_retry_ceiling: self.handshake_retry_ceiling,
            flight_start_rto: self.flight_start_rto,
            hello_request_interval: self.hello_request_interval,
            mtu: self.mtu,
            max_queue_tx: self.max_queue_tx,
            max_queue_rx: self.max_queue_rx,
            tick_resolution: self.tick_resolution,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::builder()
            .build()
            .expect("Default config should always validate")
    }
}
