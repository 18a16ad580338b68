use serde::{Deserialize, Serialize};

/// Outbound operation timeout configuration
///
/// Every step of a backend transaction is bounded, so that one wedged backend
/// can only ever cost its own recipients a `451`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendTimeouts {
    /// Timeout for connection establishment and the greeting
    ///
    /// Default: 30 seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_secs: u64,

    /// Timeout for LHLO/EHLO
    ///
    /// Default: 30 seconds
    #[serde(default = "default_lhlo_timeout")]
    pub lhlo_secs: u64,

    /// Timeout for MAIL FROM
    ///
    /// Default: 30 seconds
    #[serde(default = "default_mail_from_timeout")]
    pub mail_from_secs: u64,

    /// Timeout for RCPT TO
    ///
    /// Default: 30 seconds
    #[serde(default = "default_rcpt_to_timeout")]
    pub rcpt_to_secs: u64,

    /// Timeout for the DATA command, and separately for transmitting the
    /// message and receiving its reply
    ///
    /// Default: 120 seconds
    #[serde(default = "default_data_timeout")]
    pub data_secs: u64,

    /// Timeout for QUIT
    ///
    /// Default: 10 seconds
    #[serde(default = "default_quit_timeout")]
    pub quit_secs: u64,
}

impl Default for BackendTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_timeout(),
            lhlo_secs: default_lhlo_timeout(),
            mail_from_secs: default_mail_from_timeout(),
            rcpt_to_secs: default_rcpt_to_timeout(),
            data_secs: default_data_timeout(),
            quit_secs: default_quit_timeout(),
        }
    }
}

const fn default_connect_timeout() -> u64 {
    30
}

const fn default_lhlo_timeout() -> u64 {
    30
}

const fn default_mail_from_timeout() -> u64 {
    30
}

const fn default_rcpt_to_timeout() -> u64 {
    30
}

const fn default_data_timeout() -> u64 {
    120
}

const fn default_quit_timeout() -> u64 {
    10
}

fn default_helo_name() -> String {
    String::from("localhost")
}

/// The `delivery` section of the service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// How many recipients of one envelope are delivered at once.
    /// `0` means all of them, `1` means one after the other.
    #[serde(default)]
    pub parallelism: usize,

    /// Name announced in LHLO/EHLO
    #[serde(default = "default_helo_name")]
    pub helo_name: String,

    #[serde(default)]
    pub timeouts: BackendTimeouts,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            parallelism: 0,
            helo_name: default_helo_name(),
            timeouts: BackendTimeouts::default(),
        }
    }
}
