//! Outbound LMTP/SMTP client.
//!
//! One [`LmtpClient`] is one connection to one backend. The caller drives the
//! conversation step by step and inspects every [`Response`]:
//!
//! ```no_run
//! use mailroute_lmtp::client::LmtpClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = LmtpClient::connect_unix("/run/cyrus/socket/lmtp").await?;
//! client.read_greeting().await?;
//! client.lhlo("proxy.example.com").await?;
//! client.mail_from("sender@example.org").await?;
//! client.rcpt_to("alice@example.com").await?;
//! client.data().await?;
//! let reply = client.send_data(b"Subject: hi\r\n\r\nhello\r\n").await?;
//! assert!(reply.is_success());
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod lmtp_client;
mod response;

pub use error::{ClientError, Result};
pub use lmtp_client::LmtpClient;
pub use response::{Response, ResponseLine};
