//! End-to-end test harness for mailroute
//!
//! The harness runs the proxy on a random TCP port with two backends:
//! - `cyrus-unix`, a mock LMTP server on a UNIX socket that accepts everything
//! - `cyrus-tcp`, a mock LMTP server that hangs up right after its greeting
//!
//! # Example
//!
//! ```no_run
//! use support::harness::E2ETestHarness;
//!
//! #[tokio::test]
//! async fn test_delivery() {
//!     let harness = E2ETestHarness::builder()
//!         .with_user("user1", "cyrus-unix")
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     let replies = harness
//!         .send_email("sender@example.org", &["user1@example.com"], "Subject: Test\r\n\r\nHello")
//!         .await
//!         .unwrap();
//!
//!     harness.shutdown().await;
//! }
//! ```

#![allow(dead_code)]

use std::{fmt::Write, path::PathBuf, sync::Arc, time::Duration};

use mailroute::Mailroute;
use mailroute_common::Signal;
use mailroute_lmtp::{LmtpClient, Response};
use mailroute_routing::{ReloadHandle, SharedRoutingTable};
use tempfile::TempDir;
use tokio::{sync::broadcast, task::JoinHandle};

use super::mock_server::MockLmtpServer;

pub struct E2ETestHarness {
    port: u16,
    unix_backend: Arc<MockLmtpServer>,
    tcp_backend: Arc<MockLmtpServer>,
    routing_path: PathBuf,
    settings: Vec<(String, String)>,
    reload: ReloadHandle,
    table: Arc<SharedRoutingTable>,
    shutdown_tx: broadcast::Sender<Signal>,
    service_handle: JoinHandle<anyhow::Result<()>>,
    _dir: TempDir,
}

#[derive(Default)]
pub struct E2ETestHarnessBuilder {
    users: Vec<(String, String)>,
    settings: Vec<(String, String)>,
}

impl E2ETestHarnessBuilder {
    #[must_use]
    pub fn with_user(mut self, user: &str, backend: &str) -> Self {
        self.users.push((user.to_string(), backend.to_string()));
        self
    }

    /// Add a `config:` entry, e.g. `("ignoreDomain", "true")`
    #[must_use]
    pub fn with_setting(mut self, key: &str, value: &str) -> Self {
        self.settings.push((key.to_string(), value.to_string()));
        self
    }

    /// Start backends and the proxy
    ///
    /// # Errors
    ///
    /// If any component fails to start
    pub async fn build(self) -> anyhow::Result<E2ETestHarness> {
        let dir = tempfile::tempdir()?;

        let unix_backend = MockLmtpServer::builder().build_unix(dir.path().join("cyrus.sock"))?;
        let tcp_backend = MockLmtpServer::builder()
            .hanging_up_after_greeting()
            .build()
            .await?;

        let routing_path = dir.path().join("routing.yaml");
        let routing = routing_yaml(
            &self.settings,
            &self.users,
            &unix_backend,
            &tcp_backend,
        );
        std::fs::write(&routing_path, routing)?;

        let config = Mailroute::from_ron(&format!(
            r#"(
                listener: (socket: Tcp("127.0.0.1:0"), banner: "mailroute.test"),
                routing: "{}",
                delivery: (helo_name: "mailroute.test", timeouts: (connect_secs: 5)),
            )"#,
            routing_path.display()
        ))?;

        let service = config.init().await?;
        let port = service
            .local_addr()
            .ok_or_else(|| anyhow::anyhow!("listener is not on TCP"))?
            .port();
        let reload = service.reload_handle();
        let table = service.table();

        let (shutdown_tx, _) = broadcast::channel(16);
        let service_tx = shutdown_tx.clone();
        let service_handle = tokio::spawn(async move { service.serve(&service_tx).await });

        Ok(E2ETestHarness {
            port,
            unix_backend,
            tcp_backend,
            routing_path,
            settings: self.settings,
            reload,
            table,
            shutdown_tx,
            service_handle,
            _dir: dir,
        })
    }
}

fn routing_yaml(
    settings: &[(String, String)],
    users: &[(String, String)],
    unix_backend: &MockLmtpServer,
    tcp_backend: &MockLmtpServer,
) -> String {
    let mut yaml = String::from(if settings.is_empty() { "config: {}\n" } else { "config:\n" });
    for (key, value) in settings {
        let _ = writeln!(yaml, "  {key}: {value}");
    }

    let _ = write!(
        yaml,
        "backends:\n  cyrus-unix:\n    socket: {}\n  cyrus-tcp:\n    host: {}\n    port: {}\n",
        unix_backend.socket_path().display(),
        tcp_backend.addr().ip(),
        tcp_backend.addr().port()
    );
    yaml.push_str(if users.is_empty() { "users: {}\n" } else { "users:\n" });
    for (user, backend) in users {
        let _ = writeln!(yaml, "  \"{user}\": {backend}");
    }

    yaml
}

impl E2ETestHarness {
    #[must_use]
    pub fn builder() -> E2ETestHarnessBuilder {
        E2ETestHarnessBuilder::default()
    }

    pub fn unix_backend(&self) -> &MockLmtpServer {
        &self.unix_backend
    }

    pub fn tcp_backend(&self) -> &MockLmtpServer {
        &self.tcp_backend
    }

    /// Run one LMTP transaction against the proxy, returning the replies that
    /// follow the message data (one per recipient, then the goodbye).
    ///
    /// # Errors
    ///
    /// If the proxy refuses any step before DATA, or the connection fails
    pub async fn send_email(
        &self,
        from: &str,
        recipients: &[&str],
        body: &str,
    ) -> anyhow::Result<Vec<Response>> {
        let mut client = LmtpClient::connect_tcp("127.0.0.1", self.port).await?;
        client.read_greeting().await?;
        anyhow::ensure!(client.lhlo("client.test").await?.is_success());
        anyhow::ensure!(client.mail_from(from).await?.is_success());
        for recipient in recipients {
            anyhow::ensure!(client.rcpt_to(recipient).await?.is_success());
        }
        anyhow::ensure!(client.data().await?.is_intermediate());

        let mut replies = vec![client.send_data(body.as_bytes()).await?];
        for _ in 0..recipients.len() {
            replies.push(client.read_response().await?);
        }

        Ok(replies)
    }

    /// Replace the routing file's users, keeping the `config:` settings the
    /// harness was built with, and ask for a reload. Waits until the new table
    /// is published.
    ///
    /// # Errors
    ///
    /// If the reload is not published within a few seconds
    pub async fn rewrite_and_reload(&self, users: &[(&str, &str)]) -> anyhow::Result<()> {
        let users: Vec<(String, String)> = users
            .iter()
            .map(|(user, backend)| ((*user).to_string(), (*backend).to_string()))
            .collect();
        std::fs::write(
            &self.routing_path,
            routing_yaml(&self.settings, &users, &self.unix_backend, &self.tcp_backend),
        )?;

        let before = self.table.load();
        anyhow::ensure!(self.reload.request("test"), "reload request dropped");

        tokio::time::timeout(Duration::from_secs(5), async {
            while Arc::ptr_eq(&before, &self.table.load()) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await?;

        Ok(())
    }

    /// Write garbage to the routing file and ask for a reload
    ///
    /// # Errors
    ///
    /// If the file cannot be written
    pub async fn break_routing_and_reload(&self) -> anyhow::Result<()> {
        std::fs::write(&self.routing_path, "users: [this is: not a map")?;
        self.reload.request("test");
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(())
    }

    pub fn user_count(&self) -> usize {
        self.table.load().user_count()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(Signal::Shutdown);
        let _ = tokio::time::timeout(Duration::from_secs(5), self.service_handle).await;
        self.unix_backend.shutdown();
        self.tcp_backend.shutdown();
    }
}
