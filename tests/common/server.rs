//! Test server management.

use std::process::{Child, Command};
use std::time::Duration;

use tokio::time::sleep;

/// A daemon instance spawned for one test.
pub struct TestServer {
    child: Child,
    port: u16,
}

impl TestServer {
    /// Spawn a daemon on `port` with the given name and SID. `extra`
    /// is appended verbatim to the config, for link blocks and the
    /// like.
    pub async fn spawn(port: u16, name: &str, sid: &str, extra: &str) -> anyhow::Result<Self> {
        let dir = std::env::temp_dir().join(format!("tsircd-test-{}", port));
        std::fs::create_dir_all(&dir)?;
        let config_path = dir.join("tsircd.toml");
        let config = format!(
            r#"
[server]
name = "{name}"
sid = "{sid}"
description = "test server"

[listen]
address = "127.0.0.1:{port}"

[[opers]]
name = "testop"
password = "testpass"

[motd]
lines = ["test server motd"]
{extra}
"#
        );
        std::fs::write(&config_path, config)?;

        let child = Command::new(env!("CARGO_BIN_EXE_tsircd"))
            .arg(&config_path)
            .spawn()?;

        let server = Self { child, port };
        server.wait_until_ready().await?;
        Ok(server)
    }

    async fn wait_until_ready(&self) -> anyhow::Result<()> {
        for _ in 0..30 {
            if tokio::net::TcpStream::connect(("127.0.0.1", self.port))
                .await
                .is_ok()
            {
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("server failed to start within 3 seconds")
    }

    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
