//! A raw-socket IRC client for integration tests.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tsirc_proto::Message;

pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    nick: String,
}

impl TestClient {
    pub async fn connect(address: &str, nick: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(address).await?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            nick: nick.to_string(),
        })
    }

    pub async fn send_raw(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        if !line.ends_with("\r\n") {
            self.writer.write_all(b"\r\n").await?;
        }
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<Message> {
        let mut line = String::new();
        let n = timeout(dur, self.reader.read_line(&mut line)).await??;
        if n == 0 {
            anyhow::bail!("connection closed");
        }
        line.parse::<Message>()
            .map_err(|e| anyhow::anyhow!("parse error on {:?}: {}", line, e))
    }

    pub async fn recv(&mut self) -> anyhow::Result<Message> {
        self.recv_timeout(Duration::from_secs(5)).await
    }

    /// Read messages until the predicate matches one, returning it.
    pub async fn recv_until<F>(&mut self, mut predicate: F) -> anyhow::Result<Message>
    where
        F: FnMut(&Message) -> bool,
    {
        loop {
            let message = self.recv().await?;
            if predicate(&message) {
                return Ok(message);
            }
        }
    }

    /// NICK/USER and wait for the 001 welcome.
    pub async fn register(&mut self) -> anyhow::Result<()> {
        let nick = self.nick.clone();
        self.send_raw(&format!("NICK {}", nick)).await?;
        self.send_raw(&format!("USER {} 0 * :{} test user", nick, nick))
            .await?;
        self.recv_until(|m| m.command == "001").await?;
        Ok(())
    }

    /// JOIN and wait for the server to echo it back.
    pub async fn join(&mut self, channel: &str) -> anyhow::Result<()> {
        self.send_raw(&format!("JOIN {}", channel)).await?;
        self.recv_until(|m| m.command == "366").await?;
        Ok(())
    }

    pub async fn privmsg(&mut self, target: &str, text: &str) -> anyhow::Result<()> {
        self.send_raw(&format!("PRIVMSG {} :{}", target, text)).await
    }
}
