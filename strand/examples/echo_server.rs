//! Line echo server with a heartbeat timer.
//!
//! ```text
//! RUST_LOG=debug cargo run --example echo_server -- 127.0.0.1:7000
//! ```

use std::time::Duration;

use strand::net::{TcpConnection, TcpListener};
use strand::time::{Ticker, Timer};
use strand::{EventLoop, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

async fn echo(conn: TcpConnection) -> Result<()> {
    conn.start_read()?;

    loop {
        let line = conn.read_until(b"\n", Some(b"\r")).await?;
        if line.as_ref() == b"bye" {
            conn.send(&b"bye\n"[..]).await?;
            return Ok(());
        }

        conn.send_nowait(line)?;
        conn.send(&b"\n"[..]).await?;
    }
}

async fn heartbeat(ticker: Ticker, name: &'static str) -> Result<()> {
    let mut beats = 0u64;

    loop {
        beats += 1;
        info!(name, beats, "alive");
        ticker.next().await?;
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:7000".to_string());

    let event_loop = EventLoop::new()?;
    let handle = event_loop.handle();

    let listener = TcpListener::bind(&handle, &address, echo)?;
    listener.start()?;
    info!(addr = %listener.local_addr(), "listening");

    let timer = Timer::new(
        &handle,
        Duration::ZERO,
        Duration::from_secs(5),
        heartbeat,
        "echo",
    );
    timer.start()?;

    event_loop.run()
}
