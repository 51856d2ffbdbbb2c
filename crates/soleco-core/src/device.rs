// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of SolEco Bridge.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, trace};

use crate::error::{FetchError, FetchResult};

/// Client for the SolarEco telnet status feed.
///
/// The regulator pushes one status line per second on its telnet port;
/// a fetch is one connect, one line, one disconnect. Retry policy lives
/// in the monitor, not here.
#[derive(Debug, Clone)]
pub struct DeviceClient {
    host: String,
    port: u16,
    timeout: Duration,
}

impl DeviceClient {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Connect, read one status line and disconnect.
    ///
    /// Reading stops at the first `\n` or when the timeout elapses,
    /// whichever comes first; bytes received before a read timeout still
    /// count as the line. The connection is dropped on every exit path.
    pub async fn fetch_line(&self) -> FetchResult<String> {
        let addr = self.addr();
        debug!(addr = %addr, "connecting to device");

        let mut stream = match timeout(self.timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(FetchError::Connect { addr, source }),
            Err(_) => {
                return Err(FetchError::ConnectTimeout {
                    addr,
                    timeout: self.timeout,
                });
            }
        };

        let deadline = Instant::now() + self.timeout;
        let mut buf: Vec<u8> = Vec::with_capacity(128);
        let mut chunk = [0u8; 256];

        loop {
            let n = match timeout_at(deadline, stream.read(&mut chunk)).await {
                Ok(Ok(0)) => break, // device closed the connection
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(FetchError::Read(e)),
                Err(_) => break, // timed out; keep whatever arrived
            };
            buf.extend_from_slice(&chunk[..n]);
            if buf.contains(&b'\n') {
                break;
            }
        }

        if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            buf.truncate(pos);
        }
        if !buf.is_ascii() {
            return Err(FetchError::NonAscii);
        }
        let line = String::from_utf8(buf)
            .map_err(|_| FetchError::NonAscii)?
            .trim()
            .to_owned();
        if line.is_empty() {
            return Err(FetchError::EmptyResponse);
        }

        trace!(line = %line, "received status line");
        Ok(line)
    }

    /// One-shot connection test; used at startup before polling begins.
    pub async fn probe(&self) -> FetchResult<()> {
        self.fetch_line().await.map(|_| ())
    }
}
