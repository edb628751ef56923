//! Line-oriented AT command shell

use std::thread;
use std::time::{Duration, Instant};

use crate::error::{ReaderError, Result};
use crate::protocol;
use crate::transport::Transport;

/// Interval between polls of the transport while waiting for lines
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Sends AT commands and collects their response lines
pub struct AtShell<T: Transport> {
    transport: T,
}

impl<T: Transport> AtShell<T> {
    /// Wrap a transport
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Give the transport back
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Send `cmd` with optional arguments and wait for the `O` line
    ///
    /// Returns the response lines with the echo removed.
    pub fn send_command(
        &mut self,
        cmd: &str,
        args: Option<&str>,
        timeout: Duration,
    ) -> Result<Vec<String>> {
        if !self.transport.is_open() {
            return Err(ReaderError::TransportNotReady);
        }

        let message = protocol::command_message(cmd, args);
        self.transport.flush_input()?;
        self.transport
            .write(format!("{}{}", message, protocol::LINE_END).as_bytes())?;
        log::debug!("AT > {}", message);

        let start = Instant::now();
        let mut pending: Vec<u8> = Vec::new();
        let mut values = Vec::new();
        let mut chunk = [0u8; 256];

        loop {
            let n = self.transport.read_available(&mut chunk)?;
            pending.extend_from_slice(&chunk[..n]);

            while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = pending.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw).trim().to_string();
                if line.is_empty() {
                    continue;
                }
                log::debug!("AT < {}", line);

                if let Some(code) = protocol::error_code(&line) {
                    return Err(ReaderError::AtError(code.to_string()));
                }
                if line == protocol::OK_LINE {
                    return Ok(values);
                }
                if line.contains(&message) {
                    continue;
                }
                values.push(line);
            }

            if start.elapsed() >= timeout {
                log::debug!("AT: no answer to {} within {:?}", message, timeout);
                return Err(ReaderError::Timeout);
            }
            if n == 0 {
                thread::sleep(POLL_INTERVAL);
            }
        }
    }

    /// Put the device in test mode, retrying `TST` up to `attempts` times
    ///
    /// Each attempt sleeps `delay` before sending and then waits up to
    /// `timeout` for the answer.
    pub fn enter_test_mode(
        &mut self,
        attempts: u32,
        delay: Duration,
        timeout: Duration,
    ) -> Result<()> {
        let mut last_error = ReaderError::Timeout;
        for attempt in 1..=attempts {
            thread::sleep(delay);
            match self.send_command(protocol::TEST_MODE, None, timeout) {
                Ok(_) => {
                    log::info!("Device in test mode");
                    return Ok(());
                }
                Err(e @ (ReaderError::Timeout | ReaderError::AtError(_))) => {
                    log::debug!("Test mode attempt {}/{} failed: {}", attempt, attempts, e);
                    last_error = e;
                }
                Err(e) => return Err(e),
            }
        }
        log::warn!("Device did not enter test mode");
        Err(last_error)
    }
}
