//! Transport layer abstraction
//!
//! The read protocol never blocks on the transport: it polls
//! [`Transport::bytes_available`] and drains what is buffered with
//! [`Transport::read_available`], keeping its own wall-clock timeouts.

use std::time::Duration;

use crate::error::Result;

/// Byte transport to the sensor
pub trait Transport {
    /// Write all bytes to the transport
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Number of bytes that can be read without blocking
    fn bytes_available(&mut self) -> Result<usize>;

    /// Read up to `buf.len()` buffered bytes
    ///
    /// Never waits for data that has not arrived yet. Returns the number of
    /// bytes read, 0 if nothing is buffered.
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Discard buffered input
    fn flush_input(&mut self) -> Result<()>;

    /// Set the timeout for blocking operations
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Returns true while the transport can be used
    fn is_open(&self) -> bool;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        (**self).write(data)
    }

    fn bytes_available(&mut self) -> Result<usize> {
        (**self).bytes_available()
    }

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read_available(buf)
    }

    fn flush_input(&mut self) -> Result<()> {
        (**self).flush_input()
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        (**self).set_timeout(timeout)
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

pub mod serial {
    //! Serial port transport implementation

    use super::*;
    use crate::error::ReaderError;
    use crate::transport::listener::ListenerTransport;
    use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
    use std::io::{Read, Write};

    /// Default baud rate of the sensor's AT port
    pub const DEFAULT_BAUD: u32 = 460_800;

    /// Read timeout of the listener's cloned handle, bounds how long a stop
    /// request waits
    const LISTENER_POLL: Duration = Duration::from_millis(50);

    /// Serial port transport
    pub struct SerialTransport {
        port: Option<Box<dyn SerialPort>>,
        device: String,
    }

    impl SerialTransport {
        /// Open a serial port, 8N1 without flow control
        ///
        /// Uses [`DEFAULT_BAUD`] when `baud` is `None`.
        pub fn open(device: &str, baud: Option<u32>) -> Result<Self> {
            let baud_rate = baud.unwrap_or(DEFAULT_BAUD);

            let port = serialport::new(device, baud_rate)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(Duration::from_secs(2))
                .open()?;

            log::info!("Opened serial port {} at {} baud", device, baud_rate);

            Ok(Self {
                port: Some(port),
                device: device.to_string(),
            })
        }

        /// Device path this transport was opened on
        pub fn device(&self) -> &str {
            &self.device
        }

        /// Close the port; later operations fail with
        /// [`ReaderError::TransportNotReady`]
        pub fn close(&mut self) {
            if self.port.take().is_some() {
                log::info!("Closed serial port {}", self.device);
            }
        }

        /// Move reading to a background listener thread
        pub fn into_listener(mut self) -> Result<ListenerTransport<Box<dyn SerialPort>>> {
            let port = self.port.take().ok_or(ReaderError::TransportNotReady)?;
            let mut reader = port.try_clone()?;
            reader.set_timeout(LISTENER_POLL)?;
            Ok(ListenerTransport::spawn(reader, port))
        }

        fn port(&mut self) -> Result<&mut Box<dyn SerialPort>> {
            self.port.as_mut().ok_or(ReaderError::TransportNotReady)
        }
    }

    impl Transport for SerialTransport {
        fn write(&mut self, data: &[u8]) -> Result<()> {
            let port = self.port()?;
            port.write_all(data)?;
            port.flush()?;
            Ok(())
        }

        fn bytes_available(&mut self) -> Result<usize> {
            Ok(self.port()?.bytes_to_read()? as usize)
        }

        fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
            let port = self.port()?;
            let available = port.bytes_to_read()? as usize;
            if available == 0 || buf.is_empty() {
                return Ok(0);
            }
            let len = available.min(buf.len());
            match port.read(&mut buf[..len]) {
                Ok(n) => Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
                Err(e) => Err(ReaderError::from(e)),
            }
        }

        fn flush_input(&mut self) -> Result<()> {
            self.port()?.clear(ClearBuffer::Input)?;
            Ok(())
        }

        fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
            self.port()?.set_timeout(timeout)?;
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.port.is_some()
        }
    }
}

pub mod listener {
    //! Background listener transport
    //!
    //! A thread owns the read half and pushes every chunk it receives into a
    //! channel; the protocol side owns the write half and drains the channel
    //! when polled. The channel is unbounded.

    use super::*;
    use std::collections::VecDeque;
    use std::io::{ErrorKind, Read, Write};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc::{self, Receiver};
    use std::sync::Arc;
    use std::thread::{self, JoinHandle};

    const CHUNK_SIZE: usize = 4096;

    /// Transport fed by a background reader thread
    pub struct ListenerTransport<W: Write> {
        writer: W,
        rx: Receiver<Vec<u8>>,
        pending: VecDeque<u8>,
        stop: Arc<AtomicBool>,
        handle: Option<JoinHandle<()>>,
    }

    impl<W: Write> ListenerTransport<W> {
        /// Start the listener thread on `reader`
        ///
        /// The reader should time out periodically so the thread notices a
        /// stop request. The thread ends at end of stream or on a read error.
        pub fn spawn<R>(reader: R, writer: W) -> Self
        where
            R: Read + Send + 'static,
        {
            let (tx, rx) = mpsc::channel();
            let stop = Arc::new(AtomicBool::new(false));
            let thread_stop = Arc::clone(&stop);

            let handle = thread::spawn(move || {
                let mut reader = reader;
                let mut buf = vec![0u8; CHUNK_SIZE];
                while !thread_stop.load(Ordering::Relaxed) {
                    match reader.read(&mut buf) {
                        Ok(0) => {
                            log::debug!("Listener: end of stream");
                            break;
                        }
                        Ok(n) => {
                            log::trace!("Listener: {} bytes", n);
                            if tx.send(buf[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                        Err(e)
                            if matches!(
                                e.kind(),
                                ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                            ) => {}
                        Err(e) => {
                            log::error!("Listener: read failed: {}", e);
                            break;
                        }
                    }
                }
            });

            Self {
                writer,
                rx,
                pending: VecDeque::new(),
                stop,
                handle: Some(handle),
            }
        }

        /// Move everything the thread has queued into the local buffer
        fn drain(&mut self) {
            while let Ok(chunk) = self.rx.try_recv() {
                self.pending.extend(chunk);
            }
        }

        /// Stop the thread and wait for it
        pub fn shutdown(&mut self) {
            self.stop.store(true, Ordering::Relaxed);
            if let Some(handle) = self.handle.take() {
                if handle.join().is_err() {
                    log::error!("Listener thread panicked");
                }
            }
        }
    }

    impl<W: Write> Transport for ListenerTransport<W> {
        fn write(&mut self, data: &[u8]) -> Result<()> {
            self.writer.write_all(data)?;
            self.writer.flush()?;
            Ok(())
        }

        fn bytes_available(&mut self) -> Result<usize> {
            self.drain();
            Ok(self.pending.len())
        }

        fn read_available(&mut self, buf: &mut [u8]) -> Result<usize> {
            self.drain();
            let n = buf.len().min(self.pending.len());
            for (dst, src) in buf.iter_mut().zip(self.pending.drain(..n)) {
                *dst = src;
            }
            Ok(n)
        }

        fn flush_input(&mut self) -> Result<()> {
            self.drain();
            self.pending.clear();
            Ok(())
        }

        fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
            log::trace!("Listener: ignoring timeout {:?}, reads never block", timeout);
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.handle.as_ref().is_some_and(|h| !h.is_finished())
        }
    }

    impl<W: Write> Drop for ListenerTransport<W> {
        fn drop(&mut self) {
            self.shutdown();
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::io::Cursor;
        use std::time::Instant;

        fn wait_for_end<W: Write>(transport: &ListenerTransport<W>) {
            let start = Instant::now();
            while transport.is_open() && start.elapsed() < Duration::from_secs(5) {
                thread::sleep(Duration::from_millis(1));
            }
        }

        #[test]
        fn test_drains_in_background() {
            let data: Vec<u8> = (0..10_000u32).map(|i| i as u8).collect();
            let mut transport = ListenerTransport::spawn(Cursor::new(data.clone()), Vec::new());
            wait_for_end(&transport);

            assert!(!transport.is_open());
            assert_eq!(transport.bytes_available().unwrap(), data.len());

            let mut out = vec![0u8; data.len() + 10];
            let mut total = 0;
            while total < data.len() {
                let end = (total + 3000).min(out.len());
                let n = transport.read_available(&mut out[total..end]).unwrap();
                assert!(n > 0);
                total += n;
            }
            assert_eq!(&out[..total], &data[..]);
            assert_eq!(transport.read_available(&mut out).unwrap(), 0);
        }

        #[test]
        fn test_flush_input_discards() {
            let mut transport = ListenerTransport::spawn(Cursor::new(vec![1u8; 64]), Vec::new());
            wait_for_end(&transport);
            transport.flush_input().unwrap();
            assert_eq!(transport.bytes_available().unwrap(), 0);
        }

        #[test]
        fn test_writes_go_to_writer() {
            let mut transport = ListenerTransport::spawn(Cursor::new(Vec::new()), Vec::new());
            transport.write(b"AT+TST\r\n").unwrap();
            assert_eq!(transport.writer, b"AT+TST\r\n");
        }
    }
}
