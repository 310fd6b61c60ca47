//! Serial link abstraction over the `serialport` crate
//!
//! The connection manager only talks to [`PortOpener`] and [`SerialLink`],
//! so readers and the manager can be exercised without hardware.

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::{debug, trace};

/// An open, bidirectional serial connection
pub trait SerialLink: Read + Write + Send {
    /// Bytes waiting in the receive buffer
    fn bytes_to_read(&mut self) -> io::Result<u32>;

    /// Second handle to the same port, used for writing while the reader
    /// thread owns the original
    fn try_clone_link(&self) -> io::Result<Box<dyn SerialLink>>;
}

/// Opens serial links by port path
pub trait PortOpener: Send + Sync {
    fn open(&self, port: &str, baud_rate: u32, read_timeout: Duration) -> io::Result<Box<dyn SerialLink>>;
}

/// `SerialLink` backed by an OS serial port
struct SystemLink {
    port: Box<dyn SerialPort>,
}

impl Read for SystemLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SystemLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl SerialLink for SystemLink {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        Ok(self.port.bytes_to_read()?)
    }

    fn try_clone_link(&self) -> io::Result<Box<dyn SerialLink>> {
        let port = self.port.try_clone()?;
        Ok(Box::new(SystemLink { port }))
    }
}

/// Opens real serial ports, 8N1, raising DTR so ESP32 boards come out of
/// reset
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPortOpener;

impl PortOpener for SystemPortOpener {
    fn open(&self, port: &str, baud_rate: u32, read_timeout: Duration) -> io::Result<Box<dyn SerialLink>> {
        trace!(port, baud_rate, "Opening serial port");
        let mut serial = serialport::new(port, baud_rate)
            .timeout(read_timeout)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .open()?;
        if let Err(e) = serial.write_data_terminal_ready(true) {
            debug!(port, error = %e, "Could not raise DTR");
        }
        Ok(Box::new(SystemLink { port: serial }))
    }
}

/// Names of serial ports present on this machine
pub fn available_ports() -> io::Result<Vec<String>> {
    let ports = serialport::available_ports()?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

/// In-memory ports for tests
#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    pub(crate) struct PortState {
        pub incoming: VecDeque<u8>,
        pub written: Vec<u8>,
        pub read_error: Option<io::ErrorKind>,
        pub write_error: Option<io::ErrorKind>,
    }

    #[derive(Clone, Default)]
    pub(crate) struct FakePort(pub Arc<Mutex<PortState>>);

    impl FakePort {
        pub fn feed(&self, bytes: &[u8]) {
            self.0.lock().unwrap().incoming.extend(bytes.iter().copied());
        }

        pub fn fail_reads(&self, kind: io::ErrorKind) {
            self.0.lock().unwrap().read_error = Some(kind);
        }

        pub fn fail_writes(&self, kind: io::ErrorKind) {
            self.0.lock().unwrap().write_error = Some(kind);
        }

        pub fn written(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap().written).into_owned()
        }
    }

    impl Read for FakePort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut state = self.0.lock().unwrap();
            if let Some(kind) = state.read_error {
                return Err(io::Error::new(kind, "device reports read failure"));
            }
            let n = buf.len().min(state.incoming.len());
            for (slot, byte) in buf.iter_mut().zip(state.incoming.drain(..n)) {
                *slot = byte;
            }
            Ok(n)
        }
    }

    impl Write for FakePort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut state = self.0.lock().unwrap();
            if let Some(kind) = state.write_error {
                return Err(io::Error::new(kind, "device reports write failure"));
            }
            state.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SerialLink for FakePort {
        fn bytes_to_read(&mut self) -> io::Result<u32> {
            let state = self.0.lock().unwrap();
            if let Some(kind) = state.read_error {
                return Err(io::Error::new(kind, "device reports read failure"));
            }
            Ok(state.incoming.len() as u32)
        }

        fn try_clone_link(&self) -> io::Result<Box<dyn SerialLink>> {
            Ok(Box::new(self.clone()))
        }
    }

    /// Opener serving only the ports registered with `attach`
    #[derive(Default)]
    pub(crate) struct FakeOpener {
        ports: Mutex<HashMap<String, FakePort>>,
        pub opens: AtomicUsize,
    }

    impl FakeOpener {
        pub fn attach(&self, path: &str) -> FakePort {
            let port = FakePort::default();
            self.ports.lock().unwrap().insert(path.to_string(), port.clone());
            port
        }

        pub fn open_count(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }
    }

    impl PortOpener for FakeOpener {
        fn open(&self, port: &str, _baud_rate: u32, _read_timeout: Duration) -> io::Result<Box<dyn SerialLink>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            match self.ports.lock().unwrap().get(port) {
                Some(p) => Ok(Box::new(p.clone())),
                None => Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("No such file or directory: {}", port),
                )),
            }
        }
    }
}
