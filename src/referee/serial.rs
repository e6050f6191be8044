//! Serial device seam for the referee link.

use std::io;
use std::time::Duration;

/// Byte-channel abstraction the communicator talks through.
///
/// Implement this to connect the protocol engine to any transport; all
/// operations report failure through `io::Result`, never by panicking.
pub trait SerialDevice: Send {
    /// (Re)open the underlying device.
    fn open(&mut self) -> io::Result<()>;

    /// Read available bytes into `buf`. An idle line reads as `Ok(0)`.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write `data`, returning the number of bytes accepted.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Whether the device is currently open.
    fn is_open(&self) -> bool;
}

/// A [`SerialDevice`] over a real tty via the `serialport` crate.
pub struct TtyDevice {
    path: String,
    baud_rate: u32,
    timeout: Duration,
    port: Option<Box<dyn serialport::SerialPort>>,
}

impl TtyDevice {
    /// Referee links run at 115200-8-N-1; reads use a short bounded timeout
    /// so `update` polls never stall the pipeline.
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            timeout: Duration::from_millis(20),
            port: None,
        }
    }
}

impl SerialDevice for TtyDevice {
    fn open(&mut self) -> io::Result<()> {
        let port = serialport::new(&self.path, self.baud_rate)
            .timeout(self.timeout)
            .open()
            .map_err(io::Error::from)?;
        self.port = Some(port);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(port) = self.port.as_mut() else {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        };
        match port.read(buf) {
            Ok(n) => Ok(n),
            Err(error) if error.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(error) => Err(error),
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let Some(port) = self.port.as_mut() else {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        };
        port.write(data)
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}
