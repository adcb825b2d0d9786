//! [`Port`] on top of the `serialport` crate.

use {
    crate::{
        error::{Error, Result},
        port::{Port, PortOpener, SerialConfig},
    },
    log::trace,
    serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits},
    std::io::{self, Read, Write},
};

/// OS serial line. Dropping it closes the line as well.
pub struct NativePort {
    line: Option<Box<dyn SerialPort>>,
    name: String,
}

impl std::fmt::Debug for NativePort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativePort")
            .field("name", &self.name)
            .field("open", &self.line.is_some())
            .finish()
    }
}

impl NativePort {
    /// Open an 8N1 line without flow control.
    ///
    /// A missing device maps to [`Error::DeviceNotFound`].
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let line = serialport::new(&config.port_name, config.baud_rate)
            .timeout(config.read_timeout)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open()
            .map_err(|e| match e.kind {
                serialport::ErrorKind::NoDevice => Error::DeviceNotFound(config.port_name.clone()),
                _ => e.into(),
            })?;
        trace!("Opened {} at {} baud", config.port_name, config.baud_rate);

        Ok(Self {
            line: Some(line),
            name: config
                .port_name
                .clone(),
        })
    }

    fn line(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.line
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial line closed"))
    }
}

impl Port for NativePort {
    fn name(&self) -> &str {
        &self.name
    }

    fn clear_input(&mut self) -> Result<()> {
        self.line()?
            .clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn set_dtr(&mut self, level: bool) -> Result<()> {
        trace!("{}: DTR={level}", self.name);
        self.line()?
            .write_data_terminal_ready(level)?;
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> Result<()> {
        trace!("{}: RTS={level}", self.name);
        self.line()?
            .write_request_to_send(level)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self
            .line
            .take()
            .is_some()
        {
            trace!("Closed {}", self.name);
        }
        Ok(())
    }
}

impl Read for NativePort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.line()?
            .read(buf)
    }
}

impl Write for NativePort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.line()?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.line()?
            .flush()
    }
}

/// Opens [`NativePort`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeOpener;

impl PortOpener for NativeOpener {
    type Port = NativePort;

    fn open(&self, config: &SerialConfig) -> Result<NativePort> {
        NativePort::open(config)
    }
}
