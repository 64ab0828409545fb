//! USB host output sink (§4.13): streams file properties and bulk data to a
//! connected host tool over the wire protocol in
//! [`crate::usb_protocol`], rather than writing to a local filesystem.

use super::SinkError;
use crate::package::PackageSink;
use crate::usb_protocol::{FileProperties, UsbCommandId};
use binrw::BinWrite;
use snafu::{ResultExt, Snafu};

use super::FileWriterSink;

/// Path prefix recognized as "stream this to the connected USB host"
/// (§4.13): a single `/`, meaning "the host's own root", distinguishing it
/// from the SD/UMS device-label prefixes.
pub fn path_targets_usb_host(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with(super::sd::SD_DEVICE_PREFIX)
}

/// What a real USB transport needs to support: sending one framed command
/// plus its payload, in order, over the bulk endpoint. Modeled as a trait so
/// this sink's bookkeeping (header placeholder tracking, byte counting,
/// `nsp_header` fixup) is testable without real hardware.
pub trait UsbTransport {
    type Error: std::error::Error + 'static;

    fn send_frame(&mut self, command: UsbCommandId, payload: &[u8]) -> Result<(), Self::Error>;
}

#[derive(Snafu, Debug)]
pub enum UsbSinkError<E: std::error::Error + 'static> {
    #[snafu(display("failed to serialize file_properties payload"))]
    Serialize { source: binrw::Error },
    #[snafu(display("transport rejected a frame"))]
    Transport { source: E },
    #[snafu(display("write called before create_or_open"))]
    NotOpen,
    #[snafu(display("rewrite_nsp_header called without a declared header size"))]
    NoHeaderReserved,
}

/// Adapts [`UsbSinkError`] onto the shared [`SinkError`] taxonomy so this
/// sink can be used anywhere a [`FileWriterSink`]-generic caller expects the
/// crate's common error type, at the cost of losing the transport-specific
/// detail (folded into `SinkError::Io`'s display string).
impl<E: std::error::Error + 'static> From<UsbSinkError<E>> for SinkError {
    fn from(err: UsbSinkError<E>) -> Self {
        SinkError::Io {
            source: std::io::Error::new(std::io::ErrorKind::Other, err.to_string()),
        }
    }
}

pub struct UsbHostSink<T: UsbTransport> {
    transport: T,
    total_size: u64,
    written: u64,
    nsp_header_size: Option<u64>,
    file_name: String,
}

impl<T: UsbTransport> UsbHostSink<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            total_size: 0,
            written: 0,
            nsp_header_size: None,
            file_name: String::new(),
        }
    }

    fn send(&mut self, command: UsbCommandId, payload: &[u8]) -> Result<(), UsbSinkError<T::Error>> {
        self.transport
            .send_frame(command, payload)
            .context(TransportSnafu)
    }
}

impl<T: UsbTransport> FileWriterSink for UsbHostSink<T> {
    type Error = UsbSinkError<T::Error>;

    fn create_or_open(
        &mut self,
        path: &str,
        total_size: u64,
        nsp_header_size: Option<u64>,
    ) -> Result<(), Self::Error> {
        self.total_size = total_size;
        self.written = 0;
        self.nsp_header_size = nsp_header_size;
        self.file_name = super::sanitize_filename(path.trim_start_matches('/'));

        let props = FileProperties::new(total_size, &self.file_name, nsp_header_size);
        let mut payload = Vec::new();
        props
            .write(&mut std::io::Cursor::new(&mut payload))
            .context(SerializeSnafu)?;

        let command = if nsp_header_size.is_some() {
            UsbCommandId::NspProperties
        } else {
            UsbCommandId::FileProperties
        };
        self.send(command, &payload)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        let remaining = self.total_size.saturating_sub(self.written);
        let bytes = if (bytes.len() as u64) > remaining {
            &bytes[..remaining as usize]
        } else {
            bytes
        };
        if bytes.is_empty() {
            return Ok(());
        }
        self.send(UsbCommandId::FileData, bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    fn rewrite_nsp_header(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        if self.nsp_header_size.is_none() {
            return Err(UsbSinkError::NoHeaderReserved);
        }
        // Unlike the filesystem sinks, the USB host can't be seeked back
        // into mid-stream: per §4.13 the fixed-up header bytes are sent
        // separately as their own message, and the host itself seeks its
        // local file back to 0 and patches it on receipt.
        self.send(UsbCommandId::NspHeader, bytes)
    }

    fn cancel(&mut self) -> Result<(), Self::Error> {
        self.send(UsbCommandId::Cancel, &[])
    }

    fn close(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl<T: UsbTransport> PackageSink for UsbHostSink<T> {
    type Error = UsbSinkError<T::Error>;

    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        FileWriterSink::write(self, bytes)
    }

    fn rewrite_header(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        self.rewrite_nsp_header(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Debug, Snafu)]
    #[snafu(display("fake transport error"))]
    struct FakeTransportError;

    #[derive(Default)]
    struct FakeTransport {
        sent: RefCell<Vec<(UsbCommandId, Vec<u8>)>>,
    }

    impl UsbTransport for FakeTransport {
        type Error = FakeTransportError;

        fn send_frame(&mut self, command: UsbCommandId, payload: &[u8]) -> Result<(), Self::Error> {
            self.sent.borrow_mut().push((command, payload.to_vec()));
            Ok(())
        }
    }

    #[test]
    fn create_or_open_sends_nsp_properties_when_header_size_given() {
        let mut sink = UsbHostSink::new(FakeTransport::default());
        sink.create_or_open("/foo.nsp", 0x1000, Some(0x200))
            .unwrap();
        assert_eq!(sink.transport.sent.borrow()[0].0, UsbCommandId::NspProperties);
    }

    #[test]
    fn write_truncates_past_declared_total_size() {
        let mut sink = UsbHostSink::new(FakeTransport::default());
        sink.create_or_open("/foo.bin", 3, None).unwrap();
        FileWriterSink::write(&mut sink, &[1, 2, 3, 4, 5]).unwrap();
        let sent = sink.transport.sent.borrow();
        let (cmd, payload) = &sent[1];
        assert_eq!(*cmd, UsbCommandId::FileData);
        assert_eq!(payload, &[1, 2, 3]);
    }

    #[test]
    fn rewrite_header_sends_separate_nsp_header_frame() {
        let mut sink = UsbHostSink::new(FakeTransport::default());
        sink.create_or_open("/foo.nsp", 0x1000, Some(0x40))
            .unwrap();
        sink.rewrite_nsp_header(&[0xAB; 0x40]).unwrap();
        let sent = sink.transport.sent.borrow();
        assert_eq!(sent[1].0, UsbCommandId::NspHeader);
    }

    #[test]
    fn path_prefix_detection() {
        assert!(path_targets_usb_host("/foo.nsp"));
        assert!(!path_targets_usb_host("sdmc:/foo.nsp"));
        assert!(!path_targets_usb_host("ums0:/foo.nsp"));
    }
}
