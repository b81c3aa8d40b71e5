//! A synchronous response-writer abstraction.
//!
//! [`ResponseWriter`] is the smallest surface a handler needs: mutable
//! headers, a status line sent at most once, and body writes. Transports
//! expose further abilities through the optional [`Flusher`], [`Hijacker`]
//! and [`CloseNotifier`] capabilities, which decorators forward only when
//! the wrapped writer has them.

use http::{HeaderMap, StatusCode};
use std::io;
use std::sync::mpsc;

/// Writes one HTTP response.
///
/// The status is sent by the first call to [`write_header`], or implicitly
/// as `200 OK` by the first call to [`write`]. Header changes after that
/// point have no effect on the response.
///
/// [`write_header`]: ResponseWriter::write_header
/// [`write`]: ResponseWriter::write
pub trait ResponseWriter {
    /// Response headers.
    fn headers(&self) -> &HeaderMap;

    /// Mutable response headers.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Sends the status line and headers.
    fn write_header(&mut self, status: StatusCode);

    /// Writes body bytes, returning how many were accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// The flush capability, if the transport has one.
    fn flusher(&mut self) -> Option<&mut dyn Flusher> {
        None
    }

    /// The hijack capability, if the transport has one.
    fn hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        None
    }

    /// The close-notification capability, if the transport has one.
    fn close_notifier(&mut self) -> Option<&mut dyn CloseNotifier> {
        None
    }
}

/// Sends buffered response data to the client.
pub trait Flusher {
    /// Flushes everything written so far.
    fn flush(&mut self) -> io::Result<()>;
}

/// Takes over the underlying connection.
pub trait Hijacker {
    /// Detaches the connection from the HTTP machinery.
    ///
    /// After a successful hijack the response writer must not be used.
    fn hijack(&mut self) -> io::Result<Box<dyn Connection>>;
}

/// Reports when the client goes away.
pub trait CloseNotifier {
    /// Returns a channel receiving one message when the connection closes.
    fn close_notify(&mut self) -> mpsc::Receiver<()>;
}

/// A raw, bidirectional connection returned by [`Hijacker::hijack`].
pub trait Connection: io::Read + io::Write + Send {}

impl<T: io::Read + io::Write + Send> Connection for T {}

impl<W: ResponseWriter + ?Sized> ResponseWriter for &mut W {
    fn headers(&self) -> &HeaderMap {
        (**self).headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        (**self).headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        (**self).write_header(status)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn flusher(&mut self) -> Option<&mut dyn Flusher> {
        (**self).flusher()
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        (**self).hijacker()
    }

    fn close_notifier(&mut self) -> Option<&mut dyn CloseNotifier> {
        (**self).close_notifier()
    }
}

/// The optional capabilities of a writer, probed once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Capabilities {
    pub(crate) flush: bool,
    pub(crate) hijack: bool,
    pub(crate) close_notify: bool,
}

impl Capabilities {
    pub(crate) fn detect<W: ResponseWriter + ?Sized>(writer: &mut W) -> Self {
        Self {
            flush: writer.flusher().is_some(),
            hijack: writer.hijacker().is_some(),
            close_notify: writer.close_notifier().is_some(),
        }
    }
}

/// Adapts a [`ResponseWriter`] body to [`io::Write`] for encoders.
///
/// `flush` only drains what the encoder hands over; flushing the transport
/// is left to the caller.
pub(crate) struct BodyWriter<'a, W: ?Sized>(pub(crate) &'a mut W);

impl<W: ResponseWriter + ?Sized> io::Write for BodyWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::Recorder;
    use std::io::Write;

    #[test]
    fn test_detect_capabilities() {
        let mut plain = Recorder::new();
        assert_eq!(Capabilities::detect(&mut plain), Capabilities::default());

        let mut full = Recorder::with_capabilities(true, true, true);
        assert_eq!(
            Capabilities::detect(&mut full),
            Capabilities {
                flush: true,
                hijack: true,
                close_notify: true,
            }
        );
    }

    #[test]
    fn test_mut_ref_forwards() {
        let mut recorder = Recorder::with_capabilities(true, false, false);
        {
            let mut writer: &mut dyn ResponseWriter = &mut recorder;
            ResponseWriter::write_header(&mut writer, StatusCode::CREATED);
            assert_eq!(ResponseWriter::write(&mut writer, b"abc").unwrap(), 3);
            assert!(ResponseWriter::flusher(&mut writer).is_some());
            assert!(ResponseWriter::hijacker(&mut writer).is_none());
        }
        assert_eq!(recorder.status(), Some(StatusCode::CREATED));
        assert_eq!(recorder.body(), b"abc");
    }

    #[test]
    fn test_body_writer_short_write_fails_write_all() {
        let mut recorder = Recorder::new();
        recorder.set_write_limit(Some(0));
        let err = BodyWriter(&mut recorder).write_all(b"data").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }
}
