use crate::codec::EncodeWriter;
use crate::config::Config;
use crate::prefer::{Candidate, preferred};
use crate::sniff::{SNIFF_LEN, detect_content_type};
use crate::writer::{
    BodyWriter, Capabilities, CloseNotifier, Connection, Flusher, Hijacker, ResponseWriter,
};
use bytes::BytesMut;
use http::header::{self, HeaderMap, HeaderValue};
use http::StatusCode;
use std::io;
use std::mem;
use std::sync::{Arc, mpsc};

/// Where a [`CompressWriter`] is in its lifecycle.
///
/// Phases only move forward: `Undecided`, then `Buffering`, then one of
/// `Compressing` or `PassThrough`, then `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing written yet.
    Undecided,
    /// Body bytes are held back until the decision can be made.
    Buffering,
    /// The body is being encoded.
    Compressing,
    /// The body is written unmodified.
    PassThrough,
    /// The response is complete.
    Closed,
}

enum State {
    Undecided,
    Buffering(BytesMut),
    /// The encoder is created by the first non-empty write.
    Compressing(Option<Box<dyn EncodeWriter>>),
    PassThrough,
    Closed,
}

enum Decision {
    Wait,
    Plain,
    Encode,
}

/// A [`ResponseWriter`] that compresses the body it is given.
///
/// The writer holds back the status line and the first body bytes until it
/// knows enough to decide: either the body reached the minimum size, or a
/// declared `Content-Length` already tells. It then commits, once, to
/// either compressing with the preferred common encoding or passing the
/// body through untouched.
///
/// [`close`](CompressWriter::close) must run for the response to be
/// complete. Dropping the writer closes it, logging any error.
pub struct CompressWriter<W: ResponseWriter> {
    inner: W,
    config: Arc<Config>,
    candidates: Vec<Candidate>,
    chosen: Option<Candidate>,
    caps: Capabilities,
    status: Option<StatusCode>,
    header_decided: bool,
    body_allowed: bool,
    state: State,
}

impl<W: ResponseWriter> CompressWriter<W> {
    /// Wraps `inner` for one exchange.
    ///
    /// Without candidates the writer passes everything straight through.
    pub(crate) fn new(mut inner: W, config: Arc<Config>, candidates: Vec<Candidate>) -> Self {
        let caps = Capabilities::detect(&mut inner);
        let state = if candidates.is_empty() {
            State::PassThrough
        } else {
            State::Undecided
        };

        Self {
            inner,
            config,
            candidates,
            chosen: None,
            caps,
            status: None,
            header_decided: false,
            body_allowed: true,
            state,
        }
    }

    /// The current phase.
    pub fn phase(&self) -> Phase {
        match self.state {
            State::Undecided => Phase::Undecided,
            State::Buffering(_) => Phase::Buffering,
            State::Compressing(_) => Phase::Compressing,
            State::PassThrough => Phase::PassThrough,
            State::Closed => Phase::Closed,
        }
    }

    /// The encoding chosen at the commit point, if the body is compressed.
    pub fn encoding(&self) -> Option<&str> {
        self.chosen.as_ref().map(Candidate::encoding)
    }

    /// The wrapped writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// The wrapped writer.
    ///
    /// Writing to it directly bypasses compression.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Records the status to send at the commit point.
    ///
    /// Only the first call has any effect.
    pub fn write_header(&mut self, status: StatusCode) {
        if self.header_decided {
            return;
        }
        self.header_decided = true;

        match self.state {
            State::PassThrough => self.inner.write_header(status),
            _ => self.status = Some(status),
        }
    }

    /// Writes body bytes, compressing them once committed.
    ///
    /// Bytes held back before the commit point count as written. At most
    /// the larger of the minimum size and the sniffing window is held back;
    /// the rest of `buf` goes to the committed path in the same call. When
    /// passing through, the returned count is the transport's.
    pub fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.state {
            State::Closed => {
                return Err(io::Error::other("write on a closed compressed response"));
            }
            State::PassThrough => {
                self.header_decided = true;
                return self.inner.write(buf);
            }
            State::Compressing(_) => {
                self.write_encoded(buf)?;
                return Ok(buf.len());
            }
            State::Undecided => self.state = State::Buffering(self.config.buffers.acquire()),
            State::Buffering(_) => {}
        }

        let window = self.config.min_size.max(SNIFF_LEN);
        let held = match &mut self.state {
            State::Buffering(pending) => {
                let n = window.saturating_sub(pending.len()).min(buf.len());
                pending.extend_from_slice(&buf[..n]);
                n
            }
            _ => 0,
        };
        self.decide(false)?;

        let rest = &buf[held..];
        if rest.is_empty() {
            return Ok(buf.len());
        }
        match self.state {
            State::Compressing(_) => {
                self.write_encoded(rest)?;
                Ok(buf.len())
            }
            State::PassThrough => Ok(held + self.inner.write(rest)?),
            // a full window always decides
            _ => Ok(held),
        }
    }

    /// Flushes encoded output and then the wrapped writer.
    ///
    /// Does nothing before the commit point.
    pub fn flush(&mut self) -> io::Result<()> {
        match &mut self.state {
            State::Compressing(Some(encoder)) => encoder.flush(&mut BodyWriter(&mut self.inner))?,
            State::Compressing(None) | State::PassThrough => {}
            State::Undecided | State::Buffering(_) | State::Closed => return Ok(()),
        }

        match self.inner.flusher() {
            Some(flusher) => flusher.flush(),
            None => Ok(()),
        }
    }

    /// Completes the response.
    ///
    /// Held-back bytes are written uncompressed and the encoder, if any, is
    /// finished. Closing again does nothing.
    pub fn close(&mut self) -> io::Result<()> {
        match mem::replace(&mut self.state, State::Closed) {
            State::Closed | State::PassThrough => Ok(()),
            State::Undecided => {
                // never force a status the handler did not set
                self.header_decided = true;
                if let Some(status) = self.status.take() {
                    self.inner.write_header(status);
                }
                Ok(())
            }
            State::Buffering(pending) => self.start_plain(pending),
            State::Compressing(encoder) => {
                // an encoded body is never empty, unless the status forbids one
                let encoder = encoder.or_else(|| {
                    let candidate = self.chosen.as_ref().filter(|_| self.body_allowed)?;
                    Some(candidate.compressor().get())
                });
                match encoder {
                    Some(encoder) => encoder.close(&mut BodyWriter(&mut self.inner)),
                    None => Ok(()),
                }
            }
        }
    }

    /// Decides now, even if the body has not reached the minimum size.
    pub(crate) fn commit(&mut self) -> io::Result<()> {
        match self.state {
            State::Buffering(_) => self.decide(true),
            _ => Ok(()),
        }
    }

    fn decide(&mut self, force: bool) -> io::Result<()> {
        match self.decision(force) {
            Decision::Wait => Ok(()),
            Decision::Plain => {
                let pending = self.take_pending(State::PassThrough);
                self.start_plain(pending)
            }
            Decision::Encode => {
                let pending = self.take_pending(State::Compressing(None));
                self.start_encoded(pending)
            }
        }
    }

    fn decision(&mut self, force: bool) -> Decision {
        let min_size = self.config.min_size;
        let buffered = match &self.state {
            State::Buffering(pending) => &pending[..],
            _ => &[][..],
        };

        let headers = self.inner.headers();
        if headers.contains_key(header::CONTENT_ENCODING)
            || headers.contains_key(header::CONTENT_RANGE)
        {
            return Decision::Plain;
        }

        let content_length = declared_length(headers);
        if content_length != 0 && content_length < min_size {
            return Decision::Plain;
        }

        let content_type = declared_content_type(headers);
        if let Some(content_type) = &content_type {
            if !self.config.gate.permits(content_type) {
                return Decision::Plain;
            }
        }

        if !force && content_length == 0 && buffered.len() < min_size {
            return Decision::Wait;
        }

        let content_type = match content_type {
            Some(content_type) => content_type,
            None => {
                let sniffed = detect_content_type(buffered);
                self.inner
                    .headers_mut()
                    .insert(header::CONTENT_TYPE, HeaderValue::from_static(sniffed));
                sniffed.to_owned()
            }
        };

        if self.config.gate.permits(&content_type) && !self.candidates.is_empty() {
            Decision::Encode
        } else {
            Decision::Plain
        }
    }

    fn take_pending(&mut self, next: State) -> BytesMut {
        match mem::replace(&mut self.state, next) {
            State::Buffering(pending) => pending,
            _ => BytesMut::new(),
        }
    }

    fn start_plain(&mut self, pending: BytesMut) -> io::Result<()> {
        tracing::trace!(buffered = pending.len(), "response passes through uncompressed");
        self.send_status();

        let result = if pending.is_empty() {
            Ok(())
        } else {
            match self.inner.write(&pending) {
                Ok(n) if n < pending.len() => Err(short_write()),
                Ok(_) => Ok(()),
                Err(err) => Err(err),
            }
        };
        self.config.buffers.release(pending);
        result
    }

    fn start_encoded(&mut self, pending: BytesMut) -> io::Result<()> {
        let candidate = preferred(&mut self.candidates, self.config.prefer).clone();
        tracing::debug!(
            encoding = candidate.encoding(),
            quality = candidate.quality(),
            priority = candidate.priority(),
            "compressing response"
        );

        let headers = self.inner.headers_mut();
        headers.insert(header::CONTENT_ENCODING, candidate.header_value().clone());
        headers.remove(header::CONTENT_LENGTH);
        headers.remove(header::ACCEPT_RANGES);
        self.chosen = Some(candidate);
        self.send_status();

        let result = self.write_encoded(&pending);
        self.config.buffers.release(pending);
        result
    }

    fn write_encoded(&mut self, buf: &[u8]) -> io::Result<()> {
        if buf.is_empty() {
            return Ok(());
        }

        let (State::Compressing(slot), Some(candidate)) = (&mut self.state, &self.chosen) else {
            return Err(io::Error::other("response is not being compressed"));
        };
        let encoder = slot.get_or_insert_with(|| candidate.compressor().get());

        let n = encoder.write(&mut BodyWriter(&mut self.inner), buf)?;
        if n < buf.len() {
            return Err(short_write());
        }
        Ok(())
    }

    fn send_status(&mut self) {
        self.header_decided = true;
        let status = self.status.take().unwrap_or(StatusCode::OK);
        self.body_allowed = !(status.is_informational()
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED);
        self.inner.write_header(status);
    }

    /// Gives up pooled resources without writing anything.
    fn abandon(&mut self) {
        if let State::Buffering(pending) = mem::replace(&mut self.state, State::Closed) {
            self.config.buffers.release(pending);
        }
    }
}

fn declared_length(headers: &HeaderMap) -> usize {
    // unparsable counts as not declared
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0)
}

fn declared_content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_TYPE)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .filter(|v| !v.is_empty())
}

fn short_write() -> io::Error {
    io::Error::new(io::ErrorKind::WriteZero, "short write")
}

impl<W: ResponseWriter> ResponseWriter for CompressWriter<W> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        CompressWriter::write_header(self, status)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        CompressWriter::write(self, buf)
    }

    fn flusher(&mut self) -> Option<&mut dyn Flusher> {
        if self.caps.flush {
            Some(self)
        } else {
            None
        }
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        if self.caps.hijack {
            Some(self)
        } else {
            None
        }
    }

    fn close_notifier(&mut self) -> Option<&mut dyn CloseNotifier> {
        if self.caps.close_notify {
            Some(self)
        } else {
            None
        }
    }
}

impl<W: ResponseWriter> Flusher for CompressWriter<W> {
    fn flush(&mut self) -> io::Result<()> {
        CompressWriter::flush(self)
    }
}

impl<W: ResponseWriter> Hijacker for CompressWriter<W> {
    fn hijack(&mut self) -> io::Result<Box<dyn Connection>> {
        let hijacker = self.inner.hijacker().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Unsupported, "response writer cannot be hijacked")
        })?;
        let connection = hijacker.hijack()?;
        // the connection now belongs to the caller
        self.abandon();
        Ok(connection)
    }
}

impl<W: ResponseWriter> CloseNotifier for CompressWriter<W> {
    fn close_notify(&mut self) -> mpsc::Receiver<()> {
        match self.inner.close_notifier() {
            Some(notifier) => notifier.close_notify(),
            None => mpsc::channel().1,
        }
    }
}

impl<W: ResponseWriter> Drop for CompressWriter<W> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.abandon();
            return;
        }
        if let Err(err) = self.close() {
            tracing::debug!(error = %err, "failed to close compressed response");
        }
    }
}
