use crate::codec::{Compressor, EncodeWriter};
use crate::config::Registry;
use crate::writer::{CloseNotifier, Connection, Flusher, Hijacker, ResponseWriter};
use http::{HeaderMap, StatusCode};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;

/// An in-memory [`ResponseWriter`] recording what reaches the transport.
#[derive(Default)]
pub(crate) struct Recorder {
    headers: HeaderMap,
    sent_headers: Option<HeaderMap>,
    status: Option<StatusCode>,
    status_writes: usize,
    body: Vec<u8>,
    flushes: usize,
    write_limit: Option<usize>,
    can_flush: bool,
    can_hijack: bool,
    can_close_notify: bool,
    close_tx: Option<mpsc::Sender<()>>,
}

impl Recorder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_capabilities(flush: bool, hijack: bool, close_notify: bool) -> Self {
        Self {
            can_flush: flush,
            can_hijack: hijack,
            can_close_notify: close_notify,
            ..Self::default()
        }
    }

    /// Accept at most `limit` bytes per write.
    pub(crate) fn set_write_limit(&mut self, limit: Option<usize>) {
        self.write_limit = limit;
    }

    pub(crate) fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Number of times a status line was attempted.
    pub(crate) fn status_writes(&self) -> usize {
        self.status_writes
    }

    /// Headers as they were when the status line was sent.
    pub(crate) fn sent_headers(&self) -> Option<&HeaderMap> {
        self.sent_headers.as_ref()
    }

    pub(crate) fn body(&self) -> &[u8] {
        &self.body
    }

    pub(crate) fn flushes(&self) -> usize {
        self.flushes
    }

    pub(crate) fn notify_close(&self) {
        if let Some(tx) = &self.close_tx {
            let _ = tx.send(());
        }
    }
}

impl ResponseWriter for Recorder {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        self.status_writes += 1;
        if self.status.is_none() {
            self.status = Some(status);
            self.sent_headers = Some(self.headers.clone());
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.status.is_none() {
            self.write_header(StatusCode::OK);
        }
        let n = self.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        self.body.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flusher(&mut self) -> Option<&mut dyn Flusher> {
        if self.can_flush { Some(self) } else { None }
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        if self.can_hijack { Some(self) } else { None }
    }

    fn close_notifier(&mut self) -> Option<&mut dyn CloseNotifier> {
        if self.can_close_notify {
            Some(self)
        } else {
            None
        }
    }
}

impl Flusher for Recorder {
    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

impl Hijacker for Recorder {
    fn hijack(&mut self) -> io::Result<Box<dyn Connection>> {
        Ok(Box::new(io::Cursor::new(b"raw".to_vec())))
    }
}

impl CloseNotifier for Recorder {
    fn close_notify(&mut self) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel();
        self.close_tx = Some(tx);
        rx
    }
}

const FIXED_OPEN: &[u8] = b"<fixed>";
const FIXED_CLOSE: &[u8] = b"</fixed>";

/// A reversible stand-in for a real codec that counts its encoders.
///
/// Output is the input wrapped in `<fixed>` ... `</fixed>`; each flush
/// emits a `|` marker.
#[derive(Debug, Default)]
pub(crate) struct FixedCompressor {
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl FixedCompressor {
    pub(crate) fn shared() -> Arc<dyn Compressor> {
        Arc::new(Self::default())
    }

    pub(crate) fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub(crate) fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Reverses the encoding of a complete stream.
    pub(crate) fn decode(encoded: &[u8]) -> Vec<u8> {
        let inner = encoded
            .strip_prefix(FIXED_OPEN)
            .and_then(|rest| rest.strip_suffix(FIXED_CLOSE))
            .unwrap_or_else(|| panic!("not a fixed stream: {:?}", String::from_utf8_lossy(encoded)));
        inner.iter().copied().filter(|&b| b != b'|').collect()
    }
}

impl Compressor for FixedCompressor {
    fn get(&self) -> Box<dyn EncodeWriter> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Box::new(FixedWriter {
            started: false,
            closed: Arc::clone(&self.closed),
            released: Arc::clone(&self.released),
        })
    }
}

struct FixedWriter {
    started: bool,
    closed: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl FixedWriter {
    fn start(&mut self, parent: &mut dyn io::Write) -> io::Result<()> {
        if !self.started {
            self.started = true;
            parent.write_all(FIXED_OPEN)?;
        }
        Ok(())
    }
}

impl EncodeWriter for FixedWriter {
    fn write(&mut self, parent: &mut dyn io::Write, buf: &[u8]) -> io::Result<usize> {
        self.start(parent)?;
        parent.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self, parent: &mut dyn io::Write) -> io::Result<()> {
        self.start(parent)?;
        parent.write_all(b"|")
    }

    fn close(mut self: Box<Self>, parent: &mut dyn io::Write) -> io::Result<()> {
        self.start(parent)?;
        self.closed.fetch_add(1, Ordering::SeqCst);
        parent.write_all(FIXED_CLOSE)
    }
}

impl Drop for FixedWriter {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// A compressor whose encoders take one byte less than they are given.
#[derive(Debug)]
pub(crate) struct ShortCompressor;

impl Compressor for ShortCompressor {
    fn get(&self) -> Box<dyn EncodeWriter> {
        Box::new(ShortWriter)
    }
}

struct ShortWriter;

impl EncodeWriter for ShortWriter {
    fn write(&mut self, parent: &mut dyn io::Write, buf: &[u8]) -> io::Result<usize> {
        let n = buf.len().saturating_sub(1);
        parent.write_all(&buf[..n])?;
        Ok(n)
    }

    fn close(self: Box<Self>, _parent: &mut dyn io::Write) -> io::Result<()> {
        Ok(())
    }
}

/// A registry of [`FixedCompressor`]s under the given tokens and priorities.
pub(crate) fn registry_of(entries: &[(&str, i32)]) -> Registry {
    let mut registry = Registry::default();
    for &(token, priority) in entries {
        registry
            .insert(token, priority, FixedCompressor::shared())
            .unwrap();
    }
    registry
}
