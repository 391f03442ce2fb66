use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::{ReceiveHandler, Transport};

const READ_CHUNK_SIZE: usize = 4 * 1024;

type HandlerSlot = Arc<Mutex<Option<ReceiveHandler>>>;
type ReaderSlot = Arc<Mutex<Option<Box<dyn Read + Send>>>>;
type ReaderTask = Box<dyn FnOnce() + Send + 'static>;
type Closer = Box<dyn Fn() + Send + Sync>;

/// A transport over any byte stream (TCP socket, Unix socket, serial device).
///
/// The write half is used synchronously by [`Transport::transmit`]. The read
/// half is moved into a dedicated reader thread the first time a receive
/// handler is installed; the thread pushes every chunk it reads to the
/// current handler and exits at end of stream.
///
/// Dropping the line detaches the handler and stops the reader thread.
/// Sockets are shut down so the thread wakes at once; other streams (serial
/// devices) cannot be interrupted, so their thread exits, releasing the
/// device, at the next byte or end of stream.
pub struct StreamLine {
    name: String,
    writer: Mutex<Box<dyn Write + Send>>,
    reader: ReaderSlot,
    reader_started: AtomicBool,
    handler: HandlerSlot,
    closed: Arc<AtomicBool>,
    closer: Option<Closer>,
}

impl StreamLine {
    /// Build a line from separate read and write halves.
    pub fn new(
        name: impl Into<String>,
        reader: impl Read + Send + 'static,
        writer: impl Write + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            writer: Mutex::new(Box::new(writer)),
            reader: Arc::new(Mutex::new(Some(Box::new(reader)))),
            reader_started: AtomicBool::new(false),
            handler: Arc::new(Mutex::new(None)),
            closed: Arc::new(AtomicBool::new(false)),
            closer: None,
        }
    }

    /// Wrap a connected TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Result<Self> {
        let name = stream
            .peer_addr()
            .map(|addr| format!("tcp:{addr}"))
            .unwrap_or_else(|_| "tcp:unknown".to_string());
        let reader = stream.try_clone()?;
        let closer = stream.try_clone()?;
        let mut line = Self::new(name, reader, stream);
        line.closer = Some(Box::new(move || {
            let _ = closer.shutdown(Shutdown::Both);
        }));
        Ok(line)
    }

    /// Connect to a TCP endpoint.
    pub fn connect_tcp(addr: impl ToSocketAddrs + std::fmt::Display) -> Result<Self> {
        let endpoint = addr.to_string();
        let stream = TcpStream::connect(addr).map_err(|source| TransportError::Connect {
            endpoint: endpoint.clone(),
            source,
        })?;
        stream.set_nodelay(true)?;
        info!(%endpoint, "tcp line connected");
        Self::from_tcp(stream)
    }

    /// Wrap a connected Unix domain socket stream.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Result<Self> {
        let name = stream
            .peer_addr()
            .ok()
            .and_then(|addr| addr.as_pathname().map(|p| format!("unix:{}", p.display())))
            .unwrap_or_else(|| "unix:unnamed".to_string());
        let reader = stream.try_clone()?;
        let closer = stream.try_clone()?;
        let mut line = Self::new(name, reader, stream);
        line.closer = Some(Box::new(move || {
            let _ = closer.shutdown(Shutdown::Both);
        }));
        Ok(line)
    }

    /// Connect to a Unix domain socket path.
    #[cfg(unix)]
    pub fn connect_unix(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = std::os::unix::net::UnixStream::connect(path).map_err(|source| {
            TransportError::Connect {
                endpoint: path.display().to_string(),
                source,
            }
        })?;
        info!(path = %path.display(), "unix line connected");
        Self::from_unix(stream)
    }

    /// Open a serial device (or any character device / FIFO) for reading and writing.
    ///
    /// Line settings such as baud rate are left as configured on the device.
    /// See the type docs for how the reader thread ends after a drop.
    pub fn open_serial(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| TransportError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        let reader = file.try_clone()?;
        info!(path = %path.display(), "serial line opened");
        Ok(Self::new(format!("serial:{}", path.display()), reader, file))
    }

    /// Human-readable endpoint name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn start_reader(&self) -> Result<()> {
        self.start_reader_with(|builder, task| builder.spawn(task).map(drop))
    }

    /// Start the reader thread once. If spawning fails the read half stays in
    /// its slot so a later handler installation can try again.
    fn start_reader_with<S>(&self, spawn: S) -> Result<()>
    where
        S: FnOnce(thread::Builder, ReaderTask) -> io::Result<()>,
    {
        if self.reader_started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let slot = Arc::clone(&self.reader);
        let handler = Arc::clone(&self.handler);
        let closed = Arc::clone(&self.closed);
        let name = self.name.clone();
        let task: ReaderTask = Box::new(move || {
            let Some(reader) = lock(&slot).take() else {
                return;
            };
            read_loop(reader, &handler, &closed, &name);
        });

        let builder = thread::Builder::new().name(format!("sliplink-rx-{}", self.name));
        if let Err(err) = spawn(builder, task) {
            self.reader_started.store(false, Ordering::SeqCst);
            return Err(err.into());
        }
        Ok(())
    }
}

fn read_loop(
    mut reader: Box<dyn Read + Send>,
    handler: &Mutex<Option<ReceiveHandler>>,
    closed: &AtomicBool,
    name: &str,
) {
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        let read = match reader.read(&mut chunk) {
            Ok(0) => {
                debug!(line = %name, "end of stream");
                break;
            }
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                if !closed.load(Ordering::SeqCst) {
                    warn!(line = %name, error = %err, "read failed, stopping reader");
                }
                break;
            }
        };
        if closed.load(Ordering::SeqCst) {
            debug!(line = %name, "line dropped, stopping reader");
            break;
        }
        if let Some(handler) = lock(handler).as_mut() {
            handler(&chunk[..read]);
        }
    }
}

impl Transport for StreamLine {
    fn transmit(&self, bytes: &[u8]) -> Result<()> {
        let mut writer = lock(&self.writer);
        match writer.write_all(bytes) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::WriteZero => return Err(TransportError::Closed),
            Err(err) => return Err(TransportError::Io(err)),
        }
        writer.flush()?;
        Ok(())
    }

    fn set_receive_handler(&self, handler: ReceiveHandler) {
        *lock(&self.handler) = Some(handler);

        if let Err(err) = self.start_reader() {
            warn!(line = %self.name, error = %err, "failed to start reader thread");
        }
    }
}

impl Drop for StreamLine {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        *lock(&self.handler) = None;
        if let Some(close) = &self.closer {
            close();
        }
    }
}

impl std::fmt::Debug for StreamLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamLine").field("name", &self.name).finish()
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn transmit_writes_to_stream() {
        let sink = SharedSink::default();
        let line = StreamLine::new("test", Cursor::new(Vec::new()), sink.clone());

        line.transmit(b"hello").unwrap();
        line.transmit(b" world").unwrap();

        assert_eq!(sink.0.lock().unwrap().as_slice(), b"hello world");
    }

    #[test]
    fn reader_thread_pushes_chunks() {
        let line = StreamLine::new("test", Cursor::new(b"incoming".to_vec()), std::io::sink());
        let (tx, rx) = mpsc::channel();
        line.set_receive_handler(Box::new(move |bytes: &[u8]| {
            let _ = tx.send(bytes.to_vec());
        }));

        let mut seen = Vec::new();
        while seen.len() < b"incoming".len() {
            seen.extend(rx.recv_timeout(Duration::from_secs(2)).unwrap());
        }
        assert_eq!(seen, b"incoming");
    }

    #[test]
    fn write_zero_maps_to_closed() {
        let line = StreamLine::new("test", Cursor::new(Vec::new()), ZeroWriter);
        let err = line.transmit(b"x").unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[test]
    #[cfg(unix)]
    fn unix_pair_roundtrip() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let left = StreamLine::from_unix(left).unwrap();
        let right = StreamLine::from_unix(right).unwrap();

        let (tx, rx) = mpsc::channel();
        right.set_receive_handler(Box::new(move |bytes: &[u8]| {
            let _ = tx.send(bytes.to_vec());
        }));

        left.transmit(b"ping").unwrap();

        let mut seen = Vec::new();
        while seen.len() < 4 {
            seen.extend(rx.recv_timeout(Duration::from_secs(2)).unwrap());
        }
        assert_eq!(seen, b"ping");
    }

    #[test]
    fn connect_tcp_failure_reports_endpoint() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = StreamLine::connect_tcp(addr).unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }

    #[test]
    fn open_serial_missing_device() {
        let err = StreamLine::open_serial("/nonexistent/sliplink-tty").unwrap_err();
        assert!(matches!(err, TransportError::Open { .. }));
    }

    #[test]
    fn failed_reader_spawn_keeps_read_half_for_retry() {
        let line = StreamLine::new("test", Cursor::new(b"kept".to_vec()), std::io::sink());

        let err = line
            .start_reader_with(|_, _| Err(std::io::Error::other("no threads left")))
            .unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
        assert!(lock(&line.reader).is_some());

        let (tx, rx) = mpsc::channel();
        line.set_receive_handler(Box::new(move |bytes: &[u8]| {
            let _ = tx.send(bytes.to_vec());
        }));

        let mut seen = Vec::new();
        while seen.len() < 4 {
            seen.extend(rx.recv_timeout(Duration::from_secs(2)).unwrap());
        }
        assert_eq!(seen, b"kept");
    }

    #[test]
    #[cfg(unix)]
    fn dropped_line_stops_reader_without_shutdown() {
        use std::os::unix::net::UnixStream;
        use std::sync::atomic::AtomicUsize;

        // `new` installs no closer, like a serial device: the reader must
        // notice the drop by itself and release its end of the stream.
        let (ours, mut theirs) = UnixStream::pair().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let line = StreamLine::new("test", ours, std::io::sink());
        {
            let calls = Arc::clone(&calls);
            line.set_receive_handler(Box::new(move |_: &[u8]| {
                calls.fetch_add(1, Ordering::SeqCst);
            }));
        }
        drop(line);

        theirs.write_all(b"x").unwrap();
        theirs
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(theirs.read(&mut buf).unwrap(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
