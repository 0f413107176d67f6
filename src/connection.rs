//! An in-process serial line.
//!
//! [`pipe`] makes two linked [`Endpoint`]s: bytes written to one can be read
//! from the other. [`VirtualConnection`] puts a device on one end: a
//! background thread hands whatever arrives to a processor function and
//! writes its answer back.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info};

use crate::config::PumpConfig;
use crate::error::Error;

const READ_BUFFER: usize = 1024;

#[derive(Debug, Default)]
struct Buffer {
    data: VecDeque<u8>,
    closed: bool,
}

/// Bytes travelling in one direction.
#[derive(Debug, Default)]
struct Channel {
    buffer: Mutex<Buffer>,
    ready: Condvar,
}

impl Channel {
    fn close(&self) {
        self.buffer.lock().closed = true;
        self.ready.notify_all();
    }
}

/// One end of a [`pipe`].
///
/// Reads wait at most the read timeout and then fail with
/// [`io::ErrorKind::TimedOut`], like a serial port does. Once either end is
/// dropped, reads drain what is left and then return 0, and writes fail with
/// [`io::ErrorKind::BrokenPipe`].
#[derive(Debug)]
pub struct Endpoint {
    incoming: Arc<Channel>,
    outgoing: Arc<Channel>,
    timeout: Duration,
}

impl Endpoint {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Bytes that can be read without waiting.
    pub fn bytes_to_read(&self) -> usize {
        self.incoming.buffer.lock().data.len()
    }

    /// Close both directions.
    pub fn close(&self) {
        self.incoming.close();
        self.outgoing.close();
    }
}

/// Two endpoints connected to each other.
pub fn pipe() -> (Endpoint, Endpoint) {
    let a_to_b = Arc::new(Channel::default());
    let b_to_a = Arc::new(Channel::default());
    let a = Endpoint {
        incoming: Arc::clone(&b_to_a),
        outgoing: Arc::clone(&a_to_b),
        timeout: Endpoint::DEFAULT_TIMEOUT,
    };
    let b = Endpoint {
        incoming: a_to_b,
        outgoing: b_to_a,
        timeout: Endpoint::DEFAULT_TIMEOUT,
    };
    (a, b)
}

impl Read for Endpoint {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let deadline = Instant::now() + self.timeout;
        let mut buffer = self.incoming.buffer.lock();
        while buffer.data.is_empty() {
            if buffer.closed {
                return Ok(0);
            }
            if self.incoming.ready.wait_until(&mut buffer, deadline).timed_out()
                && buffer.data.is_empty()
            {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out"));
            }
        }
        let n = buf.len().min(buffer.data.len());
        for (slot, byte) in buf.iter_mut().zip(buffer.data.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for Endpoint {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut buffer = self.outgoing.buffer.lock();
        if buffer.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
        }
        buffer.data.extend(buf);
        drop(buffer);
        self.outgoing.ready.notify_all();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.close();
    }
}

/// Turns the bytes of one read into the bytes to answer with. An empty
/// answer sends nothing.
pub type Processor = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

/// Timing of the device loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionSettings {
    /// Sleep between polls that found nothing to read.
    pub poll_interval: Duration,
    /// How long one poll waits for input.
    pub read_timeout: Duration,
    /// How long [`VirtualConnection::close`] waits for the loop to exit.
    pub shutdown_timeout: Duration,
}

impl From<&PumpConfig> for ConnectionSettings {
    fn from(config: &PumpConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            read_timeout: config.read_timeout(),
            shutdown_timeout: config.shutdown_timeout(),
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::from(&PumpConfig::default())
    }
}

/// A device served by a background thread on one end of a [`pipe`].
#[derive(Debug)]
pub struct VirtualConnection {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    shutdown_timeout: Duration,
}

impl VirtualConnection {
    /// Start serving `processor` and return the host's end of the line.
    pub fn open(
        processor: Processor,
        settings: ConnectionSettings,
    ) -> Result<(Self, Endpoint), Error> {
        let (host, mut device) = pipe();
        device.set_timeout(settings.read_timeout);
        let stop = Arc::new(AtomicBool::new(false));
        let thread = thread::Builder::new()
            .name("vpump-connection".to_string())
            .spawn({
                let stop = Arc::clone(&stop);
                move || serve(device, processor, &stop, settings.poll_interval)
            })?;
        info!("virtual connection opened");
        Ok((
            Self {
                stop,
                thread: Some(thread),
                shutdown_timeout: settings.shutdown_timeout,
            },
            host,
        ))
    }

    /// Whether the device loop is still running.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the device loop and release the device end.
    pub fn close(&mut self) -> Result<(), Error> {
        self.stop.store(true, Ordering::Release);
        match self.thread.take() {
            Some(thread) => {
                join_within(thread, "connection thread", self.shutdown_timeout)?;
                info!("virtual connection closed");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for VirtualConnection {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("{}", e);
        }
    }
}

fn serve(mut device: Endpoint, mut processor: Processor, stop: &AtomicBool, poll_interval: Duration) {
    let mut buf = vec![0u8; READ_BUFFER];
    while !stop.load(Ordering::Acquire) {
        match device.read(&mut buf) {
            Ok(0) => {
                debug!("host end closed");
                break;
            }
            Ok(n) => {
                let reply = processor(&buf[..n]);
                if reply.is_empty() {
                    continue;
                }
                if let Err(e) = device.write_all(&reply) {
                    error!("failed to write reply: {}", e);
                    break;
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => thread::sleep(poll_interval),
            Err(e) => {
                error!("failed to read from the host: {}", e);
                break;
            }
        }
    }
}

/// Wait for `thread` to finish, giving up after `timeout`.
pub(crate) fn join_within(
    thread: JoinHandle<()>,
    name: &'static str,
    timeout: Duration,
) -> Result<(), Error> {
    let deadline = Instant::now() + timeout;
    while !thread.is_finished() {
        if Instant::now() >= deadline {
            return Err(Error::ShutdownTimeout(name, timeout.as_millis() as u64));
        }
        thread::sleep(Duration::from_millis(1));
    }
    if thread.join().is_err() {
        error!("{} panicked", name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ConnectionSettings {
        ConnectionSettings {
            poll_interval: Duration::from_millis(1),
            read_timeout: Duration::from_millis(5),
            shutdown_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn pipe_carries_bytes_both_ways() {
        let (mut a, mut b) = pipe();
        a.write_all(b"ping").unwrap();
        assert_eq!(b.bytes_to_read(), 4);
        let mut buf = [0u8; 8];
        assert_eq!(b.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"ping");

        b.write_all(b"pong").unwrap();
        let mut buf = [0u8; 2];
        a.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"po");
        a.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ng");
    }

    #[test]
    fn empty_reads_time_out() {
        let (mut a, _b) = pipe();
        assert_eq!(a.timeout(), Endpoint::DEFAULT_TIMEOUT);
        a.set_timeout(Duration::from_millis(10));
        assert_eq!(a.timeout(), Duration::from_millis(10));
        let started = Instant::now();
        let err = a.read(&mut [0u8; 4]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn dropping_one_end_closes_the_other() {
        let (mut a, b) = pipe();
        drop(b);
        assert_eq!(a.read(&mut [0u8; 4]).unwrap(), 0);
        assert_eq!(
            a.write(b"x").unwrap_err().kind(),
            io::ErrorKind::BrokenPipe
        );
    }

    #[test]
    fn reads_wake_up_on_write() {
        let (mut a, mut b) = pipe();
        a.set_timeout(Duration::from_secs(5));
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            b.write_all(b"late").unwrap();
            b
        });
        let mut buf = [0u8; 4];
        a.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"late");
        writer.join().unwrap();
    }

    #[test]
    fn device_answers_through_the_processor() {
        let processor: Processor = Box::new(|bytes: &[u8]| bytes.iter().rev().copied().collect());
        let (mut connection, mut host) = VirtualConnection::open(processor, settings()).unwrap();
        assert!(connection.is_running());

        host.write_all(b"abc").unwrap();
        let mut buf = [0u8; 3];
        host.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"cba");

        connection.close().unwrap();
        assert!(!connection.is_running());
        // Closing twice is fine.
        connection.close().unwrap();
    }

    #[test]
    fn empty_answers_send_nothing() {
        let processor: Processor = Box::new(|_| Vec::new());
        let (_connection, mut host) = VirtualConnection::open(processor, settings()).unwrap();
        host.set_timeout(Duration::from_millis(50));
        host.write_all(b"junk").unwrap();
        let err = host.read(&mut [0u8; 1]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn device_loop_ends_when_the_host_leaves() {
        let processor: Processor = Box::new(|bytes: &[u8]| bytes.to_vec());
        let (connection, host) = VirtualConnection::open(processor, settings()).unwrap();
        drop(host);
        let deadline = Instant::now() + Duration::from_secs(1);
        while connection.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!connection.is_running());
    }
}
