//! Optional network greeting link, used once per connection event.

use std::io::{self, Write};
use std::net::{TcpStream, ToSocketAddrs};

use log::{info, warn};
use parking_lot::Mutex;

/// Fixed message pushed over the link when a central connects.
pub const GREETING: &[u8] = b"connect";

/// A pre-established outbound link the peripheral can greet over.
///
/// Absence of a link simply means no greeting is sent; a send failure is the
/// caller's to log and is never fatal.
pub trait GreetingLink: Send + Sync {
    fn send_greeting(&self, payload: &[u8]) -> io::Result<()>;
}

/// TCP-backed greeting link.
pub struct TcpGreeting {
    stream: Mutex<TcpStream>,
}

impl TcpGreeting {
    /// Connects with a bounded number of attempts, stopping on the first
    /// success. If every attempt fails the last error is returned and the
    /// caller should proceed without a link.
    pub fn connect<A: ToSocketAddrs>(addr: A, max_trials: u32) -> io::Result<Self> {
        let mut last_err =
            io::Error::new(io::ErrorKind::AddrNotAvailable, "no connection attempt made");
        for trial in 1..=max_trials.max(1) {
            match TcpStream::connect(&addr) {
                Ok(stream) => {
                    info!("greeting link established on attempt {trial}");
                    return Ok(Self {
                        stream: Mutex::new(stream),
                    });
                }
                Err(err) => {
                    warn!("greeting link attempt {trial} failed: {err}");
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }
}

impl GreetingLink for TcpGreeting {
    fn send_greeting(&self, payload: &[u8]) -> io::Result<()> {
        let mut stream = self.stream.lock();
        stream.write_all(payload)?;
        stream.flush()
    }
}
