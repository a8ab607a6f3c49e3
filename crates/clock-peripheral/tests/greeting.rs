//! TCP greeting link behavior.

use std::io::Read;
use std::net::TcpListener;
use std::thread;

use clock_peripheral::{GreetingLink, TcpGreeting, GREETING};

#[test]
fn connects_and_sends_the_greeting() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).unwrap();
        buf
    });

    let link = TcpGreeting::connect(addr, 3).unwrap();
    link.send_greeting(GREETING).unwrap();
    drop(link);

    assert_eq!(server.join().unwrap(), GREETING.to_vec());
}

#[test]
fn gives_up_after_the_configured_trials() {
    // A port nothing listens on: bind, learn the address, close.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    assert!(TcpGreeting::connect(addr, 2).is_err());
}
