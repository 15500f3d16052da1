//! Serial transport over a real pseudo-terminal pair.
#![cfg(all(unix, feature = "serial"))]

use sensor_bridge::config::CommandConfig;
use sensor_bridge::protocol::ResponseStatus;
use sensor_bridge::storage::{DeviceProfile, MemoryStore, SampleStore};
use sensor_bridge::transport::{SerialTransport, Transport};
use sensor_bridge::Bridge;
use serialport::{SerialPort, TTYPort};
use std::io::{Read, Write};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Opens a pty pair; the test keeps the master as the "device" and returns the slave path.
fn device_pty() -> (TTYPort, TTYPort, String) {
    let (mut master, mut slave) = TTYPort::pair().unwrap();
    master.set_timeout(Duration::from_millis(20)).unwrap();
    slave.set_exclusive(false).unwrap();
    let path = slave.name().unwrap();
    (master, slave, path)
}

#[test]
fn test_pty_is_reported_virtual() {
    let (_master, _slave, path) = device_pty();
    let mut transport = SerialTransport::open(&path, 115_000, Duration::from_millis(20)).unwrap();

    assert!(transport.is_virtual());
    transport.set_baud_rate(9600).unwrap();
    assert_eq!(transport.baud_rate(), 9600);
}

#[test]
fn test_pty_line_speed_is_left_alone() {
    let (_master, slave, path) = device_pty();
    let transport = SerialTransport::open(&path, 115_000, Duration::from_millis(20)).unwrap();

    assert_eq!(transport.baud_rate(), 115_000);
    // The requested rate is only recorded, never written to the pty's termios.
    if let Ok(rate) = slave.baud_rate() {
        assert_ne!(rate, 115_000);
    }
}

#[test]
fn test_command_round_trip_over_pty() {
    let (mut master, _slave, path) = device_pty();
    let transport = SerialTransport::open(&path, 115_000, Duration::from_millis(20)).unwrap();

    let profile = DeviceProfile::new(path.clone(), 115, false).shared();
    let store: Arc<dyn SampleStore> = Arc::new(MemoryStore::new(profile.clone()));
    let command = CommandConfig {
        timeout_ms: 3000,
        poll_interval_ms: 1,
    };
    let (bridge, reader) = Bridge::connect(Box::new(transport), store, profile, &command).unwrap();
    let reader = reader.spawn().unwrap();

    // Emulated firmware: answer the first complete command line, then stream one sample.
    let device = thread::spawn(move || {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut received = Vec::new();
        let mut buf = [0u8; 64];
        while !received.contains(&b'\n') && Instant::now() < deadline {
            if let Ok(n) = master.read(&mut buf) {
                received.extend_from_slice(&buf[..n]);
            }
        }
        master.write_all(b"$0,ok\n$1.5,2.5,3.5\n").unwrap();
        master.flush().unwrap();
        (master, received)
    });

    assert_eq!(bridge.issue_start().unwrap(), ResponseStatus::Ok);
    let (_master, received) = device.join().unwrap();
    assert_eq!(String::from_utf8_lossy(&received).trim_end(), "$0");

    let deadline = Instant::now() + Duration::from_secs(5);
    while bridge.recent_samples(1).unwrap().is_empty() {
        assert!(Instant::now() < deadline, "sample never arrived");
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(bridge.recent_samples(1).unwrap()[0].values(), [1.5, 2.5, 3.5]);

    reader.shutdown().unwrap();
}
