//! End-to-end: a scripted virtual device behind a unix socket is
//! discovered, handshaken, bridged into the hub, and retired.

use std::io::{Read, Write};
use std::os::unix::net::UnixListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use lowcar_daemon::config::DaemonConfig;
use lowcar_daemon::discovery::{self, PortRegistry};
use lowcar_protocol::{DeviceIdentity, Message, MessageKind, ParamType, Value};
use lowcar_shm::{Client, Hub, Stream, supervisor};
use rand::Rng;
use serial_test::serial;

fn fast_config(dir: &std::path::Path) -> DaemonConfig {
    DaemonConfig {
        physical_prefix: dir.join("ttyACM").to_string_lossy().into_owned(),
        virtual_prefix: dir.join("vdev").to_string_lossy().into_owned(),
        max_endpoints: 4,
        scan_interval_ms: 30,
        handshake_timeout_ms: 500,
        device_timeout_ms: 600,
        watchdog_interval_ms: 30,
        command_tick_ms: 10,
        ping_interval_ms: 10_000,
        read_slice_ms: 50,
        cooldown_ms: 200,
        ..DaemonConfig::default()
    }
}

/// Pulls the next complete frame out of an accumulation buffer.
fn extract(buf: &mut Vec<u8>) -> Option<Message> {
    let start = buf.iter().position(|&b| b == 0x00)?;
    buf.drain(..start);
    if buf.len() < 2 {
        return None;
    }
    let body_len = buf[1] as usize;
    if buf.len() < 2 + body_len {
        return None;
    }
    let frame: Vec<u8> = buf.drain(..2 + body_len).collect();
    Message::decode_body(&frame[2..]).ok()
}

/// Speaks the device side of the protocol: acknowledges the first PING,
/// echoes DEVICE_WRITE values back as DEVICE_DATA, and pings to stay
/// alive. Stops on RESET, hangup, or the shared stop flag.
fn fake_device(
    listener: UnixListener,
    identity: DeviceIdentity,
    schema: Vec<ParamType>,
    stop: Arc<AtomicBool>,
) -> Vec<MessageKind> {
    let (mut stream, _) = listener.accept().expect("daemon never connected");
    stream
        .set_read_timeout(Some(Duration::from_millis(20)))
        .unwrap();

    let mut seen = Vec::new();
    let mut buf = Vec::new();
    let mut chunk = [0u8; 256];
    let mut acked = false;
    let mut last_beat = Instant::now();

    'session: while !stop.load(Ordering::Acquire) {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) => {}
            Err(_) => break,
        }

        while let Some(message) = extract(&mut buf) {
            seen.push(message.kind);
            match message.kind {
                MessageKind::Ping if !acked => {
                    acked = true;
                    let ack = Message::acknowledgement(&identity);
                    stream.write_all(&ack.encode().unwrap()).unwrap();
                }
                MessageKind::DeviceWrite => {
                    let (mask, values) = message.values(&schema).unwrap();
                    let echo = Message::device_data(mask, &values, &schema).unwrap();
                    stream.write_all(&echo.encode().unwrap()).unwrap();
                }
                MessageKind::Reset => break 'session,
                _ => {}
            }
        }

        if acked && last_beat.elapsed() >= Duration::from_millis(100) {
            last_beat = Instant::now();
            if stream.write_all(&Message::ping().encode().unwrap()).is_err() {
                break;
            }
        }
    }
    seen
}

fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let end = Instant::now() + deadline;
    while Instant::now() < end {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
#[serial]
fn virtual_device_round_trip() {
    let prefix = format!("lowcar-e2e-{}", std::process::id());
    supervisor::create(&prefix).unwrap();

    let dir = std::env::temp_dir().join(format!("lowcar-e2e-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let config = fast_config(&dir);

    let identity = DeviceIdentity {
        dev_type: 14,
        year: 23,
        uid: rand::thread_rng().r#gen(),
    };
    let schema = lowcar_daemon::devices::device_type(14).unwrap().schema();

    let listener = UnixListener::bind(format!("{}0", config.virtual_prefix)).unwrap();
    let device_stop = Arc::new(AtomicBool::new(false));
    let device = {
        let schema = schema.clone();
        let stop = Arc::clone(&device_stop);
        std::thread::spawn(move || fake_device(listener, identity, schema, stop))
    };

    let daemon_hub = Arc::new(Hub::attach(&prefix).unwrap());
    let registry = Arc::new(PortRegistry::new(&config));
    let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
    let daemon = {
        let hub = Arc::clone(&daemon_hub);
        let registry = Arc::clone(&registry);
        let config = config.clone();
        std::thread::spawn(move || discovery::run(hub, registry, &config, stop_rx))
    };

    // executor-side view of the same hub
    let executor = Hub::attach(&prefix).unwrap();

    assert!(
        wait_until(Duration::from_secs(3), || executor.catalog() != 0),
        "device never reached the catalog"
    );
    let slot = executor.uid_to_slot(identity.uid).unwrap();
    assert_eq!(executor.identifiers(), vec![(slot, identity)]);

    // command written here must come back as data through the device
    executor
        .write(
            Client::Executor,
            slot,
            Stream::Command,
            0b101,
            &[Value::Int(7), Value::Float(3.5)],
        )
        .unwrap();
    assert!(
        wait_until(Duration::from_secs(3), || {
            executor
                .read(Client::Executor, slot, Stream::Data, 0b101)
                .map(|values| values == [Value::Int(7), Value::Float(3.5)])
                .unwrap_or(false)
        }),
        "echoed values never appeared on the DATA stream"
    );

    // hang up; the watchdog should retire the slot
    device_stop.store(true, Ordering::Release);
    let seen = device.join().unwrap();
    assert!(seen.contains(&MessageKind::Ping));
    assert!(seen.contains(&MessageKind::DeviceWrite));
    assert!(
        wait_until(Duration::from_secs(3), || executor.catalog() == 0),
        "slot never released after hangup"
    );

    stop_tx.send(()).unwrap();
    daemon.join().unwrap();

    let _ = std::fs::remove_dir_all(&dir);
    supervisor::destroy(&prefix).unwrap();
}
