//! Two independently attached handles see one hub, the way the daemon and
//! the executor do from separate processes.

use lowcar_shm::{Client, DeviceIdentity, Hub, RunMode, Stream, Value, supervisor};
use rand::Rng;
use serial_test::serial;

struct Instance(String);

impl Instance {
    fn new(tag: &str) -> Self {
        let prefix = format!("lowcar-it-{}-{tag}", std::process::id());
        supervisor::create(&prefix).unwrap();
        Self(prefix)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        let _ = supervisor::destroy(&self.0);
    }
}

#[test]
#[serial]
fn state_is_shared_between_handles() {
    let instance = Instance::new("shared");
    let daemon = Hub::attach(&instance.0).unwrap();
    let executor = Hub::attach(&instance.0).unwrap();

    let uid: u64 = rand::thread_rng().r#gen();
    let id = DeviceIdentity {
        dev_type: 4,
        year: 23,
        uid,
    };
    let slot = daemon.connect(&id).unwrap();

    // the daemon publishes a reading; the executor sees it
    daemon
        .write(
            Client::DeviceHandler,
            slot,
            Stream::Data,
            0b1,
            &[Value::Float(12.25)],
        )
        .unwrap();
    assert_eq!(
        executor
            .read_by_uid(Client::Executor, uid, Stream::Data, 0b1)
            .unwrap(),
        vec![Value::Float(12.25)]
    );

    // the executor issues a command; the daemon drains it
    executor
        .write_by_uid(Client::Executor, uid, Stream::Command, 0b10, &[Value::Bool(true)])
        .unwrap();
    let map = daemon.changed_commands();
    assert_eq!(map.slots, 1 << slot);
    assert_eq!(
        daemon
            .read(Client::DeviceHandler, slot, Stream::Command, map.params[slot])
            .unwrap(),
        vec![Value::Bool(true)]
    );
    assert_eq!(daemon.changed_commands().slots, 0);

    // aux state crosses handles too
    executor.set_run_mode(RunMode::Auto);
    assert_eq!(daemon.run_mode(), RunMode::Auto);
}

#[test]
#[serial]
fn subscriptions_cross_handles() {
    let instance = Instance::new("subs");
    let daemon = Hub::attach(&instance.0).unwrap();
    let consumer = Hub::attach(&instance.0).unwrap();

    let uid = 0x51;
    let slot = daemon
        .connect(&DeviceIdentity {
            dev_type: 2,
            year: 23,
            uid,
        })
        .unwrap();

    consumer.subscribe(Client::NetRelay, uid, 0b1100).unwrap();
    assert_eq!(daemon.drain_subscriptions(), vec![(slot, 0b1100)]);
}
