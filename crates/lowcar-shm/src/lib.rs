//! Cross-process shared-memory hub for live device state.
//!
//! One memory-mapped region, attached by every process of the runtime,
//! holds the device catalog, the per-slot parameter streams and the
//! change/subscription bitmaps. A second, small region carries the robot
//! run mode and the latest input snapshots. Named POSIX semaphores guard
//! the state at fine grain: one for the catalog, one per (slot, stream)
//! pair, and one per metadata bitmap, so relays on different devices never
//! contend.
//!
//! The named objects are created once by [`supervisor::create`] and removed
//! by [`supervisor::destroy`]; [`Hub::attach`] only opens what already
//! exists. Lock order is catalog before slot locks; the bitmap locks are
//! leaves and never held across another acquisition.

mod error;
mod layout;
mod region;
mod sem;
pub mod supervisor;

use std::ptr;

use tracing::{debug, info};

pub use error::ShmError;
pub use layout::{Client, InputSnapshot, InputSource, RunMode, Stream};
pub use lowcar_protocol::{DeviceIdentity, MAX_DEVICES, MAX_PARAMS, Value};

use layout::{AUX_REGION_SIZE, AuxRegion, DEVICE_REGION_SIZE, DeviceRegion, NUM_STREAMS, Names, RawIdentity, RawValue};
use region::SharedRegion;
use sem::NamedSem;

/// Pending host-to-device commands, as read from the changed bitmaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandMap {
    /// One bit per slot with at least one unconsumed command write.
    pub slots: u32,
    /// Per-slot parameter bits.
    pub params: [u32; MAX_DEVICES],
}

/// A process's handle onto the shared hub.
///
/// Cheap to share behind an `Arc`; all operations take `&self`. Dropping
/// the handle unmaps the regions and closes the semaphores without
/// touching their names.
pub struct Hub {
    device: SharedRegion,
    aux: SharedRegion,
    catalog_sem: NamedSem,
    cmd_map_sem: NamedSem,
    sub_map_sem: NamedSem,
    run_mode_sem: NamedSem,
    input_sem: NamedSem,
    // indexed slot * NUM_STREAMS + stream
    stream_sems: Vec<NamedSem>,
}

impl Hub {
    /// Opens the pre-existing regions and semaphores under `prefix`.
    ///
    /// Fails with [`ShmError::Missing`] when the supervisor has not
    /// created the instance.
    pub fn attach(prefix: &str) -> Result<Self, ShmError> {
        let names = Names::new(prefix);
        let device = SharedRegion::open(&names.device_region(), DEVICE_REGION_SIZE)?;
        let aux = SharedRegion::open(&names.aux_region(), AUX_REGION_SIZE)?;

        let catalog_sem = NamedSem::open(&names.catalog_sem())?;
        let cmd_map_sem = NamedSem::open(&names.cmd_map_sem())?;
        let sub_map_sem = NamedSem::open(&names.sub_map_sem())?;
        let run_mode_sem = NamedSem::open(&names.run_mode_sem())?;
        let input_sem = NamedSem::open(&names.input_sem())?;

        let mut stream_sems = Vec::with_capacity(MAX_DEVICES * NUM_STREAMS);
        for slot in 0..MAX_DEVICES {
            stream_sems.push(NamedSem::open(&names.stream_sem(slot, Stream::Data))?);
            stream_sems.push(NamedSem::open(&names.stream_sem(slot, Stream::Command))?);
        }

        debug!(prefix, "attached to shared-memory hub");
        Ok(Self {
            device,
            aux,
            catalog_sem,
            cmd_map_sem,
            sub_map_sem,
            run_mode_sem,
            input_sem,
            stream_sems,
        })
    }

    fn dev(&self) -> *mut DeviceRegion {
        self.device.as_ptr().cast()
    }

    fn aux_region(&self) -> *mut AuxRegion {
        self.aux.as_ptr().cast()
    }

    fn stream_sem(&self, slot: usize, stream: Stream) -> &NamedSem {
        &self.stream_sems[slot * NUM_STREAMS + stream.index()]
    }

    fn check_slot(slot: usize) -> Result<(), ShmError> {
        if slot < MAX_DEVICES {
            Ok(())
        } else {
            Err(ShmError::BadSlot { slot })
        }
    }

    /// Catalog bit check without the catalog lock. Connect publishes the
    /// bit last and disconnect clears it first, so a stale answer only
    /// mirrors the documented lookup-to-use race every caller must
    /// tolerate anyway.
    fn check_connected(&self, slot: usize) -> Result<(), ShmError> {
        let catalog = unsafe { ptr::read_volatile(&raw const (*self.dev()).catalog) };
        if catalog & (1 << slot) != 0 {
            Ok(())
        } else {
            Err(ShmError::EmptySlot { slot })
        }
    }

    // ---- catalog ------------------------------------------------------

    /// Bitmap of live slots.
    pub fn catalog(&self) -> u32 {
        let _g = self.catalog_sem.lock();
        unsafe { ptr::read_volatile(&raw const (*self.dev()).catalog) }
    }

    /// Identities of every connected device, by slot.
    pub fn identifiers(&self) -> Vec<(usize, DeviceIdentity)> {
        let _g = self.catalog_sem.lock();
        let dev = self.dev();
        let catalog = unsafe { ptr::read_volatile(&raw const (*dev).catalog) };
        (0..MAX_DEVICES)
            .filter(|slot| catalog & (1 << slot) != 0)
            .map(|slot| {
                let raw = unsafe { ptr::read_volatile(&raw const (*dev).identities[slot]) };
                (slot, raw.load())
            })
            .collect()
    }

    /// Resolves a stable uid to its current slot.
    ///
    /// The slot may be gone again by the time the caller uses it; the
    /// per-operation connected check catches that.
    pub fn uid_to_slot(&self, uid: u64) -> Result<usize, ShmError> {
        self.identifiers()
            .into_iter()
            .find(|(_, id)| id.uid == uid)
            .map(|(slot, _)| slot)
            .ok_or(ShmError::UnknownUid { uid })
    }

    /// Claims the lowest free slot for `identity`: zeroes both parameter
    /// streams and any stale metadata, records the identity, and publishes
    /// the catalog bit last. `Err(Full)` when all slots are live.
    pub fn connect(&self, identity: &DeviceIdentity) -> Result<usize, ShmError> {
        let _cat = self.catalog_sem.lock();
        let dev = self.dev();
        let catalog = unsafe { ptr::read_volatile(&raw const (*dev).catalog) };
        let slot = (0..MAX_DEVICES)
            .find(|slot| catalog & (1 << slot) == 0)
            .ok_or(ShmError::Full)?;

        {
            let _d = self.stream_sem(slot, Stream::Data).lock();
            let _c = self.stream_sem(slot, Stream::Command).lock();
            unsafe {
                for stream in 0..NUM_STREAMS {
                    for param in 0..MAX_PARAMS {
                        ptr::write_volatile(
                            &raw mut (*dev).params[stream][slot][param],
                            RawValue::zeroed(),
                        );
                    }
                }
                ptr::write_volatile(
                    &raw mut (*dev).identities[slot],
                    RawIdentity::store(identity),
                );
            }
        }
        {
            let _m = self.cmd_map_sem.lock();
            unsafe {
                let slots = ptr::read_volatile(&raw const (*dev).cmd_changed[0]);
                ptr::write_volatile(&raw mut (*dev).cmd_changed[0], slots & !(1 << slot));
                ptr::write_volatile(&raw mut (*dev).cmd_changed[1 + slot], 0);
            }
        }
        {
            let _s = self.sub_map_sem.lock();
            unsafe {
                for lane in 0..layout::NUM_LANES {
                    ptr::write_volatile(&raw mut (*dev).sub_masks[lane][slot], 0);
                }
                let changed = ptr::read_volatile(&raw const (*dev).sub_changed);
                ptr::write_volatile(&raw mut (*dev).sub_changed, changed & !(1 << slot));
            }
        }

        unsafe { ptr::write_volatile(&raw mut (*dev).catalog, catalog | (1 << slot)) };
        info!(uid = format_args!("{:#018x}", identity.uid), slot, "device connected");
        Ok(slot)
    }

    /// Releases a slot: clears the catalog bit and every pending command
    /// or subscription bit so nothing leaks to the next occupant.
    pub fn disconnect(&self, slot: usize) -> Result<(), ShmError> {
        Self::check_slot(slot)?;
        let _cat = self.catalog_sem.lock();
        let dev = self.dev();
        let catalog = unsafe { ptr::read_volatile(&raw const (*dev).catalog) };
        if catalog & (1 << slot) == 0 {
            return Err(ShmError::EmptySlot { slot });
        }

        {
            // no reader may be mid-copy when the bit clears
            let _d = self.stream_sem(slot, Stream::Data).lock();
            let _c = self.stream_sem(slot, Stream::Command).lock();
            unsafe { ptr::write_volatile(&raw mut (*dev).catalog, catalog & !(1 << slot)) };
        }
        {
            let _m = self.cmd_map_sem.lock();
            unsafe {
                let slots = ptr::read_volatile(&raw const (*dev).cmd_changed[0]);
                ptr::write_volatile(&raw mut (*dev).cmd_changed[0], slots & !(1 << slot));
                ptr::write_volatile(&raw mut (*dev).cmd_changed[1 + slot], 0);
            }
        }
        {
            let _s = self.sub_map_sem.lock();
            unsafe {
                for lane in 0..layout::NUM_LANES {
                    ptr::write_volatile(&raw mut (*dev).sub_masks[lane][slot], 0);
                }
                let changed = ptr::read_volatile(&raw const (*dev).sub_changed);
                ptr::write_volatile(&raw mut (*dev).sub_changed, changed & !(1 << slot));
            }
        }
        info!(slot, "device disconnected");
        Ok(())
    }

    // ---- parameter streams --------------------------------------------

    /// Reads the parameters in `mask` (ascending bit order) from one
    /// stream. A COMMAND read by the device handler also consumes the
    /// corresponding changed bits.
    pub fn read(
        &self,
        client: Client,
        slot: usize,
        stream: Stream,
        mask: u32,
    ) -> Result<Vec<Value>, ShmError> {
        Self::check_slot(slot)?;
        self.check_connected(slot)?;
        let dev = self.dev();

        let mut values = Vec::with_capacity(mask.count_ones() as usize);
        {
            let _g = self.stream_sem(slot, stream).lock();
            for param in 0..MAX_PARAMS {
                if mask & (1 << param) != 0 {
                    let cell = unsafe {
                        ptr::read_volatile(&raw const (*dev).params[stream.index()][slot][param])
                    };
                    values.push(cell.load(slot, param)?);
                }
            }
        }

        if client == Client::DeviceHandler && stream == Stream::Command {
            let _m = self.cmd_map_sem.lock();
            unsafe {
                let params = ptr::read_volatile(&raw const (*dev).cmd_changed[1 + slot]) & !mask;
                ptr::write_volatile(&raw mut (*dev).cmd_changed[1 + slot], params);
                if params == 0 {
                    let slots = ptr::read_volatile(&raw const (*dev).cmd_changed[0]);
                    ptr::write_volatile(&raw mut (*dev).cmd_changed[0], slots & !(1 << slot));
                }
            }
        }
        Ok(values)
    }

    /// Writes `values` to the parameters in `mask` (ascending bit order).
    /// A COMMAND write by a consumer also raises the changed bits the
    /// device handler drains.
    pub fn write(
        &self,
        client: Client,
        slot: usize,
        stream: Stream,
        mask: u32,
        values: &[Value],
    ) -> Result<(), ShmError> {
        Self::check_slot(slot)?;
        let expected = mask.count_ones() as usize;
        if expected != values.len() {
            return Err(ShmError::MaskMismatch {
                expected,
                supplied: values.len(),
            });
        }
        self.check_connected(slot)?;
        let dev = self.dev();

        {
            let _g = self.stream_sem(slot, stream).lock();
            let mut next = values.iter();
            for param in 0..MAX_PARAMS {
                if mask & (1 << param) != 0 {
                    // length was checked against the mask above
                    if let Some(value) = next.next() {
                        unsafe {
                            ptr::write_volatile(
                                &raw mut (*dev).params[stream.index()][slot][param],
                                RawValue::store(*value),
                            );
                        }
                    }
                }
            }
        }

        if client != Client::DeviceHandler && stream == Stream::Command {
            let _m = self.cmd_map_sem.lock();
            unsafe {
                let slots = ptr::read_volatile(&raw const (*dev).cmd_changed[0]);
                ptr::write_volatile(&raw mut (*dev).cmd_changed[0], slots | (1 << slot));
                let params = ptr::read_volatile(&raw const (*dev).cmd_changed[1 + slot]);
                ptr::write_volatile(&raw mut (*dev).cmd_changed[1 + slot], params | mask);
            }
        }
        Ok(())
    }

    /// [`Hub::read`] addressed by stable uid instead of slot.
    pub fn read_by_uid(
        &self,
        client: Client,
        uid: u64,
        stream: Stream,
        mask: u32,
    ) -> Result<Vec<Value>, ShmError> {
        let slot = self.uid_to_slot(uid)?;
        self.read(client, slot, stream, mask)
    }

    /// [`Hub::write`] addressed by stable uid instead of slot.
    pub fn write_by_uid(
        &self,
        client: Client,
        uid: u64,
        stream: Stream,
        mask: u32,
        values: &[Value],
    ) -> Result<(), ShmError> {
        let slot = self.uid_to_slot(uid)?;
        self.write(client, slot, stream, mask, values)
    }

    // ---- command / subscription bitmaps -------------------------------

    /// Snapshot of the pending-command bitmaps, without consuming them.
    pub fn changed_commands(&self) -> CommandMap {
        let _m = self.cmd_map_sem.lock();
        let dev = self.dev();
        let mut map = CommandMap {
            slots: unsafe { ptr::read_volatile(&raw const (*dev).cmd_changed[0]) },
            params: [0; MAX_DEVICES],
        };
        for slot in 0..MAX_DEVICES {
            map.params[slot] = unsafe { ptr::read_volatile(&raw const (*dev).cmd_changed[1 + slot]) };
        }
        map
    }

    /// Records `client`'s desired DATA parameters for the device `uid`.
    /// The slot's subscription-changed bit is raised only when the mask
    /// actually differs from the lane's previous one.
    pub fn subscribe(&self, client: Client, uid: u64, mask: u32) -> Result<(), ShmError> {
        let lane = client
            .subscription_lane()
            .ok_or(ShmError::NoSubscriptionLane {
                role: client.name(),
            })?;
        let slot = self.uid_to_slot(uid)?;

        let _s = self.sub_map_sem.lock();
        let dev = self.dev();
        unsafe {
            let previous = ptr::read_volatile(&raw const (*dev).sub_masks[lane][slot]);
            if previous != mask {
                ptr::write_volatile(&raw mut (*dev).sub_masks[lane][slot], mask);
                let changed = ptr::read_volatile(&raw const (*dev).sub_changed);
                ptr::write_volatile(&raw mut (*dev).sub_changed, changed | (1 << slot));
            }
        }
        Ok(())
    }

    /// Returns, per slot whose subscriptions changed since the last drain,
    /// the union of every lane's requested mask; clears the indicator.
    pub fn drain_subscriptions(&self) -> Vec<(usize, u32)> {
        let _s = self.sub_map_sem.lock();
        let dev = self.dev();
        let changed = unsafe { ptr::read_volatile(&raw const (*dev).sub_changed) };
        if changed == 0 {
            return Vec::new();
        }
        let mut drained = Vec::new();
        for slot in 0..MAX_DEVICES {
            if changed & (1 << slot) != 0 {
                let mut union = 0;
                for lane in 0..layout::NUM_LANES {
                    union |= unsafe { ptr::read_volatile(&raw const (*dev).sub_masks[lane][slot]) };
                }
                drained.push((slot, union));
            }
        }
        unsafe { ptr::write_volatile(&raw mut (*dev).sub_changed, 0) };
        drained
    }

    // ---- auxiliary region ---------------------------------------------

    pub fn run_mode(&self) -> RunMode {
        let _g = self.run_mode_sem.lock();
        let word = unsafe { ptr::read_volatile(&raw const (*self.aux_region()).run_mode) };
        RunMode::from_word(word)
    }

    pub fn set_run_mode(&self, mode: RunMode) {
        let _g = self.run_mode_sem.lock();
        unsafe { ptr::write_volatile(&raw mut (*self.aux_region()).run_mode, mode as u32) };
    }

    pub fn input(&self, source: InputSource) -> InputSnapshot {
        let _g = self.input_sem.lock();
        unsafe { ptr::read_volatile(&raw const (*self.aux_region()).inputs[source.index()]) }
    }

    pub fn set_input(&self, source: InputSource, snapshot: InputSnapshot) {
        let _g = self.input_sem.lock();
        unsafe {
            ptr::write_volatile(&raw mut (*self.aux_region()).inputs[source.index()], snapshot)
        };
    }

    /// Holds one (slot, stream) lock for `dur`, to make lock granularity
    /// observable from tests.
    #[cfg(test)]
    fn hold_stream_lock(&self, slot: usize, stream: Stream, dur: std::time::Duration) {
        let _g = self.stream_sem(slot, stream).lock();
        std::thread::sleep(dur);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    struct TestHub {
        prefix: String,
        hub: Option<Hub>,
    }

    impl TestHub {
        fn new(tag: &str) -> Self {
            let prefix = format!("lowcar-hub-test-{}-{tag}", std::process::id());
            supervisor::create(&prefix).unwrap();
            let hub = Hub::attach(&prefix).unwrap();
            Self {
                prefix,
                hub: Some(hub),
            }
        }
    }

    impl std::ops::Deref for TestHub {
        type Target = Hub;
        fn deref(&self) -> &Hub {
            self.hub.as_ref().unwrap()
        }
    }

    impl Drop for TestHub {
        fn drop(&mut self) {
            self.hub = None;
            let _ = supervisor::destroy(&self.prefix);
        }
    }

    fn identity(uid: u64) -> DeviceIdentity {
        DeviceIdentity {
            dev_type: 1,
            year: 22,
            uid,
        }
    }

    #[test]
    fn connect_assigns_lowest_free_slot() {
        let hub = TestHub::new("slots");
        assert_eq!(hub.connect(&identity(10)).unwrap(), 0);
        assert_eq!(hub.connect(&identity(11)).unwrap(), 1);
        hub.disconnect(0).unwrap();
        assert_eq!(hub.connect(&identity(12)).unwrap(), 0);
        assert_eq!(hub.catalog(), 0b11);
    }

    #[test]
    fn table_overflows_into_full() {
        let hub = TestHub::new("full");
        for uid in 0..MAX_DEVICES as u64 {
            hub.connect(&identity(uid)).unwrap();
        }
        assert_eq!(hub.connect(&identity(999)), Err(ShmError::Full));
        assert_eq!(hub.catalog().count_ones() as usize, MAX_DEVICES);
    }

    #[test]
    fn reconnect_reads_zeroed_streams() {
        let hub = TestHub::new("zeroed");
        let id = identity(42);
        let slot = hub.connect(&id).unwrap();
        hub.write(Client::DeviceHandler, slot, Stream::Data, 0b1, &[Value::Float(1.5)])
            .unwrap();
        hub.write(Client::Executor, slot, Stream::Command, 0b1, &[Value::Float(2.5)])
            .unwrap();
        hub.disconnect(slot).unwrap();

        let slot = hub.connect(&id).unwrap();
        assert_eq!(
            hub.read(Client::Executor, slot, Stream::Data, 0b1).unwrap(),
            vec![Value::Int(0)]
        );
        assert_eq!(
            hub.read(Client::DeviceHandler, slot, Stream::Command, 0b1)
                .unwrap(),
            vec![Value::Int(0)]
        );
        assert_eq!(hub.changed_commands().slots, 0);
    }

    #[test]
    fn command_bits_set_on_write_cleared_on_handler_read() {
        let hub = TestHub::new("cmdbits");
        let slot = hub.connect(&identity(7)).unwrap();
        hub.write(
            Client::Executor,
            slot,
            Stream::Command,
            0b101,
            &[Value::Int(7), Value::Float(3.5)],
        )
        .unwrap();

        let map = hub.changed_commands();
        assert_eq!(map.slots, 1 << slot);
        assert_eq!(map.params[slot], 0b101);

        // a non-handler COMMAND read must not consume the bits
        hub.read(Client::Executor, slot, Stream::Command, 0b101).unwrap();
        assert_eq!(hub.changed_commands().slots, 1 << slot);

        let values = hub
            .read(Client::DeviceHandler, slot, Stream::Command, 0b101)
            .unwrap();
        assert_eq!(values, vec![Value::Int(7), Value::Float(3.5)]);
        let map = hub.changed_commands();
        assert_eq!(map.slots, 0);
        assert_eq!(map.params[slot], 0);
    }

    #[test]
    fn partial_drain_keeps_slot_bit() {
        let hub = TestHub::new("partial");
        let slot = hub.connect(&identity(8)).unwrap();
        hub.write(
            Client::NetRelay,
            slot,
            Stream::Command,
            0b11,
            &[Value::Int(1), Value::Int(2)],
        )
        .unwrap();
        hub.read(Client::DeviceHandler, slot, Stream::Command, 0b01)
            .unwrap();
        let map = hub.changed_commands();
        assert_eq!(map.slots, 1 << slot);
        assert_eq!(map.params[slot], 0b10);
    }

    #[test]
    fn subscriptions_union_and_change_tracking() {
        let hub = TestHub::new("subs");
        let id = identity(55);
        hub.connect(&id).unwrap();

        hub.subscribe(Client::Executor, id.uid, 0b0011).unwrap();
        hub.subscribe(Client::NetRelay, id.uid, 0b0110).unwrap();
        assert_eq!(hub.drain_subscriptions(), vec![(0, 0b0111)]);
        assert_eq!(hub.drain_subscriptions(), vec![]);

        // resubscribing with the same mask raises nothing
        hub.subscribe(Client::Executor, id.uid, 0b0011).unwrap();
        assert_eq!(hub.drain_subscriptions(), vec![]);

        hub.subscribe(Client::Executor, id.uid, 0b1000).unwrap();
        assert_eq!(hub.drain_subscriptions(), vec![(0, 0b1110)]);

        assert_eq!(
            hub.subscribe(Client::DeviceHandler, id.uid, 0b1),
            Err(ShmError::NoSubscriptionLane {
                role: "device handler"
            })
        );
    }

    #[test]
    fn uid_resolution_follows_connects() {
        let hub = TestHub::new("uid");
        let id = identity(0xDEAD_BEEF);
        assert_eq!(
            hub.uid_to_slot(id.uid),
            Err(ShmError::UnknownUid { uid: id.uid })
        );
        let slot = hub.connect(&id).unwrap();
        assert_eq!(hub.uid_to_slot(id.uid).unwrap(), slot);
        assert_eq!(hub.identifiers(), vec![(slot, id)]);
        hub.disconnect(slot).unwrap();
        assert_eq!(
            hub.uid_to_slot(id.uid),
            Err(ShmError::UnknownUid { uid: id.uid })
        );
    }

    #[test]
    fn slot_and_argument_validation() {
        let hub = TestHub::new("validate");
        assert_eq!(
            hub.read(Client::Executor, MAX_DEVICES, Stream::Data, 0b1),
            Err(ShmError::BadSlot { slot: MAX_DEVICES })
        );
        assert_eq!(
            hub.read(Client::Executor, 3, Stream::Data, 0b1),
            Err(ShmError::EmptySlot { slot: 3 })
        );
        let slot = hub.connect(&identity(1)).unwrap();
        assert_eq!(
            hub.write(Client::Executor, slot, Stream::Command, 0b11, &[Value::Int(1)]),
            Err(ShmError::MaskMismatch {
                expected: 2,
                supplied: 1
            })
        );
        assert_eq!(
            hub.disconnect(5),
            Err(ShmError::EmptySlot { slot: 5 })
        );
    }

    #[test]
    fn different_slots_do_not_contend() {
        let hub = TestHub::new("contend");
        let a = hub.connect(&identity(100)).unwrap();
        let b = hub.connect(&identity(101)).unwrap();

        std::thread::scope(|scope| {
            scope.spawn(|| hub.hold_stream_lock(a, Stream::Data, Duration::from_millis(500)));
            // give the holder time to take the lock
            std::thread::sleep(Duration::from_millis(50));

            let start = Instant::now();
            hub.write(Client::DeviceHandler, b, Stream::Data, 0b1, &[Value::Int(1)])
                .unwrap();
            assert!(start.elapsed() < Duration::from_millis(250));

            // the held slot really is blocked
            let start = Instant::now();
            hub.read(Client::Executor, a, Stream::Data, 0b1).unwrap();
            assert!(start.elapsed() > Duration::from_millis(200));
        });
    }

    #[test]
    fn aux_region_roundtrips() {
        let hub = TestHub::new("aux");
        assert_eq!(hub.run_mode(), RunMode::Idle);
        hub.set_run_mode(RunMode::Teleop);
        assert_eq!(hub.run_mode(), RunMode::Teleop);

        assert_eq!(hub.input(InputSource::Gamepad), InputSnapshot::default());
        let snap = InputSnapshot {
            buttons: 0b1010,
            joysticks: [0.5, -0.5, 0.0, 1.0],
            connected: 1,
        };
        hub.set_input(InputSource::Gamepad, snap);
        assert_eq!(hub.input(InputSource::Gamepad), snap);
        assert_eq!(hub.input(InputSource::Keyboard), InputSnapshot::default());
    }
}
