//! Creation and destruction of the hub's named objects.
//!
//! Exactly one supervisor invocation creates the regions and semaphores
//! before any process attaches, and one destroys them after every process
//! has detached. Attaching processes never create or unlink anything.

use lowcar_protocol::MAX_DEVICES;
use tracing::info;

use crate::ShmError;
use crate::layout::{AUX_REGION_SIZE, DEVICE_REGION_SIZE, Names, Stream};
use crate::region::SharedRegion;
use crate::sem::NamedSem;

/// Creates both shared regions (zero-filled) and every semaphore, all with
/// value 1. Fails with [`ShmError::AlreadyExists`] on leftovers from a
/// previous instance; only objects created by this call are rolled back, so
/// a running instance is never damaged by a stray second `create`.
pub fn create(prefix: &str) -> Result<(), ShmError> {
    let names = Names::new(prefix);
    let mut regions: Vec<String> = Vec::new();
    let mut sems: Vec<String> = Vec::new();
    let result = try_create(&names, &mut regions, &mut sems);
    if result.is_err() {
        for name in &regions {
            let _ = SharedRegion::unlink(name);
        }
        for name in &sems {
            let _ = NamedSem::unlink(name);
        }
    } else {
        info!(prefix, "shared-memory hub created");
    }
    result
}

fn try_create(
    names: &Names,
    regions: &mut Vec<String>,
    sems: &mut Vec<String>,
) -> Result<(), ShmError> {
    let mut region = |name: String, size: usize| -> Result<(), ShmError> {
        // the mapping is dropped immediately; the named object persists
        SharedRegion::create(&name, size)?;
        regions.push(name);
        Ok(())
    };
    region(names.device_region(), DEVICE_REGION_SIZE)?;
    region(names.aux_region(), AUX_REGION_SIZE)?;

    let mut sem = |name: String| -> Result<(), ShmError> {
        NamedSem::create(&name)?;
        sems.push(name);
        Ok(())
    };
    sem(names.catalog_sem())?;
    sem(names.cmd_map_sem())?;
    sem(names.sub_map_sem())?;
    sem(names.run_mode_sem())?;
    sem(names.input_sem())?;
    for slot in 0..MAX_DEVICES {
        sem(names.stream_sem(slot, Stream::Data))?;
        sem(names.stream_sem(slot, Stream::Command))?;
    }
    Ok(())
}

/// Unlinks every named object of the instance. Objects that never existed
/// or are already gone are skipped, so `destroy` is safe to rerun.
pub fn destroy(prefix: &str) -> Result<(), ShmError> {
    let names = Names::new(prefix);
    let mut first_err = None;
    let mut record = |r: Result<(), ShmError>| {
        if let Err(e) = r
            && first_err.is_none()
        {
            first_err = Some(e);
        }
    };

    record(SharedRegion::unlink(&names.device_region()));
    record(SharedRegion::unlink(&names.aux_region()));
    record(NamedSem::unlink(&names.catalog_sem()));
    record(NamedSem::unlink(&names.cmd_map_sem()));
    record(NamedSem::unlink(&names.sub_map_sem()));
    record(NamedSem::unlink(&names.run_mode_sem()));
    record(NamedSem::unlink(&names.input_sem()));
    for slot in 0..MAX_DEVICES {
        record(NamedSem::unlink(&names.stream_sem(slot, Stream::Data)));
        record(NamedSem::unlink(&names.stream_sem(slot, Stream::Command)));
    }

    match first_err {
        None => {
            info!(prefix, "shared-memory hub destroyed");
            Ok(())
        }
        Some(e) => Err(e),
    }
}
