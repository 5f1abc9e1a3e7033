use lowcar_protocol::MAX_DEVICES;
use thiserror::Error;

/// Errors from the shared-memory hub.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShmError {
    /// A named object the attach path requires does not exist. The
    /// supervisor has not run, or ran with a different prefix.
    #[error("shared object {name} does not exist (supervisor not started?)")]
    Missing { name: String },

    /// The supervisor found leftovers from a previous instance.
    #[error("shared object {name} already exists (stale instance? run destroy first)")]
    AlreadyExists { name: String },

    /// An OS call on a named object failed.
    #[error("{op} on {name} failed: {errno}")]
    Os {
        op: &'static str,
        name: String,
        errno: nix::errno::Errno,
    },

    /// All device slots are occupied.
    #[error("device table is full ({MAX_DEVICES} slots)")]
    Full,

    /// Slot index outside `0..MAX_DEVICES`.
    #[error("slot {slot} out of range")]
    BadSlot { slot: usize },

    /// The slot's catalog bit is clear.
    #[error("no device connected at slot {slot}")]
    EmptySlot { slot: usize },

    /// No connected device carries this uid.
    #[error("no device with uid {uid:#018x} is connected")]
    UnknownUid { uid: u64 },

    /// A stored value cell carries a tag no writer produces.
    #[error("corrupt value cell at slot {slot} param {param}")]
    CorruptCell { slot: usize, param: usize },

    /// The mask selects more values than the caller supplied, or vice versa.
    #[error("mask selects {expected} parameters but {supplied} values were supplied")]
    MaskMismatch { expected: usize, supplied: usize },

    /// This caller role has no subscription lane.
    #[error("{role} cannot register data subscriptions")]
    NoSubscriptionLane { role: &'static str },
}
