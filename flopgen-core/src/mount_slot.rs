//! Process-wide mount slot.
//!
//! The FAT engine keeps a single mounted filesystem per process. A volume must
//! hold a [`MountToken`] while it is mounted; dropping the token frees the slot.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{ImageError, ImageResult};

static SLOT_HELD: AtomicBool = AtomicBool::new(false);

/// Registry for the single mount slot.
pub struct MountSlot;

impl MountSlot {
    /// Take the slot, failing if another volume holds it.
    pub fn acquire() -> ImageResult<MountToken> {
        SLOT_HELD
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ImageError::MountSlotBusy)?;
        Ok(MountToken { _private: () })
    }

    /// True while some volume holds the slot.
    pub fn is_held() -> bool {
        SLOT_HELD.load(Ordering::Acquire)
    }
}

/// Proof of exclusive use of the mount slot.
#[derive(Debug)]
pub struct MountToken {
    _private: (),
}

impl Drop for MountToken {
    fn drop(&mut self) {
        SLOT_HELD.store(false, Ordering::Release);
    }
}
