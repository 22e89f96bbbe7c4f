/*!
 * Remove Lock Token
 *
 * RAII pin on a remove lock. Dropping the token releases its references, so
 * an early return or a panic in the holder can never strand the drain.
 */

use super::lock::Inner;
use crate::core::types::Tag;
use std::fmt;
use std::sync::Arc;

/// Outstanding reference(s) on a [`RemoveLock`](super::RemoveLock)
///
/// Not clonable: each token accounts for exactly the references it acquired.
#[must_use = "dropping the token releases the remove lock immediately"]
pub struct RemoveLockToken {
    issuer: Arc<Inner>,
    count: u64,
    tag: Tag,
    serial: Option<u64>,
    released: bool,
}

impl RemoveLockToken {
    pub(super) fn new(issuer: Arc<Inner>, count: u64, tag: Tag, serial: Option<u64>) -> Self {
        Self {
            issuer,
            count,
            tag,
            serial,
            released: false,
        }
    }

    /// References pinned by this token
    #[inline]
    pub fn count(&self) -> u64 {
        self.count
    }

    #[inline]
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Release the references now
    #[inline]
    pub fn release(mut self) {
        self.release_once();
    }

    #[inline]
    pub(super) fn issuer(&self) -> &Arc<Inner> {
        &self.issuer
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.issuer.release(self.count, self.serial);
        }
    }
}

impl Drop for RemoveLockToken {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl fmt::Debug for RemoveLockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoveLockToken")
            .field("count", &self.count)
            .field("tag", &self.tag)
            .field("tracked", &self.serial.is_some())
            .finish()
    }
}
