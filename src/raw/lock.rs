use std::hint;
use std::sync::atomic::{AtomicU32, Ordering};

/// This bit is set in the `state` of a `SlotLock` while a writer holds the lock.
const WRITER: u32 = 1 << 31;

/// This bit is set in the `state` of a `SlotLock` by the reader that won the right
/// to upgrade its read lock. New readers and writers stay out while it is set.
const UPGRADING: u32 = 1 << 30;

/// This bit is set in the `state` of a `SlotLock` just before a thread waits on it.
const PARKED: u32 = 1 << 29;

/// Mask for the number of readers currently holding the lock.
const READERS: u32 = PARKED - 1;

/// Spins on a contended lock before parking the thread.
const SPIN_LIMIT: u32 = 64;

/// A reader/writer lock guarding a single table slot.
///
/// The lock is a single 32-bit word so that it can be embedded next to the slot
/// it protects. Contended threads spin briefly and then wait on the word itself.
///
/// # State table:
///
/// WRITER | UPGRADING | READERS | Description
///   0    |     0     |    0    | Unlocked.
/// -------+-----------+---------+-------------------------------------------------------------
///   0    |     0     |    n    | Held by `n` readers.
/// -------+-----------+---------+-------------------------------------------------------------
///   0    |     1     |   n>0   | One of the `n` readers is upgrading and waits for the other
///        |           |         | `n - 1` readers to leave. No new readers or writers enter.
/// -------+-----------+---------+-------------------------------------------------------------
///   1    |     1     |    0    | Held exclusively by the reader that performed the upgrade.
/// -------+-----------+---------+-------------------------------------------------------------
///   1    |     0     |    0    | Held exclusively by a writer.
///
/// `PARKED` may be set in any state. It is cleared by whoever releases the lock, who then
/// wakes every waiting thread.
#[derive(Default)]
pub struct SlotLock {
    state: AtomicU32,
}

impl SlotLock {
    pub const fn new() -> SlotLock {
        SlotLock {
            state: AtomicU32::new(0),
        }
    }

    /// Acquires a shared lock.
    #[inline]
    pub fn read(&self) {
        let state = self.state.load(Ordering::Relaxed);

        if state & (WRITER | UPGRADING) != 0
            || state & READERS == READERS
            || self
                .state
                .compare_exchange_weak(state, state + 1, Ordering::Acquire, Ordering::Relaxed)
                .is_err()
        {
            self.lock_slow(
                |state| state & (WRITER | UPGRADING) == 0 && state & READERS != READERS,
                |state| state + 1,
            );
        }
    }

    /// Releases a shared lock.
    ///
    /// # Safety
    ///
    /// The current thread must hold a shared lock acquired through `read`.
    #[inline]
    pub unsafe fn read_unlock(&self) {
        let state = self.state.fetch_sub(1, Ordering::Release);
        debug_assert!(state & READERS != 0);

        if state & PARKED != 0 {
            self.wake();
        }
    }

    /// Acquires an exclusive lock.
    #[inline]
    pub fn write(&self) {
        if self
            .state
            .compare_exchange_weak(0, WRITER, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            self.lock_slow(
                |state| state & (WRITER | UPGRADING | READERS) == 0,
                |state| state | WRITER,
            );
        }
    }

    /// Releases an exclusive lock.
    ///
    /// # Safety
    ///
    /// The current thread must hold an exclusive lock acquired through `write`.
    #[inline]
    pub unsafe fn write_unlock(&self) {
        let state = self.state.fetch_and(!WRITER, Ordering::Release);
        debug_assert!(state & WRITER != 0);

        if state & PARKED != 0 {
            self.wake();
        }
    }

    /// Upgrades a shared lock held by the current thread to an exclusive lock.
    ///
    /// Returns `true` if this call performed the upgrade, in which case no other thread
    /// acquired the lock in between. Returns `false` if another reader was already
    /// upgrading. The shared lock is then released and the exclusive lock acquired
    /// normally, so anything observed under the shared lock must be checked again.
    ///
    /// Either way the current thread holds the lock exclusively on return, and must release
    /// it with `upgrade_unlock`, passing the returned value.
    ///
    /// # Safety
    ///
    /// The current thread must hold a shared lock acquired through `read`.
    pub unsafe fn upgrade(&self) -> bool {
        let mut state = self.state.load(Ordering::Relaxed);

        loop {
            debug_assert!(state & WRITER == 0 && state & READERS != 0);

            // Somebody else is upgrading and waits for us to leave.
            if state & UPGRADING != 0 {
                unsafe { self.read_unlock() };
                self.write();
                return false;
            }

            match self.state.compare_exchange_weak(
                state,
                state | UPGRADING,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(found) => state = found,
            }
        }

        // Wait for the remaining readers to drain.
        self.lock_slow(
            |state| state & READERS == 1,
            |state| (state & !READERS) | WRITER,
        );

        true
    }

    /// Releases an exclusive lock acquired through `upgrade`.
    ///
    /// # Safety
    ///
    /// The current thread must hold an exclusive lock acquired through `upgrade`, and
    /// `upgraded` must be the value that call returned.
    #[inline]
    pub unsafe fn upgrade_unlock(&self, upgraded: bool) {
        let mask = if upgraded { WRITER | UPGRADING } else { WRITER };

        let state = self.state.fetch_and(!mask, Ordering::Release);
        debug_assert!(state & mask == mask);

        if state & PARKED != 0 {
            self.wake();
        }
    }

    /// Resets the lock to the unlocked state.
    #[inline]
    pub fn reset(&mut self) {
        *self.state.get_mut() = 0;
    }

    /// Returns `true` if the lock is currently held by anyone.
    #[cfg(test)]
    pub fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) & (WRITER | UPGRADING | READERS) != 0
    }

    #[cold]
    fn lock_slow(&self, can_lock: impl Fn(u32) -> bool, lock: impl Fn(u32) -> u32) {
        let mut spin = 0;
        let mut state = self.state.load(Ordering::Relaxed);

        loop {
            if can_lock(state) {
                match self.state.compare_exchange_weak(
                    state,
                    lock(state),
                    Ordering::Acquire,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => return,
                    Err(found) => state = found,
                }
                continue;
            }

            // Slot locks are held for very short periods, try spinning a few times.
            if spin < SPIN_LIMIT {
                spin += 1;
                hint::spin_loop();
                state = self.state.load(Ordering::Relaxed);
                continue;
            }

            // Set the parked bit.
            if state & PARKED == 0 {
                if let Err(found) = self.state.compare_exchange_weak(
                    state,
                    state | PARKED,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    state = found;
                    continue;
                }
            }

            // Wait until the state changes. The releasing thread clears the parked
            // bit before waking us, so the wait returns immediately if we raced with it.
            atomic_wait::wait(&self.state, state | PARKED);

            spin = 0;
            state = self.state.load(Ordering::Relaxed);
        }
    }

    #[cold]
    fn wake(&self) {
        self.state.fetch_and(!PARKED, Ordering::Relaxed);
        atomic_wait::wake_all(&self.state);
    }
}

/// A shared lock on a slot, released on drop.
pub struct ReadGuard<'a> {
    lock: &'a SlotLock,
}

impl<'a> ReadGuard<'a> {
    #[inline]
    pub fn new(lock: &'a SlotLock) -> ReadGuard<'a> {
        lock.read();
        ReadGuard { lock }
    }

    /// Upgrades to an exclusive lock. See [`SlotLock::upgrade`].
    #[inline]
    pub fn upgrade(self) -> UpgradeGuard<'a> {
        let lock = self.lock;
        std::mem::forget(self);

        // Safety: We held the shared lock.
        let upgraded = unsafe { lock.upgrade() };
        UpgradeGuard { lock, upgraded }
    }
}

impl Drop for ReadGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        // Safety: We hold the shared lock.
        unsafe { self.lock.read_unlock() }
    }
}

/// An exclusive lock on a slot, released on drop.
pub struct WriteGuard<'a> {
    lock: &'a SlotLock,
}

impl<'a> WriteGuard<'a> {
    #[inline]
    pub fn new(lock: &'a SlotLock) -> WriteGuard<'a> {
        lock.write();
        WriteGuard { lock }
    }
}

impl Drop for WriteGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        // Safety: We hold the exclusive lock.
        unsafe { self.lock.write_unlock() }
    }
}

/// An exclusive lock on a slot acquired by upgrading a shared lock, released on drop.
pub struct UpgradeGuard<'a> {
    lock: &'a SlotLock,
    upgraded: bool,
}

impl UpgradeGuard<'_> {
    /// Whether this thread performed the upgrade without releasing its shared lock.
    #[inline]
    pub fn upgraded(&self) -> bool {
        self.upgraded
    }
}

impl Drop for UpgradeGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        // Safety: We hold the exclusive lock acquired by `upgrade`.
        unsafe { self.lock.upgrade_unlock(self.upgraded) }
    }
}
