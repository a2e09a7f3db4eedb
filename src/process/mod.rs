//! The target-process interface and the guards that keep it tidy.

#[cfg(windows)]
pub mod windows;

use crate::error::CallError;

/// Page protection requested for a remote allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    ReadWrite,
    ExecuteRead,
    ExecuteReadWrite,
}

/// Operations the engine needs from a target process.
///
/// Every fallible method reports the Win32 last-error code of the failing
/// primitive. `alloc` must return zero-filled memory, which is what freshly
/// committed pages give a real implementation for free.
pub trait RemoteProcess {
    /// Allocates `size` zero-filled bytes with the given protection and
    /// returns the remote base address.
    fn alloc(&self, size: usize, protection: Protection) -> Result<usize, u32>;

    /// Frees a region previously returned by [`RemoteProcess::alloc`].
    fn free(&self, base: usize) -> Result<(), u32>;

    /// Copies `data` into the target at `address`.
    fn write(&self, address: usize, data: &[u8]) -> Result<(), u32>;

    /// Fills `buffer` from the target at `address`.
    fn read(&self, address: usize, buffer: &mut [u8]) -> Result<(), u32>;

    /// Flushes the target's instruction cache over a freshly written range.
    fn flush_instruction_cache(&self, address: usize, size: usize) -> Result<(), u32>;

    /// Starts a remote thread at `entry` and returns an opaque handle value.
    fn create_thread(&self, entry: usize) -> Result<usize, u32>;

    /// Blocks until the thread exits. No timeout.
    fn wait_thread(&self, thread: usize) -> Result<(), u32>;

    /// Releases a thread handle. Infallible by contract; a real handle close
    /// only fails on programmer error.
    fn close_thread(&self, thread: usize);

    /// Resolves `module!symbol` inside the target's own address space.
    fn resolve(&self, module: &str, symbol: &str) -> Result<usize, u32>;
}

/// An owned remote allocation, freed on drop.
///
/// The happy path calls [`RemoteRegion::release`] so a failing free surfaces
/// as an error; every other path frees in `Drop` and logs, since the error
/// already in flight must not be masked.
pub struct RemoteRegion<'p, P: RemoteProcess> {
    process: &'p P,
    base: usize,
    size: usize,
}

impl<'p, P: RemoteProcess> RemoteRegion<'p, P> {
    pub fn alloc(process: &'p P, size: usize, protection: Protection) -> Result<Self, CallError> {
        let base = process
            .alloc(size, protection)
            .map_err(|code| CallError::RemoteAllocation { size, code })?;
        log::trace!("allocated {size} bytes at {base:#x} in the target ({protection:?})");
        Ok(Self { process, base, size })
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Frees the region, surfacing the failure.
    pub fn release(self) -> Result<(), CallError> {
        let process = self.process;
        let base = self.base;
        core::mem::forget(self);
        process
            .free(base)
            .map_err(|code| CallError::RemoteFree { address: base, code })
    }
}

impl<P: RemoteProcess> Drop for RemoteRegion<'_, P> {
    fn drop(&mut self) {
        if let Err(code) = self.process.free(self.base) {
            log::warn!(
                "leaking {} bytes at {:#x} in the target (os error {code})",
                self.size,
                self.base
            );
        }
    }
}

/// An owned remote thread handle, closed on drop.
pub struct RemoteThread<'p, P: RemoteProcess> {
    process: &'p P,
    handle: usize,
}

impl<'p, P: RemoteProcess> RemoteThread<'p, P> {
    pub fn spawn(process: &'p P, entry: usize) -> Result<Self, CallError> {
        let handle = process
            .create_thread(entry)
            .map_err(|code| CallError::ThreadCreation { code })?;
        log::trace!("remote thread started at {entry:#x}");
        Ok(Self { process, handle })
    }

    /// Waits for the thread to run to completion. No timeout: a hung callee
    /// hangs the caller, and killing a remote thread mid-call could leave the
    /// target holding its own locks.
    pub fn wait(&self) -> Result<(), CallError> {
        self.process
            .wait_thread(self.handle)
            .map_err(|code| CallError::ThreadWait { code })
    }
}

impl<P: RemoteProcess> Drop for RemoteThread<'_, P> {
    fn drop(&mut self) {
        self.process.close_thread(self.handle);
    }
}
