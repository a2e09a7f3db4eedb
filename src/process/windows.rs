//! Win32-backed implementation of the process interface.

use core::mem::{size_of, MaybeUninit};

use winapi::shared::minwindef::{DWORD, FALSE};
use winapi::shared::winerror::{ERROR_MOD_NOT_FOUND, ERROR_PROC_NOT_FOUND};
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
use winapi::um::memoryapi::{ReadProcessMemory, VirtualAllocEx, VirtualFreeEx, WriteProcessMemory};
use winapi::um::minwinbase::LPTHREAD_START_ROUTINE;
use winapi::um::processthreadsapi::{CreateRemoteThread, FlushInstructionCache, OpenProcess};
use winapi::um::synchapi::WaitForSingleObject;
use winapi::um::tlhelp32::{
    CreateToolhelp32Snapshot, Module32FirstW, Module32NextW, MODULEENTRY32W, TH32CS_SNAPMODULE,
    TH32CS_SNAPMODULE32,
};
use winapi::um::winbase::{INFINITE, WAIT_OBJECT_0};
use winapi::um::winnt::{
    HANDLE, IMAGE_DIRECTORY_ENTRY_EXPORT, IMAGE_DOS_HEADER, IMAGE_DOS_SIGNATURE,
    IMAGE_EXPORT_DIRECTORY, IMAGE_NT_HEADERS, IMAGE_NT_SIGNATURE, MEM_COMMIT, MEM_RELEASE,
    MEM_RESERVE, PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE, PAGE_READWRITE, PROCESS_CREATE_THREAD,
    PROCESS_QUERY_INFORMATION, PROCESS_VM_OPERATION, PROCESS_VM_READ, PROCESS_VM_WRITE,
};

use super::{Protection, RemoteProcess};

fn last_os_error() -> u32 {
    unsafe { GetLastError() }
}

/// An owned handle to a target process.
pub struct WindowsProcess {
    handle: HANDLE,
    pid: u32,
}

// Process handles are usable from any thread.
unsafe impl Send for WindowsProcess {}
unsafe impl Sync for WindowsProcess {}

impl WindowsProcess {
    /// Opens `pid` with the access rights the engine needs.
    pub fn open(pid: u32) -> Result<Self, u32> {
        let access = PROCESS_CREATE_THREAD
            | PROCESS_QUERY_INFORMATION
            | PROCESS_VM_OPERATION
            | PROCESS_VM_READ
            | PROCESS_VM_WRITE;
        let handle = unsafe { OpenProcess(access, FALSE, pid) };
        if handle.is_null() {
            return Err(last_os_error());
        }
        log::trace!("opened process {pid}");
        Ok(Self { handle, pid })
    }

    /// Wraps an already opened handle; the handle is closed on drop.
    ///
    /// # Safety
    /// `handle` must be a valid process handle for `pid` with at least the
    /// rights [`WindowsProcess::open`] requests, and must not be closed by
    /// anyone else.
    pub unsafe fn from_handle(handle: HANDLE, pid: u32) -> Self {
        Self { handle, pid }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Base address of `module` in the target, via a toolhelp snapshot.
    fn module_base(&self, module: &str) -> Result<usize, u32> {
        let snapshot =
            unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, self.pid) };
        if snapshot == INVALID_HANDLE_VALUE {
            return Err(last_os_error());
        }

        let wanted = module.to_ascii_lowercase();
        let mut base = None;
        let mut entry: MODULEENTRY32W = unsafe { MaybeUninit::zeroed().assume_init() };
        entry.dwSize = size_of::<MODULEENTRY32W>() as DWORD;
        let mut more = unsafe { Module32FirstW(snapshot, &mut entry) };
        while more != 0 {
            let len = entry
                .szModule
                .iter()
                .position(|&c| c == 0)
                .unwrap_or(entry.szModule.len());
            let name = String::from_utf16_lossy(&entry.szModule[..len]).to_ascii_lowercase();
            if name == wanted {
                base = Some(entry.modBaseAddr as usize);
                break;
            }
            more = unsafe { Module32NextW(snapshot, &mut entry) };
        }
        unsafe { CloseHandle(snapshot) };

        base.ok_or(ERROR_MOD_NOT_FOUND)
    }

    /// Walks the module's export directory through the target's memory.
    fn export_address(&self, base: usize, symbol: &str) -> Result<usize, u32> {
        let dos: IMAGE_DOS_HEADER = self.read_value(base)?;
        if dos.e_magic != IMAGE_DOS_SIGNATURE {
            return Err(ERROR_MOD_NOT_FOUND);
        }
        let nt: IMAGE_NT_HEADERS = self.read_value(base + dos.e_lfanew as usize)?;
        if nt.Signature != IMAGE_NT_SIGNATURE {
            return Err(ERROR_MOD_NOT_FOUND);
        }

        let directory = nt.OptionalHeader.DataDirectory[IMAGE_DIRECTORY_ENTRY_EXPORT as usize];
        if directory.VirtualAddress == 0 {
            return Err(ERROR_PROC_NOT_FOUND);
        }
        let exports: IMAGE_EXPORT_DIRECTORY =
            self.read_value(base + directory.VirtualAddress as usize)?;

        let names = base + exports.AddressOfNames as usize;
        let ordinals = base + exports.AddressOfNameOrdinals as usize;
        let functions = base + exports.AddressOfFunctions as usize;
        for index in 0..exports.NumberOfNames as usize {
            let name_rva: u32 = self.read_value(names + 4 * index)?;
            if self.read_name(base + name_rva as usize)? != symbol {
                continue;
            }
            let ordinal: u16 = self.read_value(ordinals + 2 * index)?;
            let rva: u32 = self.read_value(functions + 4 * ordinal as usize)?;

            // An RVA inside the export directory is a forwarder string;
            // following those is not supported.
            let start = directory.VirtualAddress;
            if rva >= start && rva < start + directory.Size {
                return Err(ERROR_PROC_NOT_FOUND);
            }
            return Ok(base + rva as usize);
        }

        Err(ERROR_PROC_NOT_FOUND)
    }

    fn read_value<T: Copy>(&self, address: usize) -> Result<T, u32> {
        let mut buffer = vec![0u8; size_of::<T>()];
        RemoteProcess::read(self, address, &mut buffer)?;
        Ok(unsafe { core::ptr::read_unaligned(buffer.as_ptr().cast::<T>()) })
    }

    /// Reads a nul-terminated export name in small chunks so the read never
    /// strays far past the string.
    fn read_name(&self, address: usize) -> Result<String, u32> {
        let mut name = Vec::new();
        let mut chunk = [0u8; 16];
        while name.len() < 256 {
            RemoteProcess::read(self, address + name.len(), &mut chunk)?;
            if let Some(end) = chunk.iter().position(|&byte| byte == 0) {
                name.extend_from_slice(&chunk[..end]);
                return Ok(String::from_utf8_lossy(&name).into_owned());
            }
            name.extend_from_slice(&chunk);
        }
        Err(ERROR_PROC_NOT_FOUND)
    }
}

impl RemoteProcess for WindowsProcess {
    fn alloc(&self, size: usize, protection: Protection) -> Result<usize, u32> {
        let protect = match protection {
            Protection::ReadWrite => PAGE_READWRITE,
            Protection::ExecuteRead => PAGE_EXECUTE_READ,
            Protection::ExecuteReadWrite => PAGE_EXECUTE_READWRITE,
        };
        let base = unsafe {
            VirtualAllocEx(
                self.handle,
                core::ptr::null_mut(),
                size,
                MEM_COMMIT | MEM_RESERVE,
                protect,
            )
        };
        if base.is_null() {
            return Err(last_os_error());
        }
        Ok(base as usize)
    }

    fn free(&self, base: usize) -> Result<(), u32> {
        let ok = unsafe { VirtualFreeEx(self.handle, base as _, 0, MEM_RELEASE) };
        if ok == 0 {
            return Err(last_os_error());
        }
        Ok(())
    }

    fn write(&self, address: usize, data: &[u8]) -> Result<(), u32> {
        let mut written = 0;
        let ok = unsafe {
            WriteProcessMemory(
                self.handle,
                address as _,
                data.as_ptr() as _,
                data.len(),
                &mut written,
            )
        };
        if ok == 0 || written != data.len() {
            return Err(last_os_error());
        }
        Ok(())
    }

    fn read(&self, address: usize, buffer: &mut [u8]) -> Result<(), u32> {
        let mut read = 0;
        let ok = unsafe {
            ReadProcessMemory(
                self.handle,
                address as _,
                buffer.as_mut_ptr() as _,
                buffer.len(),
                &mut read,
            )
        };
        if ok == 0 || read != buffer.len() {
            return Err(last_os_error());
        }
        Ok(())
    }

    fn flush_instruction_cache(&self, address: usize, size: usize) -> Result<(), u32> {
        let ok = unsafe { FlushInstructionCache(self.handle, address as _, size) };
        if ok == 0 {
            return Err(last_os_error());
        }
        Ok(())
    }

    fn create_thread(&self, entry: usize) -> Result<usize, u32> {
        let start: LPTHREAD_START_ROUTINE = unsafe { core::mem::transmute(entry) };
        let handle = unsafe {
            CreateRemoteThread(
                self.handle,
                core::ptr::null_mut(),
                0,
                start,
                core::ptr::null_mut(),
                0,
                core::ptr::null_mut(),
            )
        };
        if handle.is_null() {
            return Err(last_os_error());
        }
        Ok(handle as usize)
    }

    fn wait_thread(&self, thread: usize) -> Result<(), u32> {
        match unsafe { WaitForSingleObject(thread as HANDLE, INFINITE) } {
            WAIT_OBJECT_0 => Ok(()),
            _ => Err(last_os_error()),
        }
    }

    fn close_thread(&self, thread: usize) {
        unsafe { CloseHandle(thread as HANDLE) };
    }

    fn resolve(&self, module: &str, symbol: &str) -> Result<usize, u32> {
        let base = self.module_base(module)?;
        let address = self.export_address(base, symbol)?;
        log::trace!("resolved {module}!{symbol} to {address:#x} in process {}", self.pid);
        Ok(address)
    }
}

impl Drop for WindowsProcess {
    fn drop(&mut self) {
        unsafe { CloseHandle(self.handle) };
    }
}
