//! Process memory - `DataSpaces` over a live process
//!
//! Linux goes through `/proc/<pid>/mem`, Windows through
//! `ReadProcessMemory`/`WriteProcessMemory`. Pattern search is done in
//! software over chunked reads.

use super::{DataSpaces, EngineError};
use crate::core::memory::find_pattern;

/// Bytes scanned per read during a search
const SEARCH_CHUNK: usize = 64 * 1024;

/// Memory of a live process
pub struct ProcessMemory {
    pid: u32,

    #[cfg(target_os = "windows")]
    handle: windows::Win32::Foundation::HANDLE,
}

impl ProcessMemory {
    /// The process this memory belongs to
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl DataSpaces for ProcessMemory {
    fn read(&mut self, address: u64, count: usize) -> Result<Vec<u8>, EngineError> {
        let mut buffer = vec![0u8; count];
        let read = self.read_into(address, &mut buffer)?;
        buffer.truncate(read);
        Ok(buffer)
    }

    fn write(&mut self, address: u64, data: &[u8]) -> Result<usize, EngineError> {
        self.write_from(address, data)
    }

    fn search(
        &mut self,
        pattern: &[u8],
        address: u64,
        count: usize,
        alignment: usize,
    ) -> Result<Option<u64>, EngineError> {
        if pattern.is_empty() {
            return Ok(None);
        }

        let mut offset = 0usize;
        while offset < count {
            // Overlap chunks so a match straddling the boundary is still seen
            let len = (SEARCH_CHUNK + pattern.len() - 1).min(count - offset);
            let chunk = self.read(address + offset as u64, len)?;

            if let Some(pos) = find_pattern(&chunk, pattern, offset, alignment) {
                return Ok(Some(address + (offset + pos) as u64));
            }
            if chunk.len() < len {
                break;
            }
            offset += SEARCH_CHUNK;
        }
        Ok(None)
    }
}

// Linux-specific implementations
#[cfg(target_os = "linux")]
impl ProcessMemory {
    /// Open a process for memory operations
    pub fn open(pid: u32) -> Result<Self, EngineError> {
        let path = Self::mem_path(pid);
        std::fs::metadata(&path)
            .map_err(|e| EngineError::call_failed("open process memory", e))?;
        log::debug!("Opened {}", path);
        Ok(Self { pid })
    }

    fn mem_path(pid: u32) -> String {
        format!("/proc/{}/mem", pid)
    }

    fn read_into(&self, address: u64, buffer: &mut [u8]) -> Result<usize, EngineError> {
        use std::fs::File;
        use std::os::unix::fs::FileExt;

        let file = File::open(Self::mem_path(self.pid))?;
        let mut total = 0;
        while total < buffer.len() {
            match file.read_at(&mut buffer[total..], address + total as u64) {
                Ok(0) => break,
                Ok(n) => total += n,
                // Unmapped page: report what was read so far
                Err(e) if total > 0 || e.raw_os_error() == Some(EIO) => break,
                Err(e) => return Err(EngineError::call_failed("read process memory", e)),
            }
        }
        Ok(total)
    }

    fn write_from(&self, address: u64, data: &[u8]) -> Result<usize, EngineError> {
        use std::fs::OpenOptions;
        use std::os::unix::fs::FileExt;

        let file = OpenOptions::new()
            .write(true)
            .open(Self::mem_path(self.pid))?;
        let mut total = 0;
        while total < data.len() {
            match file.write_at(&data[total..], address + total as u64) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(_) if total > 0 => break,
                Err(e) => return Err(EngineError::call_failed("write process memory", e)),
            }
        }
        Ok(total)
    }
}

#[cfg(target_os = "linux")]
const EIO: i32 = 5;

// Windows-specific implementations
#[cfg(target_os = "windows")]
impl ProcessMemory {
    /// Open a process for memory operations
    pub fn open(pid: u32) -> Result<Self, EngineError> {
        use windows::Win32::System::Threading::{
            OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_OPERATION, PROCESS_VM_READ,
            PROCESS_VM_WRITE,
        };

        let handle = unsafe {
            OpenProcess(
                PROCESS_QUERY_INFORMATION | PROCESS_VM_READ | PROCESS_VM_WRITE | PROCESS_VM_OPERATION,
                false,
                pid,
            )
            .map_err(|e| EngineError::call_failed("OpenProcess", e))?
        };

        log::debug!("Opened process {}", pid);
        Ok(Self { pid, handle })
    }

    fn read_into(&self, address: u64, buffer: &mut [u8]) -> Result<usize, EngineError> {
        use windows::Win32::System::Diagnostics::Debug::ReadProcessMemory;

        let mut bytes_read = 0usize;
        let result = unsafe {
            ReadProcessMemory(
                self.handle,
                address as *const std::ffi::c_void,
                buffer.as_mut_ptr() as *mut std::ffi::c_void,
                buffer.len(),
                Some(&mut bytes_read),
            )
        };

        // A partial copy fails the call but still reports the bytes copied
        match result {
            Ok(()) => Ok(bytes_read),
            Err(_) if bytes_read > 0 => Ok(bytes_read),
            Err(e) => Err(EngineError::call_failed("ReadProcessMemory", e)),
        }
    }

    fn write_from(&self, address: u64, data: &[u8]) -> Result<usize, EngineError> {
        use windows::Win32::System::Diagnostics::Debug::WriteProcessMemory;

        let mut bytes_written = 0usize;
        let result = unsafe {
            WriteProcessMemory(
                self.handle,
                address as *const std::ffi::c_void,
                data.as_ptr() as *const std::ffi::c_void,
                data.len(),
                Some(&mut bytes_written),
            )
        };

        match result {
            Ok(()) => Ok(bytes_written),
            Err(_) if bytes_written > 0 => Ok(bytes_written),
            Err(e) => Err(EngineError::call_failed("WriteProcessMemory", e)),
        }
    }
}

#[cfg(target_os = "windows")]
impl Drop for ProcessMemory {
    fn drop(&mut self) {
        use windows::Win32::Foundation::CloseHandle;

        unsafe {
            let _ = CloseHandle(self.handle);
        }
    }
}
