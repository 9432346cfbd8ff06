//! Running-process enumeration.
//!
//! Produces a point-in-time snapshot of the process table. The snapshot is a
//! consistency boundary, not a guarantee: any listed process may exit before
//! its memory is read, and the memory engine treats that as a routine skip.

use std::path::PathBuf;

use crate::core::error::Result;

/// One process from a snapshot.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    /// Process ID
    pub pid: u32,
    /// Short process name
    pub name: String,
    /// Full path to the executable, when resolvable
    pub path: Option<PathBuf>,
}

impl ProcessInfo {
    /// Create a new process entry.
    pub fn new(pid: u32, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
            path: None,
        }
    }

    /// Set the executable path.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// The value reported for this process: the executable path when known,
    /// otherwise the short name.
    pub fn display_path(&self) -> String {
        match &self.path {
            Some(p) => p.display().to_string(),
            None => self.name.clone(),
        }
    }
}

/// Process table snapshotter.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnumerator;

impl ProcessEnumerator {
    /// Create a new enumerator.
    pub fn new() -> Self {
        Self
    }

    /// Snapshot all running processes, including the current one.
    ///
    /// A failure here is fatal to a memory scan: with no process list there
    /// is nothing to iterate.
    pub fn snapshot(&self) -> Result<Vec<ProcessInfo>> {
        #[cfg(target_os = "windows")]
        {
            self.snapshot_windows()
        }

        #[cfg(target_os = "linux")]
        {
            self.snapshot_linux()
        }

        #[cfg(not(any(target_os = "windows", target_os = "linux")))]
        {
            Ok(Vec::new())
        }
    }

    #[cfg(target_os = "windows")]
    fn snapshot_windows(&self) -> Result<Vec<ProcessInfo>> {
        use std::ffi::OsString;
        use std::mem;
        use std::os::windows::ffi::OsStringExt;
        use windows::core::PWSTR;
        use windows::Win32::Foundation::{CloseHandle, MAX_PATH};
        use windows::Win32::System::Diagnostics::ToolHelp::{
            CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W,
            TH32CS_SNAPPROCESS,
        };
        use windows::Win32::System::Threading::{
            OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
            PROCESS_QUERY_LIMITED_INFORMATION,
        };

        let mut processes = Vec::new();

        unsafe {
            let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0).map_err(|e| {
                crate::core::error::Error::ProcessEnumeration(format!(
                    "Failed to create snapshot: {}",
                    e
                ))
            })?;

            let mut entry: PROCESSENTRY32W = mem::zeroed();
            entry.dwSize = mem::size_of::<PROCESSENTRY32W>() as u32;

            if Process32FirstW(snapshot, &mut entry).is_ok() {
                loop {
                    let pid = entry.th32ProcessID;

                    let name_len = entry
                        .szExeFile
                        .iter()
                        .position(|&c| c == 0)
                        .unwrap_or(entry.szExeFile.len());
                    let name = OsString::from_wide(&entry.szExeFile[..name_len])
                        .to_string_lossy()
                        .to_string();

                    let mut info = ProcessInfo::new(pid, name);

                    if let Ok(handle) = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) {
                        let mut buffer = [0u16; MAX_PATH as usize];
                        let mut size = buffer.len() as u32;

                        if QueryFullProcessImageNameW(
                            handle,
                            PROCESS_NAME_WIN32,
                            PWSTR::from_raw(buffer.as_mut_ptr()),
                            &mut size,
                        )
                        .is_ok()
                        {
                            let path = OsString::from_wide(&buffer[..size as usize])
                                .to_string_lossy()
                                .to_string();
                            info.path = Some(PathBuf::from(path));
                        }

                        let _ = CloseHandle(handle);
                    }

                    processes.push(info);

                    if Process32NextW(snapshot, &mut entry).is_err() {
                        break;
                    }
                }
            }

            let _ = CloseHandle(snapshot);
        }

        Ok(processes)
    }

    #[cfg(target_os = "linux")]
    fn snapshot_linux(&self) -> Result<Vec<ProcessInfo>> {
        use std::fs;

        let mut processes = Vec::new();

        let entries = fs::read_dir("/proc").map_err(|e| {
            crate::core::error::Error::ProcessEnumeration(format!("Failed to read /proc: {}", e))
        })?;

        for entry in entries.filter_map(|e| e.ok()) {
            let file_name = entry.file_name();
            if let Ok(pid) = file_name.to_string_lossy().parse::<u32>() {
                // Processes may exit between readdir and here
                if let Some(info) = Self::read_proc_entry(pid) {
                    processes.push(info);
                }
            }
        }

        Ok(processes)
    }

    #[cfg(target_os = "linux")]
    fn read_proc_entry(pid: u32) -> Option<ProcessInfo> {
        use std::fs;

        let name = fs::read_to_string(format!("/proc/{}/comm", pid))
            .ok()
            .map(|s| s.trim().to_string())?;

        let mut info = ProcessInfo::new(pid, name);

        if let Ok(exe_path) = fs::read_link(format!("/proc/{}/exe", pid)) {
            info.path = Some(exe_path);
        }

        Some(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_info_display_path() {
        let info = ProcessInfo::new(1234, "sshd").with_path("/usr/sbin/sshd");
        assert_eq!(info.display_path(), "/usr/sbin/sshd");

        let pathless = ProcessInfo::new(2, "kthreadd");
        assert_eq!(pathless.display_path(), "kthreadd");
    }

    #[test]
    fn test_snapshot_includes_current_process() {
        let processes = ProcessEnumerator::new().snapshot().unwrap();
        assert!(!processes.is_empty());

        let current_pid = std::process::id();
        assert!(
            processes.iter().any(|p| p.pid == current_pid),
            "snapshot should list the current process"
        );
    }
}
