//! Live process-memory scan engine.
//!
//! Snapshots the process table, then matches the compiled rule set against
//! the readable memory regions of every other process. Processes that exit or
//! refuse access mid-scan are skipped with a tagged reason; only the
//! snapshot itself failing aborts the scan.

use crate::core::config::ScanContext;
use crate::core::error::Result;
use crate::core::types::{MatchRecord, ResultBatch};
use crate::rules::RuleSet;
use crate::scanner::process::{ProcessEnumerator, ProcessInfo};

/// What happened when one process was scanned.
///
/// Distinguishes "scanned clean" from "could not be scanned": a process that
/// exited after the snapshot, or one whose memory is off limits, yields
/// `Skipped` with the reason rather than a silent no-result.
#[derive(Debug)]
pub enum ProcessScanOutcome {
    /// A rule matched somewhere in the process's memory
    Matched(MatchRecord),
    /// Every readable region was scanned and nothing matched
    NoMatch,
    /// The process could not be scanned
    Skipped(String),
}

/// One readable slice of a process's address space.
#[derive(Debug, Clone)]
pub struct MemoryRegion {
    /// Base address of the region
    pub start: u64,
    /// Size of the region in bytes
    pub size: u64,
    /// Whether the region is marked readable
    pub readable: bool,
}

/// Process-memory scan engine.
pub struct ProcessMemoryScanEngine {
    enumerator: ProcessEnumerator,
}

impl Default for ProcessMemoryScanEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessMemoryScanEngine {
    /// Create a new memory scan engine.
    pub fn new() -> Self {
        Self {
            enumerator: ProcessEnumerator::new(),
        }
    }

    /// Scan every running process except this one and return the batch.
    ///
    /// Fails only if the process table cannot be snapshotted at all.
    pub fn scan(&self, rules: &RuleSet, ctx: &ScanContext) -> Result<ResultBatch> {
        let processes = self.enumerator.snapshot()?;
        let own_pid = std::process::id();

        if !ctx.silent {
            log::debug!(
                "Scanning memory of {} processes with {} rule(s)",
                processes.len(),
                rules.len()
            );
        }

        let mut batch = ResultBatch::new();

        for process in &processes {
            if process.pid == own_pid {
                continue;
            }

            match self.scan_process(process, rules, ctx) {
                ProcessScanOutcome::Matched(record) => {
                    if !ctx.silent {
                        log::debug!(
                            "Match: {} in pid {} ({})",
                            record.rule_name(),
                            process.pid,
                            record.subject()
                        );
                    }
                    batch.push(record);
                }
                ProcessScanOutcome::NoMatch => {}
                ProcessScanOutcome::Skipped(reason) => {
                    log::debug!("Skipping pid {}: {}", process.pid, reason);
                }
            }
        }

        Ok(batch)
    }

    /// Match the rule set against one process's readable memory.
    ///
    /// Produces at most one record per process; region iteration stops at
    /// the first matching rule. Individual unreadable regions are passed
    /// over, and only a process whose region table is inaccessible is
    /// skipped.
    pub fn scan_process(
        &self,
        process: &ProcessInfo,
        rules: &RuleSet,
        ctx: &ScanContext,
    ) -> ProcessScanOutcome {
        let regions = match self.regions(process.pid) {
            Ok(regions) => regions,
            Err(reason) => return ProcessScanOutcome::Skipped(reason),
        };

        let max_region_size = ctx.scan.max_region_size_mb * 1024 * 1024;

        for region in &regions {
            if !region.readable || region.size > max_region_size {
                continue;
            }

            let data = match self.read_region(process.pid, region) {
                Ok(data) => data,
                Err(_) => continue,
            };

            if let Some(rule) = rules.first_match(&data) {
                let record = MatchRecord::process(
                    &rule.name,
                    process.display_path(),
                    process.pid,
                    &ctx.hostname,
                );
                return ProcessScanOutcome::Matched(record);
            }
        }

        ProcessScanOutcome::NoMatch
    }

    /// List a process's memory regions.
    fn regions(&self, pid: u32) -> std::result::Result<Vec<MemoryRegion>, String> {
        #[cfg(target_os = "windows")]
        {
            self.regions_windows(pid)
        }

        #[cfg(target_os = "linux")]
        {
            self.regions_linux(pid)
        }

        #[cfg(not(any(target_os = "windows", target_os = "linux")))]
        {
            let _ = pid;
            Err("process memory scanning is not supported on this platform".to_string())
        }
    }

    #[cfg(target_os = "linux")]
    fn regions_linux(&self, pid: u32) -> std::result::Result<Vec<MemoryRegion>, String> {
        let maps = std::fs::read_to_string(format!("/proc/{}/maps", pid))
            .map_err(|e| format!("cannot read memory map: {}", e))?;

        Ok(maps.lines().filter_map(parse_maps_line).collect())
    }

    #[cfg(target_os = "windows")]
    fn regions_windows(&self, pid: u32) -> std::result::Result<Vec<MemoryRegion>, String> {
        use std::mem;
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Memory::{
            VirtualQueryEx, MEMORY_BASIC_INFORMATION, MEM_COMMIT, PAGE_GUARD, PAGE_NOACCESS,
        };
        use windows::Win32::System::Threading::{
            OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_READ,
        };

        let mut regions = Vec::new();

        unsafe {
            let handle = OpenProcess(PROCESS_QUERY_INFORMATION | PROCESS_VM_READ, false, pid)
                .map_err(|e| format!("cannot open process: {}", e))?;

            let mut address: usize = 0;
            let mut mbi: MEMORY_BASIC_INFORMATION = mem::zeroed();

            loop {
                let result = VirtualQueryEx(
                    handle,
                    Some(address as *const std::ffi::c_void),
                    &mut mbi,
                    mem::size_of::<MEMORY_BASIC_INFORMATION>(),
                );

                if result == 0 {
                    break;
                }

                if mbi.State == MEM_COMMIT {
                    let readable = mbi.Protect.0 & PAGE_NOACCESS.0 == 0
                        && mbi.Protect.0 & PAGE_GUARD.0 == 0;

                    regions.push(MemoryRegion {
                        start: mbi.BaseAddress as u64,
                        size: mbi.RegionSize as u64,
                        readable,
                    });
                }

                address = mbi.BaseAddress as usize + mbi.RegionSize;
                if address == 0 {
                    break;
                }
            }

            let _ = CloseHandle(handle);
        }

        Ok(regions)
    }

    /// Read one region's bytes. Short reads are truncated, not errors.
    fn read_region(&self, pid: u32, region: &MemoryRegion) -> std::result::Result<Vec<u8>, String> {
        #[cfg(target_os = "linux")]
        {
            self.read_region_linux(pid, region)
        }

        #[cfg(target_os = "windows")]
        {
            self.read_region_windows(pid, region)
        }

        #[cfg(not(any(target_os = "windows", target_os = "linux")))]
        {
            let _ = (pid, region);
            Err("unsupported platform".to_string())
        }
    }

    #[cfg(target_os = "linux")]
    fn read_region_linux(
        &self,
        pid: u32,
        region: &MemoryRegion,
    ) -> std::result::Result<Vec<u8>, String> {
        use std::io::{Read, Seek, SeekFrom};

        let mut file = std::fs::File::open(format!("/proc/{}/mem", pid))
            .map_err(|e| format!("cannot open process memory: {}", e))?;

        file.seek(SeekFrom::Start(region.start))
            .map_err(|e| format!("cannot seek to region: {}", e))?;

        let mut buffer = vec![0u8; region.size as usize];
        let bytes_read = file.read(&mut buffer).map_err(|e| e.to_string())?;
        buffer.truncate(bytes_read);

        Ok(buffer)
    }

    #[cfg(target_os = "windows")]
    fn read_region_windows(
        &self,
        pid: u32,
        region: &MemoryRegion,
    ) -> std::result::Result<Vec<u8>, String> {
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Diagnostics::Debug::ReadProcessMemory;
        use windows::Win32::System::Threading::{OpenProcess, PROCESS_VM_READ};

        let mut buffer = vec![0u8; region.size as usize];

        unsafe {
            let handle = OpenProcess(PROCESS_VM_READ, false, pid)
                .map_err(|e| format!("cannot open process: {}", e))?;

            let mut bytes_read = 0usize;
            let result = ReadProcessMemory(
                handle,
                region.start as *const std::ffi::c_void,
                buffer.as_mut_ptr() as *mut std::ffi::c_void,
                buffer.len(),
                Some(&mut bytes_read),
            );

            let _ = CloseHandle(handle);

            if result.is_err() {
                return Err("read failed".to_string());
            }

            buffer.truncate(bytes_read);
        }

        Ok(buffer)
    }
}

/// Parse one line of `/proc/[pid]/maps` into a region.
#[cfg(target_os = "linux")]
fn parse_maps_line(line: &str) -> Option<MemoryRegion> {
    let mut parts = line.split_whitespace();

    let range = parts.next()?;
    let (start, end) = range.split_once('-')?;
    let start = u64::from_str_radix(start, 16).ok()?;
    let end = u64::from_str_radix(end, 16).ok()?;

    let perms = parts.next()?;

    Some(MemoryRegion {
        start,
        size: end.saturating_sub(start),
        readable: perms.starts_with('r'),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::compile_ruleset;

    #[cfg(target_os = "linux")]
    #[test]
    fn test_parse_maps_line() {
        let region = parse_maps_line(
            "7f2c4d600000-7f2c4d7a0000 r-xp 00000000 08:01 131132 /usr/lib/libc.so.6",
        )
        .unwrap();

        assert_eq!(region.start, 0x7f2c4d600000);
        assert_eq!(region.size, 0x1a0000);
        assert!(region.readable);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_parse_maps_line_unreadable() {
        let region = parse_maps_line("ffffffffff600000-ffffffffff601000 --xp 00000000 00:00 0 [vsyscall]").unwrap();
        assert!(!region.readable);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_parse_maps_line_garbage() {
        assert!(parse_maps_line("").is_none());
        assert!(parse_maps_line("not a maps line").is_none());
    }

    #[test]
    fn test_nonexistent_process_is_skipped() {
        let engine = ProcessMemoryScanEngine::new();
        let rules =
            compile_ruleset("rule m { strings: $a = \"x\" condition: any of them }").unwrap();
        let ctx = ScanContext::with_hostname("HOST", true);

        // A PID far beyond any real process table
        let ghost = ProcessInfo::new(999_999_999, "ghost");
        let outcome = engine.scan_process(&ghost, &rules, &ctx);

        assert!(matches!(outcome, ProcessScanOutcome::Skipped(_)));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_scan_own_process_finds_planted_marker() {
        let engine = ProcessMemoryScanEngine::new();
        let rules = compile_ruleset(
            "rule planted { strings: $a = \"TRAILSCAN_MEM_MARKER_7f3a\" condition: any of them }",
        )
        .unwrap();
        let ctx = ScanContext::with_hostname("HOST", true);

        // Keep the marker alive on the heap for the duration of the scan
        let marker = String::from("TRAILSCAN_MEM_MARKER_") + "7f3a";

        let own = ProcessInfo::new(std::process::id(), "self").with_path("/proc/self/exe");
        let outcome = engine.scan_process(&own, &rules, &ctx);

        match outcome {
            ProcessScanOutcome::Matched(record) => {
                assert_eq!(record.rule_name(), "planted");
                assert_eq!(record.pid(), Some(std::process::id()));
            }
            // Restricted ptrace scope blocks even self-reads on some kernels
            ProcessScanOutcome::Skipped(_) | ProcessScanOutcome::NoMatch => {}
        }

        drop(marker);
    }
}
