//! Leak-tracking allocator.
//!
//! Wraps another allocator and records every live block together with the
//! call site that requested it. Releasing a block it never handed out (a
//! double free or a foreign pointer) is a contract violation. Whatever is
//! still live when the last handle goes away is reported through the logger.
//!
//! This is a diagnostic aid: it surfaces leaks, it does not prevent them.

use crate::allocator::{Allocator, AllocatorStats};
use crate::block::Block;
use crate::contract_violation;
use crate::error::Result;
use hashbrown::HashMap;
use std::fmt;
use std::panic::Location;

/// Metadata kept for one live allocation.
#[derive(Debug, Clone)]
struct LeakRecord {
    size: usize,
    align: usize,
    location: &'static Location<'static>,
    #[cfg(feature = "leak-backtrace")]
    backtrace: backtrace::Backtrace,
}

/// One allocation that was still live when a report was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeakEntry {
    /// Address of the block.
    pub address: usize,
    /// Size of the block in bytes.
    pub size: usize,
    /// Alignment of the block.
    pub align: usize,
    /// Source location that requested the block.
    pub location: &'static Location<'static>,
    /// Rendered backtrace (only with the `leak-backtrace` feature).
    pub backtrace: Option<String>,
}

/// Snapshot of the allocations a leak tracker still considers live.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeakReport {
    /// Number of live allocations.
    pub count: usize,
    /// Total bytes of the live allocations.
    pub bytes: usize,
    /// The allocations themselves, ordered by address.
    pub entries: Vec<LeakEntry>,
}

impl LeakReport {
    /// True when nothing is live.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.count == 0
    }
}

impl fmt::Display for LeakReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} leaked allocation(s), {} bytes", self.count, self.bytes)?;
        for entry in &self.entries {
            write!(
                f,
                "\n  {:#x}: {} bytes allocated at {}",
                entry.address, entry.size, entry.location
            )?;
            if let Some(backtrace) = &entry.backtrace {
                write!(f, "\n{backtrace}")?;
            }
        }
        Ok(())
    }
}

pub(crate) struct LeakAllocator {
    inner: Allocator,
    live: HashMap<usize, LeakRecord>,
    bytes: usize,
    highwater: usize,
}

impl LeakAllocator {
    pub(crate) fn new(inner: Allocator) -> Self {
        LeakAllocator {
            inner,
            live: HashMap::new(),
            bytes: 0,
            highwater: 0,
        }
    }

    fn track(&mut self, block: &Block, location: &'static Location<'static>) {
        if block.is_empty() {
            return;
        }
        self.live.insert(
            block.addr(),
            LeakRecord {
                size: block.size(),
                align: block.align(),
                location,
                #[cfg(feature = "leak-backtrace")]
                backtrace: backtrace::Backtrace::new_unresolved(),
            },
        );
        self.bytes += block.size();
        self.highwater = self.highwater.max(self.bytes);
    }

    fn untrack(&mut self, block: &Block) -> LeakRecord {
        let Some(record) = self.live.remove(&block.addr()) else {
            contract_violation!(
                "leak tracker: release of untracked block {:#x} ({} bytes); double free or foreign pointer",
                block.addr(),
                block.size()
            );
        };
        self.bytes -= record.size;
        record
    }

    pub(crate) fn allocate(
        &mut self,
        size: usize,
        align: usize,
        location: &'static Location<'static>,
    ) -> Result<Block> {
        let block = self.inner.allocate(size, align)?;
        self.track(&block, location);
        Ok(block)
    }

    pub(crate) fn resize(&mut self, block: Block, new_size: usize) -> Result<Block> {
        let record = self.untrack(&block);
        // SAFETY: The block is tracked, so it came from `inner`.
        match unsafe { self.inner.resize(block, new_size) } {
            Ok(resized) => {
                self.track(&resized, record.location);
                Ok(resized)
            }
            Err(err) => {
                self.bytes += record.size;
                self.live.insert(block.addr(), record);
                Err(err)
            }
        }
    }

    pub(crate) fn release(&mut self, block: Block) {
        self.untrack(&block);
        // SAFETY: The block was tracked, so it came from `inner` and is live.
        unsafe { self.inner.release(block) };
    }

    pub(crate) fn release_all(&mut self) {
        self.live.clear();
        self.bytes = 0;
        // SAFETY: Forwarded from the caller's release_all contract.
        unsafe { self.inner.release_all() };
    }

    pub(crate) fn report(&self) -> LeakReport {
        let mut entries: Vec<LeakEntry> = self
            .live
            .iter()
            .map(|(&address, record)| LeakEntry {
                address,
                size: record.size,
                align: record.align,
                location: record.location,
                backtrace: render_backtrace(record),
            })
            .collect();
        entries.sort_unstable_by_key(|e| e.address);

        LeakReport {
            count: entries.len(),
            bytes: self.bytes,
            entries,
        }
    }

    pub(crate) fn stats(&self) -> AllocatorStats {
        AllocatorStats {
            used: self.bytes,
            highwater: self.highwater,
            reserved: self.bytes,
            chunks: 0,
            live_allocations: self.live.len(),
        }
    }
}

#[cfg(feature = "leak-backtrace")]
fn render_backtrace(record: &LeakRecord) -> Option<String> {
    let mut backtrace = record.backtrace.clone();
    backtrace.resolve();
    Some(format!("{backtrace:?}"))
}

#[cfg(not(feature = "leak-backtrace"))]
fn render_backtrace(_record: &LeakRecord) -> Option<String> {
    None
}

impl Drop for LeakAllocator {
    fn drop(&mut self) {
        if self.live.is_empty() {
            return;
        }
        cairn_log::error!("{}", self.report());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[track_caller]
    fn here() -> &'static Location<'static> {
        Location::caller()
    }

    #[test]
    fn test_leak_tracker_reports_unreleased() {
        let mut leak = LeakAllocator::new(Allocator::clib());
        let a = leak.allocate(8, 8, here()).unwrap();
        let b = leak.allocate(16, 8, here()).unwrap();
        let c = leak.allocate(24, 8, here()).unwrap();

        leak.release(a);
        leak.release(c);

        let report = leak.report();
        assert_eq!(report.count, 1);
        assert_eq!(report.bytes, 16);
        assert_eq!(report.entries[0].address, b.addr());
        assert_eq!(report.entries[0].location.file(), file!());

        leak.release(b);
        assert!(leak.report().is_clean());
    }

    #[test]
    fn test_leak_tracker_follows_resize() {
        let mut leak = LeakAllocator::new(Allocator::clib());
        let a = leak.allocate(8, 8, here()).unwrap();
        let grown = leak.resize(a, 4096).unwrap();

        let report = leak.report();
        assert_eq!(report.count, 1);
        assert_eq!(report.bytes, 4096);
        assert_eq!(report.entries[0].address, grown.addr());

        leak.release(grown);
        assert_eq!(leak.stats().highwater, 4096);
    }

    #[test]
    #[should_panic(expected = "double free or foreign pointer")]
    fn test_leak_tracker_double_free_is_violation() {
        let mut leak = LeakAllocator::new(Allocator::clib());
        let a = leak.allocate(8, 8, here()).unwrap();
        leak.release(a);
        leak.release(a);
    }

    #[test]
    fn test_leak_report_display() {
        let mut leak = LeakAllocator::new(Allocator::clib());
        let a = leak.allocate(32, 8, here()).unwrap();
        let text = leak.report().to_string();
        assert!(text.starts_with("1 leaked allocation(s), 32 bytes"));
        assert!(text.contains("32 bytes allocated at"));
        leak.release(a);
    }
}
