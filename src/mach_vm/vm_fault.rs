//! Page-fault handler.
//!
//! Translates a faulting virtual address plus an access cause into an
//! installed page-table entry, driven by `vmmap` lookup and the mobj
//! page-frame protocol. §4.E.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::mach_vm::pmap;
use crate::mach_vm::vm_map::{user_mem_high_page, user_mem_low_page, VmMap, VmProt};
use crate::mach_vm::vm_page::PAGE_SHIFT;

/// Fault cause bitmask (bit-exact with the spec's `{USER, WRITE, EXEC}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultCause(u32);

impl FaultCause {
    pub const USER: Self = Self(0x1);
    pub const WRITE: Self = Self(0x2);
    pub const EXEC: Self = Self(0x4);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl core::ops::BitOr for FaultCause {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Why a fault could not be resolved. Every variant corresponds to a step
/// in §4.E that ends in "terminate process with segfault" rather than an
/// installed PTE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultError {
    /// `vaddr` outside `[USER_MEM_LOW, USER_MEM_HIGH)`.
    OutOfRange,
    /// No vma covers the faulting page.
	NoVma,
    /// The access cause isn't permitted by the vma's protection bits.
    ProtectionViolation,
    /// The mobj couldn't produce a pframe (out of memory).
    NoMemory,
}

/// Fault-handling counters, in the teacher's plain-atomics idiom.
#[derive(Debug, Default)]
pub struct FaultStats {
    pub resolved: AtomicU64,
    pub segfaults: AtomicU64,
    pub cow_faults: AtomicU64,
}

impl FaultStats {
    pub const fn new() -> Self {
        Self {
            resolved: AtomicU64::new(0),
            segfaults: AtomicU64::new(0),
            cow_faults: AtomicU64::new(0),
        }
    }
}

static FAULT_STATS: FaultStats = FaultStats::new();

pub fn fault_stats() -> &'static FaultStats {
    &FAULT_STATS
}

/// Resolve a page fault against `map` at `vaddr` for the given `cause`.
///
/// Implements §4.E's seven steps. The pdflags-always-WRITE nuance the spec
/// describes (so hardware COW retriggers on a later write to a read-faulted
/// page) collapses here into a single `pt_map` call whose protection is
/// exactly the access that was permitted: `forwrite` controls the PTE's
/// write bit directly, since this port's `Pmap::enter` has no separate
/// pd-level/pt-level flag split to exploit.
pub fn handle_pagefault(map: &VmMap, vaddr: u64, cause: FaultCause) -> Result<(), FaultError> {
    // Step 1: bounds check.
    let page = vaddr >> PAGE_SHIFT;
    if page < user_mem_low_page() || page >= user_mem_high_page() {
        FAULT_STATS.segfaults.fetch_add(1, Ordering::Relaxed);
        return Err(FaultError::OutOfRange);
    }

    // Step 2: vmmap lookup.
    let vma = match map.lookup(page) {
        Some(v) => v,
        None => {
            FAULT_STATS.segfaults.fetch_add(1, Ordering::Relaxed);
            return Err(FaultError::NoVma);
        }
    };

    // Step 3: protection check.
    let ok = if cause.contains(FaultCause::WRITE) {
        vma.prot.contains(VmProt::WRITE)
    } else if cause.contains(FaultCause::EXEC) {
        vma.prot.contains(VmProt::EXECUTE)
    } else {
        vma.prot.contains(VmProt::READ)
    };
    if !ok {
        FAULT_STATS.segfaults.fetch_add(1, Ordering::Relaxed);
        return Err(FaultError::ProtectionViolation);
    }

    // Step 4/5: fetch (or materialize) the backing pframe.
    let forwrite = cause.contains(FaultCause::WRITE);
    let pagenum_in_obj = vma.vma_off + (page - vma.vma_start);
    let phys = vma
        .vma_obj
        .get_pframe(pagenum_in_obj as u32, forwrite)
        .map_err(|_| {
            FAULT_STATS.segfaults.fetch_add(1, Ordering::Relaxed);
            FaultError::NoMemory
        })?;

    // Step 6: install the translation.
    let page_prot = if forwrite {
        VmProt::READ | VmProt::WRITE
    } else {
        VmProt::READ
    };
    let page_prot = if vma.prot.contains(VmProt::EXECUTE) {
        page_prot | VmProt::EXECUTE
    } else {
        page_prot
    };
    let page_addr = page << PAGE_SHIFT;
    let _ = pmap::pt_map(page_addr, phys, page_prot);

    // Step 7: flush the single stale translation.
    pmap::tlb_flush(page_addr);

    FAULT_STATS.resolved.fetch_add(1, Ordering::Relaxed);
    if forwrite && vma.vma_obj.kind == crate::mach_vm::vm_object::MobjKind::Shadow {
        FAULT_STATS.cow_faults.fetch_add(1, Ordering::Relaxed);
    }
    Ok(())
}

/// Convenience wrapper taking an `Arc<VmMap>`, for callers (e.g. the trap
/// dispatcher) that only hold the process's shared map handle.
pub fn handle_pagefault_arc(
    map: &Arc<VmMap>,
    vaddr: u64,
    cause: FaultCause,
) -> Result<(), FaultError> {
    handle_pagefault(map, vaddr, cause)
}

pub fn init() {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mach_vm::vm_map::{user_mem_low_page, VmArea, VmAreaFlags, VmMap};
    use crate::mach_vm::vm_object::anon_create;
    use crate::mach_vm::vm_page;

    fn init_test_pages() {
        use core::sync::atomic::AtomicBool;
        static INIT: AtomicBool = AtomicBool::new(false);
        if !INIT.swap(true, Ordering::SeqCst) {
            vm_page::init();
            vm_page::init_memory(0x300000, 0x400000);
            crate::mach_vm::pmap::init();
        }
    }

    #[test]
    fn test_out_of_range_segfaults() {
        init_test_pages();
        let map = VmMap::new();
        let err = handle_pagefault(&map, 0, FaultCause::USER).unwrap_err();
        assert_eq!(err, FaultError::OutOfRange);
    }

    #[test]
    fn test_unmapped_page_segfaults() {
        init_test_pages();
        let map = VmMap::new();
        let lo = user_mem_low_page() << PAGE_SHIFT;
        let err = handle_pagefault(&map, lo, FaultCause::USER).unwrap_err();
        assert_eq!(err, FaultError::NoVma);
    }

    #[test]
    fn test_write_to_readonly_vma_segfaults() {
        init_test_pages();
        let map = VmMap::new();
        let lo = user_mem_low_page();
        map.insert(VmArea::new(
            lo,
            lo + 4,
            0,
            VmProt::READ,
            VmAreaFlags::PRIVATE,
            anon_create(),
        ));
        let vaddr = lo << PAGE_SHIFT;
        let err = handle_pagefault(&map, vaddr, FaultCause::USER | FaultCause::WRITE).unwrap_err();
        assert_eq!(err, FaultError::ProtectionViolation);
    }

    #[test]
    fn test_resolves_anon_read_fault() {
        init_test_pages();
        let map = VmMap::new();
        let lo = user_mem_low_page();
        map.insert(VmArea::new(
            lo,
            lo + 4,
            0,
            VmProt::READ | VmProt::WRITE,
            VmAreaFlags::PRIVATE,
            anon_create(),
        ));
        let vaddr = lo << PAGE_SHIFT;
        handle_pagefault(&map, vaddr, FaultCause::USER).unwrap();
        assert_eq!(fault_stats().resolved.load(Ordering::Relaxed) >= 1, true);
    }
}
