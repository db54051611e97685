//! Virtual memory subsystem: memory objects, address-space maps, page fault
//! handling, and the POSIX mmap/munmap/brk syscalls built on top of them.
//!
//! - vm_page: physical page management
//! - vm_object: memory objects (mobj) - anonymous, shadow, and file-backed page caches
//! - vm_map: address space management (vmarea/vmmap)
//! - vm_fault: page fault handler
//! - vm_user: mmap/munmap/brk
//! - pmap: physical map (hardware page table management) - the VM core's
//!   external hardware collaborator, kept largely as the teacher wrote it.

pub mod pmap;
pub mod vm_fault;
pub mod vm_map;
pub mod vm_object;
pub mod vm_page;
pub mod vm_user;

pub use pmap::{
    pmap_create, pmap_enter, pmap_extract, pmap_find, pmap_protect, pmap_remove, pt_map,
    pt_unmap_range, pt_virt_to_phys, tlb_flush, tlb_flush_all, tlb_flush_range, Pmap, PmapId,
};
pub use vm_fault::{fault_stats, handle_pagefault, handle_pagefault_arc, FaultCause, FaultError, FaultStats};
pub use vm_map::{FindDir, MapError, VmArea, VmAreaFlags, VmMap, VmMapId, VmProt};
pub use vm_object::{Mobj, MobjError, MobjId, MobjKind, Pframe};
pub use vm_page::{PageFlags, PageQueue, VmPage, PAGE_SIZE};
pub use vm_user::{do_brk, do_mmap, do_munmap, MmapError};

/// Initialize the virtual memory subsystem.
pub fn init() {
    vm_page::init();
    vm_object::init();
    vm_map::init();
    pmap::init();
    vm_fault::init();
    vm_user::init();
}

/// Initialize VM subsystem with physical memory range
///
/// This should be called after basic init() with the actual physical
/// memory range discovered during boot.
pub fn init_with_memory(start: u64, end: u64) {
    vm_page::init_memory(start, end);
}
