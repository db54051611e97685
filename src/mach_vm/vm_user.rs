//! `mmap`/`munmap`/`brk`: the POSIX memory-management syscalls built on top
//! of `vmmap`. §4.F.

use crate::mach_vm::vm_map::{
    FileHandle, FindDir, MapError, VmArea, VmAreaFlags, VmMap, VmProt, USER_MEM_HIGH,
    USER_MEM_LOW,
};
use crate::mach_vm::vm_object::anon_create;
use crate::mach_vm::vm_page::{PAGE_SHIFT, PAGE_SIZE};

/// Error surface for `do_mmap`/`do_munmap`/`do_brk`, convertible to the
/// POSIX `errno` values in `libc::errno` exactly like `MapError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmapError {
    Invalid,
    BadFile,
    NoDevice,
    Access,
    NoMemory,
}

impl MmapError {
    pub fn to_errno(self) -> i32 {
        use crate::libc::errno::{EACCES, EBADF, EINVAL, ENODEV, ENOMEM};
        match self {
            MmapError::Invalid => EINVAL,
            MmapError::BadFile => EBADF,
            MmapError::NoDevice => ENODEV,
            MmapError::Access => EACCES,
            MmapError::NoMemory => ENOMEM,
        }
    }
}

impl From<MapError> for MmapError {
    fn from(e: MapError) -> Self {
        match e {
            MapError::InvalidRange => MmapError::Invalid,
            MapError::NoSpace => MmapError::NoMemory,
            MapError::NotFound => MmapError::Invalid,
            MapError::ProtectionFailure => MmapError::Access,
            MapError::OutOfMemory => MmapError::NoMemory,
        }
    }
}

fn page_align_up(x: u64) -> u64 {
    (x + PAGE_SIZE as u64 - 1) & !(PAGE_SIZE as u64 - 1)
}

/// `mmap(addr, len, prot, flags, file, off)`, validated in the exact order
/// §4.F specifies. Returns the start address of the new mapping.
#[allow(clippy::too_many_arguments)]
pub fn do_mmap(
    map: &VmMap,
    addr: u64,
    len: i64,
    prot: VmProt,
    flags: VmAreaFlags,
    file: Option<&dyn FileHandle>,
    off: i64,
) -> Result<u64, MmapError> {
    if len <= 0 || off < 0 {
        return Err(MmapError::Invalid);
    }
    if !(flags.is_private() || flags.is_shared()) {
        return Err(MmapError::Invalid);
    }
    let off = off as u64;
    if off % PAGE_SIZE as u64 != 0 {
        return Err(MmapError::Invalid);
    }
    if flags.is_fixed() && addr % PAGE_SIZE as u64 != 0 {
        return Err(MmapError::Invalid);
    }
    if flags.is_fixed() && addr < USER_MEM_LOW {
        return Err(MmapError::Invalid);
    }
    // MAP_FIXED gates the missing-file EBADF check (literal-C reading; the
    // spec's own table omits this qualifier, see DESIGN.md §9).
    if !flags.is_anon() && file.is_none() && flags.is_fixed() {
        return Err(MmapError::BadFile);
    }
    if let Some(f) = file {
        if prot.can_read() && !f.readable() {
            return Err(MmapError::Access);
        }
        if prot.can_write() && f.append_only() {
            return Err(MmapError::Access);
        }
        // literal C: `!(FMODE_READ || FMODE_WRITE)`, not "not opened
        // read+write" — the weaker of the two checks, kept as-is (§9).
        if flags.is_shared() && prot.can_write() && !(f.readable() || f.writable()) {
            return Err(MmapError::Access);
        }
    }

    let addr_off_in_page = addr & (PAGE_SIZE as u64 - 1);
    let npages = page_align_up(addr_off_in_page + len as u64) >> PAGE_SHIFT;
    let lopage = if flags.is_fixed() {
        addr >> PAGE_SHIFT
    } else {
        0
    };
    let off_pages = off >> PAGE_SHIFT;

    let vma = map
        .map(file, lopage, npages, prot, flags, off_pages, FindDir::LoHi)
        .map_err(MmapError::from)?;

    crate::mach_vm::pmap::tlb_flush_range(vma.vma_start, vma.vma_end);
    Ok(vma.vma_start << PAGE_SHIFT)
}

/// `munmap(addr, len)`.
pub fn do_munmap(map: &VmMap, addr: u64, len: i64) -> Result<(), MmapError> {
    if len <= 0 || addr % PAGE_SIZE as u64 != 0 {
        return Err(MmapError::Invalid);
    }
    let end = addr.checked_add(len as u64).ok_or(MmapError::Invalid)?;
    if addr < USER_MEM_LOW || end > USER_MEM_HIGH {
        return Err(MmapError::Invalid);
    }
    let lopage = addr >> PAGE_SHIFT;
    let npages = page_align_up(len as u64) >> PAGE_SHIFT;
    map.remove(lopage, npages).map_err(MmapError::from)
}

/// `brk(addr)`: grow or shrink the single heap vmarea.
///
/// `p_start_brk`/`p_brk` are the caller's (a `Process`'s) own heap-window
/// bookkeeping; this function computes the new `p_brk` and mutates `map`
/// to match but does not own that state itself — the caller stores the
/// returned value back into its own fields.
pub fn do_brk(map: &VmMap, addr: u64, p_start_brk: u64, p_brk: u64) -> Result<u64, MmapError> {
    if addr == 0 {
        return Ok(p_brk);
    }
    if addr > USER_MEM_HIGH || addr < p_start_brk {
        return Err(MmapError::NoMemory);
    }

    let endpage = page_align_up(addr) >> PAGE_SHIFT;
    let lopage = page_align_up(p_start_brk) >> PAGE_SHIFT;

    let existing_heap = map.lookup(lopage).filter(|v| v.vma_start == lopage);

    match existing_heap {
        None => {
            if endpage > lopage {
                if !map.is_range_empty(lopage, endpage - lopage) {
                    return Err(MmapError::NoMemory);
                }
                let heap = VmArea::new(
                    lopage,
                    endpage,
                    0,
                    VmProt::READ | VmProt::WRITE,
                    VmAreaFlags::PRIVATE | VmAreaFlags::ANON | VmAreaFlags::FIXED,
                    anon_create(),
                );
                map.insert(heap);
            }
        }
        Some(heap) => {
            if endpage > heap.vma_end {
                if !map.is_range_empty(heap.vma_end, endpage - heap.vma_end) {
                    return Err(MmapError::NoMemory);
                }
                map.set_area_end(heap.vma_start, endpage)
                    .map_err(MmapError::from)?;
            } else if endpage < heap.vma_end {
                // Shrink without unmap/flush, preserved verbatim from the
                // literal C (§9 "do_brk shrink path").
                map.set_area_end(heap.vma_start, endpage)
                    .map_err(MmapError::from)?;
            }
        }
    }

    let new_brk = page_align_up(addr);
    Ok(new_brk)
}

pub fn init() {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mach_vm::vm_map::user_mem_low_page;
    use crate::mach_vm::vm_page;
    use core::sync::atomic::{AtomicBool, Ordering};

    fn init_test_pages() {
        static INIT: AtomicBool = AtomicBool::new(false);
        if !INIT.swap(true, Ordering::SeqCst) {
            vm_page::init();
            vm_page::init_memory(0x500000, 0x600000);
            crate::mach_vm::pmap::init();
        }
    }

    #[test]
    fn test_mmap_anon_rejects_bad_flags() {
        init_test_pages();
        let map = VmMap::new();
        let err = do_mmap(&map, 0, 4096, VmProt::READ, VmAreaFlags::ANON, None, 0).unwrap_err();
        assert_eq!(err, MmapError::Invalid);
    }

    #[test]
    fn test_mmap_anon_gap_find_then_munmap() {
        init_test_pages();
        let map = VmMap::new();
        let addr = do_mmap(
            &map,
            0,
            4096 * 4,
            VmProt::READ | VmProt::WRITE,
            VmAreaFlags::PRIVATE | VmAreaFlags::ANON,
            None,
            0,
        )
        .unwrap();
        assert_eq!(addr, USER_MEM_LOW);
        assert_eq!(map.area_count(), 1);

        do_munmap(&map, addr, 4096 * 4).unwrap();
        assert_eq!(map.area_count(), 0);
    }

    #[test]
    fn test_mmap_fixed_below_user_low_rejected() {
        init_test_pages();
        let map = VmMap::new();
        let err = do_mmap(
            &map,
            0,
            4096,
            VmProt::READ,
            VmAreaFlags::PRIVATE | VmAreaFlags::ANON | VmAreaFlags::FIXED,
            None,
            0,
        )
        .unwrap_err();
        assert_eq!(err, MmapError::Invalid);
    }

    #[test]
    fn test_brk_grows_and_shrinks() {
        init_test_pages();
        let map = VmMap::new();
        let start_brk = user_mem_low_page() << PAGE_SHIFT;

        let b1 = do_brk(&map, start_brk + 4096 * 3, start_brk, start_brk).unwrap();
        assert_eq!(b1, start_brk + 4096 * 3);
        assert_eq!(map.area_count(), 1);

        let b2 = do_brk(&map, start_brk + 4096, start_brk, b1).unwrap();
        assert_eq!(b2, start_brk + 4096);
        assert_eq!(map.area_count(), 1);
    }

    #[test]
    fn test_brk_null_returns_current() {
        init_test_pages();
        let map = VmMap::new();
        let start_brk = user_mem_low_page() << PAGE_SHIFT;
        let b = do_brk(&map, 0, start_brk, start_brk + 4096).unwrap();
        assert_eq!(b, start_brk + 4096);
    }

    #[test]
    fn test_brk_below_start_is_enomem() {
        init_test_pages();
        let map = VmMap::new();
        let start_brk = user_mem_low_page() << PAGE_SHIFT;
        let err = do_brk(&map, start_brk - 4096, start_brk, start_brk).unwrap_err();
        assert_eq!(err, MmapError::NoMemory);
    }
}
