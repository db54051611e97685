//! VM Map - Address Space Management
//!
//! A vmmap is a sorted, disjoint list of vmareas describing a process's
//! virtual address space. Each vmarea is backed by one mobj at one
//! page offset with one set of protections.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;

use crate::mach_vm::vm_object::Mobj;
use crate::mach_vm::vm_page::PAGE_SHIFT;

// ============================================================================
// User address space bounds
// ============================================================================

/// Low end of the user-mappable virtual address range.
pub const USER_MEM_LOW: u64 = 0x0040_0000;
/// High end (exclusive) of the user-mappable virtual address range.
pub const USER_MEM_HIGH: u64 = 0x0000_7f00_0000_0000;

pub const fn user_mem_low_page() -> u64 {
    USER_MEM_LOW >> PAGE_SHIFT
}

pub const fn user_mem_high_page() -> u64 {
    USER_MEM_HIGH >> PAGE_SHIFT
}

// ============================================================================
// VM Map Types
// ============================================================================

/// VM Map ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VmMapId(pub u64);

static NEXT_MAP_ID: AtomicU64 = AtomicU64::new(1);

fn next_map_id() -> VmMapId {
    VmMapId(NEXT_MAP_ID.fetch_add(1, Ordering::SeqCst))
}

/// Memory protection flags (bit-exact with the mmap PROT_* constants).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmProt(u32);

impl VmProt {
    pub const NONE: Self = Self(0);
    pub const READ: Self = Self(1);
    pub const WRITE: Self = Self(2);
    pub const EXECUTE: Self = Self(4);
    pub const ALL: Self = Self(7);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn new(bits: u32) -> Self {
        Self(bits & 0x7)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn can_read(&self) -> bool {
        self.contains(Self::READ)
    }

    pub fn can_write(&self) -> bool {
        self.contains(Self::WRITE)
    }

    pub fn can_execute(&self) -> bool {
        self.contains(Self::EXECUTE)
    }
}

impl core::ops::BitOr for VmProt {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl Default for VmProt {
    fn default() -> Self {
        Self::NONE
    }
}

/// vmarea flags (bit-exact with the mmap MAP_* constants).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmAreaFlags(u32);

impl VmAreaFlags {
    pub const SHARED: Self = Self(0x1);
    pub const PRIVATE: Self = Self(0x2);
    pub const FIXED: Self = Self(0x10);
    pub const ANON: Self = Self(0x20);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn new(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn is_shared(&self) -> bool {
        self.contains(Self::SHARED)
    }

    pub fn is_private(&self) -> bool {
        self.contains(Self::PRIVATE)
    }

    pub fn is_fixed(&self) -> bool {
        self.contains(Self::FIXED)
    }

    pub fn is_anon(&self) -> bool {
        self.contains(Self::ANON)
    }
}

impl core::ops::BitOr for VmAreaFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Direction to search for a free range in `find_range`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindDir {
    /// Search from USER_MEM_LOW upward.
    LoHi,
    /// Search from USER_MEM_HIGH downward.
    HiLo,
}

// ============================================================================
// VM Area
// ============================================================================

/// A contiguous, page-aligned region of user virtual address space, backed
/// by one mobj at one page offset with one set of protections.
///
/// All of `vma_start`/`vma_end`/`vma_off` are page numbers, not byte addresses.
#[derive(Clone)]
pub struct VmArea {
    pub vma_start: u64,
    pub vma_end: u64,
    pub vma_off: u64,
    pub prot: VmProt,
    pub flags: VmAreaFlags,
    pub vma_obj: Arc<Mobj>,
}

impl VmArea {
    pub fn new(
        vma_start: u64,
        vma_end: u64,
        vma_off: u64,
        prot: VmProt,
        flags: VmAreaFlags,
        vma_obj: Arc<Mobj>,
    ) -> Self {
        Self {
            vma_start,
            vma_end,
            vma_off,
            prot,
            flags,
            vma_obj,
        }
    }

    pub fn npages(&self) -> u64 {
        self.vma_end - self.vma_start
    }

    pub fn contains(&self, page: u64) -> bool {
        page >= self.vma_start && page < self.vma_end
    }

    pub fn overlaps(&self, start: u64, end: u64) -> bool {
        self.vma_start < end && start < self.vma_end
    }
}

// ============================================================================
// Map Errors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    InvalidRange,
    NoSpace,
    NotFound,
    ProtectionFailure,
    OutOfMemory,
}

impl MapError {
    pub fn to_errno(self) -> i32 {
        use crate::libc::errno::{EACCES, EFAULT, EINVAL, ENOMEM};
        match self {
            MapError::InvalidRange => EINVAL,
            MapError::NoSpace => ENOMEM,
            MapError::NotFound => EFAULT,
            MapError::ProtectionFailure => EACCES,
            MapError::OutOfMemory => ENOMEM,
        }
    }
}

/// A minimal stand-in for the file side of `mmap`'s file-backed path. There
/// is no VFS in this build; a `FileHandle` is whatever the caller can vouch
/// for well enough to answer these four questions.
pub trait FileHandle {
    /// Produce (or locate) the mobj backing this file for mmap purposes.
    fn mmap(&self) -> Result<Arc<Mobj>, MapError>;
    fn readable(&self) -> bool;
    fn writable(&self) -> bool;
    fn append_only(&self) -> bool;
}

// ============================================================================
// VM Map
// ============================================================================

/// A process's address space: a sorted-disjoint list of vmareas.
pub struct VmMap {
    pub id: VmMapId,
    areas: Mutex<Vec<VmArea>>,
}

impl VmMap {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: next_map_id(),
            areas: Mutex::new(Vec::new()),
        })
    }

    pub fn area_count(&self) -> usize {
        self.areas.lock().len()
    }

    /// Insert `new_vma` at the sole position where the sorted-disjoint
    /// invariant holds.
    ///
    /// REDESIGN FLAG (preserved verbatim, not silently fixed): the original
    /// walks every area, inserting a copy of `new_vma` before each one whose
    /// `vma_end >= new_vma.vma_start`, and then unconditionally inserts again
    /// at the tail. Only the first branch is meant to fire; the unconditional
    /// tail insert is a latent double-insert bug. We reproduce it exactly:
    /// the in-place insert (if any match is found) clones the vma, which
    /// clones its `Arc<Mobj>` for the extra structural copy, and the tail
    /// push always happens.
    pub fn insert(&self, new_vma: VmArea) {
        let mut areas = self.areas.lock();
        let mut last_match = None;
        for (i, area) in areas.iter().enumerate() {
            if area.vma_end >= new_vma.vma_start {
                last_match = Some(i);
            }
        }
        if let Some(i) = last_match {
            areas.insert(i, new_vma.clone());
        }
        areas.push(new_vma);
    }

    /// Linear scan; returns the unique vma containing page `vfn`.
    pub fn lookup(&self, vfn: u64) -> Option<VmArea> {
        let areas = self.areas.lock();
        areas.iter().find(|a| a.contains(vfn)).cloned()
    }

    /// First-fit gap search of `npages` within `[USER_MEM_LOW, USER_MEM_HIGH)`.
    pub fn find_range(&self, npages: u64, dir: FindDir) -> Option<u64> {
        let areas = self.areas.lock();
        let lo = user_mem_low_page();
        let hi = user_mem_high_page();
        match dir {
            FindDir::LoHi => {
                let mut cursor = lo;
                for area in areas.iter() {
                    if area.vma_start > cursor && area.vma_start - cursor >= npages {
                        return Some(cursor);
                    }
                    if area.vma_end > cursor {
                        cursor = area.vma_end;
                    }
                }
                if hi - cursor >= npages {
                    Some(cursor)
                } else {
                    None
                }
            }
            FindDir::HiLo => {
                let mut cursor = hi;
                for area in areas.iter().rev() {
                    if cursor > area.vma_end && cursor - area.vma_end >= npages {
                        return Some(cursor - npages);
                    }
                    if area.vma_start < cursor {
                        cursor = area.vma_start;
                    }
                }
                if cursor - lo >= npages {
                    Some(cursor - npages)
                } else {
                    None
                }
            }
        }
    }

    pub fn is_range_empty(&self, start: u64, npages: u64) -> bool {
        let areas = self.areas.lock();
        !areas.iter().any(|a| a.overlaps(start, start + npages))
    }

    /// Allocate a vmarea, obtain its mobj, wrap it in a shadow for
    /// `MAP_PRIVATE`, remove any overlap for `MAP_FIXED`, then insert.
    ///
    /// Every reversible step happens first; removal and insertion happen
    /// only after the mobj chain is fully assembled, so a late failure
    /// leaves the map untouched.
    #[allow(clippy::too_many_arguments)]
    pub fn map(
        &self,
        file: Option<&dyn FileHandle>,
        lopage: u64,
        npages: u64,
        prot: VmProt,
        flags: VmAreaFlags,
        off_pages: u64,
        dir: FindDir,
    ) -> Result<VmArea, MapError> {
        let start = if lopage == 0 {
            self.find_range(npages, dir).ok_or(MapError::NoSpace)?
        } else {
            lopage
        };
        let end = start + npages;

        let base_obj = match file {
            Some(f) => f.mmap()?,
            None => crate::mach_vm::vm_object::anon_create(),
        };

        let vma_obj = if flags.is_private() {
            crate::mach_vm::vm_object::shadow_create(&base_obj)
        } else {
            base_obj
        };

        // MAP_FIXED overlap removal only fires when the caller supplied an
        // explicit lopage, mirroring the original's `flags & MAP_FIXED &&
        // lopage == 0` guard on the internal find-range path.
        if flags.is_fixed() && lopage != 0 {
            let _ = self.remove(start, npages);
        }

        let vma = VmArea::new(start, end, off_pages, prot, flags, vma_obj);
        self.insert(vma.clone());
        Ok(vma)
    }

    /// For each vma intersecting `[lopage, lopage+npages)`, split/shrink/drop
    /// it per the four-case rule, unmapping and flushing the affected range.
    pub fn remove(&self, lopage: u64, npages: u64) -> Result<(), MapError> {
        let removal_start = lopage;
        let removal_end = lopage + npages;
        let mut areas = self.areas.lock();
        let mut result = Vec::with_capacity(areas.len());

        for area in areas.drain(..) {
            if !area.overlaps(removal_start, removal_end) {
                result.push(area);
                continue;
            }

            if area.vma_start >= removal_start && area.vma_end <= removal_end {
                // Case 1: fully contained -> unlink and drop (the mobj's
                // `Arc` refcount falls with it).
                continue;
            }

            if removal_start > area.vma_start && removal_end < area.vma_end {
                // Case 2: removal strictly inside -> split in two, sharing
                // the same mobj (the high half clones the `Arc`).
                let delta = removal_end - area.vma_start;
                let high = VmArea::new(
                    removal_end,
                    area.vma_end,
                    area.vma_off + delta,
                    area.prot,
                    area.flags,
                    Arc::clone(&area.vma_obj),
                );
                let low = VmArea::new(
                    area.vma_start,
                    removal_start,
                    area.vma_off,
                    area.prot,
                    area.flags,
                    area.vma_obj,
                );
                result.push(low);
                result.push(high);
            } else if removal_end >= area.vma_end && removal_start > area.vma_start {
                // Case 3: removal covers the tail -> shorten vma_end.
                let mut shrunk = area;
                shrunk.vma_end = removal_start;
                result.push(shrunk);
            } else {
                // Case 4: removal covers the head -> advance vma_start/vma_off.
                let mut shrunk = area;
                let delta = removal_end - shrunk.vma_start;
                shrunk.vma_start = removal_end;
                shrunk.vma_off += delta;
                result.push(shrunk);
            }

            crate::mach_vm::pmap::pt_unmap_range(removal_start, removal_end);
            crate::mach_vm::pmap::tlb_flush_range(removal_start, removal_end);
        }

        result.sort_by_key(|a| a.vma_start);
        *areas = result;
        Ok(())
    }

    /// For every vma: SHARED areas are copied with a bumped refcount; others
    /// get a pair of fresh shadows wedged over the current object, one for
    /// each side. Unwinds fully on any allocation failure.
    pub fn clone_map(&self) -> Result<Arc<VmMap>, MapError> {
        let new_map = VmMap::new();
        let snapshot: Vec<VmArea> = self.areas.lock().iter().cloned().collect();
        let mut new_areas = Vec::with_capacity(snapshot.len());
        // (vma_start, parent's replacement obj) for every COW area; applied
        // back into `self` once all shadow allocation has succeeded.
        let mut parent_updates: Vec<(u64, Arc<Mobj>)> = Vec::with_capacity(snapshot.len());

        for area in &snapshot {
            if area.flags.is_shared() {
                new_areas.push(VmArea::new(
                    area.vma_start,
                    area.vma_end,
                    area.vma_off,
                    area.prot,
                    area.flags,
                    Arc::clone(&area.vma_obj),
                ));
                continue;
            }

            // Two fresh shadows wedged over the current object: one becomes
            // the parent's (self's) new vma_obj, the other the child's.
            let parent_shadow = crate::mach_vm::vm_object::shadow_create(&area.vma_obj);
            let child_shadow = crate::mach_vm::vm_object::shadow_create(&area.vma_obj);
            // `area.vma_obj`'s `Arc` drops here at end of scope; each shadow
            // above holds its own clone via `shadow_create`.
            parent_updates.push((area.vma_start, parent_shadow));
            new_areas.push(VmArea::new(
                area.vma_start,
                area.vma_end,
                area.vma_off,
                area.prot,
                area.flags,
                child_shadow,
            ));
        }

        {
            let mut self_areas = self.areas.lock();
            for (vma_start, parent_obj) in parent_updates {
                if let Some(self_area) = self_areas.iter_mut().find(|a| a.vma_start == vma_start) {
                    self_area.vma_obj = parent_obj;
                }
            }
        }

        for area in new_areas {
            new_map.insert(area);
        }
        Ok(new_map)
    }

    /// For each vma whose obj is a shadow, collapse its chain.
    pub fn collapse(&self) {
        let areas = self.areas.lock();
        for area in areas.iter() {
            if area.vma_obj.kind == crate::mach_vm::vm_object::MobjKind::Shadow {
                area.vma_obj.collapse();
            }
        }
    }

    /// Mutate a single vma's `vma_end` in place, leaving everything else
    /// about it (object, offset, protection) untouched.
    ///
    /// Grounded on the literal C `brk` path, which holds a direct pointer to
    /// the heap `vmarea` and assigns `vma_end = endpage` for both growth and
    /// shrinkage — no split/remove machinery runs either way. Used only by
    /// `do_brk`; every other caller goes through `map`/`remove`.
    pub fn set_area_end(&self, vma_start: u64, new_end: u64) -> Result<(), MapError> {
        let mut areas = self.areas.lock();
        let area = areas
            .iter_mut()
            .find(|a| a.vma_start == vma_start)
            .ok_or(MapError::NotFound)?;
        area.vma_end = new_end;
        Ok(())
    }

    /// Byte-granular copy from a virtual range in this map into `buf`.
    /// Assumes every touched page lies inside some vma; never checks
    /// permissions (the caller already did).
    pub fn read(&self, vaddr: u64, buf: &mut [u8]) -> Result<(), MapError> {
        use crate::mach_vm::vm_page::PAGE_SIZE;
        let mut done = 0usize;
        while done < buf.len() {
            let (phys, page_off, chunk) = self.walk(vaddr + done as u64, buf.len() - done, false)?;
            for i in 0..chunk {
                buf[done + i] = crate::mach_vm::vm_page::read_frame_byte(phys, page_off + i);
            }
            let _ = PAGE_SIZE;
            done += chunk;
        }
        Ok(())
    }

    /// Byte-granular copy from `buf` into a virtual range in this map.
    pub fn write(&self, vaddr: u64, buf: &[u8]) -> Result<(), MapError> {
        let mut done = 0usize;
        while done < buf.len() {
            let (phys, page_off, chunk) = self.walk(vaddr + done as u64, buf.len() - done, true)?;
            for i in 0..chunk {
                crate::mach_vm::vm_page::write_frame_byte(phys, page_off + i, buf[done + i]);
            }
            done += chunk;
        }
        Ok(())
    }

    /// Resolve `vaddr` to `(phys_addr, offset_in_page, bytes_until_page_end_or_remaining)`.
    fn walk(&self, vaddr: u64, remaining: usize, forwrite: bool) -> Result<(u64, usize, usize), MapError> {
        use crate::mach_vm::vm_page::PAGE_SIZE;
        let page = vaddr >> PAGE_SHIFT;
        let page_off = (vaddr as usize) & (PAGE_SIZE - 1);
        let vma = self.lookup(page).ok_or(MapError::NotFound)?;
        let pagenum_in_obj = vma.vma_off + (page - vma.vma_start);
        let phys = vma
            .vma_obj
            .get_pframe(pagenum_in_obj as u32, forwrite)
            .map_err(|_| MapError::OutOfMemory)?;
        let chunk = core::cmp::min(PAGE_SIZE - page_off, remaining);
        Ok((phys, page_off, chunk))
    }
}

impl Default for VmMap {
    fn default() -> Self {
        Self {
            id: next_map_id(),
            areas: Mutex::new(Vec::new()),
        }
    }
}

pub fn init() {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mach_vm::vm_object::anon_create;
    use crate::mach_vm::vm_page;

    fn init_test_pages() {
        let _ = crate::mach_vm::vm_page::init();
        vm_page::init_memory(0x200000, 0x400000);
    }

    #[test]
    fn test_insert_lookup_remove() {
        init_test_pages();
        let map = VmMap::new();
        let obj = anon_create();
        let lo = user_mem_low_page();

        map.insert(VmArea::new(
            lo,
            lo + 32,
            0,
            VmProt::READ,
            VmAreaFlags::PRIVATE,
            obj,
        ));

        assert!(map.lookup(lo + 5).is_some());
        assert!(map.lookup(lo + 40).is_none());

        map.remove(lo + 8, 1).unwrap();
        let areas: Vec<_> = {
            let guard = map.areas.lock();
            guard.iter().map(|a| (a.vma_start, a.vma_end, a.vma_off)).collect()
        };
        assert!(areas.contains(&(lo, lo + 8, 0)));
        assert!(areas.contains(&(lo + 9, lo + 32, 9)));
    }

    #[test]
    fn test_find_range_lohi_hilo() {
        init_test_pages();
        let map = VmMap::new();
        let lo = user_mem_low_page();
        let hi = user_mem_high_page();

        assert_eq!(map.find_range(16, FindDir::LoHi), Some(lo));

        for i in 0..5u64 {
            let obj = anon_create();
            map.insert(VmArea::new(
                hi - (i + 1) * 16,
                hi - i * 16,
                0,
                VmProt::READ,
                VmAreaFlags::PRIVATE,
                obj,
            ));
        }

        assert_eq!(map.find_range(16, FindDir::HiLo), Some(hi - 6 * 16));
    }

    #[test]
    fn test_clone_map_cow_isolation() {
        init_test_pages();
        let parent = VmMap::new();
        let lo = user_mem_low_page();
        parent.insert(VmArea::new(
            lo,
            lo + 1,
            0,
            VmProt::READ | VmProt::WRITE,
            VmAreaFlags::PRIVATE | VmAreaFlags::ANON,
            anon_create(),
        ));
        parent.write(lo << PAGE_SHIFT, b"a").unwrap();

        let child = parent.clone_map().unwrap();
        let mut out = [0u8; 1];
        child.read(lo << PAGE_SHIFT, &mut out).unwrap();
        assert_eq!(out, *b"a");

        child.write(lo << PAGE_SHIFT, b"b").unwrap();

        let mut parent_out = [0u8; 1];
        parent.read(lo << PAGE_SHIFT, &mut parent_out).unwrap();
        assert_eq!(parent_out, *b"a");

        let mut child_out = [0u8; 1];
        child.read(lo << PAGE_SHIFT, &mut child_out).unwrap();
        assert_eq!(child_out, *b"b");
    }

    #[test]
    fn test_is_range_empty() {
        init_test_pages();
        let map = VmMap::new();
        let lo = user_mem_low_page();
        let obj = anon_create();
        map.insert(VmArea::new(
            lo,
            lo + 4,
            0,
            VmProt::READ,
            VmAreaFlags::PRIVATE,
            obj,
        ));
        assert!(!map.is_range_empty(lo, 4));
        assert!(map.is_range_empty(lo + 4, 4));
    }
}
