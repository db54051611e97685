//! Memory objects (mobj): reference-counted, locked page-frame caches.
//!
//! An `Mobj` is the page-cache facade over a logical data source: anonymous
//! zero-fill memory, a shadow copy-on-write overlay over another mobj, or
//! (in the degenerate case used by a handful of tests) a file-backed range.
//! Every vmarea holds exactly one counted reference to the mobj backing it;
//! a shadow additionally holds references to its `shadowed` parent and to
//! the non-shadow `bottom_mobj` at the base of its chain.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;

use crate::mach_vm::vm_page;

/// Opaque identifier for a memory object, assigned at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MobjId(pub u64);

static NEXT_MOBJ_ID: AtomicU64 = AtomicU64::new(1);

fn next_mobj_id() -> MobjId {
    MobjId(NEXT_MOBJ_ID.fetch_add(1, Ordering::SeqCst))
}

/// Which variant of the mobj vtable a given object implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MobjKind {
    /// Zero-initialized, in-memory only, no backing store.
    Anon,
    /// Copy-on-write overlay over another mobj (`shadowed`/`bottom_mobj`).
    Shadow,
    /// A file-backed range (minimal stand-in; no real VFS in this build).
    File,
    /// A device-backed range (not exercised by this build's mmap paths).
    Device,
}

/// A single resident page belonging to exactly one mobj at a time.
#[derive(Debug)]
pub struct Pframe {
    /// Page number within the owning mobj.
    pub pagenum: u32,
    /// Physical frame backing this pframe (allocated from `vm_page`).
    pub phys_addr: u64,
    pub dirty: bool,
}

impl Pframe {
    fn new(pagenum: u32, phys_addr: u64) -> Self {
        Self { pagenum, phys_addr, dirty: false }
    }
}

/// Errors returned by mobj operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MobjError {
    OutOfMemory,
    NotFound,
}

impl MobjError {
    pub fn to_errno(self) -> i32 {
        match self {
            MobjError::OutOfMemory => -(crate::libc::errno::ENOMEM),
            MobjError::NotFound => -(crate::libc::errno::ENOENT),
        }
    }
}

/// A memory object: a ref-counted, mutex-guarded cache of page frames keyed
/// by page number, with per-variant fill/flush behavior.
///
/// The "counted reference" §3 describes is `Arc<Mobj>`'s own strong count:
/// every vmarea or shadow slot that holds a reference holds it as an
/// `Arc::clone`, and the last clone dropping runs `Drop for Mobj` below.
/// There is no separate refcount field to keep in sync with that - the
/// registry §3 says guards the refcount is, in this port, simply "whoever
/// currently owns an `Arc`".
pub struct Mobj {
    pub id: MobjId,
    pub kind: MobjKind,
    inner: Mutex<MobjInner>,
    /// Shadow-only: the mobj immediately above `bottom_mobj` in the chain.
    pub shadowed: Mutex<Option<Arc<Mobj>>>,
    /// Shadow-only: the non-shadow mobj at the base of the chain.
    pub bottom_mobj: Mutex<Option<Arc<Mobj>>>,
}

struct MobjInner {
    pframes: BTreeMap<u32, Pframe>,
}

impl core::fmt::Debug for Mobj {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Mobj")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

impl Mobj {
    fn new(kind: MobjKind) -> Self {
        Self {
            id: next_mobj_id(),
            kind,
            inner: Mutex::new(MobjInner { pframes: BTreeMap::new() }),
            shadowed: Mutex::new(None),
            bottom_mobj: Mutex::new(None),
        }
    }

    /// Current number of `Arc<Mobj>` holders, i.e. the mobj's refcount.
    pub fn ref_count(self: &Arc<Self>) -> usize {
        Arc::strong_count(self)
    }

    // ------------------------------------------------------------------
    // mobj_find_pframe / mobj_default_get_pframe / mobj_default_destructor
    // ------------------------------------------------------------------

    fn resident_phys_addr(&self, pagenum: u32) -> Option<u64> {
        self.inner.lock().pframes.get(&pagenum).map(|pf| pf.phys_addr)
    }

    /// `mobj_default_get_pframe`: find an existing resident pframe for
    /// `pagenum`; if none, allocate a physical frame and call `fill_pframe`
    /// to populate it, per §4.A.
    fn default_get_pframe(self: &Arc<Self>, pagenum: u32) -> Result<u64, MobjError> {
        if let Some(addr) = self.resident_phys_addr(pagenum) {
            return Ok(addr);
        }
        let phys = vm_page::alloc_page().ok_or(MobjError::OutOfMemory)?;
        self.fill_pframe(pagenum, phys)?;
        self.inner.lock().pframes.insert(pagenum, Pframe::new(pagenum, phys));
        Ok(phys)
    }

    /// `fill_pframe(o, pf)`: populate a freshly-allocated physical frame
    /// at `phys` for `pagenum`, per variant.
    fn fill_pframe(self: &Arc<Self>, pagenum: u32, phys: u64) -> Result<(), MobjError> {
        match self.kind {
            MobjKind::Anon => {
                vm_page::zero_frame(phys);
                Ok(())
            }
            MobjKind::Shadow => {
                // §4.C: search the chain (read-path logic) for a source
                // copy and memcpy PAGE_SIZE bytes into the new frame.
                match self.find_in_chain(pagenum) {
                    Some(src_phys) => {
                        vm_page::copy_frame(src_phys, phys);
                        Ok(())
                    }
                    None => {
                        vm_page::zero_frame(phys);
                        Ok(())
                    }
                }
            }
            MobjKind::File | MobjKind::Device => {
                // No real backing store in this build; treat as a
                // zero-fill fallback rather than invent I/O.
                vm_page::zero_frame(phys);
                Ok(())
            }
        }
    }

    /// `flush_pframe(o, pf)`: write back dirty contents if applicable.
    /// Anon and shadow pages are never backed, so this is always a no-op.
    fn flush_pframe(&self, _pagenum: u32) {}

    /// Walk the shadow chain from `self.shadowed` down to `bottom_mobj`,
    /// iteratively (never recursively, per §4.C), looking for a resident
    /// copy of `pagenum`. Returns its physical address if found anywhere
    /// in the chain, including at `bottom_mobj` itself.
    fn find_in_chain(&self, pagenum: u32) -> Option<u64> {
        let mut current = self.shadowed.lock().clone();
        while let Some(mobj) = current {
            if let Some(addr) = mobj.resident_phys_addr(pagenum) {
                return Some(addr);
            }
            current = match mobj.kind {
                MobjKind::Shadow => mobj.shadowed.lock().clone(),
                _ => None,
            };
        }
        // Fall through to bottom_mobj if the walk above didn't already
        // reach it (e.g. self has no intermediate shadows).
        if let Some(bottom) = self.bottom_mobj.lock().clone() {
            if let Some(addr) = bottom.resident_phys_addr(pagenum) {
                return Some(addr);
            }
        }
        None
    }

    /// `get_pframe(o, pagenum, forwrite, &pf)` per §4.A/§4.C.
    ///
    /// For anon and file/device objects this is just the default
    /// allocate-and-fill path. For shadows, the write path materializes a
    /// private copy in `self` (never in `bottom_mobj` - see SPEC_FULL.md
    /// §9's resolution of the shadow write-path open question); the read
    /// path walks the chain for an existing copy before falling back to
    /// `bottom_mobj.get_pframe(pagenum, 0, ..)`.
    pub fn get_pframe(self: &Arc<Self>, pagenum: u32, forwrite: bool) -> Result<u64, MobjError> {
        match self.kind {
            MobjKind::Anon | MobjKind::File | MobjKind::Device => {
                self.default_get_pframe(pagenum)
            }
            MobjKind::Shadow => {
                if forwrite {
                    // Write path: materialize in `self`. §4.C.
                    self.default_get_pframe(pagenum)
                } else {
                    // Read path: is it already resident here?
                    if let Some(addr) = self.resident_phys_addr(pagenum) {
                        return Ok(addr);
                    }
                    // Walk shadowed -> bottom_mobj looking for a hit.
                    if let Some(addr) = self.find_in_chain(pagenum) {
                        return Ok(addr);
                    }
                    // Nobody has it: delegate to bottom_mobj.get_pframe.
                    let bottom = self
                        .bottom_mobj
                        .lock()
                        .clone()
                        .expect("shadow mobj must have a bottom_mobj");
                    bottom.get_pframe(pagenum, false)
                }
            }
        }
    }

    /// `shadow_collapse(o)` per §4.C: while the next shadow up the chain
    /// is itself a shadow *and* is solely owned by `self` (refcount == 1),
    /// migrate its resident pframes into `self` and drop it.
    ///
    /// REDESIGN FLAG (preserved, not "fixed" to something looser): the
    /// refcount==1 gate is load-bearing - collapsing a shadow still
    /// referenced by a sibling would steal that sibling's private view.
    pub fn collapse(self: &Arc<Self>) {
        debug_assert_eq!(self.kind, MobjKind::Shadow);
        loop {
            // Check the strong count through a borrow (not a clone) so the
            // count we see is the real external one, not inflated by a
            // temporary clone of our own making.
            let next = {
                let guard = self.shadowed.lock();
                match guard.as_ref() {
                    Some(n) if n.kind == MobjKind::Shadow && Arc::strong_count(n) == 1 => {
                        Some(Arc::clone(n))
                    }
                    _ => None,
                }
            };
            let next = match next {
                Some(n) => n,
                None => break,
            };

            // Migrate every resident pframe from `next` into `self`,
            // skipping pages `self` already has (release the duplicate
            // by simply freeing the now-orphaned frame).
            let migrated: Vec<(u32, Pframe)> = {
                let mut next_inner = next.inner.lock();
                core::mem::take(&mut next_inner.pframes).into_iter().collect()
            };
            {
                let mut self_inner = self.inner.lock();
                for (pagenum, pf) in migrated {
                    if self_inner.pframes.contains_key(&pagenum) {
                        vm_page::free_page(pf.phys_addr);
                    } else {
                        self_inner.pframes.insert(pagenum, pf);
                    }
                }
            }

            // Re-anchor self.shadowed past the collapsed intermediate.
            let new_shadowed = next.shadowed.lock().clone();
            *self.shadowed.lock() = new_shadowed;

            debug_assert_eq!(Arc::strong_count(&next), 1);
            // `next` drops here, running its destructor.
        }
    }
}

impl Drop for Mobj {
    /// `mobj_default_destructor` + shadow-specific teardown, per §4.A/§4.C:
    /// evict (and, if dirty, flush) all resident pframes, then release
    /// `shadowed`/`bottom_mobj`.
    fn drop(&mut self) {
        let pframes = core::mem::take(&mut self.inner.lock().pframes);
        for (pagenum, pf) in pframes {
            if pf.dirty {
                self.flush_pframe(pagenum);
            }
            vm_page::free_page(pf.phys_addr);
        }
        // shadowed/bottom_mobj are Arc<Mobj>; dropping them here releases
        // our reference, recursing into this same Drop if they hit zero.
        *self.shadowed.lock() = None;
        *self.bottom_mobj.lock() = None;
    }
}

/// `anon_create`: a fresh anonymous mobj, refcount 1, unowned by any
/// registry (the caller's `Arc` is the sole reference). §4.B.
pub fn anon_create() -> Arc<Mobj> {
    Arc::new(Mobj::new(MobjKind::Anon))
}

/// A minimal file-backed mobj stand-in, used by the file-mapping path of
/// `do_mmap` when no real VFS is present in this build (§1's VFS
/// out-of-scope note). Content is always zero-fill; this exists only to
/// exercise the validation table and shadow-wrapping logic around a
/// non-anonymous mapping.
pub fn file_create() -> Arc<Mobj> {
    Arc::new(Mobj::new(MobjKind::File))
}

/// `shadow_create(shadowed)` per §4.C: returns a fresh shadow with
/// refcount 1. If `shadowed` is itself a shadow, inherit its
/// `bottom_mobj`; otherwise `shadowed` itself becomes the new
/// `bottom_mobj`. One reference is added to each of `shadowed` and
/// `bottom_mobj` - here, simply by storing an `Arc::clone` of each into the
/// new shadow's fields.
pub fn shadow_create(shadowed: &Arc<Mobj>) -> Arc<Mobj> {
    let bottom = if shadowed.kind == MobjKind::Shadow {
        shadowed
            .bottom_mobj
            .lock()
            .clone()
            .expect("shadow mobj must have a bottom_mobj")
    } else {
        shadowed.clone()
    };
    debug_assert_ne!(bottom.kind, MobjKind::Shadow);

    let s = Mobj::new(MobjKind::Shadow);
    *s.shadowed.lock() = Some(shadowed.clone());
    *s.bottom_mobj.lock() = Some(bottom);
    Arc::new(s)
}

pub fn init() {}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_test_pages() {
        use core::sync::atomic::AtomicBool;
        static INIT: AtomicBool = AtomicBool::new(false);
        if !INIT.swap(true, Ordering::SeqCst) {
            vm_page::init();
            vm_page::init_memory(0x100000, 0x200000);
        }
    }

    #[test]
    fn test_anon_fill_zeroes() {
        init_test_pages();
        let o = anon_create();
        let phys = o.get_pframe(0, false).unwrap();
        assert_eq!(vm_page::read_frame_byte(phys, 0), 0);
    }

    #[test]
    fn test_shadow_create_links_bottom() {
        init_test_pages();
        let base = anon_create();
        let s1 = shadow_create(&base);
        assert_eq!(s1.kind, MobjKind::Shadow);
        assert!(Arc::ptr_eq(&s1.bottom_mobj.lock().clone().unwrap(), &base));
        assert_eq!(base.ref_count(), 3); // 1 (creator) + shadowed + bottom_mobj

        let s2 = shadow_create(&s1);
        assert!(Arc::ptr_eq(&s2.bottom_mobj.lock().clone().unwrap(), &base));
        assert!(Arc::ptr_eq(&s2.shadowed.lock().clone().unwrap(), &s1));
    }

    #[test]
    fn test_shadow_write_materializes_privately() {
        init_test_pages();
        let base = anon_create();
        base.get_pframe(0, false).unwrap(); // base page 0 resident, zero

        let shadow = shadow_create(&base);
        let shadow_phys = shadow.get_pframe(0, true).unwrap();
        vm_page::write_frame_byte(shadow_phys, 0, 0xAB);

        // Base must be unaffected - the write materialized in `shadow`.
        let base_phys = base.resident_phys_addr(0).unwrap();
        assert_eq!(vm_page::read_frame_byte(base_phys, 0), 0);
        assert_ne!(base_phys, shadow_phys);
    }

    #[test]
    fn test_shadow_read_falls_through_to_bottom() {
        init_test_pages();
        let base = anon_create();
        let base_phys = base.get_pframe(3, false).unwrap();
        vm_page::write_frame_byte(base_phys, 0, 0x7);

        let shadow = shadow_create(&base);
        let read_phys = shadow.get_pframe(3, false).unwrap();
        assert_eq!(vm_page::read_frame_byte(read_phys, 0), 0x7);
    }

    #[test]
    fn test_collapse_migrates_pframes_and_reanchors() {
        init_test_pages();
        let base = anon_create();
        let mid = shadow_create(&base);
        let top = shadow_create(&mid);
        let mid_for_write = top.shadowed.lock().clone().unwrap();
        drop(mid); // top + mid_for_write now hold the remaining references to `mid`

        let phys = mid_for_write.get_pframe(1, true).unwrap();
        vm_page::write_frame_byte(phys, 0, 0x42);
        drop(mid_for_write); // now only `top.shadowed` references the intermediate

        top.collapse();
        assert!(Arc::ptr_eq(&top.shadowed.lock().clone().unwrap(), &base));
        let migrated = top.resident_phys_addr(1).unwrap();
        assert_eq!(vm_page::read_frame_byte(migrated, 0), 0x42);
    }
}
