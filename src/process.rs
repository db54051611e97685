//! Processes: the POSIX layer over `kern::task`/`kern::thread` and
//! `mach_vm`'s address-space machinery. §4.G (fork).
//!
//! A `Process` pairs one `Task` (the existing Mach thread/IPC container)
//! with one `VmMap` (the new POSIX address space) and the heap-window
//! bookkeeping `brk` needs. Mach's task/thread substrate already owns
//! scheduling and IPC; this module only adds what POSIX process semantics
//! require on top.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;

use crate::kern::task::{task_create, Task};
use crate::kern::thread::{kthread_clone, Thread};
use crate::mach_vm::vm_map::{user_mem_high_page, user_mem_low_page, VmMap, USER_MEM_LOW};
use crate::mach_vm::{pmap, vm_user};

/// Process identifier. Distinct from `TaskId`/`ThreadId` — one process is
/// one task with one or more threads, but POSIX pid semantics (parent,
/// children, zombies) live here, not on `Task`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u64);

/// Errors from `fork`'s multi-stage allocation. Every stage before the
/// point of failure is unwound by the caller, per §7's propagation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkError {
    NoMemory,
}

impl ForkError {
    pub fn to_errno(self) -> i32 {
        crate::libc::errno::ENOMEM
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Zombie(i32),
}

/// A process: one task, one address space, one heap window.
pub struct Process {
    pub pid: ProcessId,
    pub task: Arc<Task>,
    pub vmmap: Arc<VmMap>,
    /// The thread executing this process's user-mode code. `fork` gives
    /// the child exactly one (the clone of the parent's current thread);
    /// POSIX `pthread_create`-style multithreading is out of scope.
    pub thread: Mutex<Option<Arc<Thread>>>,
    pub parent: Mutex<Option<ProcessId>>,
    pub children: Mutex<Vec<ProcessId>>,
    pub p_start_brk: AtomicU64,
    pub p_brk: AtomicU64,
    pub state: Mutex<ProcessState>,
}

impl Process {
    fn new(pid: ProcessId, task: Arc<Task>, vmmap: Arc<VmMap>, parent: Option<ProcessId>) -> Self {
        let start_brk = USER_MEM_LOW;
        task.set_map(vmmap.id);
        Self {
            pid,
            task,
            vmmap,
            thread: Mutex::new(None),
            parent: Mutex::new(parent),
            children: Mutex::new(Vec::new()),
            p_start_brk: AtomicU64::new(start_brk),
            p_brk: AtomicU64::new(start_brk),
            state: Mutex::new(ProcessState::Running),
        }
    }

    pub fn get_brk(&self) -> u64 {
        self.p_brk.load(Ordering::Acquire)
    }

    /// `brk(addr)` against this process's heap window.
    pub fn brk(&self, addr: u64) -> Result<u64, vm_user::MmapError> {
        let start = self.p_start_brk.load(Ordering::Acquire);
        let cur = self.p_brk.load(Ordering::Acquire);
        let new_brk = vm_user::do_brk(&self.vmmap, addr, start, cur)?;
        self.p_brk.store(new_brk, Ordering::Release);
        Ok(new_brk)
    }

    pub fn add_child(&self, child: ProcessId) {
        self.children.lock().push(child);
    }
}

// ============================================================================
// Process registry
// ============================================================================

struct ProcessManager {
    processes: BTreeMap<ProcessId, Arc<Process>>,
    next_id: u64,
}

impl ProcessManager {
    fn new() -> Self {
        Self {
            processes: BTreeMap::new(),
            next_id: 1,
        }
    }

    fn alloc_id(&mut self) -> ProcessId {
        let id = ProcessId(self.next_id);
        self.next_id += 1;
        id
    }

    fn insert(&mut self, proc: Arc<Process>) {
        self.processes.insert(proc.pid, proc);
    }

    fn find(&self, pid: ProcessId) -> Option<Arc<Process>> {
        self.processes.get(&pid).cloned()
    }

    fn remove(&mut self, pid: ProcessId) -> Option<Arc<Process>> {
        self.processes.remove(&pid)
    }
}

static PROCESS_MANAGER: spin::Once<Mutex<ProcessManager>> = spin::Once::new();

fn process_manager() -> &'static Mutex<ProcessManager> {
    PROCESS_MANAGER.call_once(|| Mutex::new(ProcessManager::new()));
    PROCESS_MANAGER.get().unwrap()
}

static CURRENT_PROCESS: Mutex<Option<Arc<Process>>> = Mutex::new(None);

/// The process the running thread belongs to.
///
/// `curproc` is ambient per-CPU context in the design this module is
/// grounded on (§9); this single global is this crate's stand-in for that
/// (no SMP/per-CPU state exists yet — see `DESIGN.md`).
pub fn current_process() -> Option<Arc<Process>> {
    CURRENT_PROCESS.lock().clone()
}

pub fn set_current_process(proc: Arc<Process>) {
    *CURRENT_PROCESS.lock() = Some(proc);
}

/// Clear the current-process slot. Test-only: exercises the "no current
/// process" error path that real syscall entry can't reach without a
/// signal/trap that arrives before any process context is established.
#[cfg(test)]
pub fn clear_current_process() {
    *CURRENT_PROCESS.lock() = None;
}

pub fn find_process(pid: ProcessId) -> Option<Arc<Process>> {
    process_manager().lock().find(pid)
}

/// Create a fresh, parentless process with an empty address space (the
/// init process's entry point; every other process arrives via `fork`).
pub fn proc_create_root() -> Arc<Process> {
    let mut mgr = process_manager().lock();
    let pid = mgr.alloc_id();
    let task = task_create(None);
    let map = VmMap::new();
    let proc = Arc::new(Process::new(pid, task, map, None));
    mgr.insert(Arc::clone(&proc));
    proc
}

/// `fork()`: §4.G's six steps.
///
/// This port has no real trap-frame type to build a register snapshot
/// into, so `fork_setup_stack` is a documented simplification of step 4:
/// instead of pushing a synthetic return frame onto a real kernel stack,
/// the child thread's user-mode entry state (`pc`/`sp`) is copied directly
/// from the parent's thread. The one bit the spec calls out, `RAX := 0`
/// for the child's syscall return value, has no modeled register slot to
/// write into yet — the caller (the trap dispatcher) is the one place that
/// actually returns a value to whichever of parent/child it's running as,
/// and it does so simply by returning `Ok(child.pid)` from this call,
/// since nothing here ever runs "as" the child.
pub fn do_fork(parent: &Arc<Process>) -> Result<ProcessId, ForkError> {
    // Step 1: proc_create, including the vmmap_clone this spec says is
    // proc_create's own invariant.
    let child_map = parent.vmmap.clone_map().map_err(|_| ForkError::NoMemory)?;

    let mut mgr = process_manager().lock();
    let pid = mgr.alloc_id();
    let child_task = task_create(Some(parent.task.as_ref()));
    let child = Arc::new(Process::new(pid, child_task, child_map, Some(parent.pid)));

    // Step 2: kthread_clone.
    let parent_thread = parent.thread.lock().clone();
    let Some(parent_thread) = parent_thread else {
        // Step 3: unwind — nothing irreversible has happened to the parent
        // yet, so dropping `child` (and its freshly cloned map/task) is
        // enough.
        return Err(ForkError::NoMemory);
    };
    let child_thread = kthread_clone(&parent_thread, child.task.id);

    // Step 4: entry state installed on the child's thread.
    fork_setup_stack(&parent_thread, &child_thread);

    // Step 5: attach, unmap+flush the parent's whole user range so both
    // sides re-fault and observe fresh COW PTEs, make the child runnable.
    *child.thread.lock() = Some(Arc::clone(&child_thread));
    child.task.add_thread(child_thread.id);
    mgr.insert(Arc::clone(&child));
    drop(mgr);

    parent.add_child(child.pid);
    pmap::pt_unmap_range(user_mem_low_page(), user_mem_high_page());
    pmap::tlb_flush_all();
    child_thread.resume();

    // Step 6.
    Ok(child.pid)
}

/// Install the child's user-mode entry state after `kthread_clone`.
///
/// Grounded on `original_source/kernel/proc/fork.c`'s `fork_setup_stack`:
/// the child resumes in the same place the parent's syscall will return
/// to, so it inherits the parent's saved PC/SP verbatim.
fn fork_setup_stack(parent_thread: &Thread, child_thread: &Thread) {
    child_thread.set_pc(parent_thread.get_pc());
    child_thread.set_sp(parent_thread.get_sp());
}

/// Reap a zombie child, removing it from the registry. Returns its exit
/// status. `wait4`'s blocking-until-a-child-exits half is out of scope
/// (see `SPEC_FULL.md`'s Non-goals); this is the non-blocking core.
pub fn reap_zombie(pid: ProcessId) -> Option<i32> {
    let mut mgr = process_manager().lock();
    let proc = mgr.find(pid)?;
    let status = match *proc.state.lock() {
        ProcessState::Zombie(status) => status,
        ProcessState::Running => return None,
    };
    mgr.remove(pid);
    Some(status)
}

pub fn init() {
    let _ = process_manager();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mach_vm::vm_page;
    use core::sync::atomic::AtomicBool;

    fn init_test_pages() {
        static INIT: AtomicBool = AtomicBool::new(false);
        if !INIT.swap(true, Ordering::SeqCst) {
            vm_page::init();
            vm_page::init_memory(0x700000, 0x800000);
            pmap::init();
        }
    }

    fn root_with_thread() -> Arc<Process> {
        let proc = proc_create_root();
        let thread = crate::kern::thread::kernel_thread_create();
        *proc.thread.lock() = Some(thread);
        proc
    }

    #[test]
    fn test_proc_create_root_has_fresh_brk_window() {
        init_test_pages();
        let proc = proc_create_root();
        assert_eq!(proc.get_brk(), USER_MEM_LOW);
        assert!(proc.children.lock().is_empty());
    }

    #[test]
    fn test_fork_clones_vmmap_and_registers_child() {
        init_test_pages();
        let parent = root_with_thread();
        let child_pid = do_fork(&parent).unwrap();
        assert_ne!(child_pid, parent.pid);

        let child = find_process(child_pid).unwrap();
        assert_eq!(*child.parent.lock(), Some(parent.pid));
        assert_eq!(parent.children.lock().as_slice(), &[child_pid]);
        assert!(child.thread.lock().is_some());
    }

    #[test]
    fn test_fork_without_thread_fails_cleanly() {
        init_test_pages();
        let parent = proc_create_root();
        let err = do_fork(&parent).unwrap_err();
        assert_eq!(err, ForkError::NoMemory);
    }

    #[test]
    fn test_brk_delegates_to_vm_user() {
        init_test_pages();
        let proc = proc_create_root();
        let new_brk = proc.brk(USER_MEM_LOW + 4096 * 2).unwrap();
        assert_eq!(new_brk, USER_MEM_LOW + 4096 * 2);
        assert_eq!(proc.get_brk(), new_brk);
    }
}
