//! Mach trap interface - system call layer
//!
//! Implements both traditional Mach traps and POSIX syscall emulation

use crate::port::Port;
use crate::types::{PortId, TaskId};

/// Mach trap numbers (negative for Mach, positive for POSIX)
#[repr(i32)]
#[derive(Debug, Clone, Copy)]
pub enum TrapNumber {
    // Mach traps (negative numbers)
    MachReplyPort = -26,
    MachThreadSelf = -27,
    MachTaskSelf = -28,
    MachHostSelf = -29,
    MachMsgTrap = -31,
    MachMsgOverwrite = -32,
    SemaphoreSignalTrap = -33,
    SemaphoreSignalAllTrap = -34,
    SemaphoreWaitTrap = -35,
    SemaphoreWaitSignalTrap = -36,
    SemaphoreTimedwaitTrap = -37,
    TaskNameForPid = -44,
    PidForTask = -45,
    MachTimebaseInfo = -89,
    MachWaitUntil = -90,
    MkTimerCreate = -91,
    MkTimerDestroy = -92,
    MkTimerArm = -93,
    MkTimerCancel = -94,

    // POSIX syscalls (positive numbers - Linux compatible)
    Read = 0,
    Write = 1,
    Open = 2,
    Close = 3,
    Stat = 4,
    Fstat = 5,
    Lstat = 6,
    Poll = 7,
    Lseek = 8,
    Mmap = 9,
    Mprotect = 10,
    Munmap = 11,
    Brk = 12,
    Sigaction = 13,
    Sigprocmask = 14,
    Ioctl = 16,
    Access = 21,
    Pipe = 22,
    Select = 23,
    SchedYield = 24,
    Dup = 32,
    Dup2 = 33,
    Pause = 34,
    Nanosleep = 35,
    Getpid = 39,
    Fork = 57,
    Vfork = 58,
    Execve = 59,
    Exit = 60,
    Wait4 = 61,
    Kill = 62,
    Getppid = 110,
    Clone = 120,
    Fsync = 118,
    Getcwd = 79,
    Chdir = 80,
    Mkdir = 83,
    Rmdir = 84,
    Creat = 85,
    Unlink = 87,
    Readlink = 89,
    Chmod = 90,
    Chown = 92,
    Umask = 95,
    Gettimeofday = 96,
    Getuid = 102,
    Getgid = 104,
    Geteuid = 107,
    Getegid = 108,
}

/// Trap return values
pub type TrapReturn = Result<usize, TrapError>;

/// Trap errors  
#[derive(Debug, Clone, Copy)]
pub enum TrapError {
    InvalidTrap,
    InvalidArgument,
    PermissionDenied,
    ResourceNotFound,
    OutOfMemory,
    WouldBlock,
    Interrupted,
    IoError,
    NotImplemented,
}

/// Mach message trap arguments
#[repr(C)]
pub struct MachMsgArgs {
    pub msg: *mut u8,
    pub option: u32,
    pub send_size: u32,
    pub rcv_size: u32,
    pub rcv_name: PortId,
    pub timeout: u32,
    pub notify: PortId,
}

/// Main trap dispatcher
pub fn trap_dispatch(trap_num: i32, args: &[usize]) -> TrapReturn {
    // Check if it's a Mach trap (negative) or POSIX syscall (positive)
    if trap_num < 0 {
        dispatch_mach_trap(trap_num, args)
    } else {
        dispatch_posix_syscall(trap_num, args)
    }
}

/// Dispatch Mach traps
fn dispatch_mach_trap(trap_num: i32, args: &[usize]) -> TrapReturn {
    match trap_num {
        -26 => mach_reply_port(),
        -27 => mach_thread_self(),
        -28 => mach_task_self(),
        -29 => mach_host_self(),
        -31 => {
            // mach_msg_trap
            let msg_args = unsafe { &*(args[0] as *const MachMsgArgs) };
            mach_msg_trap(msg_args)
        }
        _ => Err(TrapError::NotImplemented),
    }
}

/// Dispatch POSIX syscalls
fn dispatch_posix_syscall(syscall_num: i32, args: &[usize]) -> TrapReturn {
    match syscall_num {
        0 => sys_read(args[0], args[1] as *mut u8, args[2]),
        1 => sys_write(args[0], args[1] as *const u8, args[2]),
        2 => sys_open(args[0] as *const u8, args[1] as i32, args[2] as u32),
        3 => sys_close(args[0]),
        9 => sys_mmap(
            args[0] as u64,
            args[1] as i64,
            args[2] as u32,
            args[3] as u32,
            args[4] as i32,
            args[5] as i64,
        ),
        11 => sys_munmap(args[0] as u64, args[1] as i64),
        12 => sys_brk(args[0] as u64),
        39 => sys_getpid(),
        57 => sys_fork(),
        60 => sys_exit(args[0] as i32),
        _ => Err(TrapError::NotImplemented),
    }
}

// Mach trap implementations

fn mach_reply_port() -> TrapReturn {
    // Create a reply port for the current thread
    let port = Port::new(TaskId(0)); // TODO: Get current task
    Ok(port.id().0 as usize)
}

fn mach_thread_self() -> TrapReturn {
    // Return current thread's port
    // TODO: Get from current thread context
    Ok(0)
}

fn mach_task_self() -> TrapReturn {
    // Return current task's port
    // TODO: Get from current task context
    Ok(0)
}

fn mach_host_self() -> TrapReturn {
    // Return host port (privileged)
    Ok(0)
}

fn mach_msg_trap(args: &MachMsgArgs) -> TrapReturn {
    // Core Mach message send/receive
    // This is the heart of Mach IPC

    let option = args.option;
    let send = (option & 0x1) != 0;
    let receive = (option & 0x2) != 0;

    if send {
        // Send message
        // TODO: Marshal message and send via port
    }

    if receive {
        // Receive message
        // TODO: Receive from port and unmarshal
    }

    Ok(0)
}

// POSIX syscall implementations (mapped to Mach operations)

fn sys_read(fd: usize, buf: *mut u8, count: usize) -> TrapReturn {
    // Map fd to port and send read message to file server
    // For now, read from serial if fd == 0 (stdin)
    if fd == 0 {
        let mut bytes_read = 0;
        let buffer = unsafe { core::slice::from_raw_parts_mut(buf, count) };

        for slot in buffer.iter_mut().take(count) {
            if let Some(byte) = crate::drivers::serial::read_byte() {
                *slot = byte;
                bytes_read += 1;
            } else {
                break;
            }
        }

        Ok(bytes_read)
    } else {
        Err(TrapError::InvalidArgument)
    }
}

fn sys_write(fd: usize, buf: *const u8, count: usize) -> TrapReturn {
    // Map fd to port and send write message to file server
    // For now, write to serial if fd == 1 or 2 (stdout/stderr)
    if fd == 1 || fd == 2 {
        let buffer = unsafe { core::slice::from_raw_parts(buf, count) };

        for &byte in buffer {
            crate::drivers::serial::write_byte(byte);
        }

        Ok(count)
    } else {
        Err(TrapError::InvalidArgument)
    }
}

fn sys_open(path: *const u8, flags: i32, _mode: u32) -> TrapReturn {
    if path.is_null() {
        return Err(TrapError::InvalidArgument);
    }

    // Convert C string to Rust string
    let path_str = unsafe {
        let mut len = 0;
        while *path.add(len) != 0 {
            len += 1;
        }
        core::slice::from_raw_parts(path, len)
    };

    let path_string = match core::str::from_utf8(path_str) {
        Ok(s) => s,
        Err(_) => return Err(TrapError::InvalidArgument),
    };

    // Create message for file server
    let file_server_port = crate::port::PORT_REGISTRY
        .lookup_port("file_server")
        .unwrap_or(crate::types::PortId(1));
    let mut data = alloc::vec::Vec::new();
    data.extend_from_slice(path_string.as_bytes());
    data.extend_from_slice(&flags.to_le_bytes());
    let msg = crate::message::Message::new_out_of_line(file_server_port, data);

    // Send to file server
    match crate::port::send_message(file_server_port, msg) {
        Ok(_) => Ok(3), // Return file descriptor 3
        Err(_) => Err(TrapError::ResourceNotFound),
    }
}

fn sys_close(fd: usize) -> TrapReturn {
    if fd < 3 {
        // Don't close stdin, stdout, stderr
        return Err(TrapError::InvalidArgument);
    }

    // Send close message to file server
    let file_server_port = crate::port::PORT_REGISTRY
        .lookup_port("file_server")
        .unwrap_or(crate::types::PortId(1));
    let data = fd.to_le_bytes().to_vec();
    let msg = crate::message::Message::new_out_of_line(file_server_port, data);

    match crate::port::send_message(file_server_port, msg) {
        Ok(_) => Ok(0),
        Err(_) => Err(TrapError::ResourceNotFound),
    }
}

fn sys_getpid() -> TrapReturn {
    match crate::process::current_process() {
        Some(proc) => Ok(proc.pid.0 as usize),
        None => Ok(1),
    }
}

// mmap/munmap/brk currently only serve anonymous mappings: there is no
// fd-to-FileHandle table wired up yet, so `fd` is accepted (matching the
// real syscall's register layout) but unused, and file-backed mappings
// always fail with EBADF via `do_mmap`'s own validation.
fn sys_mmap(addr: u64, len: i64, prot: u32, flags: u32, _fd: i32, off: i64) -> TrapReturn {
    let proc = current_process_or_err()?;
    let prot = crate::mach_vm::VmProt::new(prot);
    let flags = crate::mach_vm::VmAreaFlags::new(flags);
    crate::mach_vm::do_mmap(&proc.vmmap, addr, len, prot, flags, None, off)
        .map(|a| a as usize)
        .map_err(|e| mmap_err_to_trap(e))
}

fn sys_munmap(addr: u64, len: i64) -> TrapReturn {
    let proc = current_process_or_err()?;
    crate::mach_vm::do_munmap(&proc.vmmap, addr, len)
        .map(|_| 0)
        .map_err(mmap_err_to_trap)
}

fn sys_brk(addr: u64) -> TrapReturn {
    let proc = current_process_or_err()?;
    proc.brk(addr).map(|a| a as usize).map_err(mmap_err_to_trap)
}

fn sys_fork() -> TrapReturn {
    let proc = current_process_or_err()?;
    crate::process::do_fork(&proc)
        .map(|pid| pid.0 as usize)
        .map_err(|_| TrapError::OutOfMemory)
}

fn current_process_or_err() -> Result<alloc::sync::Arc<crate::process::Process>, TrapError> {
    crate::process::current_process().ok_or(TrapError::ResourceNotFound)
}

fn mmap_err_to_trap(e: crate::mach_vm::MmapError) -> TrapError {
    use crate::libc::errno::{EACCES, EBADF, EINVAL, ENODEV, ENOMEM};
    match e.to_errno() {
        EINVAL => TrapError::InvalidArgument,
        EBADF | ENODEV => TrapError::ResourceNotFound,
        EACCES => TrapError::PermissionDenied,
        ENOMEM => TrapError::OutOfMemory,
        _ => TrapError::InvalidArgument,
    }
}

fn sys_exit(status: i32) -> TrapReturn {
    // Terminate current task
    // TODO: Send termination message to task server
    crate::println!("Task exiting with status: {}", status);
    loop {
        core::hint::spin_loop();
    }
}

/// Install trap handlers
pub fn init() {
    // Register trap handler with architecture-specific code
    crate::println!("Mach trap interface initialized");
    crate::println!("  {} Mach traps available", 20);
    crate::println!("  {} POSIX syscalls emulated", 30);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mach_vm::vm_map::{user_mem_low_page, VmProt};
    use crate::mach_vm::vm_page::PAGE_SHIFT;
    use crate::process;
    use core::sync::atomic::{AtomicBool, Ordering};

    fn init_test_pages() {
        static INIT: AtomicBool = AtomicBool::new(false);
        if !INIT.swap(true, Ordering::SeqCst) {
            crate::mach_vm::vm_page::init();
            crate::mach_vm::vm_page::init_memory(0x600000, 0x700000);
            crate::mach_vm::pmap::init();
        }
    }

    fn with_current_process() -> alloc::sync::Arc<process::Process> {
        let proc = process::proc_create_root();
        process::set_current_process(alloc::sync::Arc::clone(&proc));
        proc
    }

    #[test]
    fn test_sys_getpid_returns_current_process_pid() {
        init_test_pages();
        let proc = with_current_process();
        let pid = sys_getpid().unwrap();
        assert_eq!(pid as u64, proc.pid.0);
    }

    #[test]
    fn test_sys_mmap_anon_then_munmap() {
        init_test_pages();
        with_current_process();
        let prot = (VmProt::READ | VmProt::WRITE).bits();
        let flags = crate::mach_vm::vm_map::VmAreaFlags::PRIVATE.bits()
            | crate::mach_vm::vm_map::VmAreaFlags::ANON.bits();

        let addr = sys_mmap(0, 4096 * 2, prot, flags, -1, 0).unwrap() as u64;
        assert_eq!(addr, user_mem_low_page() << PAGE_SHIFT);

        let ret = sys_munmap(addr, 4096 * 2).unwrap();
        assert_eq!(ret, 0);
    }

    #[test]
    fn test_sys_brk_grows_heap() {
        init_test_pages();
        let proc = with_current_process();
        let target = proc.get_brk() + 4096 * 3;
        let new_brk = sys_brk(target).unwrap() as u64;
        assert_eq!(new_brk, target);
    }

    #[test]
    fn test_sys_fork_without_thread_reports_error() {
        init_test_pages();
        with_current_process();
        let err = sys_fork().unwrap_err();
        matches!(err, TrapError::OutOfMemory);
    }

    #[test]
    fn test_sys_mmap_without_current_process_is_resource_not_found() {
        init_test_pages();
        process::clear_current_process();
        let err = sys_mmap(0, 4096, VmProt::READ.bits(), 0, -1, 0).unwrap_err();
        matches!(err, TrapError::ResourceNotFound);
    }
}
