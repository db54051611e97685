//! Continuation-Based Context Switching
//!
//! Based on Mach4 kern/sched_prim.c continuation model
//!
//! Continuations are the key optimization in Mach that allows threads to block
//! without saving their entire register state. Instead of a full context save,
//! the thread specifies a continuation function to be called when it resumes.
//!
//! ## How Continuations Work
//!
//! 1. Thread calls thread_block(continuation)
//! 2. Kernel saves minimal state (just the continuation pointer)
//! 3. When the thread is woken, it jumps directly to the continuation
//! 4. The continuation runs on a fresh stack, no register restore needed
//!
//! This is dramatically more efficient than full context switches, especially
//! for operations like IPC where the thread knows exactly where it will resume.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use spin::Mutex;

use crate::types::ThreadId;

// ============================================================================
// Continuation Type
// ============================================================================

/// A continuation function that takes a result parameter and never returns
///
/// In Mach, continuations are functions that:
/// - Take a single parameter (usually the wait result)
/// - Never return (they end by calling thread_block again or thread_terminate)
pub type Continuation = fn(result: WaitResult) -> !;

/// A continuation that takes a generic context pointer
pub type ContinuationWithContext = fn(context: *mut u8, result: WaitResult) -> !;

// ============================================================================
// Wait Result
// ============================================================================

/// Result passed to continuation when thread resumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum WaitResult {
    /// Thread woken normally (event occurred)
    Success = 0,
    /// Thread woken by timeout expiring
    TimedOut = 1,
    /// Thread woken by interrupt/signal
    Interrupted = 2,
    /// Thread woken because wait was aborted
    Aborted = 3,
    /// Thread woken but must restart operation
    Restart = 4,
}

impl Default for WaitResult {
    fn default() -> Self {
        WaitResult::Success
    }
}

// ============================================================================
// Block Reason
// ============================================================================

/// Reason why a thread is blocking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum BlockReason {
    /// No block reason (shouldn't be blocked)
    None = 0,
    /// Blocked waiting for IPC message
    IpcWait = 1,
    /// Blocked waiting on a port
    PortWait = 2,
    /// Blocked waiting for arbitrary event
    EventWait = 3,
    /// Blocked waiting for timer
    TimerWait = 4,
    /// Blocked because suspended
    Suspended = 5,
    /// Blocked during termination
    Terminated = 6,
    /// Blocked waiting for mutex/lock
    MutexWait = 7,
    /// Blocked waiting for semaphore
    SemaphoreWait = 8,
    /// Blocked waiting for page fault resolution
    PageFaultWait = 9,
}

impl Default for BlockReason {
    fn default() -> Self {
        BlockReason::None
    }
}

// ============================================================================
// Continuation Frame
// ============================================================================

/// Frame storing continuation state for a blocked thread
#[derive(Debug)]
pub struct ContinuationFrame {
    /// The continuation function to call when resumed
    pub continuation: Option<Continuation>,
    /// Optional context pointer passed to continuation (as usize for Send/Sync)
    pub context: usize,
    /// The event being waited on (if any)
    pub wait_event: u64,
    /// Reason for blocking
    pub block_reason: BlockReason,
    /// Result to pass when waking
    pub wait_result: WaitResult,
    /// Is this frame valid?
    pub valid: bool,
}

// SAFETY: ContinuationFrame is only accessed from kernel context with proper locking
unsafe impl Send for ContinuationFrame {}
unsafe impl Sync for ContinuationFrame {}

impl ContinuationFrame {
    /// Create an empty frame
    pub const fn empty() -> Self {
        Self {
            continuation: None,
            context: 0,
            wait_event: 0,
            block_reason: BlockReason::None,
            wait_result: WaitResult::Success,
            valid: false,
        }
    }

    /// Create a frame with continuation
    pub fn new(continuation: Continuation, event: u64, reason: BlockReason) -> Self {
        Self {
            continuation: Some(continuation),
            context: 0,
            wait_event: event,
            block_reason: reason,
            wait_result: WaitResult::Success,
            valid: true,
        }
    }

    /// Create a frame with context
    pub fn with_context(
        continuation: Continuation,
        context: usize,
        event: u64,
        reason: BlockReason,
    ) -> Self {
        Self {
            continuation: Some(continuation),
            context,
            wait_event: event,
            block_reason: reason,
            wait_result: WaitResult::Success,
            valid: true,
        }
    }

    /// Mark frame as invalid
    pub fn invalidate(&mut self) {
        self.valid = false;
        self.continuation = None;
    }

    /// Set the wait result
    pub fn set_result(&mut self, result: WaitResult) {
        self.wait_result = result;
    }
}

impl Default for ContinuationFrame {
    fn default() -> Self {
        Self::empty()
    }
}

// ============================================================================
// Thread Continuation State
// ============================================================================

/// Continuation state stored in each thread
#[derive(Debug)]
pub struct ThreadContinuationState {
    /// Current continuation frame (if thread is blocked)
    frame: Mutex<ContinuationFrame>,
    /// Is thread currently blocked with a continuation?
    is_blocked: AtomicBool,
    /// Deadline for timeout (absolute time)
    deadline: AtomicU64,
    /// Has the timeout expired?
    timeout_expired: AtomicBool,
}

impl ThreadContinuationState {
    /// Create new continuation state
    pub const fn new() -> Self {
        Self {
            frame: Mutex::new(ContinuationFrame::empty()),
            is_blocked: AtomicBool::new(false),
            deadline: AtomicU64::new(0),
            timeout_expired: AtomicBool::new(false),
        }
    }

    /// Check if thread is blocked with continuation
    pub fn is_blocked(&self) -> bool {
        self.is_blocked.load(Ordering::SeqCst)
    }

    /// Get the wait event
    pub fn wait_event(&self) -> u64 {
        self.frame.lock().wait_event
    }

    /// Get the block reason
    pub fn block_reason(&self) -> BlockReason {
        self.frame.lock().block_reason
    }

    /// Set up a continuation for blocking
    pub fn setup_continuation(&self, continuation: Continuation, event: u64, reason: BlockReason) {
        let mut frame = self.frame.lock();
        *frame = ContinuationFrame::new(continuation, event, reason);
        self.is_blocked.store(true, Ordering::SeqCst);
    }

    /// Set up a continuation with context
    pub fn setup_continuation_with_context(
        &self,
        continuation: Continuation,
        context: usize,
        event: u64,
        reason: BlockReason,
    ) {
        let mut frame = self.frame.lock();
        *frame = ContinuationFrame::with_context(continuation, context, event, reason);
        self.is_blocked.store(true, Ordering::SeqCst);
    }

    /// Set timeout deadline
    pub fn set_deadline(&self, deadline: u64) {
        self.deadline.store(deadline, Ordering::SeqCst);
        self.timeout_expired.store(false, Ordering::SeqCst);
    }

    /// Clear timeout
    pub fn clear_deadline(&self) {
        self.deadline.store(0, Ordering::SeqCst);
    }

    /// Mark timeout as expired
    pub fn expire_timeout(&self) {
        self.timeout_expired.store(true, Ordering::SeqCst);
    }

    /// Check if timeout expired
    pub fn is_timeout_expired(&self) -> bool {
        self.timeout_expired.load(Ordering::SeqCst)
    }

    /// Get deadline
    pub fn deadline(&self) -> u64 {
        self.deadline.load(Ordering::SeqCst)
    }

    /// Clear the continuation (thread is no longer blocked)
    pub fn clear(&self, result: WaitResult) {
        {
            let mut frame = self.frame.lock();
            frame.set_result(result);
            frame.invalidate();
        }
        self.is_blocked.store(false, Ordering::SeqCst);
    }

    /// Get continuation and clear (for invoking)
    pub fn take_continuation(&self) -> Option<(Continuation, WaitResult)> {
        let mut frame = self.frame.lock();
        if frame.valid {
            let cont = frame.continuation.take();
            let result = frame.wait_result;
            frame.valid = false;
            self.is_blocked.store(false, Ordering::SeqCst);
            cont.map(|c| (c, result))
        } else {
            None
        }
    }
}

impl Default for ThreadContinuationState {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Continuation Operations
// ============================================================================

/// Assert that current thread will wait on event
///
/// This sets up the thread to block on the given event. The actual blocking
/// happens when thread_block() is called.
///
/// # Arguments
/// * `event` - The event to wait on (typically an address)
/// * `interruptible` - Whether the wait can be interrupted
pub fn assert_wait(event: u64, interruptible: bool) {
    // Get current thread's continuation state
    // In a full implementation, this would access the current thread structure
    let _ = (event, interruptible);
    // thread.continuation_state.setup_wait(event, interruptible);
}

/// Assert wait with deadline
pub fn assert_wait_deadline(event: u64, deadline: u64, interruptible: bool) {
    let _ = (event, deadline, interruptible);
    // Similar to assert_wait but also sets timeout
}

/// Clear a thread's wait condition
///
/// This is called when an event occurs to wake up waiting threads.
///
/// # Arguments
/// * `thread_id` - Thread to clear wait for
/// * `result` - Result to pass to the continuation
pub fn clear_wait(thread_id: ThreadId, result: WaitResult) {
    let _ = (thread_id, result);
    // Get thread by ID
    // thread.continuation_state.clear(result);
    // Make thread runnable
}

/// Block current thread with continuation
///
/// This is the main entry point for blocking. The thread will:
/// 1. Save the continuation
/// 2. Switch to another thread
/// 3. When woken, jump to the continuation
///
/// # Arguments
/// * `continuation` - Function to call when resumed
///
/// # Returns
/// This function never returns! The continuation is called instead.
pub fn thread_block(continuation: Continuation) -> ! {
    // In a full implementation:
    // 1. Save continuation in current thread
    // 2. Call scheduler to pick next thread
    // 3. Context switch to new thread
    // 4. When this thread is woken, jump to continuation

    // For now, just call the continuation directly (won't work in real kernel)
    continuation(WaitResult::Success)
}

/// Block with reason
pub fn thread_block_reason(continuation: Continuation, reason: BlockReason) -> ! {
    let _ = reason;
    thread_block(continuation)
}

/// Wake up one thread waiting on event
pub fn thread_wakeup_one(event: u64) {
    let _ = event;
    // Find one thread waiting on this event
    // Clear its wait and make it runnable
}

/// Wake up all threads waiting on event
pub fn thread_wakeup_all(event: u64) {
    let _ = event;
    // Find all threads waiting on this event
    // Clear their waits and make them runnable
}

/// Check if current thread has a continuation set
pub fn has_continuation() -> bool {
    // Get current thread
    // return thread.continuation_state.has_continuation()
    false
}

/// Invoke continuation for a thread
///
/// # Safety
/// This is unsafe because it manipulates the stack and never returns.
pub unsafe fn invoke_continuation(continuation: Continuation, result: WaitResult) -> ! {
    // In a real implementation, this would:
    // 1. Switch to a clean kernel stack for the thread
    // 2. Call the continuation with the result
    continuation(result)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continuation_frame() {
        fn test_continuation(_result: WaitResult) -> ! {
            loop {}
        }

        let frame = ContinuationFrame::new(test_continuation, 0x1234, BlockReason::IpcWait);
        assert!(frame.valid);
        assert!(frame.continuation.is_some());
        assert_eq!(frame.wait_event, 0x1234);
        assert_eq!(frame.block_reason, BlockReason::IpcWait);
    }

    #[test]
    fn test_thread_continuation_state() {
        fn test_continuation(_result: WaitResult) -> ! {
            loop {}
        }

        let state = ThreadContinuationState::new();
        assert!(!state.is_blocked());

        state.setup_continuation(test_continuation, 0x5678, BlockReason::MutexWait);
        assert!(state.is_blocked());
        assert_eq!(state.wait_event(), 0x5678);
        assert_eq!(state.block_reason(), BlockReason::MutexWait);

        state.clear(WaitResult::Success);
        assert!(!state.is_blocked());
    }

    #[test]
    fn test_wait_result() {
        assert_eq!(WaitResult::default(), WaitResult::Success);
        assert_eq!(WaitResult::TimedOut as u32, 1);
        assert_eq!(WaitResult::Interrupted as u32, 2);
    }
}
