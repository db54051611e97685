//! Process supervisor for managing child processes
//! Handles process creation, monitoring, and cleanup

use heapless::{Vec, FnvIndexMap};
use super::MAX_PROCESSES;

/// Process information
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    /// Process ID
    pub pid: u32,
    /// Command line
    pub command: heapless::String<256>,
    /// Process state
    pub state: ProcessState,
    /// Exit code (if terminated)
    pub exit_code: Option<i32>,
    /// Start time
    pub start_time: u64,
}

/// Process state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProcessState {
    /// Process is running
    Running,
    /// Process has exited
    Exited,
    /// Process was killed by signal
    Killed,
    /// Process state unknown
    Unknown,
}

/// Process supervisor
pub struct ProcessSupervisor {
    /// Active processes
    processes: Vec<ProcessInfo, MAX_PROCESSES>,
    /// Process ID to index mapping
    pid_index: FnvIndexMap<u32, usize, MAX_PROCESSES>,
    /// Next available PID
    next_pid: u32,
}

impl ProcessSupervisor {
    /// Create a new process supervisor
    pub fn new() -> Self {
        Self {
            processes: Vec::new(),
            pid_index: FnvIndexMap::new(),
            next_pid: 1,
        }
    }
    
    /// Start a new process
    pub fn start_process(
        &mut self,
        command: &str,
        env: &FnvIndexMap<heapless::String<32>, heapless::String<128>, 16>,
    ) -> Result<u32, &'static str> {
        // TODO: Implement actual process creation
        // This would involve:
        // 1. Parse command line
        // 2. Set up process environment
        // 3. Create new task/thread
        // 4. Execute the command
        
        let pid = self.next_pid;
        self.next_pid += 1;
        
        let mut cmd_string = heapless::String::new();
        cmd_string.push_str(command).map_err(|_| "Command too long")?;
        
        let process_info = ProcessInfo {
            pid,
            command: cmd_string,
            state: ProcessState::Running,
            exit_code: None,
            start_time: get_timestamp(),
        };
        
        let index = self.processes.len();
        self.processes.push(process_info).map_err(|_| "Too many processes")?;
        self.pid_index.insert(pid, index).map_err(|_| "PID index full")?;
        
        Ok(pid)
    }
    
    /// Stop a process by sending termination signal
    pub fn stop_process(&mut self, pid: u32) -> Result<(), &'static str> {
        let index = self.find_process_index(pid)?;
        let process = &mut self.processes[index];
        
        if process.state != ProcessState::Running {
            return Err("Process not running");
        }
        
        // TODO: Send actual signal to process
        // For now, just mark as killed
        process.state = ProcessState::Killed;
        process.exit_code = Some(128 + 15); // SIGTERM
        
        Ok(())
    }
    
    /// Kill a process forcefully
    pub fn kill_process(&mut self, pid: u32) -> Result<(), &'static str> {
        let index = self.find_process_index(pid)?;
        let process = &mut self.processes[index];
        
        // TODO: Send SIGKILL to process
        process.state = ProcessState::Killed;
        process.exit_code = Some(128 + 9); // SIGKILL
        
        Ok(())
    }
    
    /// Wait for process to exit
    pub fn wait_process(&mut self, pid: u32) -> Result<i32, &'static str> {
        let index = self.find_process_index(pid)?;
        let process = &self.processes[index];
        
        match process.state {
            ProcessState::Running => Err("Process still running"),
            ProcessState::Exited | ProcessState::Killed => {
                Ok(process.exit_code.unwrap_or(-1))
            }
            ProcessState::Unknown => Err("Process state unknown"),
        }
    }
    
    /// Check for dead children and reap them
    pub fn reap_children(&mut self) -> Result<Vec<(u32, i32), 32>, &'static str> {
        let mut reaped = Vec::new();
        
        // TODO: Actually check for dead processes using waitpid or similar
        // For now, simulate some processes finishing
        
        for i in 0..self.processes.len() {
            let process = &mut self.processes[i];
            if process.state == ProcessState::Running {
                // Simulate random process termination for demo
                // In real implementation, this would check actual process status
                if (process.pid % 10) == 0 && get_timestamp() % 1000 == 0 {
                    process.state = ProcessState::Exited;
                    process.exit_code = Some(0);
                    reaped.push((process.pid, 0)).map_err(|_| "Too many reaped processes")?;
                }
            }
        }
        
        Ok(reaped)
    }
    
    /// Get process information
    pub fn get_process_info(&self, pid: u32) -> Result<&ProcessInfo, &'static str> {
        let index = self.find_process_index(pid)?;
        Ok(&self.processes[index])
    }
    
    /// List all processes
    pub fn list_processes(&self) -> &Vec<ProcessInfo, MAX_PROCESSES> {
        &self.processes
    }
    
    /// Find process index by PID
    fn find_process_index(&self, pid: u32) -> Result<usize, &'static str> {
        self.pid_index.get(&pid)
            .copied()
            .ok_or("Process not found")
    }
    
    /// Get process count by state
    pub fn count_processes_by_state(&self, state: ProcessState) -> usize {
        self.processes.iter()
            .filter(|p| p.state == state)
            .count()
    }
    
    /// Clean up terminated processes
    pub fn cleanup_terminated(&mut self) -> Result<usize, &'static str> {
        let mut cleanup_count = 0;
        let mut i = 0;
        
        while i < self.processes.len() {
            let process = &self.processes[i];
            if process.state == ProcessState::Exited || process.state == ProcessState::Killed {
                // Remove from PID index
                self.pid_index.remove(&process.pid);
                // Remove from process list
                self.processes.swap_remove(i);
                cleanup_count += 1;
            } else {
                i += 1;
            }
        }
        
        // Rebuild PID index since indices may have changed
        self.pid_index.clear();
        for (index, process) in self.processes.iter().enumerate() {
            self.pid_index.insert(process.pid, index)
                .map_err(|_| "Failed to rebuild PID index")?;
        }
        
        Ok(cleanup_count)
    }
    
    /// Get system load information
    pub fn get_load_info(&self) -> LoadInfo {
        let running = self.count_processes_by_state(ProcessState::Running);
        let total = self.processes.len();
        
        LoadInfo {
            running_processes: running,
            total_processes: total,
            load_average: calculate_load_average(running),
        }
    }
}

/// System load information
#[derive(Debug)]
pub struct LoadInfo {
    pub running_processes: usize,
    pub total_processes: usize,
    pub load_average: f32,
}

/// Calculate system load average (simplified)
fn calculate_load_average(running_processes: usize) -> f32 {
    // TODO: Implement proper load average calculation
    running_processes as f32 / 100.0
}

/// Get current timestamp
fn get_timestamp() -> u64 {
    // TODO: Get actual system timestamp
    static mut COUNTER: u64 = 0;
    unsafe {
        COUNTER += 1;
        COUNTER
    }
}