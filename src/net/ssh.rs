//! SSH server integration 
//! Pure Rust SSH implementation for Mach_R (internal implementation)

use heapless::String;

/// SSH server configuration
#[derive(Debug)]
pub struct SshConfig {
    /// Port to listen on
    pub port: u16,
    /// Host key path
    pub host_key: String<256>,
    /// Maximum connections
    pub max_connections: usize,
}

impl Default for SshConfig {
    fn default() -> Self {
        let mut host_key = String::new();
        host_key.push_str("/etc/ssh/ssh_host_ed25519_key").ok();
        
        Self {
            port: 22,
            host_key,
            max_connections: 10,
        }
    }
}

/// SSH server state
pub struct SshServer {
    config: SshConfig,
    active: bool,
}

impl SshServer {
    /// Create a new SSH server instance
    pub fn new(config: SshConfig) -> Self {
        Self {
            config,
            active: false,
        }
    }
    
    /// Start the SSH server
    pub fn start(&mut self) -> Result<(), &'static str> {
        if self.active {
            return Err("SSH server already running");
        }
        
        // TODO: Implement actual SSH server startup with Makiko
        // This would involve:
        // 1. Loading host keys
        // 2. Setting up socket listener
        // 3. Handling incoming connections
        // 4. Authentication and session management
        
        self.active = true;
        Ok(())
    }
    
    /// Stop the SSH server
    pub fn stop(&mut self) {
        self.active = false;
    }
    
    /// Check if server is running
    pub fn is_active(&self) -> bool {
        self.active
    }
}

static mut SSH_SERVER: Option<SshServer> = None;

/// Initialize the SSH subsystem
pub fn init() -> Result<(), &'static str> {
    let config = SshConfig::default();
    let mut server = SshServer::new(config);
    server.start()?;
    
    unsafe {
        SSH_SERVER = Some(server);
    }
    
    Ok(())
}