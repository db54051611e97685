//! Virtual File System (VFS) layer
//! Provides unified interface for different filesystem types

use super::FilesystemType;
use heapless::{String, Vec};

/// File handle for VFS operations
#[derive(Debug, Clone, Copy)]
pub struct FileHandle(pub usize);

/// Directory handle for VFS operations
#[derive(Debug, Clone, Copy)]
pub struct DirHandle(pub usize);

/// File information structure
#[derive(Debug)]
pub struct FileInfo {
    pub name: String<256>,
    pub size: u64,
    pub is_directory: bool,
    pub readonly: bool,
}

/// File operation modes
#[derive(Debug, Clone, Copy)]
pub enum OpenMode {
    Read,
    Write,
    ReadWrite,
    Append,
}

/// VFS operations trait
pub trait VfsOperations {
    /// Open a file
    fn open(&mut self, path: &str, mode: OpenMode) -> Result<FileHandle, &'static str>;

    /// Close a file
    fn close(&mut self, handle: FileHandle) -> Result<(), &'static str>;

    /// Read from a file
    fn read(&mut self, handle: FileHandle, buffer: &mut [u8]) -> Result<usize, &'static str>;

    /// Write to a file
    fn write(&mut self, handle: FileHandle, data: &[u8]) -> Result<usize, &'static str>;

    /// Get file information
    fn stat(&self, path: &str) -> Result<FileInfo, &'static str>;

    /// Open directory
    fn opendir(&mut self, path: &str) -> Result<DirHandle, &'static str>;

    /// Read directory entry
    fn readdir(&mut self, handle: DirHandle) -> Result<Option<FileInfo>, &'static str>;

    /// Close directory
    fn closedir(&mut self, handle: DirHandle) -> Result<(), &'static str>;

    /// Create directory
    fn mkdir(&mut self, path: &str) -> Result<(), &'static str>;

    /// Remove file
    fn unlink(&mut self, path: &str) -> Result<(), &'static str>;

    /// Remove directory
    fn rmdir(&mut self, path: &str) -> Result<(), &'static str>;
}

/// VFS mount entry
#[derive(Debug)]
struct MountEntry {
    path: String<256>,
    fs_type: FilesystemType,
    // TODO: Add filesystem-specific data
}

/// Virtual File System implementation
pub struct Vfs {
    mounts: Vec<MountEntry, 16>,
    next_handle: usize,
    initialized: bool,
}

impl Vfs {
    /// Create a new VFS instance
    pub fn new() -> Self {
        Self {
            mounts: Vec::new(),
            next_handle: 1,
            initialized: false,
        }
    }

    /// Initialize the VFS
    pub fn init(&mut self) -> Result<(), &'static str> {
        if self.initialized {
            return Ok(());
        }

        // Create root mount point
        let mut root_path = String::new();
        root_path.push('/').map_err(|_| "Path creation failed")?;

        let root_mount = MountEntry {
            path: root_path,
            fs_type: FilesystemType::Fat32,
        };

        self.mounts
            .push(root_mount)
            .map_err(|_| "Failed to add root mount")?;
        self.initialized = true;
        Ok(())
    }

    /// Find the mount point for a given path
    fn find_mount(&self, path: &str) -> Result<&MountEntry, &'static str> {
        // Find the longest matching mount path
        let mut best_match: Option<&MountEntry> = None;
        let mut best_length = 0;

        for mount in &self.mounts {
            if path.starts_with(mount.path.as_str()) && mount.path.len() > best_length {
                best_match = Some(mount);
                best_length = mount.path.len();
            }
        }

        best_match.ok_or("No mount point found")
    }

    /// Get next available handle
    fn next_handle(&mut self) -> usize {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }
}

impl VfsOperations for Vfs {
    fn open(&mut self, path: &str, _mode: OpenMode) -> Result<FileHandle, &'static str> {
        if !self.initialized {
            return Err("VFS not initialized");
        }

        let _mount = self.find_mount(path)?;
        // TODO: Delegate to appropriate filesystem
        Ok(FileHandle(self.next_handle()))
    }

    fn close(&mut self, _handle: FileHandle) -> Result<(), &'static str> {
        // TODO: Implement file closing
        Ok(())
    }

    fn read(&mut self, _handle: FileHandle, _buffer: &mut [u8]) -> Result<usize, &'static str> {
        // TODO: Implement file reading
        Ok(0)
    }

    fn write(&mut self, _handle: FileHandle, _data: &[u8]) -> Result<usize, &'static str> {
        // TODO: Implement file writing
        Ok(0)
    }

    fn stat(&self, path: &str) -> Result<FileInfo, &'static str> {
        if !self.initialized {
            return Err("VFS not initialized");
        }

        let _mount = self.find_mount(path)?;

        // TODO: Get actual file info from filesystem
        let mut name = String::new();
        name.push_str("placeholder").map_err(|_| "Name too long")?;

        Ok(FileInfo {
            name,
            size: 0,
            is_directory: false,
            readonly: false,
        })
    }

    fn opendir(&mut self, path: &str) -> Result<DirHandle, &'static str> {
        if !self.initialized {
            return Err("VFS not initialized");
        }

        let _mount = self.find_mount(path)?;
        Ok(DirHandle(self.next_handle()))
    }

    fn readdir(&mut self, _handle: DirHandle) -> Result<Option<FileInfo>, &'static str> {
        // TODO: Implement directory reading
        Ok(None)
    }

    fn closedir(&mut self, _handle: DirHandle) -> Result<(), &'static str> {
        // TODO: Implement directory closing
        Ok(())
    }

    fn mkdir(&mut self, _path: &str) -> Result<(), &'static str> {
        // TODO: Implement directory creation
        Ok(())
    }

    fn unlink(&mut self, _path: &str) -> Result<(), &'static str> {
        // TODO: Implement file removal
        Ok(())
    }

    fn rmdir(&mut self, _path: &str) -> Result<(), &'static str> {
        // TODO: Implement directory removal
        Ok(())
    }
}

static mut VFS: Option<Vfs> = None;

/// Initialize the VFS subsystem
pub fn init() -> Result<(), &'static str> {
    let mut vfs = Vfs::new();
    vfs.init()?;

    unsafe {
        VFS = Some(vfs);
    }

    Ok(())
}

/// Get the global VFS instance
pub fn get_vfs() -> Option<&'static mut Vfs> {
    unsafe { (*core::ptr::addr_of_mut!(VFS)).as_mut() }
}
