//! Namespace discovery for block devices and image files.

use nix::libc;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::Path;
use wrc_core::Namespace;

/// Rings the driver is willing to create.
pub const MAX_QUEUES: u32 = 64;

/// Submission entries per ring.
pub const QUEUE_SIZE: u32 = 256;

/// Largest single transfer.
pub const MAX_TRANSFER_BYTES: u32 = 128 * 1024;

/// Block size assumed for regular files.
pub const FILE_BLOCK_SIZE: u32 = 512;

const PAGE_BYTES: u32 = 4096;

nix::ioctl_read!(blk_get_size64, 0x12, 114, u64);
nix::ioctl_read_bad!(blk_ssz_get, nix::request_code_none!(0x12, 104), libc::c_int);

/// Open `path` for direct I/O, falling back to buffered I/O where the
/// filesystem refuses `O_DIRECT`. Returns the file and whether it is direct.
///
/// Regular files are always opened buffered: their 512-byte blocks need not
/// match the logical block size of the filesystem's backing device.
pub fn open(path: &Path, writable: bool) -> io::Result<(File, bool)> {
    let mut options = OpenOptions::new();
    options.read(true).write(writable);

    if std::fs::metadata(path)?.is_file() {
        return options.open(path).map(|file| (file, false));
    }

    match options.clone().custom_flags(libc::O_DIRECT).open(path) {
        Ok(file) => Ok((file, true)),
        Err(e) if e.raw_os_error() == Some(libc::EINVAL) => {
            tracing::warn!(path = %path.display(), "O_DIRECT unsupported, using buffered I/O");
            options.open(path).map(|file| (file, false))
        }
        Err(e) => Err(e),
    }
}

/// Describe the namespace behind an opened file.
pub fn namespace(file: &File, name: &str) -> io::Result<Namespace> {
    let metadata = file.metadata()?;
    let (block_size, bytes) = if metadata.file_type().is_block_device() {
        let fd = file.as_raw_fd();
        let mut bytes = 0u64;
        let mut ssz: libc::c_int = 0;
        // SAFETY: fd is open for the duration of both calls and the out
        // pointers reference live locals of the ioctl's declared type.
        unsafe {
            blk_get_size64(fd, &mut bytes).map_err(io::Error::from)?;
            blk_ssz_get(fd, &mut ssz).map_err(io::Error::from)?;
        }
        let block_size = u32::try_from(ssz)
            .ok()
            .filter(|&bs| bs >= 512 && bs.is_power_of_two())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, format!("bad sector size {ssz}")))?;
        (block_size, bytes)
    } else if metadata.is_file() {
        (FILE_BLOCK_SIZE, metadata.len())
    } else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a block device or regular file",
        ));
    };

    Ok(describe(name, block_size, bytes))
}

/// Capabilities for a device of `bytes` bytes in `block_size` blocks.
#[must_use]
pub fn describe(name: &str, block_size: u32, bytes: u64) -> Namespace {
    Namespace {
        device: name.to_string(),
        block_size,
        block_count: bytes / u64::from(block_size),
        queue_count: MAX_QUEUES,
        queue_size: QUEUE_SIZE,
        max_blocks_per_io: (MAX_TRANSFER_BYTES / block_size).max(1),
        blocks_per_page: (PAGE_BYTES / block_size).max(1),
    }
}
