//! POSIX shared-memory mapping, without ownership of the backing object.
//!
//! The backing objects under `/dev/shm` are created and unlinked only by the
//! supervisor ([`crate::supervisor`]); every other process just maps and
//! unmaps. Dropping a [`SharedRegion`] therefore never unlinks.

use std::ffi::CString;
use std::num::NonZeroUsize;
use std::os::fd::{IntoRawFd, RawFd};
use std::ptr::NonNull;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{MapFlags, ProtFlags, mmap, munmap, shm_open, shm_unlink};
use nix::sys::stat::Mode;
use nix::unistd::{close, ftruncate};

use crate::ShmError;

#[derive(Debug)]
pub struct SharedRegion {
    ptr: NonNull<u8>,
    size: usize,
    fd: RawFd,
}

// Access to the mapping is serialized by the hub's named semaphores.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

fn object_name(name: &str) -> Result<CString, ShmError> {
    let full = if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{name}")
    };
    CString::new(full).map_err(|_| ShmError::Missing {
        name: name.to_string(),
    })
}

impl SharedRegion {
    /// Creates the backing object (exclusive), sizes it, and maps it.
    /// The fresh object reads as all zeroes.
    pub fn create(name: &str, size: usize) -> Result<Self, ShmError> {
        let cname = object_name(name)?;
        let fd = shm_open(
            cname.as_c_str(),
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )
        .map_err(|errno| match errno {
            Errno::EEXIST => ShmError::AlreadyExists {
                name: name.to_string(),
            },
            errno => ShmError::Os {
                op: "shm_open",
                name: name.to_string(),
                errno,
            },
        })?;

        if let Err(errno) = ftruncate(&fd, size as i64) {
            drop(fd);
            let _ = shm_unlink(cname.as_c_str());
            return Err(ShmError::Os {
                op: "ftruncate",
                name: name.to_string(),
                errno,
            });
        }

        Self::map(fd, cname, name, size, true)
    }

    /// Maps an existing object; fails if the supervisor never created it.
    pub fn open(name: &str, size: usize) -> Result<Self, ShmError> {
        let cname = object_name(name)?;
        let fd = shm_open(cname.as_c_str(), OFlag::O_RDWR, Mode::empty()).map_err(|errno| {
            match errno {
                Errno::ENOENT => ShmError::Missing {
                    name: name.to_string(),
                },
                errno => ShmError::Os {
                    op: "shm_open",
                    name: name.to_string(),
                    errno,
                },
            }
        })?;
        Self::map(fd, cname, name, size, false)
    }

    fn map(
        fd: std::os::fd::OwnedFd,
        cname: CString,
        name: &str,
        size: usize,
        created: bool,
    ) -> Result<Self, ShmError> {
        let len = NonZeroUsize::new(size).ok_or(ShmError::Os {
            op: "mmap",
            name: name.to_string(),
            errno: Errno::EINVAL,
        })?;
        let ptr = match unsafe {
            mmap(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                &fd,
                0,
            )
        } {
            Ok(p) => p,
            Err(errno) => {
                drop(fd);
                if created {
                    let _ = shm_unlink(cname.as_c_str());
                }
                return Err(ShmError::Os {
                    op: "mmap",
                    name: name.to_string(),
                    errno,
                });
            }
        };
        Ok(Self {
            // mmap never returns null on success
            ptr: unsafe { NonNull::new_unchecked(ptr.as_ptr().cast()) },
            size,
            fd: fd.into_raw_fd(),
        })
    }

    /// Removes the backing object's name. Existing mappings stay valid.
    pub fn unlink(name: &str) -> Result<(), ShmError> {
        let cname = object_name(name)?;
        match shm_unlink(cname.as_c_str()) {
            Ok(()) | Err(Errno::ENOENT) => Ok(()),
            Err(errno) => Err(ShmError::Os {
                op: "shm_unlink",
                name: name.to_string(),
                errno,
            }),
        }
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.ptr.cast(), self.size);
        }
        let _ = close(self.fd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_open_share_bytes() {
        let name = format!("lowcar-region-test-{}", std::process::id());
        let a = SharedRegion::create(&name, 4096).unwrap();
        unsafe { std::ptr::write_volatile(a.as_ptr(), 0xA5u8) };
        let b = SharedRegion::open(&name, 4096).unwrap();
        assert_eq!(unsafe { std::ptr::read_volatile(b.as_ptr()) }, 0xA5);
        drop(b);
        drop(a);
        SharedRegion::unlink(&name).unwrap();
    }

    #[test]
    fn open_without_create_is_missing() {
        let err = SharedRegion::open("lowcar-region-test-missing", 4096).unwrap_err();
        assert!(matches!(err, ShmError::Missing { .. }));
    }

    #[test]
    fn double_create_is_rejected() {
        let name = format!("lowcar-region-test-dup-{}", std::process::id());
        let _a = SharedRegion::create(&name, 4096).unwrap();
        assert!(matches!(
            SharedRegion::create(&name, 4096),
            Err(ShmError::AlreadyExists { .. })
        ));
        SharedRegion::unlink(&name).unwrap();
    }
}
