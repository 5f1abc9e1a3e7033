//! Named POSIX semaphores, used as cross-process mutexes (initial value 1).
//!
//! The supervisor creates every semaphore the hub needs; attaching processes
//! open them by name and fail fast if the supervisor never ran.

use std::ffi::CString;

use nix::errno::Errno;

use crate::ShmError;

pub struct NamedSem {
    sem: *mut libc::sem_t,
}

// sem_wait/sem_post are thread-safe on the same sem_t.
unsafe impl Send for NamedSem {}
unsafe impl Sync for NamedSem {}

fn sem_name(name: &str) -> Result<CString, ShmError> {
    let full = if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{name}")
    };
    CString::new(full).map_err(|_| ShmError::Missing {
        name: name.to_string(),
    })
}

impl NamedSem {
    /// Creates the semaphore (exclusive) with value 1.
    pub fn create(name: &str) -> Result<Self, ShmError> {
        let cname = sem_name(name)?;
        let sem = unsafe {
            libc::sem_open(
                cname.as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                (libc::S_IRUSR | libc::S_IWUSR) as libc::c_uint,
                1u32,
            )
        };
        if sem == libc::SEM_FAILED {
            return Err(match Errno::last() {
                Errno::EEXIST => ShmError::AlreadyExists {
                    name: name.to_string(),
                },
                errno => ShmError::Os {
                    op: "sem_open",
                    name: name.to_string(),
                    errno,
                },
            });
        }
        Ok(Self { sem })
    }

    /// Opens an existing semaphore; fails if the supervisor never created it.
    pub fn open(name: &str) -> Result<Self, ShmError> {
        let cname = sem_name(name)?;
        let sem = unsafe { libc::sem_open(cname.as_ptr(), 0) };
        if sem == libc::SEM_FAILED {
            return Err(match Errno::last() {
                Errno::ENOENT => ShmError::Missing {
                    name: name.to_string(),
                },
                errno => ShmError::Os {
                    op: "sem_open",
                    name: name.to_string(),
                    errno,
                },
            });
        }
        Ok(Self { sem })
    }

    /// Removes the semaphore's name. Open handles stay valid.
    pub fn unlink(name: &str) -> Result<(), ShmError> {
        let cname = sem_name(name)?;
        let rc = unsafe { libc::sem_unlink(cname.as_ptr()) };
        if rc == 0 || Errno::last() == Errno::ENOENT {
            Ok(())
        } else {
            Err(ShmError::Os {
                op: "sem_unlink",
                name: name.to_string(),
                errno: Errno::last(),
            })
        }
    }

    /// Acquires the semaphore, returning a guard that releases on drop.
    pub fn lock(&self) -> SemGuard<'_> {
        loop {
            let rc = unsafe { libc::sem_wait(self.sem) };
            if rc == 0 {
                return SemGuard { sem: self };
            }
            let errno = Errno::last();
            if errno != Errno::EINTR {
                // sem_wait on an open unbounded-wait semaphore can only
                // fail with EINTR; anything else means the handle itself
                // is broken and no caller could make progress
                unreachable!("sem_wait failed: {errno}");
            }
        }
    }
}

impl Drop for NamedSem {
    fn drop(&mut self) {
        unsafe {
            let _ = libc::sem_close(self.sem);
        }
    }
}

/// Holds the semaphore; posting happens on drop.
pub struct SemGuard<'a> {
    sem: &'a NamedSem,
}

impl Drop for SemGuard<'_> {
    fn drop(&mut self) {
        unsafe {
            let _ = libc::sem_post(self.sem.sem);
        }
    }
}
