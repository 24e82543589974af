//! Privilege drop and daemonization: run once, before the runtime core ever
//! constructs a channel set.
//!
//! Unix-only, using `libc` directly for the raw syscalls involved.

use crate::error::StartupError;

/// Drop privileges to the named user via `setuid`/`setgid`, looked up
/// through `getpwnam`. A no-op (returns `Ok`) when `enabled` is false.
#[cfg(unix)]
pub fn drop_privileges(enabled: bool, user: &str) -> Result<(), StartupError> {
    if !enabled {
        return Ok(());
    }

    let cname = std::ffi::CString::new(user)
        .map_err(|_| StartupError::Config(format!("invalid user name {user:?}")))?;

    let passwd = unsafe { libc::getpwnam(cname.as_ptr()) };
    if passwd.is_null() {
        return Err(StartupError::Config(format!("no such user {user:?}")));
    }
    let (uid, gid) = unsafe { ((*passwd).pw_uid, (*passwd).pw_gid) };

    let rc = unsafe { libc::setgid(gid) };
    if rc != 0 {
        return Err(StartupError::Config(format!("setgid({gid}) failed")));
    }
    let rc = unsafe { libc::setuid(uid) };
    if rc != 0 {
        return Err(StartupError::Config(format!("setuid({uid}) failed")));
    }

    Ok(())
}

#[cfg(not(unix))]
pub fn drop_privileges(_enabled: bool, _user: &str) -> Result<(), StartupError> {
    Ok(())
}

/// Classic double-fork daemonize: detach from the controlling terminal, put
/// the process in its own session, and fork again so it can never reacquire
/// one. A no-op when `enabled` is false (the `--foreground` CLI flag forces
/// this).
#[cfg(unix)]
pub fn daemonize(enabled: bool) -> Result<(), StartupError> {
    if !enabled {
        return Ok(());
    }

    unsafe {
        match libc::fork() {
            -1 => return Err(StartupError::Config("fork failed".to_string())),
            0 => {}
            _ => std::process::exit(0),
        }

        if libc::setsid() == -1 {
            return Err(StartupError::Config("setsid failed".to_string()));
        }

        match libc::fork() {
            -1 => return Err(StartupError::Config("fork failed".to_string())),
            0 => {}
            _ => std::process::exit(0),
        }

        libc::close(0);
        libc::close(1);
        libc::close(2);
    }

    Ok(())
}

#[cfg(not(unix))]
pub fn daemonize(_enabled: bool) -> Result<(), StartupError> {
    Ok(())
}

/// `SIGPIPE` is ignored at startup so that a client closing its read end
/// mid-write surfaces as a normal `EPIPE`/`BrokenPipe` I/O error instead of
/// terminating the process.
#[cfg(unix)]
pub fn ignore_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}

#[cfg(not(unix))]
pub fn ignore_sigpipe() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_privilege_drop_is_a_no_op() {
        assert!(drop_privileges(false, "nonexistent-user").is_ok());
    }

    #[test]
    fn disabled_daemonize_is_a_no_op() {
        assert!(daemonize(false).is_ok());
    }
}
