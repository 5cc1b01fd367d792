//! Process handle ("Process: spawn + wait, inherits/creates
//! stdio"). `Stdio` enumerates the per-fd disposition the original
//! `child_process.cc` offers (ignore/inherit/create-pipe/inherit-fd), plus
//! an IPC slot for the one pipe that's also wired into the stream engine
//! and the host's out-of-band message channel.

use std::ffi::CString;
use std::io;
use std::os::fd::{FromRawFd, OwnedFd};

use crate::error::{Error, Result};
use crate::evloop::Loop;
use crate::handle::{Handle, HandleId, HandleKind, HandlePayload};
use crate::handles::pipe;

pub type ExitCallback = Box<dyn FnMut(&mut crate::evloop::Loop, crate::handle::HandleId, i64, i32)>;

#[derive(Debug, Clone, Copy)]
pub enum Stdio {
    /// fd closed in the child.
    Ignore,
    /// child shares the parent's fd verbatim.
    Inherit,
    /// a new pipe is created; the parent end becomes a stream handle.
    PipeCreate { readable: bool, writable: bool },
    /// child's fd is dup2'd from an explicit fd the host already owns.
    FdInherit(i32),
    /// like `PipeCreate`, but frames written/read carry this core's own
    /// length-prefixed protocol rather than raw bytes (used for the one
    /// slot the host reserves for IPC with a spawned worker).
    Ipc,
}

pub struct ProcessState {
    pub pid: Option<i32>,
    pub stdio: Vec<Stdio>,
    pub exit_cb: Option<ExitCallback>,
    pub exit_status: Option<(i64, i32)>,
}

impl ProcessState {
    pub fn new(stdio: Vec<Stdio>) -> ProcessState {
        ProcessState { pid: None, stdio, exit_cb: None, exit_status: None }
    }
}

/// Spawns `path` with `args` under `posix_spawn`, honoring each stdio slot's
/// disposition via `posix_spawn_file_actions` (dup2-equivalent; grounded on
/// the original's `dup2(pipe[1], STDOUT_FILENO)` pattern, done here through
/// the file-actions API rather than between `fork`/`exec` so there's no need
/// to hand-write async-signal-safe setup code). Returns the process handle
/// plus one stream handle per `PipeCreate`/`Ipc` slot, indexed the same as
/// `stdio`.
pub fn spawn(
    loop_: &mut Loop,
    path: &str,
    args: &[String],
    stdio: Vec<Stdio>,
    exit_cb: ExitCallback,
) -> Result<(HandleId, Vec<Option<HandleId>>)> {
    let mut actions: libc::posix_spawn_file_actions_t = unsafe { std::mem::zeroed() };
    unsafe {
        libc::posix_spawn_file_actions_init(&mut actions);
    }

    // (slot index, parent-kept end, whether it's the IPC slot) for every
    // pipe created below; child ends are dup2'd by the file actions and
    // then closed in the parent once spawn returns.
    let mut parent_pipes: Vec<(usize, OwnedFd, bool)> = Vec::new();
    let mut child_fds: Vec<i32> = Vec::new();
    let spawn_result = (|| -> Result<()> {
        for (idx, slot) in stdio.iter().enumerate() {
            match slot {
                Stdio::Ignore => unsafe {
                    let dev_null = CString::new("/dev/null").expect("no interior nul");
                    libc::posix_spawn_file_actions_addopen(
                        &mut actions,
                        idx as libc::c_int,
                        dev_null.as_ptr(),
                        libc::O_RDWR,
                        0,
                    );
                },
                Stdio::Inherit => {}
                Stdio::FdInherit(fd) => unsafe {
                    libc::posix_spawn_file_actions_adddup2(&mut actions, *fd, idx as libc::c_int);
                },
                Stdio::PipeCreate { .. } | Stdio::Ipc => {
                    let mut fds = [0i32; 2];
                    if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } != 0 {
                        return Err(Error::from_io(&io::Error::last_os_error()));
                    }
                    // Slot 0 is stdin: the child reads, so it gets the read
                    // end and the parent keeps the write end. Every other
                    // slot (stdout/stderr/extra) is the reverse.
                    let (parent_fd, child_fd) = if idx == 0 { (fds[1], fds[0]) } else { (fds[0], fds[1]) };
                    unsafe {
                        libc::posix_spawn_file_actions_adddup2(&mut actions, child_fd, idx as libc::c_int);
                    }
                    child_fds.push(child_fd);
                    parent_pipes.push((idx, unsafe { OwnedFd::from_raw_fd(parent_fd) }, matches!(slot, Stdio::Ipc)));
                }
            }
        }
        Ok(())
    })();

    if let Err(e) = spawn_result {
        for fd in &child_fds {
            unsafe {
                libc::close(*fd);
            }
        }
        unsafe {
            libc::posix_spawn_file_actions_destroy(&mut actions);
        }
        return Err(e);
    }

    let c_path = CString::new(path).map_err(|_| Error::Inval)?;
    let mut c_args: Vec<CString> =
        std::iter::once(c_path.clone()).chain(args.iter().map(|a| CString::new(a.as_str()).unwrap())).collect();
    let mut argv: Vec<*mut libc::c_char> = c_args.iter_mut().map(|s| s.as_ptr() as *mut libc::c_char).collect();
    argv.push(std::ptr::null_mut());

    let mut pid: libc::pid_t = 0;
    let rc = unsafe {
        libc::posix_spawnp(
            &mut pid,
            c_path.as_ptr(),
            &actions,
            std::ptr::null(),
            argv.as_mut_ptr(),
            libc::environ,
        )
    };
    unsafe {
        libc::posix_spawn_file_actions_destroy(&mut actions);
    }
    // Now that the child has its own copy (via dup2), the parent's handle
    // on each child fd would otherwise leave e.g. the child's stdin read end
    // open in the parent forever, wedging EOF detection.
    for fd in &child_fds {
        unsafe {
            libc::close(*fd);
        }
    }

    if rc != 0 {
        return Err(Error::from_errno(rc));
    }

    let id = loop_.alloc_handle_id();
    let mut state = ProcessState::new(stdio);
    state.pid = Some(pid);
    state.exit_cb = Some(exit_cb);
    loop_.insert_handle(Handle::new(id, HandleKind::Process, HandlePayload::Process(state)));
    if let Some(handle) = loop_.get_mut(id) {
        handle.activate();
    }
    loop_.track_child(pid, id)?;

    let slot_count = stdio_len(&parent_pipes);
    let mut stdio_handles = vec![None; slot_count];
    for (idx, parent_end, ipc) in parent_pipes {
        stdio_handles[idx] = Some(pipe::adopt(loop_, parent_end, ipc));
    }

    Ok((id, stdio_handles))
}

fn stdio_len(pipes: &[(usize, OwnedFd, bool)]) -> usize {
    pipes.iter().map(|(idx, _, _)| idx + 1).max().unwrap_or(0)
}

/// Sends `signal` to the child; `SIGTERM`/`SIGKILL` are the common cases
/// (`uv_process_kill`).
pub fn kill(loop_: &Loop, id: HandleId, signal: i32) -> Result<()> {
    let pid = loop_
        .get(id)
        .and_then(|h| if let HandlePayload::Process(s) = &h.payload { s.pid } else { None })
        .ok_or(Error::BadF)?;
    if unsafe { libc::kill(pid, signal) } != 0 {
        return Err(Error::from_io(&io::Error::last_os_error()));
    }
    Ok(())
}
