//! Small `/bin/sh` programs standing in for frpc.
//!
//! Writing an executable while another test thread forks can make the later
//! `exec` fail with ETXTBSY (the forked child briefly inherits the open
//! write handle). Every write and every spawn therefore happens under
//! [`spawn_lock`].

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

static SPAWN_LOCK: Mutex<()> = Mutex::new(());

pub fn spawn_lock() -> MutexGuard<'static, ()> {
    SPAWN_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Write `body` as an executable shell script `dir/name`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let _guard = spawn_lock();
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A tool config file; the content is irrelevant to the scripts that only
/// echo their arguments.
pub fn write_config(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, "[common]\n").unwrap();
    path
}
