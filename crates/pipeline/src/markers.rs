//! Filesystem markers for the EDL lifecycle.
//!
//! An EDL moves through three on-disk states, all expressed in its file
//! name: `<recording>.yml` (pending), `<recording>.pending_yml_<i>`
//! (claimed by worker `i`) and `<recording>.yml.done` (completed with the
//! source left in place).
//!
//! The claim rename is the only concurrency-control mechanism of the folder
//! runner: an unclaimed file has a different suffix than any worker scans
//! for, and a half-claimed bin left by a crash is simply re-discovered and
//! re-claimed on a later run.

use std::io;
use std::path::{Path, PathBuf};

/// Path of the completion marker: `<recording>.yml.done`, whatever state
/// the EDL was in.
///
/// `rec.mp4.yml` -> `rec.mp4.yml.done`;
/// `rec.mp4.pending_yml_2` -> `rec.mp4.yml.done`
pub fn done_marker_path(edl_path: &Path) -> PathBuf {
    edl_path.with_extension("yml.done")
}

/// Extension suffix claimed EDLs of worker `i` carry (without the dot).
pub fn claim_extension(worker: usize) -> String {
    format!("pending_yml_{}", worker)
}

/// Path an EDL takes once claimed by worker `i`: the last extension is
/// replaced (`rec.mp4.yml` -> `rec.mp4.pending_yml_3`).
pub fn claim_path(edl_path: &Path, worker: usize) -> PathBuf {
    edl_path.with_extension(claim_extension(worker))
}

/// Claim an EDL for worker `i` by renaming it.
///
/// Idempotent: when the source is already gone but the claimed name exists,
/// a previous run (or a crash between claim and process) already performed
/// the rename and the claim is considered held.
pub fn claim(edl_path: &Path, worker: usize) -> io::Result<PathBuf> {
    let claimed = claim_path(edl_path, worker);

    match std::fs::rename(edl_path, &claimed) {
        Ok(()) => Ok(claimed),
        Err(e) if e.kind() == io::ErrorKind::NotFound && claimed.exists() => Ok(claimed),
        Err(e) => Err(e),
    }
}

/// Deactivate a processed EDL by renaming it to its `.done` marker.
pub fn mark_done(edl_path: &Path) -> io::Result<PathBuf> {
    let marker = done_marker_path(edl_path);
    std::fs::rename(edl_path, &marker)?;
    Ok(marker)
}
