//! On-disk snapshots of a record store.
//!
//! A snapshot is a bincode blob of [`Snapshot`]. Uniform stores write their
//! newest records, prioritized stores the whole tree. Writing goes to a
//! sibling `.tmp` file which is synced and then renamed over the target, so a
//! valid snapshot exists on disk at every point in time.
use super::SumTree;
use crate::RecordStoreError;
use anyhow::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    ffi::OsString,
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

/// Snapshot as read back from disk.
#[derive(Deserialize)]
pub(crate) enum Snapshot<R> {
    Records(Vec<R>),
    Tree(TreeSnapshot<R>),
}

/// Full state of a [`SumTree`].
#[derive(Deserialize)]
pub(crate) struct TreeSnapshot<R> {
    pub capacity: usize,
    pub priorities: Vec<f32>,
    pub records: Vec<Option<R>>,
    pub data_pointer: usize,
    pub n_entries: usize,
}

// Borrowed counterparts of the two types above, used for writing without
// cloning records. Variant order and field order must match.

#[derive(Serialize)]
pub(crate) enum SnapshotRef<'a, R> {
    Records(Vec<&'a R>),
    Tree(TreeSnapshotRef<'a, R>),
}

#[derive(Serialize)]
pub(crate) struct TreeSnapshotRef<'a, R> {
    capacity: usize,
    priorities: &'a [f32],
    records: &'a [Option<R>],
    data_pointer: usize,
    n_entries: usize,
}

impl<'a, R> SnapshotRef<'a, R> {
    pub fn tree(sum_tree: &'a SumTree<R>) -> Self {
        Self::Tree(TreeSnapshotRef {
            capacity: sum_tree.capacity(),
            priorities: sum_tree.priorities(),
            records: sum_tree.records(),
            data_pointer: sum_tree.data_pointer(),
            n_entries: sum_tree.len(),
        })
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut s = OsString::from(path.as_os_str());
    s.push(".tmp");
    PathBuf::from(s)
}

/// Writes a snapshot, replacing the file at `path` only once it is complete.
pub(crate) fn write<R: Serialize>(path: &Path, snapshot: &SnapshotRef<R>) -> Result<()> {
    let tmp = tmp_path(path);
    {
        let file = File::create(&tmp).map_err(RecordStoreError::from)?;
        let mut wtr = BufWriter::new(file);
        bincode::serialize_into(&mut wtr, snapshot).map_err(RecordStoreError::from)?;
        wtr.flush().map_err(RecordStoreError::from)?;
        wtr.get_ref().sync_all().map_err(RecordStoreError::from)?;
    }
    fs::rename(&tmp, path).map_err(RecordStoreError::from)?;
    Ok(())
}

/// Reads a snapshot written by [`write`].
pub(crate) fn read<R: DeserializeOwned>(path: &Path) -> Result<Snapshot<R>> {
    let file = File::open(path).map_err(RecordStoreError::from)?;
    let rdr = BufReader::new(file);
    let snapshot = bincode::deserialize_from(rdr).map_err(RecordStoreError::from)?;
    Ok(snapshot)
}
