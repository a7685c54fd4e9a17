//! Directory watcher publishing external edits of a directory box.
//!
//! Filesystem events are debounced; each batch that touches a zettel file triggers one rescan
//! of the directory. Changes to the directory itself cause a reload.
use notify_debouncer_full::{
    new_debouncer,
    notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher},
    DebounceEventResult, Debouncer, FileIdMap,
};
use std::{path::PathBuf, sync::Weak, time::Duration};

use super::DirShared;
use crate::{boxes::filefmt, error::ZettelError};

type DirDebouncer = Debouncer<RecommendedWatcher, FileIdMap>;

pub const DEBOUNCE: Duration = Duration::from_millis(500);

pub struct DirWatcher {
    debouncer: DirDebouncer,
    path: PathBuf,
}

impl std::fmt::Debug for DirWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirWatcher")
            .field("path", &self.path)
            .finish()
    }
}

impl DirWatcher {
    pub(crate) fn new(shared: Weak<DirShared>) -> Result<DirWatcher, ZettelError> {
        let path = match shared.upgrade() {
            Some(shared) => shared.path().to_path_buf(),
            None => return Err(ZettelError::BoxUnavailable("directory box dropped".into())),
        };
        let root = path.clone();
        let mut debouncer = new_debouncer(DEBOUNCE, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    let mut relevant = false;
                    let mut reload = false;
                    for event in events.iter() {
                        match event.event.kind {
                            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {
                                for p in event.paths.iter() {
                                    if *p == root {
                                        reload = true;
                                        continue;
                                    }
                                    let name = p.file_name().and_then(|n| n.to_str()).unwrap_or("");
                                    if !name.starts_with('.')
                                        && filefmt::parse_file_name(name).is_some()
                                    {
                                        relevant = true;
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                    if !relevant && !reload {
                        return;
                    }
                    let Some(shared) = shared.upgrade() else {
                        return;
                    };
                    tracing::info!(
                        "[DirWatcher] Rescanning {} (reload: {})",
                        shared.path().display(),
                        reload
                    );
                    if let Err(e) = shared.rescan(reload) {
                        tracing::error!("[DirWatcher] Rescan failed: {e}");
                    }
                }
                Err(errors) => {
                    tracing::error!("Notify debouncer returned errors: {:?}", errors);
                }
            }
        })?;
        debouncer
            .watcher()
            .watch(&path, RecursiveMode::NonRecursive)?;
        tracing::debug!("[DirWatcher] Watching {}", path.display());
        Ok(DirWatcher { debouncer, path })
    }

    pub fn stop(mut self) {
        let unwatch_res = self.debouncer.watcher().unwatch(&self.path);
        tracing::debug!("Unwatch_res(path: {:?}) = {:?}", self.path, unwatch_res);
    }
}
