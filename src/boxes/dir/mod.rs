//! A box storing zettel as files in one directory.
//!
//! The directory is scanned once on start. Afterwards the box keeps a table of the files that
//! make up each zettel together with a digest of their bytes. Rescans compare digests, so only
//! zettel whose files actually changed are published to observers.
//!
//! With the `service` feature the directory is watched and external edits trigger a rescan, see
//! [`watch`].
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use walkdir::WalkDir;

use super::{
    filefmt, new_zid, url_param, BoxStats, Observers, UpdateFn, UpdateInfo, UpdateReason,
    ZettelBox,
};
use crate::{
    context::Context,
    error::ZettelError,
    id::Zid,
    meta::{parse_bool, Meta},
    zettel::Zettel,
};

#[cfg(feature = "service")]
pub mod watch;

/// The files of one zettel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct DirEntry {
    /// Extension and path of the content file.
    content: Option<(String, PathBuf)>,
    meta: Option<PathBuf>,
    digest: String,
}

impl DirEntry {
    fn files(&self) -> impl Iterator<Item = &PathBuf> {
        self.content
            .iter()
            .map(|(_, p)| p)
            .chain(self.meta.iter())
    }

    fn read(&self, zid: Zid) -> Result<Zettel, ZettelError> {
        let content = match &self.content {
            Some((ext, path)) => Some((ext.as_str(), read_file(zid, path)?)),
            None => None,
        };
        let meta = match &self.meta {
            Some(path) => Some(read_file(zid, path)?),
            None => None,
        };
        Ok(filefmt::decode(
            zid,
            content.as_ref().map(|(ext, bytes)| (*ext, bytes.as_slice())),
            meta.as_deref(),
        ))
    }

    /// The metadata alone. Only a text zettel without companion file needs its content read.
    fn read_meta(&self, zid: Zid) -> Result<Meta, ZettelError> {
        match (&self.meta, &self.content) {
            (Some(path), content) => {
                let meta = read_file(zid, path)?;
                let ext = content.as_ref().map(|(ext, _)| (ext.as_str(), &[][..]));
                Ok(filefmt::decode(zid, ext, Some(meta.as_slice())).meta)
            }
            (None, _) => self.read(zid).map(|z| z.meta),
        }
    }
}

fn read_file(zid: Zid, path: &Path) -> Result<Vec<u8>, ZettelError> {
    fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ZettelError::NotFound(zid),
        _ => ZettelError::from(e),
    })
}

fn digest(entry: &DirEntry) -> String {
    let mut hasher = Sha256::new();
    for path in entry.files() {
        match fs::read(path) {
            Ok(bytes) => hasher.update(&bytes),
            Err(e) => tracing::warn!("[DirBox] Unable to read {}: {}", path.display(), e),
        }
    }
    hex::encode(hasher.finalize())
}

/// State shared between the box and its directory watcher.
#[derive(Debug)]
pub(crate) struct DirShared {
    number: usize,
    location: String,
    path: PathBuf,
    read_only: bool,
    entries: RwLock<BTreeMap<Zid, DirEntry>>,
    observers: Observers,
    /// Serializes writes to the directory.
    writer: Mutex<()>,
}

impl DirShared {
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    #[tracing::instrument(skip_all, fields(path = %self.path.display()))]
    fn scan(&self) -> Result<BTreeMap<Zid, DirEntry>, ZettelError> {
        let mut entries: BTreeMap<Zid, DirEntry> = BTreeMap::new();
        for item in WalkDir::new(&self.path)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let item = item.map_err(|e| ZettelError::Io(e.to_string()))?;
            if !item.file_type().is_file() {
                continue;
            }
            let Some(name) = item.file_name().to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let Some((zid, ext)) = filefmt::parse_file_name(name) else {
                tracing::debug!("[DirBox::scan] Ignoring {name}");
                continue;
            };
            let entry = entries.entry(zid).or_default();
            if ext == filefmt::META_EXT {
                entry.meta = Some(item.path().to_path_buf());
            } else if let Some((kept, _)) = &entry.content {
                tracing::warn!(
                    "[DirBox::scan] Zettel {zid} has several content files, ignoring {name} in favour of .{kept}"
                );
            } else {
                entry.content = Some((ext, item.path().to_path_buf()));
            }
        }
        for entry in entries.values_mut() {
            entry.digest = digest(entry);
        }
        Ok(entries)
    }

    /// Scans silently, replacing the current table.
    fn load(&self) -> Result<usize, ZettelError> {
        let entries = self.scan()?;
        let count = entries.len();
        *self.entries.write() = entries;
        Ok(count)
    }

    /// Rescans the directory and publishes every difference to the previous scan.
    pub(crate) fn rescan(&self, reload: bool) -> Result<usize, ZettelError> {
        let fresh = self.scan()?;
        let mut updates = Vec::new();
        {
            let mut entries = self.entries.write();
            for (zid, entry) in fresh.iter() {
                if entries.get(zid).map(|e| &e.digest) != Some(&entry.digest) {
                    updates.push(UpdateInfo::new(self.number, UpdateReason::OnZettel, *zid));
                }
            }
            for zid in entries.keys() {
                if !fresh.contains_key(zid) {
                    updates.push(UpdateInfo::new(self.number, UpdateReason::OnDelete, *zid));
                }
            }
            *entries = fresh;
        }
        if reload {
            updates.push(UpdateInfo::new(
                self.number,
                UpdateReason::OnReload,
                Zid::INVALID,
            ));
        }
        tracing::debug!(
            "[DirBox::rescan] {} changes in {}",
            updates.len(),
            self.path.display()
        );
        let count = updates.len();
        for info in updates {
            self.observers.notify(info);
        }
        Ok(count)
    }

    fn check_writable(&self) -> Result<(), ZettelError> {
        if self.read_only {
            return Err(ZettelError::ReadOnly);
        }
        Ok(())
    }

    /// Writes the files of `zettel`, replacing whatever files it had before.
    fn store(&self, zettel: &Zettel) -> Result<(), ZettelError> {
        let zid = zettel.zid();
        let files = filefmt::encode(zettel);
        let old = self.entries.read().get(&zid).cloned();
        let mut entry = DirEntry::default();
        for (name, bytes) in files.iter() {
            let path = self.path.join(name);
            let tmp = self.path.join(format!("{name}.tmp"));
            fs::write(&tmp, bytes)?;
            fs::rename(&tmp, &path)?;
            match filefmt::parse_file_name(name) {
                Some((_, ext)) if ext == filefmt::META_EXT => entry.meta = Some(path),
                Some((_, ext)) => entry.content = Some((ext, path)),
                None => {}
            }
        }
        if let Some(old) = old {
            for stale in old.files().filter(|p| !entry.files().any(|n| n == *p)) {
                fs::remove_file(stale)?;
            }
        }
        entry.digest = digest(&entry);
        self.entries.write().insert(zid, entry);
        Ok(())
    }

    fn remove(&self, zid: Zid) -> Result<(), ZettelError> {
        let entry = self
            .entries
            .write()
            .remove(&zid)
            .ok_or(ZettelError::NotFound(zid))?;
        for path in entry.files() {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn notify(&self, reason: UpdateReason, zid: Zid) {
        self.observers
            .notify(UpdateInfo::new(self.number, reason, zid));
    }
}

#[derive(Debug)]
pub struct DirBox {
    shared: Arc<DirShared>,
    #[cfg(feature = "service")]
    watcher: Mutex<Option<watch::DirWatcher>>,
}

impl DirBox {
    pub fn new<P: AsRef<Path>>(path: P, read_only: bool, number: usize) -> DirBox {
        let path = path.as_ref().to_path_buf();
        let location = format!(
            "dir://{}{}",
            path.display(),
            if read_only { "?readonly" } else { "" }
        );
        DirBox {
            shared: Arc::new(DirShared {
                number,
                location,
                path,
                read_only,
                entries: RwLock::new(BTreeMap::new()),
                observers: Observers::default(),
                writer: Mutex::new(()),
            }),
            #[cfg(feature = "service")]
            watcher: Mutex::new(None),
        }
    }

    /// Builds a box from `dir:///path[?readonly]`. A relative `dir:path` is accepted as well.
    pub fn from_url(url: &url::Url, number: usize) -> Result<DirBox, ZettelError> {
        let path = url
            .to_file_path()
            .unwrap_or_else(|_| PathBuf::from(url.path()));
        if path.as_os_str().is_empty() {
            return Err(ZettelError::Config(format!("Missing directory in {url}")));
        }
        let read_only = url_param(url, "readonly")
            .map(|v| v.is_empty() || parse_bool(&v))
            .unwrap_or(false);
        Ok(DirBox::new(path, read_only, number))
    }

    pub fn path(&self) -> &Path {
        self.shared.path()
    }

    /// Rescans the directory, publishing what changed since the last scan.
    pub fn refresh(&self, ctx: &Context) -> Result<usize, ZettelError> {
        ctx.check()?;
        self.shared.rescan(false)
    }

    fn entry(&self, zid: Zid) -> Option<DirEntry> {
        self.shared.entries.read().get(&zid).cloned()
    }
}

impl ZettelBox for DirBox {
    fn location(&self) -> String {
        self.shared.location.clone()
    }

    fn number(&self) -> usize {
        self.shared.number
    }

    fn get_zettel(&self, ctx: &Context, zid: Zid) -> Result<Zettel, ZettelError> {
        ctx.check()?;
        self.entry(zid)
            .ok_or(ZettelError::NotFound(zid))?
            .read(zid)
    }

    fn get_meta(&self, ctx: &Context, zid: Zid) -> Result<Meta, ZettelError> {
        ctx.check()?;
        self.entry(zid)
            .ok_or(ZettelError::NotFound(zid))?
            .read_meta(zid)
    }

    fn has_zettel(&self, _ctx: &Context, zid: Zid) -> bool {
        self.shared.entries.read().contains_key(&zid)
    }

    fn apply_meta(
        &self,
        ctx: &Context,
        handler: &mut dyn FnMut(Meta),
        include: &dyn Fn(Zid) -> bool,
    ) -> Result<(), ZettelError> {
        let entries: Vec<(Zid, DirEntry)> = self
            .shared
            .entries
            .read()
            .iter()
            .filter(|(zid, _)| include(**zid))
            .map(|(zid, e)| (*zid, e.clone()))
            .collect();
        for (zid, entry) in entries {
            ctx.check()?;
            match entry.read(zid) {
                Ok(zettel) => handler(zettel.meta),
                Err(ZettelError::NotFound(_)) => {
                    tracing::debug!("[DirBox::apply_meta] {zid} vanished");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn fetch_zids(&self, ctx: &Context) -> Result<BTreeSet<Zid>, ZettelError> {
        ctx.check()?;
        Ok(self.shared.entries.read().keys().copied().collect())
    }

    fn can_create_zettel(&self, _ctx: &Context) -> bool {
        !self.shared.read_only
    }

    fn create_zettel(&self, ctx: &Context, mut zettel: Zettel) -> Result<Zid, ZettelError> {
        ctx.check()?;
        self.shared.check_writable()?;
        let zid = {
            let _guard = self.shared.writer.lock();
            let zid = new_zid(|zid| self.shared.entries.read().contains_key(&zid))?;
            zettel.meta.set_zid(zid);
            self.shared.store(&zettel)?;
            zid
        };
        self.shared.notify(UpdateReason::OnZettel, zid);
        Ok(zid)
    }

    fn can_update_zettel(&self, _ctx: &Context, _zettel: &Zettel) -> bool {
        !self.shared.read_only
    }

    fn update_zettel(&self, ctx: &Context, zettel: Zettel) -> Result<(), ZettelError> {
        ctx.check()?;
        self.shared.check_writable()?;
        let zid = zettel.zid();
        if !zid.is_valid() {
            return Err(ZettelError::InvalidZid(zid.to_string()));
        }
        {
            let _guard = self.shared.writer.lock();
            self.shared.store(&zettel)?;
        }
        self.shared.notify(UpdateReason::OnZettel, zid);
        Ok(())
    }

    fn can_rename_zettel(&self, ctx: &Context, zid: Zid) -> bool {
        !self.shared.read_only && self.has_zettel(ctx, zid)
    }

    fn rename_zettel(&self, ctx: &Context, from: Zid, to: Zid) -> Result<(), ZettelError> {
        ctx.check()?;
        self.shared.check_writable()?;
        {
            let _guard = self.shared.writer.lock();
            if self.has_zettel(ctx, to) {
                return Err(ZettelError::InvalidZid(to.to_string()));
            }
            let mut zettel = self.get_zettel(ctx, from)?;
            zettel.meta.set_zid(to);
            self.shared.store(&zettel)?;
            self.shared.remove(from)?;
        }
        self.shared.notify(UpdateReason::OnDelete, from);
        self.shared.notify(UpdateReason::OnZettel, to);
        Ok(())
    }

    fn can_delete_zettel(&self, ctx: &Context, zid: Zid) -> bool {
        !self.shared.read_only && self.has_zettel(ctx, zid)
    }

    fn delete_zettel(&self, ctx: &Context, zid: Zid) -> Result<(), ZettelError> {
        ctx.check()?;
        self.shared.check_writable()?;
        {
            let _guard = self.shared.writer.lock();
            self.shared.remove(zid)?;
        }
        self.shared.notify(UpdateReason::OnDelete, zid);
        Ok(())
    }

    fn read_stats(&self, stats: &mut BoxStats) {
        stats.location = self.shared.location.clone();
        stats.read_only = self.shared.read_only;
        stats.zettel = self.shared.entries.read().len();
    }

    fn start(&self, ctx: &Context) -> Result<(), ZettelError> {
        ctx.check()?;
        if !self.shared.path.is_dir() {
            return Err(ZettelError::BoxUnavailable(self.shared.location.clone()));
        }
        let count = self.shared.load()?;
        tracing::info!(
            "[DirBox] Started box {} with {} zettel in {}",
            self.shared.number,
            count,
            self.shared.path.display()
        );
        #[cfg(feature = "service")]
        {
            let watcher = watch::DirWatcher::new(Arc::downgrade(&self.shared))?;
            *self.watcher.lock() = Some(watcher);
        }
        self.shared.notify(UpdateReason::OnReady, Zid::INVALID);
        Ok(())
    }

    fn stop(&self, _ctx: &Context) {
        #[cfg(feature = "service")]
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.stop();
        }
        self.shared.entries.write().clear();
        tracing::info!("[DirBox] Stopped box {}", self.shared.number);
    }

    fn register_observer(&self, observer: UpdateFn) {
        self.shared.observers.register(observer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::helpers::create_test_zettel;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn started_box(dir: &TempDir) -> DirBox {
        let b = DirBox::new(dir.path(), false, 1);
        b.start(&Context::background()).unwrap();
        b
    }

    #[test]
    fn scan_picks_up_existing_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("20240101000000.zmk"), "title: One\n\nfirst").unwrap();
        fs::write(dir.path().join("20240101000001.md"), "# two").unwrap();
        fs::write(dir.path().join("README.txt"), "ignored").unwrap();
        let b = started_box(&dir);
        let ctx = Context::background();
        let zids = b.fetch_zids(&ctx).unwrap();
        assert_eq!(zids.len(), 2);
        let one = b
            .get_zettel(&ctx, Zid::parse("20240101000000").unwrap())
            .unwrap();
        assert_eq!(one.meta.title(), Some("One"));
        assert_eq!(one.content.as_text(), "first");
        let two = b
            .get_zettel(&ctx, Zid::parse("20240101000001").unwrap())
            .unwrap();
        assert_eq!(two.meta.syntax(), "md");
    }

    #[test]
    fn companion_metadata_is_read_without_content() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("20240101000003.png"), [0x89, b'P', b'N', b'G']).unwrap();
        fs::write(dir.path().join("20240101000003.meta"), "title: Pixel\n").unwrap();
        let b = started_box(&dir);
        let ctx = Context::background();
        let zid = Zid::parse("20240101000003").unwrap();
        fs::remove_file(dir.path().join("20240101000003.png")).unwrap();

        let meta = b.get_meta(&ctx, zid).unwrap();
        assert_eq!(meta.title(), Some("Pixel"));
        assert_eq!(meta.syntax(), "png");
        assert_eq!(b.get_zettel(&ctx, zid), Err(ZettelError::NotFound(zid)));
    }

    #[test]
    fn update_replaces_stale_files() {
        let dir = TempDir::new().unwrap();
        let b = started_box(&dir);
        let ctx = Context::background();
        let zid = Zid::parse("20240101000000").unwrap();
        b.update_zettel(&ctx, create_test_zettel(zid.as_u64(), "A", "zmk", "x"))
            .unwrap();
        assert!(dir.path().join("20240101000000.zmk").exists());
        b.update_zettel(&ctx, create_test_zettel(zid.as_u64(), "A", "md", "x"))
            .unwrap();
        assert!(!dir.path().join("20240101000000.zmk").exists());
        assert!(dir.path().join("20240101000000.md").exists());
        assert_eq!(b.get_zettel(&ctx, zid).unwrap().meta.syntax(), "md");
    }

    #[test]
    fn rescan_publishes_only_changes() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("20240101000000.zmk"), "a").unwrap();
        fs::write(dir.path().join("20240101000001.zmk"), "b").unwrap();
        let b = started_box(&dir);
        let ctx = Context::background();
        let changes = Arc::new(AtomicUsize::new(0));
        let c = changes.clone();
        b.register_observer(Arc::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(b.refresh(&ctx).unwrap(), 0);
        fs::write(dir.path().join("20240101000000.zmk"), "changed").unwrap();
        fs::remove_file(dir.path().join("20240101000001.zmk")).unwrap();
        assert_eq!(b.refresh(&ctx).unwrap(), 2);
        assert_eq!(changes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn read_only_refuses_writes() {
        let dir = TempDir::new().unwrap();
        let url = url::Url::parse(&format!("dir://{}?readonly", dir.path().display())).unwrap();
        let b = DirBox::from_url(&url, 1).unwrap();
        b.start(&Context::background()).unwrap();
        let ctx = Context::background();
        assert!(!b.can_create_zettel(&ctx));
        assert_eq!(
            b.create_zettel(&ctx, create_test_zettel(0, "A", "zmk", "a")),
            Err(ZettelError::ReadOnly)
        );
    }

    #[test]
    fn rename_moves_files() {
        let dir = TempDir::new().unwrap();
        let b = started_box(&dir);
        let ctx = Context::background();
        let from = Zid::parse("20240101000000").unwrap();
        let to = Zid::parse("20240202000000").unwrap();
        b.update_zettel(&ctx, create_test_zettel(from.as_u64(), "A", "zmk", "x"))
            .unwrap();
        b.rename_zettel(&ctx, from, to).unwrap();
        assert!(!b.has_zettel(&ctx, from));
        assert_eq!(b.get_zettel(&ctx, to).unwrap().meta.title(), Some("A"));
        assert!(dir.path().join("20240202000000.zmk").exists());
        assert!(!dir.path().join("20240101000000.zmk").exists());
    }
}
