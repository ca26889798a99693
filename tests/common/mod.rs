//! In-memory mock backend shared by the integration tests.

#![allow(dead_code)]

use gridio::metadata::{DirEntry, FileStat, StageBatch, StageStatus, XattrFlags};
use gridio::plugin::{Backend, Operation};
use gridio::{BackendError, BackendResult, FileHandle};
use rustix::fs::{Mode, OFlags};
use rustix::io::Errno;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io::SeekFrom;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One seek or read observed by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoEvent {
    /// lseek landed at `offset`.
    Seek { handle: u64, offset: u64 },
    /// read started at `offset`.
    Read { handle: u64, offset: u64 },
}

/// Backing store, shareable between several mock backends.
#[derive(Default)]
pub struct MockStore {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    dirs: Mutex<BTreeSet<String>>,
    links: Mutex<HashMap<String, String>>,
    xattrs: Mutex<HashMap<(String, String), Vec<u8>>>,
    log: Mutex<Vec<IoEvent>>,
}

impl MockStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put_file(&self, url: &str, contents: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(url.to_string(), contents.to_vec());
    }

    pub fn put_dir(&self, url: &str) {
        self.dirs.lock().unwrap().insert(url.to_string());
    }

    pub fn contents(&self, url: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(url).cloned()
    }

    pub fn has_file(&self, url: &str) -> bool {
        self.files.lock().unwrap().contains_key(url)
    }

    pub fn has_dir(&self, url: &str) -> bool {
        self.dirs.lock().unwrap().contains(url)
    }

    pub fn io_log(&self) -> Vec<IoEvent> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, event: IoEvent) {
        self.log.lock().unwrap().push(event);
    }
}

struct MockFile {
    id: u64,
    url: String,
    pos: Mutex<u64>,
}

struct MockDir {
    entries: Vec<String>,
    next: Mutex<usize>,
}

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Parent directory URL, `None` when the parent is the storage root.
fn parent(url: &str) -> Option<&str> {
    let trimmed = url.trim_end_matches('/');
    let authority = trimmed.find("://").map_or(0, |i| i + 3);
    let slash = trimmed[authority..].rfind('/')? + authority;
    let head = &trimmed[..slash];
    head[authority..].contains('/').then_some(head)
}

fn err(errno: Errno, message: &str) -> BackendError {
    BackendError::new(errno, message)
}

/// Configurable in-memory backend.
pub struct MockBackend {
    name: String,
    scheme: String,
    priority: i32,
    claims: Option<HashSet<Operation>>,
    native_pread: bool,
    bulk_unlink: bool,
    batch_staging: bool,
    seek_skew: u64,
    store: Arc<MockStore>,
    teardowns: Arc<AtomicUsize>,
    preads: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl MockBackend {
    /// Backend named `name` claiming every URL starting with `scheme`.
    pub fn new(name: &str, scheme: &str) -> Self {
        Self {
            name: name.to_string(),
            scheme: scheme.to_string(),
            priority: 0,
            claims: None,
            native_pread: false,
            bulk_unlink: false,
            batch_staging: false,
            seek_skew: 0,
            store: MockStore::new(),
            teardowns: Arc::new(AtomicUsize::new(0)),
            preads: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Only claim these operation kinds.
    pub fn claiming(mut self, operations: &[Operation]) -> Self {
        self.claims = Some(operations.iter().copied().collect());
        self
    }

    pub fn with_native_pread(mut self) -> Self {
        self.native_pread = true;
        self
    }

    pub fn with_bulk_unlink(mut self) -> Self {
        self.bulk_unlink = true;
        self
    }

    /// Serve the bring-online list actions.
    pub fn with_batch_staging(mut self) -> Self {
        self.batch_staging = true;
        self
    }

    /// Make every seek land `skew` bytes past the requested offset.
    pub fn with_seek_skew(mut self, skew: u64) -> Self {
        self.seek_skew = skew;
        self
    }

    pub fn with_store(mut self, store: Arc<MockStore>) -> Self {
        self.store = store;
        self
    }

    pub fn store(&self) -> Arc<MockStore> {
        self.store.clone()
    }

    pub fn teardown_counter(&self) -> Arc<AtomicUsize> {
        self.teardowns.clone()
    }

    pub fn native_pread_counter(&self) -> Arc<AtomicUsize> {
        self.preads.clone()
    }

    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        self.closes.clone()
    }

    fn batch_token(urls: &[&str]) -> String {
        format!("batch:{}", urls.join(","))
    }

    /// Per-URL outcome of a batch action: the file must exist.
    fn per_file<T>(&self, urls: &[&str], ok: impl Fn() -> T) -> Vec<BackendResult<T>> {
        urls.iter()
            .map(|url| {
                if self.store.has_file(url) {
                    Ok(ok())
                } else {
                    Err(err(Errno::NOENT, "no such file"))
                }
            })
            .collect()
    }

    fn check_batch(&self, urls: &[&str], token: &str) -> BackendResult<()> {
        if !self.batch_staging {
            return Err(BackendError::unsupported("batch staging"));
        }
        if token != Self::batch_token(urls) {
            return Err(err(Errno::INVAL, "unknown token"));
        }
        Ok(())
    }

    fn file<'a>(&self, handle: &'a FileHandle) -> BackendResult<&'a MockFile> {
        handle
            .fdesc::<MockFile>()
            .ok_or_else(|| err(Errno::BADF, "not a mock file"))
    }

    fn read_at(&self, file: &MockFile, buf: &mut [u8], offset: u64) -> BackendResult<usize> {
        let files = self.store.files.lock().unwrap();
        let data = files
            .get(&file.url)
            .ok_or_else(|| err(Errno::NOENT, "file vanished"))?;
        let start = (offset as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }
}

impl Backend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn check_url(&self, url: &str, operation: Operation) -> BackendResult<bool> {
        let claimed = self
            .claims
            .as_ref()
            .is_none_or(|claims| claims.contains(&operation));
        Ok(claimed && url.starts_with(&self.scheme))
    }

    fn teardown(&self) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }

    fn stat(&self, url: &str) -> BackendResult<FileStat> {
        if let Some(data) = self.store.files.lock().unwrap().get(url) {
            return Ok(FileStat::regular(Mode::from_raw_mode(0o644), data.len() as u64));
        }
        if self.store.has_dir(url) {
            return Ok(FileStat::directory(Mode::from_raw_mode(0o755)));
        }
        Err(err(Errno::NOENT, "no such file or directory"))
    }

    fn mkdir(&self, url: &str, _mode: Mode, recursive: bool) -> BackendResult<()> {
        let mut dirs = self.store.dirs.lock().unwrap();
        if dirs.contains(url) {
            return Err(err(Errno::EXIST, "directory exists"));
        }
        match parent(url) {
            Some(up) if !dirs.contains(up) => {
                if !recursive {
                    return Err(err(Errno::NOENT, "parent does not exist"));
                }
                let mut missing = vec![up.to_string()];
                let mut cursor = up;
                while let Some(up) = parent(cursor) {
                    if dirs.contains(up) {
                        break;
                    }
                    missing.push(up.to_string());
                    cursor = up;
                }
                dirs.extend(missing);
            }
            _ => {}
        }
        dirs.insert(url.to_string());
        Ok(())
    }

    fn rmdir(&self, url: &str) -> BackendResult<()> {
        if self.store.dirs.lock().unwrap().remove(url) {
            Ok(())
        } else {
            Err(err(Errno::NOENT, "no such directory"))
        }
    }

    fn unlink(&self, url: &str) -> BackendResult<()> {
        match self.store.files.lock().unwrap().remove(url) {
            Some(_) => Ok(()),
            None => Err(err(Errno::NOENT, "no such file")),
        }
    }

    fn unlink_list(&self, urls: &[&str]) -> Option<Vec<BackendResult<()>>> {
        if !self.bulk_unlink {
            return None;
        }
        Some(urls.iter().map(|url| self.unlink(url)).collect())
    }

    fn rename(&self, old_url: &str, new_url: &str) -> BackendResult<()> {
        let mut files = self.store.files.lock().unwrap();
        let data = files
            .remove(old_url)
            .ok_or_else(|| err(Errno::NOENT, "no such file"))?;
        files.insert(new_url.to_string(), data);
        Ok(())
    }

    fn symlink(&self, target_url: &str, link_url: &str) -> BackendResult<()> {
        self.store
            .links
            .lock()
            .unwrap()
            .insert(link_url.to_string(), target_url.to_string());
        Ok(())
    }

    fn readlink(&self, url: &str) -> BackendResult<String> {
        self.store
            .links
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| err(Errno::INVAL, "not a link"))
    }

    fn opendir(&self, url: &str) -> BackendResult<FileHandle> {
        let url = url.trim_end_matches('/');
        if !self.store.has_dir(url) {
            return Err(err(Errno::NOENT, "no such directory"));
        }
        let prefix = format!("{url}/");
        let entries = self
            .store
            .files
            .lock()
            .unwrap()
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect();
        Ok(FileHandle::new(
            self.name.clone(),
            MockDir {
                entries,
                next: Mutex::new(0),
            },
        ))
    }

    fn readdir(&self, dir: &FileHandle) -> BackendResult<Option<DirEntry>> {
        let dir = dir
            .fdesc::<MockDir>()
            .ok_or_else(|| err(Errno::BADF, "not a mock directory"))?;
        let mut next = dir.next.lock().unwrap();
        let entry = dir.entries.get(*next).map(DirEntry::new);
        *next += 1;
        Ok(entry)
    }

    fn closedir(&self, _dir: &FileHandle) -> BackendResult<()> {
        Ok(())
    }

    fn open(&self, url: &str, flags: OFlags, _mode: Mode) -> BackendResult<FileHandle> {
        let mut files = self.store.files.lock().unwrap();
        if !files.contains_key(url) {
            if !flags.contains(OFlags::CREATE) {
                return Err(err(Errno::NOENT, "no such file"));
            }
            files.insert(url.to_string(), Vec::new());
        }
        Ok(FileHandle::new(
            self.name.clone(),
            MockFile {
                id: NEXT_HANDLE.fetch_add(1, Ordering::Relaxed),
                url: url.to_string(),
                pos: Mutex::new(0),
            },
        ))
    }

    fn read(&self, handle: &FileHandle, buf: &mut [u8]) -> BackendResult<usize> {
        let file = self.file(handle)?;
        let mut pos = file.pos.lock().unwrap();
        self.store.record(IoEvent::Read {
            handle: file.id,
            offset: *pos,
        });
        let n = self.read_at(file, buf, *pos)?;
        *pos += n as u64;
        Ok(n)
    }

    fn write(&self, handle: &FileHandle, buf: &[u8]) -> BackendResult<usize> {
        let file = self.file(handle)?;
        let mut pos = file.pos.lock().unwrap();
        let mut files = self.store.files.lock().unwrap();
        let data = files
            .get_mut(&file.url)
            .ok_or_else(|| err(Errno::NOENT, "file vanished"))?;
        let start = *pos as usize;
        if data.len() < start + buf.len() {
            data.resize(start + buf.len(), 0);
        }
        data[start..start + buf.len()].copy_from_slice(buf);
        *pos += buf.len() as u64;
        Ok(buf.len())
    }

    fn pread(&self, handle: &FileHandle, buf: &mut [u8], offset: u64) -> Option<BackendResult<usize>> {
        if !self.native_pread {
            return None;
        }
        self.preads.fetch_add(1, Ordering::SeqCst);
        Some(self.file(handle).and_then(|file| self.read_at(file, buf, offset)))
    }

    fn lseek(&self, handle: &FileHandle, pos: SeekFrom) -> BackendResult<u64> {
        let file = self.file(handle)?;
        let len = self
            .store
            .contents(&file.url)
            .map_or(0, |data| data.len() as u64);
        let mut current = file.pos.lock().unwrap();
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => current.checked_add_signed(delta),
            SeekFrom::End(delta) => len.checked_add_signed(delta),
        }
        .ok_or_else(|| err(Errno::INVAL, "negative offset"))?;
        *current = target + self.seek_skew;
        self.store.record(IoEvent::Seek {
            handle: file.id,
            offset: *current,
        });
        drop(current);
        // Widen the window between a seek and the read that follows it.
        std::thread::yield_now();
        Ok(target + self.seek_skew)
    }

    fn close(&self, _handle: &FileHandle) -> BackendResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn getxattr(&self, url: &str, name: &str) -> BackendResult<Vec<u8>> {
        self.store
            .xattrs
            .lock()
            .unwrap()
            .get(&(url.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| err(Errno::NODATA, "no such attribute"))
    }

    fn listxattr(&self, url: &str) -> BackendResult<Vec<String>> {
        let mut names: Vec<_> = self
            .store
            .xattrs
            .lock()
            .unwrap()
            .keys()
            .filter(|(key_url, _)| key_url == url)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    fn setxattr(
        &self,
        url: &str,
        name: &str,
        value: &[u8],
        flags: XattrFlags,
    ) -> BackendResult<()> {
        let mut xattrs = self.store.xattrs.lock().unwrap();
        let key = (url.to_string(), name.to_string());
        match (flags, xattrs.contains_key(&key)) {
            (XattrFlags::Create, true) => return Err(err(Errno::EXIST, "attribute exists")),
            (XattrFlags::Replace, false) => return Err(err(Errno::NODATA, "no such attribute")),
            _ => {}
        }
        xattrs.insert(key, value.to_vec());
        Ok(())
    }

    fn bring_online(
        &self,
        url: &str,
        _pin_time: Duration,
        _timeout: Duration,
        asynchronous: bool,
    ) -> BackendResult<StageStatus> {
        if !self.store.has_file(url) {
            return Err(err(Errno::NOENT, "no such file"));
        }
        Ok(StageStatus {
            token: format!("token:{url}"),
            online: !asynchronous,
        })
    }

    fn bring_online_poll(&self, url: &str, token: &str) -> BackendResult<bool> {
        Ok(token == format!("token:{url}"))
    }

    fn release_file(&self, url: &str, token: &str) -> BackendResult<()> {
        if token == format!("token:{url}") {
            Ok(())
        } else {
            Err(err(Errno::INVAL, "unknown token"))
        }
    }

    fn bring_online_list(
        &self,
        urls: &[&str],
        _pin_time: Duration,
        _timeout: Duration,
        asynchronous: bool,
    ) -> BackendResult<StageBatch<BackendError>> {
        if !self.batch_staging {
            return Err(BackendError::unsupported("bring_online_list"));
        }
        Ok(StageBatch {
            token: Some(Self::batch_token(urls)),
            files: self.per_file(urls, || !asynchronous),
        })
    }

    fn bring_online_poll_list(
        &self,
        urls: &[&str],
        token: &str,
    ) -> BackendResult<Vec<BackendResult<bool>>> {
        self.check_batch(urls, token)?;
        Ok(self.per_file(urls, || true))
    }

    fn release_file_list(
        &self,
        urls: &[&str],
        token: &str,
    ) -> BackendResult<Vec<BackendResult<()>>> {
        self.check_batch(urls, token)?;
        Ok(self.per_file(urls, || ()))
    }

    fn abort_files(&self, urls: &[&str], token: &str) -> BackendResult<Vec<BackendResult<()>>> {
        self.check_batch(urls, token)?;
        Ok(self.per_file(urls, || ()))
    }
}
