//! The backing-store file: evicted page data, keyed by `[PAGE:<id>]`
//! headers. Guarded by its own mutex, independent of the in-memory
//! page/frame table mutex.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct BackingStore {
    path: PathBuf,
    /// Serializes the read-modify-write cycle below; the store is a flat
    /// text file, not something we can update with file-level locking.
    lock: Mutex<()>,
}

impl BackingStore {
    /// Truncates the file at construction.
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::write(&path, "")?;
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    /// Returns the page's `DATA:` payload if a `[PAGE:<id>]` record exists.
    pub fn read_page(&self, page_id: u64) -> io::Result<Option<String>> {
        let _guard = self.lock.lock().unwrap();
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let header = format!("[PAGE:{page_id}]");
        let mut lines = contents.lines();
        while let Some(line) = lines.next() {
            if line == header {
                for data_line in lines.by_ref() {
                    if let Some(payload) = data_line.strip_prefix("DATA:") {
                        return Ok(Some(payload.to_owned()));
                    }
                    if data_line.starts_with("[PAGE:") || data_line.is_empty() {
                        break;
                    }
                }
                break;
            }
        }
        Ok(None)
    }

    /// Writes (or in-place rewrites) the `[PAGE:<id>]` record for `page_id`.
    /// `frame_index` is `-1` when the page is not currently resident.
    pub fn write_page(&self, page_id: u64, data: &str, frame_index: i64) -> io::Result<()> {
        let _guard = self.lock.lock().unwrap();
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e),
        };
        let mut lines: Vec<String> = contents.lines().map(str::to_owned).collect();
        let header = format!("[PAGE:{page_id}]");

        if let Some(header_pos) = lines.iter().position(|l| *l == header) {
            let mut data_pos = None;
            let mut frame_pos = None;
            for i in (header_pos + 1)..lines.len() {
                if lines[i].starts_with("DATA:") {
                    data_pos = Some(i);
                } else if lines[i].starts_with("EVICTED_FROM_FRAME:") {
                    frame_pos = Some(i);
                    break;
                } else if lines[i].starts_with("[PAGE:") || lines[i].is_empty() {
                    break;
                }
            }
            match data_pos {
                Some(i) => lines[i] = format!("DATA:{data}"),
                None => lines.insert(header_pos + 1, format!("DATA:{data}")),
            }
            // Re-scan: inserting the DATA line may have shifted frame_pos.
            let frame_pos = frame_pos.map(|p| if data_pos.is_none() { p + 1 } else { p });
            match frame_pos {
                Some(i) => lines[i] = format!("EVICTED_FROM_FRAME:{frame_index}"),
                None => {
                    let insert_at = data_pos.map(|p| p + 1).unwrap_or(header_pos + 2);
                    lines.insert(insert_at, format!("EVICTED_FROM_FRAME:{frame_index}"));
                },
            }
        } else {
            lines.push(header);
            lines.push(format!("DATA:{data}"));
            lines.push(format!("EVICTED_FROM_FRAME:{frame_index}"));
            lines.push(String::new());
        }

        let mut out = lines.join("\n");
        out.push('\n');
        fs::write(&self.path, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackingStore::new(dir.path().join("backing.txt")).unwrap();
        store.write_page(3, "hello", 2).unwrap();
        assert_eq!(store.read_page(3).unwrap(), Some("hello".to_owned()));
    }

    #[test]
    fn rewrite_in_place_replaces_data() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackingStore::new(dir.path().join("backing.txt")).unwrap();
        store.write_page(1, "first", 0).unwrap();
        store.write_page(1, "second", -1).unwrap();
        assert_eq!(store.read_page(1).unwrap(), Some("second".to_owned()));
    }

    #[test]
    fn missing_page_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackingStore::new(dir.path().join("backing.txt")).unwrap();
        assert_eq!(store.read_page(42).unwrap(), None);
    }

    #[test]
    fn multiple_pages_coexist() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackingStore::new(dir.path().join("backing.txt")).unwrap();
        store.write_page(1, "a", 0).unwrap();
        store.write_page(2, "b", 1).unwrap();
        assert_eq!(store.read_page(1).unwrap(), Some("a".to_owned()));
        assert_eq!(store.read_page(2).unwrap(), Some("b".to_owned()));
    }
}
