//! Where board bytes come from.
//!
//! A [`BoardSource`] exposes named entries: a loose `.kicad_pcb` file, a
//! project directory, or a zip archive of one. Entry names always use `/`.

use std::fs::{self, File};
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use zip::result::ZipError;
use zip::ZipArchive;

use crate::core::BomError;

pub const BOARD_EXTENSION: &str = ".kicad_pcb";

/// Deepest directory level searched by [`DirectorySource`].
const MAX_DEPTH: usize = 20;

pub trait BoardSource {
    /// Entry names, sorted.
    fn list_entries(&self) -> Result<Vec<String>, BomError>;

    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, BomError>;

    /// Entry to read when none is requested, bypassing board-file
    /// selection. Only a source that is itself a single file has one.
    fn default_entry(&self) -> Option<String> {
        None
    }
}

/// A single file on disk; its only entry is its file name.
pub struct FileSource {
    path: PathBuf,
    name: String,
}

impl FileSource {
    pub fn new(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self {
            path: path.to_path_buf(),
            name,
        }
    }
}

impl BoardSource for FileSource {
    fn list_entries(&self) -> Result<Vec<String>, BomError> {
        Ok(vec![self.name.clone()])
    }

    fn default_entry(&self) -> Option<String> {
        Some(self.name.clone())
    }

    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, BomError> {
        if name != self.name {
            return Err(BomError::ArchiveEntryNotFound(name.to_string()));
        }
        Ok(fs::read(&self.path)?)
    }
}

/// A project directory, walked recursively.
pub struct DirectorySource {
    root: PathBuf,
    entries: Vec<String>,
}

impl DirectorySource {
    pub fn new(root: &Path) -> Result<Self, BomError> {
        let mut files = Vec::new();
        walk_dir(root, &mut files, 0)?;

        let mut entries: Vec<String> = files
            .iter()
            .filter_map(|path| path.strip_prefix(root).ok())
            .map(|rel| {
                rel.components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .collect();
        entries.sort();
        tracing::debug!("{}: {} files", root.display(), entries.len());

        Ok(Self {
            root: root.to_path_buf(),
            entries,
        })
    }
}

impl BoardSource for DirectorySource {
    fn list_entries(&self) -> Result<Vec<String>, BomError> {
        Ok(self.entries.clone())
    }

    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, BomError> {
        // only names from the walk; keeps `..` from escaping the root
        if !self.entries.iter().any(|e| e == name) {
            return Err(BomError::ArchiveEntryNotFound(name.to_string()));
        }
        Ok(fs::read(self.root.join(name))?)
    }
}

fn walk_dir(dir: &Path, files: &mut Vec<PathBuf>, depth: usize) -> Result<(), BomError> {
    if depth > MAX_DEPTH {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name.starts_with('.') || name == "node_modules" || name == "target" || name == "build" {
                continue;
            }
            walk_dir(&path, files, depth + 1)?;
        } else if path.is_file() {
            files.push(path);
        }
    }
    Ok(())
}

/// A zip archive. Directory entries are not listed.
pub struct ZipSource<R: Read + Seek> {
    archive: ZipArchive<R>,
}

impl ZipSource<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, BomError> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> ZipSource<R> {
    pub fn new(reader: R) -> Result<Self, BomError> {
        let archive = ZipArchive::new(reader)?;
        tracing::debug!("Opened archive with {} entries", archive.len());
        Ok(Self { archive })
    }
}

impl<R: Read + Seek> BoardSource for ZipSource<R> {
    fn list_entries(&self) -> Result<Vec<String>, BomError> {
        let mut names: Vec<String> = self
            .archive
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .map(str::to_string)
            .collect();
        names.sort();
        Ok(names)
    }

    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, BomError> {
        let mut file = match self.archive.by_name(name) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => {
                return Err(BomError::ArchiveEntryNotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

/// Pick the adapter for `path`: directory, `.zip` archive, or loose file.
pub fn open_source(path: &Path) -> Result<Box<dyn BoardSource>, BomError> {
    if path.is_dir() {
        return Ok(Box::new(DirectorySource::new(path)?));
    }
    let is_zip = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("zip"));
    if is_zip {
        Ok(Box::new(ZipSource::open(path)?))
    } else {
        Ok(Box::new(FileSource::new(path)))
    }
}

/// A board file KiCad's user would mean, not an autosave or backup copy.
pub fn is_board_entry(name: &str) -> bool {
    if !name.ends_with(BOARD_EXTENSION) {
        return false;
    }
    let mut components = name.split('/').rev();
    let file_name = components.next().unwrap_or(name);
    !file_name.starts_with("_autosave-") && !components.any(|dir| dir.contains("-backup"))
}

/// Name of the entry to read: `requested` if it exists, otherwise the only
/// board file among `entries`.
pub fn select_board_entry(entries: &[String], requested: Option<&str>) -> Result<String, BomError> {
    if let Some(name) = requested {
        return if entries.iter().any(|e| e == name) {
            Ok(name.to_string())
        } else {
            Err(BomError::ArchiveEntryNotFound(name.to_string()))
        };
    }

    let boards: Vec<&String> = entries.iter().filter(|e| is_board_entry(e)).collect();
    match boards.as_slice() {
        [] => Err(BomError::ArchiveEntryNotFound(format!("*{}", BOARD_EXTENSION))),
        [only] => Ok(only.to_string()),
        _ => Err(BomError::AmbiguousBoardEntry(
            boards.into_iter().cloned().collect(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorKind;
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn zip_of(files: &[(&str, &str)]) -> Cursor<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.add_directory("project/", SimpleFileOptions::default()).unwrap();
        for (name, contents) in files {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        let mut cursor = writer.finish().unwrap();
        cursor.set_position(0);
        cursor
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_zip_source_lists_and_reads() {
        let mut source = ZipSource::new(zip_of(&[
            ("project/board.kicad_pcb", "(kicad_pcb)"),
            ("project/board.kicad_pro", "{}"),
        ]))
        .unwrap();
        assert_eq!(
            source.list_entries().unwrap(),
            names(&["project/board.kicad_pcb", "project/board.kicad_pro"])
        );
        assert_eq!(source.read_entry("project/board.kicad_pcb").unwrap(), b"(kicad_pcb)");

        let err = source.read_entry("missing.kicad_pcb").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArchiveEntryNotFound);
    }

    #[test]
    fn test_not_a_zip() {
        let err = ZipSource::new(Cursor::new(b"(kicad_pcb)".to_vec())).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
    }

    #[test]
    fn test_select_single_board() {
        let entries = names(&[
            "a.kicad_pro",
            "a.kicad_pcb",
            "_autosave-a.kicad_pcb",
            "a-backups/a-2024-01-01.kicad_pcb",
        ]);
        assert_eq!(select_board_entry(&entries, None).unwrap(), "a.kicad_pcb");
    }

    #[test]
    fn test_select_requested_entry() {
        let entries = names(&["a.kicad_pcb", "b.kicad_pcb"]);
        assert_eq!(select_board_entry(&entries, Some("b.kicad_pcb")).unwrap(), "b.kicad_pcb");

        match select_board_entry(&entries, Some("c.kicad_pcb")) {
            Err(BomError::ArchiveEntryNotFound(name)) => assert_eq!(name, "c.kicad_pcb"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_select_no_or_many_boards() {
        match select_board_entry(&names(&["readme.md"]), None) {
            Err(BomError::ArchiveEntryNotFound(name)) => assert_eq!(name, "*.kicad_pcb"),
            other => panic!("unexpected {other:?}"),
        }
        match select_board_entry(&names(&["a.kicad_pcb", "b/b.kicad_pcb"]), None) {
            Err(BomError::AmbiguousBoardEntry(found)) => {
                assert_eq!(found, names(&["a.kicad_pcb", "b/b.kicad_pcb"]))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_directory_source() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("hw/.git")).unwrap();
        fs::create_dir_all(dir.path().join("target")).unwrap();
        fs::write(dir.path().join("hw/main.kicad_pcb"), "(kicad_pcb)").unwrap();
        fs::write(dir.path().join("hw/.git/HEAD"), "ref").unwrap();
        fs::write(dir.path().join("target/old.kicad_pcb"), "(kicad_pcb)").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let mut source = DirectorySource::new(dir.path()).unwrap();
        let entries = source.list_entries().unwrap();
        assert_eq!(entries, names(&["hw/main.kicad_pcb", "notes.txt"]));
        assert_eq!(source.read_entry("hw/main.kicad_pcb").unwrap(), b"(kicad_pcb)");
        assert!(source.read_entry("../etc/passwd").is_err());
    }

    #[test]
    fn test_file_source_default_entry() {
        let file = FileSource::new(Path::new("/boards/_autosave-main.kicad_pcb"));
        assert_eq!(file.default_entry().as_deref(), Some("_autosave-main.kicad_pcb"));

        let archive = ZipSource::new(zip_of(&[("main.kicad_pcb", "(kicad_pcb)")])).unwrap();
        assert_eq!(archive.default_entry(), None);
    }

    #[test]
    fn test_file_source_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.kicad_pcb");
        let mut source = open_source(&path).unwrap();
        assert_eq!(source.list_entries().unwrap(), names(&["gone.kicad_pcb"]));
        let err = source.read_entry("gone.kicad_pcb").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
    }
}
