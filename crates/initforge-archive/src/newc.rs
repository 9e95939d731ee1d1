//! cpio newc encoder
//!
//! Produces `070701` (newc) archives: ASCII hex headers, NUL-terminated
//! names, header+name and file data each padded to 4-byte boundaries, and a
//! `TRAILER!!!` terminator entry. Owner is always root and mtime is zeroed
//! so repeated builds of the same tree are byte-identical.

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::Result;

const MAGIC: &[u8; 6] = b"070701";
const TRAILER: &str = "TRAILER!!!";

const S_IFDIR: u32 = 0o040000;
const S_IFCHR: u32 = 0o020000;
const S_IFREG: u32 = 0o100000;
const S_IFLNK: u32 = 0o120000;

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    mode: u32,
    nlink: u32,
    rdev_major: u32,
    rdev_minor: u32,
    data: Vec<u8>,
}

/// An in-memory newc archive.
#[derive(Debug, Default)]
pub struct CpioArchive {
    entries: Vec<Entry>,
}

impl CpioArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether an entry with this name exists. Leading slashes are ignored,
    /// so declared absolute paths match their in-archive names.
    pub fn contains(&self, name: &str) -> bool {
        let name = name.trim_start_matches('/');
        self.entries.iter().any(|entry| entry.name == name)
    }

    pub fn add_dir(&mut self, name: &str, mode: u32) {
        self.push(name, S_IFDIR | (mode & 0o7777), 2, 0, 0, Vec::new());
    }

    pub fn add_file(&mut self, name: &str, data: Vec<u8>, mode: u32) {
        self.push(name, S_IFREG | (mode & 0o7777), 1, 0, 0, data);
    }

    pub fn add_symlink(&mut self, name: &str, target: &str) {
        self.push(name, S_IFLNK | 0o777, 1, 0, 0, target.as_bytes().to_vec());
    }

    /// Add a character device node.
    pub fn add_chardev(&mut self, name: &str, mode: u32, major: u32, minor: u32) {
        tracing::debug!("Adding character device: {} ({}:{})", name, major, minor);
        self.push(name, S_IFCHR | (mode & 0o7777), 1, major, minor, Vec::new());
    }

    fn push(
        &mut self,
        name: &str,
        mode: u32,
        nlink: u32,
        rdev_major: u32,
        rdev_minor: u32,
        data: Vec<u8>,
    ) {
        self.entries.push(Entry {
            name: name.trim_start_matches('/').to_string(),
            mode,
            nlink,
            rdev_major,
            rdev_minor,
            data,
        });
    }

    /// Pack a directory tree, entry names relative to `root`.
    pub fn append_recursive(&mut self, root: &Path) -> Result<()> {
        for item in WalkDir::new(root) {
            let item = item?;
            let relative = item
                .path()
                .strip_prefix(root)
                .unwrap_or(item.path())
                .to_string_lossy()
                .into_owned();
            if relative.is_empty() {
                continue;
            }

            let metadata = fs::symlink_metadata(item.path())?;
            let perms = metadata.mode() & 0o7777;
            if item.path_is_symlink() {
                let target = fs::read_link(item.path())?;
                self.add_symlink(&relative, &target.to_string_lossy());
            } else if metadata.is_dir() {
                self.add_dir(&relative, perms);
            } else {
                self.add_file(&relative, fs::read(item.path())?, perms);
            }
        }
        Ok(())
    }

    /// Encode the archive, trailer included.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (index, entry) in self.entries.iter().enumerate() {
            // Inode numbers only need to be unique within the archive.
            encode_entry(&mut out, index as u32 + 1, entry);
        }
        encode_entry(
            &mut out,
            0,
            &Entry {
                name: TRAILER.to_string(),
                mode: 0,
                nlink: 1,
                rdev_major: 0,
                rdev_minor: 0,
                data: Vec::new(),
            },
        );
        out
    }
}

fn encode_entry(out: &mut Vec<u8>, ino: u32, entry: &Entry) {
    out.extend_from_slice(MAGIC);
    for field in [
        ino,
        entry.mode,
        0, // uid
        0, // gid
        entry.nlink,
        0, // mtime
        entry.data.len() as u32,
        0, // devmajor
        0, // devminor
        entry.rdev_major,
        entry.rdev_minor,
        entry.name.len() as u32 + 1,
        0, // check
    ] {
        out.extend_from_slice(format!("{field:08X}").as_bytes());
    }
    out.extend_from_slice(entry.name.as_bytes());
    out.push(0);
    pad(out);
    out.extend_from_slice(&entry.data);
    pad(out);
}

fn pad(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Decode one header starting at `offset`, returning selected fields
    /// and the offset of the next header.
    fn read_header(bytes: &[u8], offset: usize) -> (String, u32, u32, usize) {
        assert_eq!(&bytes[offset..offset + 6], MAGIC);
        let field = |index: usize| {
            let start = offset + 6 + index * 8;
            let text = std::str::from_utf8(&bytes[start..start + 8]).unwrap();
            u32::from_str_radix(text, 16).unwrap()
        };
        let mode = field(1);
        let filesize = field(6) as usize;
        let namesize = field(11) as usize;

        let name_start = offset + 110;
        let name =
            String::from_utf8(bytes[name_start..name_start + namesize - 1].to_vec()).unwrap();
        let mut next = name_start + namesize;
        next += (4 - next % 4) % 4;
        next += filesize;
        next += (4 - next % 4) % 4;
        (name, mode, filesize as u32, next)
    }

    #[test]
    fn test_file_entry_header_fields() {
        let mut archive = CpioArchive::new();
        archive.add_file("init", b"#!/bin/sh\n".to_vec(), 0o755);

        let bytes = archive.to_bytes();
        let (name, mode, filesize, _) = read_header(&bytes, 0);
        assert_eq!(name, "init");
        assert_eq!(mode, S_IFREG | 0o755);
        assert_eq!(filesize, 10);
    }

    #[test]
    fn test_chardev_entry_fields() {
        let mut archive = CpioArchive::new();
        archive.add_chardev("dev/console", 0o600, 5, 1);

        let bytes = archive.to_bytes();
        let (name, mode, filesize, _) = read_header(&bytes, 0);
        assert_eq!(name, "dev/console");
        assert_eq!(mode, S_IFCHR | 0o600);
        assert_eq!(filesize, 0);
    }

    #[test]
    fn test_trailer_terminates_archive() {
        let mut archive = CpioArchive::new();
        archive.add_dir("etc", 0o755);

        let bytes = archive.to_bytes();
        let (_, _, _, trailer_offset) = read_header(&bytes, 0);
        let (name, _, _, end) = read_header(&bytes, trailer_offset);
        assert_eq!(name, TRAILER);
        assert_eq!(end, bytes.len());
    }

    #[test]
    fn test_archive_is_four_byte_aligned() {
        let mut archive = CpioArchive::new();
        archive.add_file("a", b"xyz".to_vec(), 0o644);
        archive.add_file("bb", b"1".to_vec(), 0o644);

        assert_eq!(archive.to_bytes().len() % 4, 0);
    }

    #[test]
    fn test_contains_ignores_leading_slash() {
        let mut archive = CpioArchive::new();
        archive.add_file("etc/profile", Vec::new(), 0o644);

        assert!(archive.contains("/etc/profile"));
        assert!(archive.contains("etc/profile"));
        assert!(!archive.contains("etc/missing"));
    }

    #[test]
    fn test_append_recursive_uses_relative_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("bin")).unwrap();
        std::fs::write(dir.path().join("bin/sh"), b"elf").unwrap();

        let mut archive = CpioArchive::new();
        archive.append_recursive(dir.path()).unwrap();

        assert!(archive.contains("bin"));
        assert!(archive.contains("bin/sh"));
        assert!(!archive.contains(&dir.path().to_string_lossy()));
    }
}
