use std::ops::Range;

use tracing::debug;

use crate::consts::{FileDescriptor, ENTRY_DELIMITER, LINK_REGISTRY_NAME, MAX_SIZE_FILE, NAME_DELIMITER};
use crate::driver::DeviceDriver;
use crate::ops::{validate_name, FlatFS};
use crate::util::error::{FsError, Result};

/// One `<entry><target><name><link>` record of the registry file.
#[derive(Debug, PartialEq)]
struct LinkEntry<'a> {
    range: Range<usize>,
    target: &'a [u8],
    link: &'a [u8],
}

fn parse_entries(buffer: &[u8]) -> Vec<LinkEntry<'_>> {
    let starts: Vec<usize> = buffer
        .iter()
        .enumerate()
        .filter(|(_, byte)| **byte == ENTRY_DELIMITER)
        .map(|(i, _)| i)
        .collect();

    let mut entries = Vec::with_capacity(starts.len());
    for (n, start) in starts.iter().enumerate() {
        let end = starts.get(n + 1).copied().unwrap_or(buffer.len());
        let body = &buffer[start + 1..end];
        if let Some(split) = body.iter().position(|byte| *byte == NAME_DELIMITER) {
            entries.push(LinkEntry {
                range: *start..end,
                target: &body[..split],
                link: &body[split + 1..],
            });
        }
    }
    entries
}

fn encode_entry(target: &[u8], link: &[u8]) -> Vec<u8> {
    let mut entry = Vec::with_capacity(target.len() + link.len() + 2);
    entry.push(ENTRY_DELIMITER);
    entry.extend_from_slice(target);
    entry.push(NAME_DELIMITER);
    entry.extend_from_slice(link);
    entry
}

impl<A: DeviceDriver> FlatFS<A> {
    /// Records `link` as an alias of the existing file `name`.
    pub fn create_link(&mut self, name: &str, link: &str) -> Result<()> {
        self.ensure_mounted()?;
        let target = validate_name(name)?;
        let alias = validate_name(link)?;
        self.lookup_file(name)?;

        if self.structure.inode_table.find(LINK_REGISTRY_NAME.as_bytes()).is_none() {
            self.create_entry(LINK_REGISTRY_NAME)?;
        }
        self.edit_registry(|buffer| {
            if parse_entries(buffer).iter().any(|entry| entry.link == alias) {
                return Err(FsError::AlreadyExists(link.to_string()));
            }
            let entry = encode_entry(target, alias);
            if buffer.len() + entry.len() > MAX_SIZE_FILE {
                return Err(FsError::NoSpace);
            }
            buffer.extend_from_slice(&entry);
            Ok(())
        })?;
        debug!(file = name, link, "created link");
        Ok(())
    }

    pub fn remove_link(&mut self, link: &str) -> Result<()> {
        self.ensure_mounted()?;
        if self.structure.inode_table.find(LINK_REGISTRY_NAME.as_bytes()).is_none() {
            return Err(FsError::NotFound(link.to_string()));
        }
        self.edit_registry(|buffer| {
            let range = parse_entries(buffer)
                .into_iter()
                .find(|entry| entry.link == link.as_bytes())
                .map(|entry| entry.range)
                .ok_or_else(|| FsError::NotFound(link.to_string()))?;
            buffer.drain(range);
            Ok(())
        })?;
        debug!(link, "removed link");
        Ok(())
    }

    /// Name of the file `link` points to.
    pub fn resolve_link(&mut self, link: &str) -> Result<String> {
        self.links()?
            .into_iter()
            .find(|(alias, _)| alias == link)
            .map(|(_, target)| target)
            .ok_or_else(|| FsError::NotFound(link.to_string()))
    }

    /// Every `(link, target)` pair in registry order.
    pub fn links(&mut self) -> Result<Vec<(String, String)>> {
        self.ensure_mounted()?;
        if self.structure.inode_table.find(LINK_REGISTRY_NAME.as_bytes()).is_none() {
            return Ok(Vec::new());
        }
        let buffer = self.read_registry()?;
        Ok(parse_entries(&buffer)
            .iter()
            .map(|entry| {
                (
                    String::from_utf8_lossy(entry.link).into_owned(),
                    String::from_utf8_lossy(entry.target).into_owned(),
                )
            })
            .collect())
    }

    fn open_registry(&mut self) -> Result<FileDescriptor> {
        let index = self.lookup(LINK_REGISTRY_NAME)?;
        self.open_index(index)
    }

    fn read_registry(&mut self) -> Result<Vec<u8>> {
        let fd = self.open_registry()?;
        let buffer = self.read_all(fd);
        self.close(fd)?;
        buffer
    }

    /// Reads the whole registry, applies `edit` in memory and writes the
    /// result back from offset 0. Nothing is written if `edit` fails.
    fn edit_registry<F>(&mut self, edit: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<u8>) -> Result<()>,
    {
        let fd = self.open_registry()?;
        let result = self.read_all(fd).and_then(|mut buffer| {
            edit(&mut buffer)?;
            self.rewrite(fd, &buffer)
        });
        self.close(fd)?;
        result
    }
}
