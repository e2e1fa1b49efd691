//! Image source sequencer: lazy directory walk plus decode into a reusable
//! output buffer.
//!
//! The sequencer owns the "current image" identity for the server. Each
//! advance pulls the next matching file path from a lazy walk of the image
//! root, decodes it to RGB8, and flattens the pixels into a buffer that is
//! reused across advances. When the walk runs dry and `repeat` is on, the
//! walk is rebuilt from the root and enumeration starts over; the
//! filesystem is re-read on each cycle, so files added or removed between
//! cycles show up in the next one.

use crate::error::{Error, Result};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

/// File extensions served, matched case-sensitively.
const IMAGE_EXTENSIONS: [&str; 2] = ["jpg", "png"];

/// Decoded image geometry: height x width x channels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameShape {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

/// Lazy depth-first walk over image files under a root directory.
///
/// Directories are only read when the walk reaches them. Entries within a
/// directory are visited in name order so that a restarted walk replays
/// the same sequence over an unchanged tree: a directory yields its own
/// matching files first, then descends into subdirectories.
struct ImageWalk {
    skip_substrings: Vec<String>,
    /// Directories not yet read, most recently discovered last.
    pending_dirs: Vec<PathBuf>,
    /// Files of the directory currently being yielded, in name order.
    current_files: std::vec::IntoIter<PathBuf>,
}

impl ImageWalk {
    fn new(root: &Path, skip_substrings: &[String]) -> Self {
        Self {
            skip_substrings: skip_substrings.to_vec(),
            pending_dirs: vec![root.to_path_buf()],
            current_files: Vec::new().into_iter(),
        }
    }

    /// Whether a file path should be yielded: matching extension and not
    /// excluded by any skip substring.
    fn matches(&self, path: &Path) -> bool {
        let extension_ok = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e))
            .unwrap_or(false);
        if !extension_ok {
            return false;
        }

        let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let absolute = absolute.to_string_lossy();
        !self
            .skip_substrings
            .iter()
            .any(|pattern| absolute.contains(pattern.as_str()))
    }

    /// Read one directory, splitting its entries into files (kept for
    /// yielding) and subdirectories (queued for later). Unreadable
    /// directories are skipped rather than ending the walk.
    fn descend(&mut self, dir: &Path) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Skipping unreadable directory {}: {}", dir.display(), e);
                return;
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .collect();
        paths.sort();

        let mut files = Vec::new();
        let mut subdirs = Vec::new();
        for path in paths {
            if path.is_dir() {
                subdirs.push(path);
            } else if path.is_file() {
                files.push(path);
            }
        }

        // pending_dirs is popped from the back: push subdirectories in
        // reverse so the first-sorting one is visited first.
        for subdir in subdirs.into_iter().rev() {
            self.pending_dirs.push(subdir);
        }
        self.current_files = files.into_iter();
    }
}

impl Iterator for ImageWalk {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            while let Some(path) = self.current_files.next() {
                if self.matches(&path) {
                    return Some(path);
                }
            }
            let dir = self.pending_dirs.pop()?;
            self.descend(&dir);
        }
    }
}

/// Ordered cursor over the image files beneath a root directory.
pub struct ImageSequencer {
    root: PathBuf,
    repeat: bool,
    skip_substrings: Vec<String>,
    walk: Option<ImageWalk>,
    current_path: Option<PathBuf>,
    shape: FrameShape,
    /// Reused across advances; only grows.
    buffer: Vec<u8>,
}

impl ImageSequencer {
    pub fn new(root: PathBuf, repeat: bool, skip_substrings: Vec<String>) -> Self {
        Self {
            root,
            repeat,
            skip_substrings,
            walk: None,
            current_path: None,
            shape: FrameShape::default(),
            buffer: Vec::new(),
        }
    }

    /// Start (or restart) the walk from the root.
    pub fn init(&mut self) -> Result<()> {
        if !self.root.is_dir() {
            return Err(Error::Config(format!(
                "image root {} does not exist or is not a directory",
                self.root.display()
            )));
        }
        self.walk = Some(ImageWalk::new(&self.root, &self.skip_substrings));
        debug!("Image root {} initialized", self.root.display());
        Ok(())
    }

    /// Advance to the next image and load it into the output buffer.
    ///
    /// Returns `Ok(true)` when an image was loaded, `Ok(false)` when the
    /// walk is exhausted and `repeat` is off (the caller decides what
    /// end-of-stream means), and an error when decoding fails. A decode
    /// error leaves `current_path` pointing at the offending file.
    pub fn advance(&mut self) -> Result<bool> {
        let walk = self
            .walk
            .as_mut()
            .ok_or_else(|| Error::State("sequencer not initialized".to_string()))?;

        let next = match walk.next() {
            Some(path) => path,
            None => {
                info!("All images served.");
                if !self.repeat {
                    return Ok(false);
                }
                info!("Repeating all available images.");
                let mut fresh = ImageWalk::new(&self.root, &self.skip_substrings);
                let first = fresh
                    .next()
                    .ok_or_else(|| Error::NoImages(self.root.clone()))?;
                self.walk = Some(fresh);
                first
            }
        };

        self.load(next)?;
        Ok(true)
    }

    fn load(&mut self, path: PathBuf) -> Result<()> {
        let decoded = image::open(&path);
        self.current_path = Some(path);
        let decoded = decoded?.into_rgb8();
        self.shape = FrameShape {
            width: decoded.width(),
            height: decoded.height(),
            channels: 3,
        };
        self.buffer.clear();
        self.buffer.extend_from_slice(decoded.as_raw());
        debug!(
            "Loaded image ({}x{}x{})",
            self.shape.width, self.shape.height, self.shape.channels
        );
        Ok(())
    }

    /// Path of the image currently loaded (or being loaded when the last
    /// advance failed).
    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    pub fn shape(&self) -> FrameShape {
        self.shape
    }

    /// Raw RGB8 bytes of the current image.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn repeat(&self) -> bool {
        self.repeat
    }
}
