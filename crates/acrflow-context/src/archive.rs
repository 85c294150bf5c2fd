//! ビルドコンテキストの tar.gz アーカイブ作成
//!
//! ディレクトリを深さ優先で走査し、無視ルールに通ったエントリだけを
//! gzip 圧縮した tar ストリームへ書き出します。

use crate::error::{ContextError, Result};
use crate::ignore::{IgnoreRules, is_common_ignore, normalize_separators};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tar::{Builder, HeaderMode};

const MAX_CONTEXT_SIZE: u64 = 500 * 1024 * 1024; // 500MB

type ArchiveWriter = Builder<GzEncoder<BufWriter<File>>>;

/// Builder for a build context archive.
///
/// Configure with [`with_ignore`](Self::with_ignore), add entries, then [`seal`](Self::seal).
pub struct ContextArchive {
    path: PathBuf,
    writer: ArchiveWriter,
    rules: IgnoreRules,
    root: Option<PathBuf>,
    files: Vec<PathBuf>,
}

/// A finished archive. Immutable.
#[derive(Debug, Clone)]
pub struct SealedArchive {
    path: PathBuf,
    files: Vec<PathBuf>,
    size: u64,
}

impl SealedArchive {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Absolute paths of every packed entry, in the order they were added.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Compressed size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl ContextArchive {
    /// 出力先ファイルを作成してアーカイブを開く
    pub fn create(destination: &Path) -> Result<Self> {
        let path = std::path::absolute(destination).map_err(|source| ContextError::CreateArchive {
            path: destination.to_path_buf(),
            source,
        })?;
        let file = File::create(&path).map_err(|source| ContextError::CreateArchive {
            path: path.clone(),
            source,
        })?;

        let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        let mut writer = Builder::new(encoder);
        writer.mode(HeaderMode::Complete);
        // シンボリックリンクはリンクのまま格納し、辿らない
        writer.follow_symlinks(false);

        tracing::debug!("Creating build context archive: {}", path.display());

        Ok(Self {
            path,
            writer,
            rules: IgnoreRules::new(),
            root: None,
            files: Vec::new(),
        })
    }

    /// Replace the ignore rules applied to entries added from now on.
    pub fn with_ignore(&mut self, rules: IgnoreRules) -> &mut Self {
        self.rules = rules;
        self
    }

    /// Add a file or a directory, whichever `path` is.
    pub fn add_path(&mut self, path: &Path) -> Result<&mut Self> {
        if path.is_dir() {
            self.add_directory(path)
        } else {
            self.add_file(path)
        }
    }

    /// Add a single file.
    ///
    /// Stored relative to the current root when it lives under it, otherwise
    /// under its own file name.
    pub fn add_file(&mut self, path: &Path) -> Result<&mut Self> {
        self.add_entry(path)?;
        Ok(self)
    }

    /// Add the contents of a directory recursively. The directory becomes the
    /// root that entry names are made relative to.
    pub fn add_directory(&mut self, dir: &Path) -> Result<&mut Self> {
        if !dir.exists() {
            tracing::debug!("Context directory does not exist, skipping: {}", dir.display());
            return Ok(self);
        }

        let root = std::path::absolute(dir)?;
        self.root = Some(root.clone());

        for child in read_children(&root) {
            self.add_entry(&child)?;
        }
        Ok(self)
    }

    /// Paths packed so far.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// tar と gzip を閉じてファイルを確定する
    pub fn seal(self) -> Result<SealedArchive> {
        let encoder = self.writer.into_inner()?;
        let buffered = encoder.finish()?;
        let file = buffered.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        let size = file.metadata()?.len();

        tracing::debug!(
            "Build context sealed: {} entries, {} bytes",
            self.files.len(),
            size
        );
        check_context_size(size);

        Ok(SealedArchive {
            path: self.path,
            files: self.files,
            size,
        })
    }

    fn add_entry(&mut self, path: &Path) -> Result<()> {
        let absolute = std::path::absolute(path)?;
        let Some(name) = absolute.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return Ok(());
        };
        let entry_name = self.entry_name(&absolute, &name);
        let relative = normalize_separators(&entry_name.to_string_lossy());

        if !absolute.exists()
            || is_common_ignore(&name)
            || self.rules.is_excluded(&relative)
            || absolute == self.path
        {
            tracing::debug!("Skipping {}", relative);
            return Ok(());
        }

        self.writer
            .append_path_with_name(&absolute, &entry_name)
            .map_err(|source| ContextError::AddEntry {
                path: absolute.clone(),
                source,
            })?;
        self.files.push(absolute.clone());

        let is_real_dir = fs::symlink_metadata(&absolute)
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if is_real_dir {
            for child in read_children(&absolute) {
                self.add_entry(&child)?;
            }
        }
        Ok(())
    }

    fn entry_name(&self, absolute: &Path, name: &str) -> PathBuf {
        match &self.root {
            Some(root) => match absolute.strip_prefix(root) {
                Ok(relative) if !relative.as_os_str().is_empty() => relative.to_path_buf(),
                _ => PathBuf::from(name),
            },
            None => PathBuf::from(name),
        }
    }
}

/// 列挙できないディレクトリは「追加するものなし」として扱う
fn read_children(dir: &Path) -> Vec<PathBuf> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.path()),
                Err(e) => {
                    tracing::debug!("Skipping unreadable entry in {}: {}", dir.display(), e);
                    None
                }
            })
            .collect(),
        Err(e) => {
            tracing::debug!("Cannot list {}: {}", dir.display(), e);
            Vec::new()
        }
    }
}

/// コンテキストサイズのチェックと警告
fn check_context_size(size: u64) {
    if size > MAX_CONTEXT_SIZE {
        tracing::warn!(
            "Build context is large ({}MB). Consider adding ignore rules to exclude unneeded files.",
            size / 1024 / 1024
        );
    }
}
