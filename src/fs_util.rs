use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;

use crate::error::FixtureError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Wrap `inner` so gzip input is decoded transparently and anything else is
/// passed through.
pub fn maybe_gzip_reader<R>(inner: R) -> io::Result<Box<dyn BufRead + Send>>
where
    R: Read + Send + 'static,
{
    let mut buffered = BufReader::new(inner);
    let is_gzip = buffered.fill_buf()?.starts_with(&GZIP_MAGIC);
    if is_gzip {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(buffered))))
    } else {
        Ok(Box::new(buffered))
    }
}

pub fn open_maybe_gzip(path: &Path) -> Result<Box<dyn BufRead + Send>, FixtureError> {
    let file = fs::File::open(path)
        .map_err(|err| FixtureError::Filesystem(format!("open {}: {err}", path.display())))?;
    maybe_gzip_reader(file)
        .map_err(|err| FixtureError::Filesystem(format!("read {}: {err}", path.display())))
}

/// Number of lines in a gzip-compressed text file.
pub fn count_gz_lines(path: &Path) -> io::Result<usize> {
    let file = fs::File::open(path)?;
    let reader = BufReader::new(MultiGzDecoder::new(file));
    let mut count = 0usize;
    for line in reader.split(b'\n') {
        line?;
        count += 1;
    }
    Ok(count)
}

pub fn ensure_dir(path: &Path) -> Result<(), FixtureError> {
    fs::create_dir_all(path)
        .map_err(|err| FixtureError::Filesystem(format!("create {}: {err}", path.display())))
}

/// Every `*.tsv.gz` below `root`, sorted.
pub fn find_sumstat_files(root: &Path) -> Result<Vec<PathBuf>, FixtureError> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = fs::read_dir(&dir)
            .map_err(|err| FixtureError::Filesystem(format!("read {}: {err}", dir.display())))?;
        for entry in entries {
            let entry = entry.map_err(|err| FixtureError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.ends_with(".tsv.gz"))
                .unwrap_or(false)
            {
                out.push(path);
            }
        }
    }
    out.sort();
    Ok(out)
}
