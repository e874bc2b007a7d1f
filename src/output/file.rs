use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::output::OutputCollector;

pub const FIELD_SEPARATOR: &str = "\u{1}";
pub const RECORD_SEPARATOR: &str = "\n";

/// Writes a result set as a delimited text file.
///
/// The first record is the header. Each following record is preceded by
/// [`RECORD_SEPARATOR`], so the file never ends in a newline.
#[derive(Debug)]
pub struct FileOutputCollector {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FileOutputCollector {
    /// Create `root/file_name`. Fails if the file already exists.
    pub fn create(root: impl AsRef<Path>, file_name: &str) -> io::Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;
        let path = root.join(file_name);
        let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "output collector is closed"))
    }
}

impl OutputCollector for FileOutputCollector {
    fn init_columns(&mut self, columns: &[String]) -> io::Result<()> {
        let header = columns.join(FIELD_SEPARATOR);
        self.writer()?.write_all(header.as_bytes())
    }

    fn collect(&mut self, values: &[String]) -> io::Result<()> {
        let writer = self.writer()?;
        writer.write_all(RECORD_SEPARATOR.as_bytes())?;
        writer.write_all(values.join(FIELD_SEPARATOR).as_bytes())
    }

    fn close(&mut self) -> io::Result<()> {
        match self.writer.take() {
            Some(mut writer) => writer.flush(),
            None => Ok(()),
        }
    }
}
