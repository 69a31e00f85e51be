//! Scoped seek used to patch bytes already written.

use std::io::{self, Seek, SeekFrom, Write};

/// Remembers where writing should resume and seeks back there when done,
/// whether or not the patch succeeded.
pub(crate) struct SeekCheckpoint<'a, W: Write + Seek> {
    writer: &'a mut W,
    resume: u64,
    restored: bool,
}

impl<'a, W: Write + Seek> SeekCheckpoint<'a, W> {
    pub fn new(writer: &'a mut W, resume: u64) -> Self {
        Self {
            writer,
            resume,
            restored: false,
        }
    }

    /// Overwrite `bytes` at absolute position `pos`.
    pub fn patch(&mut self, pos: u64, bytes: &[u8]) -> io::Result<()> {
        self.writer.seek(SeekFrom::Start(pos))?;
        self.writer.write_all(bytes)
    }

    /// Seek back to the resume position.
    pub fn restore(mut self) -> io::Result<()> {
        self.restored = true;
        self.writer.seek(SeekFrom::Start(self.resume)).map(|_| ())
    }
}

impl<W: Write + Seek> Drop for SeekCheckpoint<'_, W> {
    fn drop(&mut self) {
        if !self.restored {
            let _ = self.writer.seek(SeekFrom::Start(self.resume));
        }
    }
}
