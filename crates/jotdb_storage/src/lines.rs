//! Lazy line iteration over a block file.

use crate::error::{StorageError, StorageResult};
use std::fs::File;
use std::io::{BufRead, BufReader};

/// Internal read buffer size. Lines spanning the buffer are reassembled, so
/// this never affects the sequence of lines produced.
const READ_BUF_SIZE: usize = 64 * 1024;

/// Iterator over the lines of a block file.
///
/// Yields `(line, line_no)` pairs in file order, where `line` excludes the
/// trailing `'\n'` and `line_no` is 1-based. A trailing fragment with no
/// terminating newline (a torn final write) is discarded silently. Empty
/// lines yield [`StorageError::EmptyLine`].
pub struct LineReader {
    bid: String,
    reader: BufReader<File>,
    line_no: u64,
    done: bool,
}

impl LineReader {
    pub(crate) fn new(bid: String, file: File) -> Self {
        Self {
            bid,
            reader: BufReader::with_capacity(READ_BUF_SIZE, file),
            line_no: 0,
            done: false,
        }
    }

    /// The block this reader iterates over.
    #[must_use]
    pub fn bid(&self) -> &str {
        &self.bid
    }
}

impl Iterator for LineReader {
    type Item = StorageResult<(String, u64)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut buf = Vec::new();
        match self.reader.read_until(b'\n', &mut buf) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(_) => {
                if buf.last() != Some(&b'\n') {
                    // Unterminated fragment at EOF: a torn final append.
                    self.done = true;
                    return None;
                }
                buf.pop();
                self.line_no += 1;

                if buf.is_empty() {
                    self.done = true;
                    return Some(Err(StorageError::EmptyLine {
                        bid: self.bid.clone(),
                        line_no: self.line_no,
                    }));
                }

                match String::from_utf8(buf) {
                    Ok(line) => Some(Ok((line, self.line_no))),
                    Err(_) => {
                        self.done = true;
                        Some(Err(StorageError::corrupt(
                            &self.bid,
                            self.line_no,
                            "invalid UTF-8",
                        )))
                    }
                }
            }
            Err(e) => {
                self.done = true;
                Some(Err(StorageError::Io(e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, TempDir};

    fn reader_over(content: &[u8]) -> (TempDir, LineReader) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.block");
        let mut f = File::create(&path).unwrap();
        f.write_all(content).unwrap();
        drop(f);
        let reader = LineReader::new("t.block".to_string(), File::open(&path).unwrap());
        (dir, reader)
    }

    #[test]
    fn yields_lines_in_order() {
        let (_dir, reader) = reader_over(b"{\"a\":1}\n{\"b\":2}\n");
        let lines: Vec<_> = reader.collect::<StorageResult<Vec<_>>>().unwrap();
        assert_eq!(
            lines,
            vec![
                ("{\"a\":1}".to_string(), 1),
                ("{\"b\":2}".to_string(), 2)
            ]
        );
    }

    #[test]
    fn discards_unterminated_tail() {
        let (_dir, reader) = reader_over(b"{\"a\":1}\n{\"torn\"");
        let lines: Vec<_> = reader.collect::<StorageResult<Vec<_>>>().unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].0, "{\"a\":1}");
    }

    #[test]
    fn empty_file_yields_nothing() {
        let (_dir, reader) = reader_over(b"");
        assert_eq!(reader.count(), 0);
    }

    #[test]
    fn empty_line_is_an_error() {
        let (_dir, mut reader) = reader_over(b"{\"a\":1}\n\n{\"b\":2}\n");
        assert!(reader.next().unwrap().is_ok());
        let err = reader.next().unwrap().unwrap_err();
        assert!(matches!(err, StorageError::EmptyLine { line_no: 2, .. }));
        assert!(reader.next().is_none());
    }

    #[test]
    fn long_lines_span_the_read_buffer() {
        let big = "x".repeat(READ_BUF_SIZE * 2 + 17);
        let content = format!("{big}\n{big}\n");
        let (_dir, reader) = reader_over(content.as_bytes());
        let lines: Vec<_> = reader.collect::<StorageResult<Vec<_>>>().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].0.len(), big.len());
        assert_eq!(lines[1].1, 2);
    }

    #[test]
    fn utf8_content_round_trips() {
        let line = "{\"name\":\"レモン 🍋\"}";
        let content = format!("{line}\n");
        let (_dir, reader) = reader_over(content.as_bytes());
        let lines: Vec<_> = reader.collect::<StorageResult<Vec<_>>>().unwrap();
        assert_eq!(lines[0].0, line);
    }
}
