use crate::catalog::Language;
use crate::error::{Result, ScanError, SkipReason};
use crate::matcher::imports::ImportAliases;
use std::ops::Range;
use std::path::{Path, PathBuf};

const BINARY_SNIFF_LEN: usize = 8 * 1024;
const SNIPPET_MAX_CHARS: usize = 160;

/// A source file loaded for scanning, with a line index over its text.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub display: String,
    pub language: Language,
    pub text: String,
    /// Import aliases; empty outside Python.
    pub imports: ImportAliases,
    line_starts: Vec<usize>,
}

impl SourceFile {
    /// Loads `path`; oversized, binary, unreadable and non-UTF-8 files are
    /// reported as [`ScanError::SkippedFile`].
    pub fn load(path: &Path, display: String, language: Language, max_size: u64) -> Result<Self> {
        let skipped = |reason| ScanError::SkippedFile {
            path: PathBuf::from(&display),
            reason,
        };

        let metadata = std::fs::metadata(path).map_err(|_| skipped(SkipReason::Unreadable))?;
        if metadata.len() > max_size {
            return Err(skipped(SkipReason::Oversized {
                size: metadata.len(),
                limit: max_size,
            }));
        }

        let bytes = std::fs::read(path).map_err(|_| skipped(SkipReason::Unreadable))?;
        let sniff = &bytes[..bytes.len().min(BINARY_SNIFF_LEN)];
        if sniff.contains(&0) {
            return Err(skipped(SkipReason::Binary));
        }
        let text = String::from_utf8(bytes).map_err(|_| skipped(SkipReason::NotUtf8))?;

        Ok(Self::new(path.to_path_buf(), display, language, text))
    }

    pub fn from_text(display: &str, language: Language, text: &str) -> Self {
        Self::new(PathBuf::from(display), display.to_string(), language, text.to_string())
    }

    fn new(path: PathBuf, display: String, language: Language, text: String) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        let imports = match language {
            Language::Python => ImportAliases::parse_python(&text),
            _ => ImportAliases::default(),
        };
        Self {
            path,
            display,
            language,
            text,
            imports,
            line_starts,
        }
    }

    /// 1-based line and 0-based character column of a byte offset.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.text.len());
        let line_index = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let start = self.line_starts[line_index];
        let column = self
            .text
            .get(start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(offset - start);
        (line_index + 1, column)
    }

    /// Byte offset of the start of a 1-based line.
    pub fn line_start(&self, line: usize) -> Option<usize> {
        self.line_starts.get(line.checked_sub(1)?).copied()
    }

    pub fn line_text(&self, line: usize) -> &str {
        let Some(start) = self.line_start(line) else {
            return "";
        };
        let end = self
            .line_starts
            .get(line)
            .map(|next| next - 1)
            .unwrap_or(self.text.len());
        self.text.get(start..end).unwrap_or("").trim_end_matches('\r')
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Whether the line holding `offset` is a comment line.
    pub fn is_comment_line(&self, offset: usize) -> bool {
        let (line, _) = self.line_col(offset);
        let trimmed = self.line_text(line).trim_start();
        if trimmed.starts_with(self.language.line_comment()) {
            return true;
        }
        self.language.has_block_comments()
            && (trimmed.starts_with("/*") || trimmed.starts_with("* ") || trimmed == "*")
    }

    pub fn slice(&self, span: &Range<usize>) -> &str {
        self.text.get(span.clone()).unwrap_or("")
    }

    /// First line of the spanned text, trimmed and capped.
    pub fn snippet(&self, span: &Range<usize>) -> String {
        let first = self.slice(span).lines().next().unwrap_or("").trim();
        if first.chars().count() > SNIPPET_MAX_CHARS {
            let cut: String = first.chars().take(SNIPPET_MAX_CHARS).collect();
            format!("{}…", cut)
        } else {
            first.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_line_col() {
        let src = SourceFile::from_text("a.js", Language::JavaScript, "ab\ncdé\nf");
        assert_eq!(src.line_col(0), (1, 0));
        assert_eq!(src.line_col(3), (2, 0));
        assert_eq!(src.line_col(5), (2, 2));
        assert_eq!(src.line_col(8), (3, 0));
        assert_eq!(src.line_text(2), "cdé");
        assert_eq!(src.line_count(), 3);
    }

    #[test]
    fn test_comment_lines() {
        let js = SourceFile::from_text(
            "a.js",
            Language::JavaScript,
            "// setInterval(x)\n/* block\n * setInterval(y)\n */\nsetInterval(z)\n",
        );
        assert!(js.is_comment_line(3));
        assert!(js.is_comment_line(js.line_start(3).unwrap() + 4));
        assert!(!js.is_comment_line(js.line_start(5).unwrap()));

        let py = SourceFile::from_text("a.py", Language::Python, "  # open(x)\nopen(y)\n");
        assert!(py.is_comment_line(5));
        assert!(!py.is_comment_line(12));
    }

    #[test]
    fn test_load_skips_binary_and_oversized() {
        let dir = tempfile::tempdir().unwrap();

        let binary = dir.path().join("blob.js");
        std::fs::File::create(&binary)
            .unwrap()
            .write_all(b"abc\0def")
            .unwrap();
        let err = SourceFile::load(&binary, "blob.js".into(), Language::JavaScript, 1024)
            .unwrap_err();
        assert!(matches!(
            err,
            ScanError::SkippedFile {
                reason: SkipReason::Binary,
                ..
            }
        ));

        let big = dir.path().join("big.js");
        std::fs::write(&big, "x".repeat(64)).unwrap();
        let err = SourceFile::load(&big, "big.js".into(), Language::JavaScript, 10).unwrap_err();
        assert!(matches!(
            err,
            ScanError::SkippedFile {
                reason: SkipReason::Oversized { .. },
                ..
            }
        ));

        let latin1 = dir.path().join("latin1.py");
        std::fs::write(&latin1, [b'a', 0xE9, b'\n']).unwrap();
        let err = SourceFile::load(&latin1, "latin1.py".into(), Language::Python, 1024)
            .unwrap_err();
        assert!(matches!(
            err,
            ScanError::SkippedFile {
                reason: SkipReason::NotUtf8,
                ..
            }
        ));

        let missing = dir.path().join("missing.go");
        assert!(SourceFile::load(&missing, "missing.go".into(), Language::Go, 1024).is_err());
    }
}
