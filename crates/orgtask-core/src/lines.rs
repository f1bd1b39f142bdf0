//! Line-oriented view of an org document.
//!
//! Every line keeps its own `\n` terminator, so joining the lines reproduces
//! the input byte for byte. Only the last line may lack a terminator.
//! Edits go through the splice operations below, which take line content
//! without a terminator and keep that invariant.

use std::fmt;

/// An org document held as a sequence of terminated lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lines {
    lines: Vec<String>,
}

impl Lines {
    /// Split text into lines, keeping terminators.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        text.split_inclusive('\n').map(String::from).collect()
    }

    /// Join the lines back into a document.
    #[must_use]
    pub fn to_text(&self) -> String {
        self.lines.concat()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Raw line at `index`, terminator included.
    #[must_use]
    pub fn raw(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    /// Line content at `index`, terminator stripped.
    #[must_use]
    pub fn content(&self, index: usize) -> Option<&str> {
        self.raw(index).map(strip_terminator)
    }

    /// Iterate over line contents, terminators stripped.
    pub fn contents(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|l| strip_terminator(l))
    }

    /// Replace the content of a line, keeping its terminator.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    pub fn replace(&mut self, index: usize, content: &str) {
        let terminated = self.lines[index].ends_with('\n');
        let mut line = content.to_string();
        if terminated {
            line.push('\n');
        }
        self.lines[index] = line;
    }

    /// Insert a terminated line before `index`.
    ///
    /// Inserting after an unterminated last line terminates that line first.
    ///
    /// # Panics
    /// Panics if `index > len`.
    pub fn insert(&mut self, index: usize, content: &str) {
        if index > 0 {
            self.terminate(index - 1);
        }
        self.lines.insert(index, format!("{content}\n"));
    }

    /// Remove a line and return its raw text.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    pub fn remove(&mut self, index: usize) -> String {
        self.lines.remove(index)
    }

    /// Remove the last line.
    pub fn pop(&mut self) -> Option<String> {
        self.lines.pop()
    }

    /// Keep only the first `len` lines.
    pub fn truncate(&mut self, len: usize) {
        self.lines.truncate(len);
    }

    /// Append raw text after the last line, splitting it into lines.
    pub fn append_text(&mut self, text: &str) {
        if let Some(last) = self.lines.len().checked_sub(1) {
            self.terminate(last);
        }
        self.lines.extend(text.split_inclusive('\n').map(String::from));
    }

    /// Raw lines in `[start, end)` joined back into text.
    #[must_use]
    pub fn slice_text(&self, start: usize, end: usize) -> String {
        let end = end.min(self.lines.len());
        if start >= end {
            return String::new();
        }
        self.lines[start..end].concat()
    }

    fn terminate(&mut self, index: usize) {
        if let Some(line) = self.lines.get_mut(index) {
            if !line.ends_with('\n') {
                line.push('\n');
            }
        }
    }
}

impl FromIterator<String> for Lines {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            lines: iter.into_iter().collect(),
        }
    }
}

impl From<&str> for Lines {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

impl fmt::Display for Lines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            f.write_str(line)?;
        }
        Ok(())
    }
}

fn strip_terminator(line: &str) -> &str {
    line.strip_suffix('\n').unwrap_or(line)
}
