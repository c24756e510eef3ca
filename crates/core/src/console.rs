//! Console sink for user-facing lines
//!
//! The watcher never formats terminal output itself. It hands each line and
//! its tone to a `Console`, which the binary renders with colors.

/// How a line should be rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// Startup and status notices
    Notice,
    /// Secondary information (debounce summaries, cache paths)
    Muted,
    /// A trigger firing
    Trigger,
    /// Added lines or content
    Added,
    /// Removed lines or content
    Removed,
    /// Plain diff output (block separators, byte offsets)
    Context,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub tone: Tone,
    pub text: String,
}

impl Line {
    pub fn new(tone: Tone, text: impl Into<String>) -> Self {
        Self {
            tone,
            text: text.into(),
        }
    }
}

/// Destination for user-facing lines
pub trait Console {
    fn emit(&mut self, line: Line);

    fn say(&mut self, tone: Tone, text: impl Into<String>)
    where
        Self: Sized,
    {
        self.emit(Line::new(tone, text));
    }
}

impl<C: Console + ?Sized> Console for &mut C {
    fn emit(&mut self, line: Line) {
        (**self).emit(line);
    }
}

impl<C: Console + ?Sized> Console for Box<C> {
    fn emit(&mut self, line: Line) {
        (**self).emit(line);
    }
}

/// Console that keeps every line in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryConsole {
    lines: Vec<Line>,
}

impl MemoryConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Text of every recorded line
    pub fn texts(&self) -> Vec<&str> {
        self.lines.iter().map(|line| line.text.as_str()).collect()
    }

    /// Text of lines recorded with `tone`
    pub fn with_tone(&self, tone: Tone) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|line| line.tone == tone)
            .map(|line| line.text.as_str())
            .collect()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

impl Console for MemoryConsole {
    fn emit(&mut self, line: Line) {
        self.lines.push(line);
    }
}
