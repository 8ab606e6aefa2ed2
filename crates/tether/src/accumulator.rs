//! Line-at-a-time statement buffering for `evaluate`.
//!
//! In interactive mode a line that does not compile on its own (the header of
//! a block, an open bracket) is held back and later lines are appended to it
//! until the caller flushes with a blank or absent line. In direct mode every
//! non-blank line is executed as-is and nothing is ever buffered.

/// The engine operations the accumulator needs.
///
/// The session implements this over its context handle; tests implement it
/// directly to drive the state machine without an engine.
pub trait StatementSink {
    type Error;

    /// Compile-only probe: does `source` parse as a complete unit?
    fn is_complete(&mut self, source: &str) -> Result<bool, Self::Error>;

    /// Executes `source`.
    fn execute(&mut self, source: &str) -> Result<(), Self::Error>;
}

/// What a single `evaluate` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalOutcome {
    /// Source was sent to the engine and ran.
    Executed,
    /// The line was appended to the pending statement; nothing ran yet.
    Buffered,
    /// A flush with nothing to run.
    Nothing,
}

impl EvalOutcome {
    /// Whether this call ran guest code.
    #[must_use]
    pub fn executed(self) -> bool {
        matches!(self, Self::Executed)
    }
}

/// Multi-line statement buffer.
#[derive(Debug, Clone, Default)]
pub struct StatementAccumulator {
    interactive: bool,
    pending: Option<String>,
}

impl StatementAccumulator {
    #[must_use]
    pub fn new(interactive: bool) -> Self {
        Self {
            interactive,
            pending: None,
        }
    }

    #[must_use]
    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Switches mode. Leaving interactive mode discards any pending text,
    /// since direct mode never holds a buffer. Returns the discarded text.
    pub fn set_interactive(&mut self, interactive: bool) -> Option<String> {
        self.interactive = interactive;
        if interactive { None } else { self.pending.take() }
    }

    /// The buffered statement, if one is accumulating.
    #[must_use]
    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Feeds one line (`None` or blank text flushes).
    ///
    /// If the sink fails, the pending buffer is cleared before the error is
    /// returned so a bad statement never leaks into the next one.
    pub fn feed<S: StatementSink>(&mut self, line: Option<&str>, sink: &mut S) -> Result<EvalOutcome, S::Error> {
        let result = self.step(line, sink);
        if result.is_err() {
            self.pending = None;
        }
        result
    }

    fn step<S: StatementSink>(&mut self, line: Option<&str>, sink: &mut S) -> Result<EvalOutcome, S::Error> {
        let line = line.map(|text| text.replace('\r', ""));
        let line = match line {
            Some(text) if !text.trim().is_empty() => text,
            _ => return self.flush(sink),
        };

        if !self.interactive || (self.pending.is_none() && sink.is_complete(&line)?) {
            sink.execute(&line)?;
            return Ok(EvalOutcome::Executed);
        }

        // blank lines never reach here, so an empty buffer means a fresh statement
        let buffer = self.pending.get_or_insert_with(String::new);
        if !buffer.is_empty() {
            buffer.push('\n');
        }
        buffer.push_str(&line);
        tracing::trace!(pending = ?self.pending, "statement buffered");
        Ok(EvalOutcome::Buffered)
    }

    /// Runs the pending buffer whether or not it compiles on its own.
    fn flush<S: StatementSink>(&mut self, sink: &mut S) -> Result<EvalOutcome, S::Error> {
        if !self.interactive {
            return Ok(EvalOutcome::Nothing);
        }
        let Some(source) = self.pending.take() else {
            return Ok(EvalOutcome::Nothing);
        };
        sink.execute(&source)?;
        Ok(EvalOutcome::Executed)
    }
}
