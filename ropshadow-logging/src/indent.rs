//! Per-thread indentation of diagnostic output.

/// Call-nesting depth of one monitored thread.
///
/// Each thread owns its own context, so deepening one thread's output never
/// shifts another's. Depth saturates at zero: a return observed with nothing
/// recorded must not wrap around.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndentContext {
    depth: usize,
}

impl IndentContext {
    /// A context at depth zero.
    #[must_use]
    pub const fn new() -> Self {
        Self { depth: 0 }
    }

    /// Current depth.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// One level deeper, after a call.
    pub fn indent(&mut self) {
        self.depth = self.depth.saturating_add(1);
    }

    /// One level shallower, after a return or a skipped frame.
    pub fn unindent(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Back to depth zero.
    pub fn reset(&mut self) {
        self.depth = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indent_and_unindent() {
        let mut ctx = IndentContext::new();
        ctx.indent();
        ctx.indent();
        assert_eq!(ctx.depth(), 2);
        ctx.unindent();
        assert_eq!(ctx.depth(), 1);
    }

    #[test]
    fn test_unindent_saturates() {
        let mut ctx = IndentContext::new();
        ctx.unindent();
        assert_eq!(ctx.depth(), 0);
    }
}
