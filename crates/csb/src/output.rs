//! Status lines for `csb render`.
//!
//! Rendered markdown may go to stdout, so every status line is written to
//! stderr.

use console::{Style, Term};

pub(crate) struct Output {
    term: Term,
    ok: Style,
    warn: Style,
    fail: Style,
    file: Style,
}

impl Output {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            term: Term::stderr(),
            ok: Style::new().green(),
            warn: Style::new().yellow(),
            fail: Style::new().red(),
            file: Style::new().cyan().bold(),
        }
    }

    /// Write one line, dropping it if stderr is gone.
    fn line(&self, style: Option<&Style>, msg: &str) {
        let text = match style {
            Some(style) => style.apply_to(msg).to_string(),
            None => msg.to_owned(),
        };
        let _ = self.term.write_line(&text);
    }

    pub(crate) fn info(&self, msg: &str) {
        self.line(None, msg);
    }

    /// Run summary.
    pub(crate) fn success(&self, msg: &str) {
        self.line(Some(&self.ok), msg);
    }

    /// A file with nothing to transform.
    pub(crate) fn warning(&self, msg: &str) {
        self.line(Some(&self.warn), msg);
    }

    pub(crate) fn error(&self, msg: &str) {
        self.line(Some(&self.fail), msg);
    }

    /// Header line naming a processed file.
    pub(crate) fn file(&self, path: &str) {
        self.line(Some(&self.file), path);
    }
}
