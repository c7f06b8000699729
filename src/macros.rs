//! Indented tracing on top of `log`. `debug_heading!` opens a block
//! that is closed when the enclosing scope ends, so nested solver
//! steps read as a tree.

use std::cell::Cell;

thread_local! {
    static INDENT: Cell<usize> = Cell::new(0);
}

macro_rules! debug {
    ($($t:tt)*) => {
        if log::log_enabled!(log::Level::Debug) {
            $crate::macros::dump(&format!($($t)*), "");
        }
    }
}

macro_rules! debug_heading {
    ($($t:tt)*) => {
        let _indent = if log::log_enabled!(log::Level::Debug) {
            $crate::macros::dump(&format!($($t)*), " {");
            $crate::macros::Indent::new(true)
        } else {
            $crate::macros::Indent::new(false)
        };
    }
}

pub struct Indent {
    enabled: bool,
}

impl Indent {
    pub fn new(enabled: bool) -> Self {
        if enabled {
            INDENT.with(|indent| indent.set(indent.get() + 1));
        }
        Indent { enabled }
    }
}

impl Drop for Indent {
    fn drop(&mut self) {
        if self.enabled {
            INDENT.with(|indent| indent.set(indent.get().saturating_sub(1)));
            dump("}", "");
        }
    }
}

pub fn dump(string: &str, suffix: &str) {
    let indent = INDENT.with(|indent| indent.get()) * 2;
    let mut lines = string.lines().peekable();
    while let Some(line) = lines.next() {
        let suffix = if lines.peek().is_none() { suffix } else { "" };
        log::debug!(target: "tabling", "{:indent$}{}{}", "", line, suffix, indent = indent);
    }
}
