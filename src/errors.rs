use crate::store::AnswerId;

error_chain! {
    errors {
        OutOfMemory(what: &'static str) {
            description("out of memory")
            display("out of memory while growing {}", what)
        }

        StaleHandle(kind: &'static str, slot: usize) {
            description("stale or mis-typed handle")
            display("stale {} handle (slot {})", kind, slot)
        }

        Scheduling(message: String) {
            description("tabling scheduling contract violated")
            display("scheduling error: {}", message)
        }

        UnknownAnswer(answer: AnswerId) {
            description("unknown answer")
            display("answer {:?} is not in the store", answer)
        }

        Floundered(literal: String) {
            description("negative literal is not ground")
            display("floundered on `tnot({})`", literal)
        }

        Overflow(depth: usize) {
            description("call depth exceeded")
            display("tabled call depth exceeded {}", depth)
        }
    }
}

impl Error {
    /// Fatal errors indicate a broken invariant upstream (use after
    /// free, cross-wired handles, scheduling misuse). They are never
    /// retried.
    pub fn is_fatal(&self) -> bool {
        match *self.kind() {
            ErrorKind::StaleHandle(..) | ErrorKind::Scheduling(..) => true,
            _ => false,
        }
    }
}

/// Pushes onto `vec`, reporting allocation failure instead of
/// aborting. On failure `vec` is unchanged.
pub(crate) fn try_push<T>(vec: &mut Vec<T>, value: T, what: &'static str) -> Result<()> {
    vec.try_reserve(1).map_err(|_| ErrorKind::OutOfMemory(what))?;
    vec.push(value);
    Ok(())
}
