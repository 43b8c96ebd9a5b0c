// Licensed under the Apache-2.0 license

//! Shared plumbing: the logging facade and the scoped interrupt guard.

use core::cell::RefCell;
use core::fmt::{self, Write as _};

use critical_section::{Mutex, RestoreState};

/// Diagnostics sink threaded through the driver as a generic parameter.
///
/// Implementations must be callable from interrupt context, so every method
/// takes `&self` and must not block.
pub trait Logger: Sync {
    fn debug(&self, args: fmt::Arguments<'_>);
    fn warn(&self, args: fmt::Arguments<'_>);
    fn error(&self, args: fmt::Arguments<'_>);
}

/// Logger that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpLogger {}

impl Logger for NoOpLogger {
    fn debug(&self, _args: fmt::Arguments<'_>) {}
    fn warn(&self, _args: fmt::Arguments<'_>) {}
    fn error(&self, _args: fmt::Arguments<'_>) {}
}

const LINE_CAPACITY: usize = 96;

/// Logger writing one line per record to a byte sink such as a UART.
///
/// Lines longer than the internal buffer are truncated. Write errors from the
/// sink are ignored; logging has no say in driver control flow.
pub struct WriterLogger<W> {
    sink: Mutex<RefCell<W>>,
}

impl<W: embedded_io::Write + Send> WriterLogger<W> {
    pub const fn new(sink: W) -> Self {
        Self {
            sink: Mutex::new(RefCell::new(sink)),
        }
    }

    fn emit(&self, level: &str, args: fmt::Arguments<'_>) {
        let mut line: heapless::String<LINE_CAPACITY> = heapless::String::new();
        // fmt::Error here only means the line was truncated.
        let _ = write!(line, "[{level}] {args}\r\n");
        critical_section::with(|cs| {
            let mut sink = self.sink.borrow_ref_mut(cs);
            let _ = sink.write_all(line.as_bytes());
        });
    }
}

impl<W: embedded_io::Write + Send> Logger for WriterLogger<W> {
    fn debug(&self, args: fmt::Arguments<'_>) {
        self.emit("SLV", args);
    }

    fn warn(&self, args: fmt::Arguments<'_>) {
        self.emit("SLV WARN", args);
    }

    fn error(&self, args: fmt::Arguments<'_>) {
        self.emit("SLV ERR", args);
    }
}

/// Scoped interrupt mask.
///
/// Interrupts are masked from `acquire` until the guard is dropped, on every
/// exit path. Guards nest: the innermost drop restores the state the matching
/// `acquire` observed.
pub struct InterruptGuard {
    restore: RestoreState,
}

impl InterruptGuard {
    #[must_use]
    pub fn acquire() -> Self {
        // SAFETY: the matching release happens exactly once, in Drop.
        let restore = unsafe { critical_section::acquire() };
        Self { restore }
    }

    /// Token proving interrupts are masked for the lifetime of the borrow.
    #[must_use]
    pub fn token(&self) -> critical_section::CriticalSection<'_> {
        // SAFETY: the guard holds the critical section for at least as long
        // as the returned token borrows it.
        unsafe { critical_section::CriticalSection::new() }
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        // SAFETY: `restore` came from the acquire in `InterruptGuard::acquire`
        // and guards are released in reverse order of acquisition.
        unsafe { critical_section::release(self.restore) };
    }
}
