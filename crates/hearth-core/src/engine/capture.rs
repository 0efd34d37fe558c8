//! Output redirection for the duration of one execution.

use crate::interp::{Output, StreamKind};
use std::io::Write;
use std::ops::{Deref, DerefMut};

/// Where one stream currently goes.
#[derive(Debug)]
enum Sink {
    /// The kernel process's own stdio.
    Process,
    Buffer(String),
}

impl Sink {
    fn write(&mut self, stream: StreamKind, text: &str) {
        match self {
            Sink::Buffer(buf) => buf.push_str(text),
            Sink::Process => {
                // Process stdio is the kernel log; losing a line there is harmless.
                let _ = match stream {
                    StreamKind::Stdout => std::io::stdout().write_all(text.as_bytes()),
                    StreamKind::Stderr => std::io::stderr().write_all(text.as_bytes()),
                };
            }
        }
    }

    fn take(&mut self) -> String {
        match self {
            Sink::Buffer(buf) => std::mem::take(buf),
            Sink::Process => String::new(),
        }
    }
}

/// The engine's current stdout/stderr destinations.
#[derive(Debug)]
pub struct Streams {
    stdout: Sink,
    stderr: Sink,
}

impl Default for Streams {
    fn default() -> Self {
        Self {
            stdout: Sink::Process,
            stderr: Sink::Process,
        }
    }
}

impl Streams {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a [`CaptureGuard`] holds the streams.
    pub fn is_capturing(&self) -> bool {
        matches!(self.stdout, Sink::Buffer(_))
    }
}

impl Output for Streams {
    fn write(&mut self, stream: StreamKind, text: &str) {
        match stream {
            StreamKind::Stdout => self.stdout.write(stream, text),
            StreamKind::Stderr => self.stderr.write(stream, text),
        }
    }
}

/// Text collected while a capture was active.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Captured {
    pub stdout: String,
    pub stderr: String,
}

/// Redirects both streams into fresh buffers; the previous destinations are
/// put back when the guard drops, whether or not execution succeeded.
pub struct CaptureGuard<'a> {
    streams: &'a mut Streams,
    saved: Option<(Sink, Sink)>,
}

impl<'a> CaptureGuard<'a> {
    pub fn new(streams: &'a mut Streams) -> Self {
        let saved = (
            std::mem::replace(&mut streams.stdout, Sink::Buffer(String::new())),
            std::mem::replace(&mut streams.stderr, Sink::Buffer(String::new())),
        );
        Self {
            streams,
            saved: Some(saved),
        }
    }

    /// Take everything captured so far.
    pub fn take(&mut self) -> Captured {
        Captured {
            stdout: self.streams.stdout.take(),
            stderr: self.streams.stderr.take(),
        }
    }
}

impl Deref for CaptureGuard<'_> {
    type Target = Streams;

    fn deref(&self) -> &Streams {
        self.streams
    }
}

impl DerefMut for CaptureGuard<'_> {
    fn deref_mut(&mut self) -> &mut Streams {
        self.streams
    }
}

impl Drop for CaptureGuard<'_> {
    fn drop(&mut self) {
        if let Some((stdout, stderr)) = self.saved.take() {
            self.streams.stdout = stdout;
            self.streams.stderr = stderr;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_separates_streams() {
        let mut streams = Streams::new();
        let mut guard = CaptureGuard::new(&mut streams);
        guard.write(StreamKind::Stdout, "out");
        guard.write(StreamKind::Stderr, "err");
        let captured = guard.take();
        assert_eq!(captured.stdout, "out");
        assert_eq!(captured.stderr, "err");
    }

    #[test]
    fn test_drop_restores_destinations() {
        let mut streams = Streams::new();
        {
            let guard = CaptureGuard::new(&mut streams);
            assert!(guard.is_capturing());
        }
        assert!(!streams.is_capturing());
    }

    #[test]
    fn test_restored_after_panic() {
        let mut streams = Streams::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut guard = CaptureGuard::new(&mut streams);
            guard.write(StreamKind::Stdout, "partial");
            panic!("boom");
        }));
        assert!(result.is_err());
        assert!(!streams.is_capturing());
    }

    #[test]
    fn test_nested_capture_restores_outer_buffer() {
        let mut streams = Streams::new();
        let mut outer = CaptureGuard::new(&mut streams);
        outer.write(StreamKind::Stdout, "a");
        let before = outer.take();
        {
            let mut inner = CaptureGuard::new(&mut outer);
            inner.write(StreamKind::Stdout, "b");
            assert_eq!(inner.take().stdout, "b");
        }
        outer.write(StreamKind::Stdout, "c");
        assert_eq!(before.stdout, "a");
        assert_eq!(outer.take().stdout, "c");
    }
}
