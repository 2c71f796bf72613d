//! Cycle guard for dependency chains.
//!
//! One guard lives for exactly one top-level resolution and is passed down
//! the recursion by `&mut`. It is never stored on the resolver, so concurrent
//! resolutions cannot see each other's frames.

/// Stack of in-flight `feature|context` frames.
#[derive(Debug, Default)]
pub struct DependencyGuard {
    frames: Vec<String>,
}

impl DependencyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame key for a feature and serialized context
    pub fn frame(feature: &str, context_key: &str) -> String {
        format!("{}|{}", feature, context_key)
    }

    /// Push a frame. Returns `false` when the frame is already in flight (a cycle).
    pub fn enter(&mut self, frame: String) -> bool {
        if self.frames.contains(&frame) {
            return false;
        }
        self.frames.push(frame);
        true
    }

    /// Pop the most recent frame
    pub fn leave(&mut self) {
        self.frames.pop();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Frames currently on the stack, outermost first
    pub fn path(&self) -> &[String] {
        &self.frames
    }
}
