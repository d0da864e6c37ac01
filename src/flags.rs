//! Compilation-session-wide settings.
//!
//! Modeled on the settings-builder idiom this codebase uses for target-independent compilation
//! flags: a small, fixed set of named, typed settings fixed once at construction and immutable
//! for the rest of the pipeline. Nothing here is mutated by a pass; a pass only ever reads it.

/// The optimization level requested for a compilation session.
///
/// Reserved for the Non-goal optimization passes named in the design doc (reaching defs, DCE,
/// CSE, GVN, constant folding, arithmetic peepholes). At `None`, the only level this pipeline
/// actually implements, no pass behavior changes; the type exists so a caller that later wants
/// `Speed` doesn't need a different entry point.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum OptLevel {
    /// Compile as directly as possible; no optimization passes run.
    #[default]
    None,
    /// Reserved: prefer runtime speed once the optimization passes exist.
    Speed,
}

/// Immutable settings fixed for one compilation session.
#[derive(Debug, Clone)]
pub struct Flags {
    enable_verifier: bool,
    emit_linux_exit_syscall: bool,
    opt_level: OptLevel,
}

impl Flags {
    /// Start building a `Flags` value from defaults (verifier on, exit syscall on, no
    /// optimization).
    pub fn builder() -> FlagsBuilder {
        FlagsBuilder::default()
    }

    /// After each pass that is supposed to establish one of the invariants in the design doc,
    /// walk it and panic with a descriptive message if it's violated. Defaults to `true`; this
    /// only adds checking and never changes compiled output.
    pub fn enable_verifier(&self) -> bool {
        self.enable_verifier
    }

    /// Whether a function named `_start` gets the Linux `exit(0)` syscall emitted before its
    /// frame close.
    pub fn emit_linux_exit_syscall(&self) -> bool {
        self.emit_linux_exit_syscall
    }

    /// The requested optimization level.
    pub fn opt_level(&self) -> OptLevel {
        self.opt_level
    }
}

impl Default for Flags {
    fn default() -> Self {
        Flags::builder().finish()
    }
}

/// Builds a [`Flags`] value. See the field docs on `Flags` for what each setting controls.
#[derive(Debug, Clone)]
pub struct FlagsBuilder {
    enable_verifier: bool,
    emit_linux_exit_syscall: bool,
    opt_level: OptLevel,
}

impl Default for FlagsBuilder {
    fn default() -> Self {
        Self {
            enable_verifier: true,
            emit_linux_exit_syscall: true,
            opt_level: OptLevel::None,
        }
    }
}

impl FlagsBuilder {
    /// Override whether the pass manager checks invariants after the passes that establish them.
    pub fn set_enable_verifier(mut self, value: bool) -> Self {
        self.enable_verifier = value;
        self
    }

    /// Override whether `_start` frames get the Linux exit syscall.
    pub fn set_emit_linux_exit_syscall(mut self, value: bool) -> Self {
        self.emit_linux_exit_syscall = value;
        self
    }

    /// Override the requested optimization level.
    pub fn set_opt_level(mut self, value: OptLevel) -> Self {
        self.opt_level = value;
        self
    }

    /// Freeze the builder into an immutable `Flags`.
    pub fn finish(self) -> Flags {
        Flags {
            enable_verifier: self.enable_verifier,
            emit_linux_exit_syscall: self.emit_linux_exit_syscall,
            opt_level: self.opt_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let flags = Flags::default();
        assert!(flags.enable_verifier());
        assert!(flags.emit_linux_exit_syscall());
        assert_eq!(flags.opt_level(), OptLevel::None);
    }

    #[test]
    fn builder_overrides() {
        let flags = Flags::builder()
            .set_enable_verifier(false)
            .set_emit_linux_exit_syscall(false)
            .finish();
        assert!(!flags.enable_verifier());
        assert!(!flags.emit_linux_exit_syscall());
    }
}
