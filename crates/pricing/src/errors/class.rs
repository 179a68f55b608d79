/// Classification for error handling policy.
///
/// Used to decide whether an operation could ever succeed on retry.
///
/// | Class | Meaning | Retry? |
/// |-------|---------|--------|
/// | `Permanent` | Misconfiguration or invalid input | No |
/// | `Transient` | Network, provider, or rate availability fault | By caller policy |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    /// The request is fundamentally invalid - a bad mapping, an unregistered
    /// source tag, or data that fails validation. Retrying won't help.
    Permanent,

    /// A transient fault: the provider was unreachable, timed out, or an FX
    /// rate was momentarily unavailable. The caller may retry on its own
    /// schedule; the engine itself is single-attempt per request.
    Transient,
}

impl ErrorClass {
    /// Whether this class represents a permanent failure.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent)
    }
}
