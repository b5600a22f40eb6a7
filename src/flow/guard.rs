/// Unsaved-changes prompt state, scoped to one flow instance.
///
/// Armed once the flow holds any value, disarmed on completion, on an
/// expected redirect, or on unmount. A disabled guard never arms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationGuard {
    enabled: bool,
    armed: bool,
    released: bool,
}

impl NavigationGuard {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            armed: false,
            released: false,
        }
    }

    pub fn arm(&mut self) {
        if self.enabled && !self.released {
            self.armed = true;
        }
    }

    /// Disarm for good; later value changes do not re-arm.
    pub fn release(&mut self) {
        self.armed = false;
        self.released = true;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
