pub trait Controller: Send + Sync + 'static {
    fn timeout_ms(&self) -> i32 {
        5000
    }

    fn trace_id(&self) -> i32 {
        0
    }
}

/// Per-call options: deadline and trace id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseController {
    pub timeout_ms: i32,
    pub trace_id: i32,
}

impl BaseController {
    pub fn with_timeout_ms(mut self, timeout_ms: i32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_trace_id(mut self, trace_id: i32) -> Self {
        self.trace_id = trace_id;
        self
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms.max(0) as u64)
    }
}

impl Controller for BaseController {
    fn timeout_ms(&self) -> i32 {
        self.timeout_ms
    }

    fn trace_id(&self) -> i32 {
        self.trace_id
    }
}

impl Default for BaseController {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            trace_id: 0,
        }
    }
}
