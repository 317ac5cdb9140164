#[doc(hidden)]
pub struct Defer<F: FnOnce()> {
    // runs once, when the guard created by `defer!` leaves scope
    func: Option<F>,
}

impl<F: FnOnce()> Defer<F> {
    pub fn new(func: F) -> Self {
        Self { func: Some(func) }
    }
}

impl<F: FnOnce()> Drop for Defer<F> {
    fn drop(&mut self) {
        if let Some(f) = self.func.take() {
            f()
        }
    }
}

/// Run the given statements when the enclosing scope exits, including by `?` or cancellation.
#[macro_export]
macro_rules! defer {
	( $($tt:tt)* ) => {
		let _deferred = $crate::common::defer::Defer::new(|| { $($tt)* });
	};
}
