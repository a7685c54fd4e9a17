use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::error::ZettelError;

/// Cancellation handle threaded through every box and manager call.
///
/// Clones share the same flag, so cancelling any clone cancels all of them.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
}

impl Context {
    pub fn background() -> Context {
        Context::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Suspension point: fails with [`ZettelError::Cancelled`] once cancelled.
    pub fn check(&self) -> Result<(), ZettelError> {
        if self.is_cancelled() {
            Err(ZettelError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_shared_between_clones() {
        let ctx = Context::background();
        let other = ctx.clone();
        assert!(ctx.check().is_ok());
        other.cancel();
        assert_eq!(ctx.check(), Err(ZettelError::Cancelled));
    }
}
