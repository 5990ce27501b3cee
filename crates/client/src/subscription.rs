use tokio::task::JoinHandle;

/// Handle for a callback registered with the sync engine or connectivity
/// monitor. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub(crate) fn new(handle: JoinHandle<()>) -> Self {
        Self { handle: Some(handle) }
    }

    /// Stop delivering events. Idempotent.
    pub fn unsubscribe(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unsubscribe_aborts_listener() {
        let mut sub = Subscription::new(tokio::spawn(std::future::pending::<()>()));
        assert!(sub.is_active());
        sub.unsubscribe();
        assert!(!sub.is_active());
        sub.unsubscribe();
    }
}
