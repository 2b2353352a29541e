use tokio::sync::watch;

/// Owning side of the shutdown signal. Dropping it does not cancel.
pub struct CancellationSource {
    sender: watch::Sender<bool>,
}

impl CancellationSource {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Shutdown signal observed by the monitor loop and by delayed restarts.
#[derive(Clone)]
pub struct CancellationToken {
    receiver: watch::Receiver<bool>,
}

impl CancellationToken {
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    pub async fn cancelled(&mut self) {
        while !*self.receiver.borrow_and_update() {
            if self.receiver.changed().await.is_err() {
                // Source gone without cancelling: never resolve.
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_all_tokens() {
        let source = CancellationSource::new();
        let mut a = source.token();
        let mut b = source.token();
        assert!(!a.is_cancelled());

        source.cancel();
        tokio::time::timeout(Duration::from_secs(1), a.cancelled()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), b.cancelled()).await.unwrap();
        assert!(source.is_cancelled());
    }

    #[tokio::test]
    async fn test_token_created_after_cancel() {
        let source = CancellationSource::new();
        source.cancel();
        let mut late = source.token();
        assert!(late.is_cancelled());
        tokio::time::timeout(Duration::from_millis(100), late.cancelled()).await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_source_does_not_cancel() {
        let source = CancellationSource::new();
        let mut token = source.token();
        drop(source);
        assert!(tokio::time::timeout(Duration::from_millis(50), token.cancelled()).await.is_err());
    }
}
