use std::sync::Arc;

use tokio::sync::watch;

/// Access token shared between the HTTP repositories and the coordinator.
/// Sync only runs while a token is present.
#[derive(Clone)]
pub struct AuthGate {
    sender: Arc<watch::Sender<Option<String>>>,
    receiver: watch::Receiver<Option<String>>,
}

impl AuthGate {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub fn sign_in(&self, access_token: impl Into<String>) {
        self.sender.send_replace(Some(access_token.into()));
    }

    pub fn sign_out(&self) {
        self.sender.send_replace(None);
    }

    pub fn token(&self) -> Option<String> {
        self.receiver.borrow().clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.receiver.borrow().is_some()
    }

    /// Notified on every sign-in, sign-out or token swap.
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.receiver.clone()
    }
}

impl Default for AuthGate {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate")
            .field("signed_in", &self.is_signed_in())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sign_in_and_out_are_broadcast() {
        let gate = AuthGate::new();
        let mut rx = gate.subscribe();
        assert!(!gate.is_signed_in());

        gate.sign_in("tok");
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_deref(), Some("tok"));
        assert_eq!(gate.clone().token().as_deref(), Some("tok"));

        gate.sign_out();
        assert!(!gate.is_signed_in());
    }
}
