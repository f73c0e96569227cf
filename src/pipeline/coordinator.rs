//! Subscription Coordinator
//!
//! Decides which control frames to send as the channel opens and closes and
//! as the active session changes. It never touches the socket itself; each
//! operation returns the frames to write, in order.

use crate::protocol::Frame;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionCoordinator {
    interest: Option<String>,
    /// Session subscribed on the current open socket
    subscribed: Option<String>,
    open: bool,
}

impl SubscriptionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interest(&self) -> Option<&str> {
        self.interest.as_deref()
    }

    pub fn subscribed(&self) -> Option<&str> {
        self.subscribed.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// The channel opened; subscribe to the current interest
    pub fn on_open(&mut self) -> Vec<Frame> {
        self.open = true;
        self.subscribed = self.interest.clone();
        self.subscribed
            .as_deref()
            .map(Frame::subscribe)
            .into_iter()
            .collect()
    }

    /// The channel closed; the server forgets subscriptions with the socket
    pub fn on_closed(&mut self) {
        self.open = false;
        self.subscribed = None;
    }

    /// The session of interest changed
    ///
    /// While open, the old session is unsubscribed before the new one is
    /// subscribed. While closed only the interest is recorded.
    pub fn set_interest(&mut self, interest: Option<String>) -> Vec<Frame> {
        if interest == self.interest {
            return Vec::new();
        }
        self.interest = interest;

        if !self.open {
            return Vec::new();
        }

        let mut frames = Vec::with_capacity(2);
        if let Some(previous) = self.subscribed.take() {
            frames.push(Frame::unsubscribe(&previous));
        }
        if let Some(next) = &self.interest {
            frames.push(Frame::subscribe(next));
            self.subscribed = Some(next.clone());
        }
        frames
    }
}
