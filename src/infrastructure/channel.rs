use crate::domain::ports::{EventSource, FeedConnection, FeedConnectionBox};
use crate::error::{BenchError, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// An event source fed from an in-process channel.
///
/// Useful for replaying captured frames or driving the engine without a
/// gateway. The receiver can be connected once.
pub struct ChannelEventSource {
    name: String,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl ChannelEventSource {
    /// Creates a source and the sender used to push frames into it.
    pub fn new(name: impl Into<String>) -> (Self, mpsc::UnboundedSender<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let source = Self {
            name: name.into(),
            receiver: Mutex::new(Some(receiver)),
        };
        (source, sender)
    }
}

#[async_trait]
impl EventSource for ChannelEventSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<FeedConnectionBox> {
        let receiver = self
            .receiver
            .lock()
            .map_err(|_| BenchError::Task("channel source lock poisoned".to_string()))?
            .take()
            .ok_or_else(|| BenchError::FeedConnect {
                url: format!("channel://{}", self.name),
                source: "channel source already connected".into(),
            })?;
        Ok(Box::new(ChannelConnection { receiver }))
    }
}

struct ChannelConnection {
    receiver: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl FeedConnection for ChannelConnection {
    async fn next_frame(&mut self) -> Result<Option<String>> {
        Ok(self.receiver.recv().await)
    }

    async fn close(&mut self) -> Result<()> {
        self.receiver.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_flow_through() {
        let (source, sender) = ChannelEventSource::new("test");
        let mut connection = source.connect().await.unwrap();

        sender.send("hello".to_string()).unwrap();
        drop(sender);

        assert_eq!(connection.next_frame().await.unwrap().as_deref(), Some("hello"));
        assert_eq!(connection.next_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_second_connect_fails() {
        let (source, _sender) = ChannelEventSource::new("test");
        source.connect().await.unwrap();
        assert!(matches!(
            source.connect().await,
            Err(BenchError::FeedConnect { .. })
        ));
    }
}
