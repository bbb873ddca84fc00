use async_trait::async_trait;

use crate::error::MediaError;
use crate::peer::connection::RemoteTrack;

/// Local capture devices feeding the publisher.
#[async_trait]
pub trait MediaSource<T: Send + 'static>: Send {
    async fn acquire(&mut self) -> Result<Vec<T>, MediaError>;

    /// Stops every acquired track and frees the devices. Safe to call again.
    fn release(&mut self);
}

/// Where the subscriber plays received tracks. Each attached track sits
/// alongside the ones already attached.
#[async_trait]
pub trait PlaybackSink<T: Send + 'static>: Send {
    async fn attach(&mut self, track: RemoteTrack<T>);

    fn detach_all(&mut self);
}
