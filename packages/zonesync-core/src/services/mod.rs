//! Services that feed the registry and fan its changes out to displays.

pub mod external_source;
pub mod primary_source;
pub mod subscriptions;

pub use external_source::{ExternalNowPlaying, ExternalSourceAdapter, PushAccepted};
pub use primary_source::{PrimarySourceProcessor, SourceEvent, UpstreamStatus};
pub use subscriptions::SubscriptionBroadcaster;
