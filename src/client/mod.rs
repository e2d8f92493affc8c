//! Sessions, endpoints and the request resolver.

mod builder;
mod classification;
mod delivery;
mod download;
mod endpoint;
mod inflight;
mod policy;
mod resolver;
mod session;
mod signals;

pub use builder::SessionBuilder;
pub use classification::StatusFamily;
pub use download::{DownloadProgress, DownloadedFile};
pub use endpoint::{CachePolicy, DispatchOptions, Endpoint};
pub use inflight::SessionCountersSnapshot;
pub use session::{
    ExpiryOverride, QueryInFingerprint, Session, SessionConfig, UnauthorizedHandler,
};
pub use signals::SessionSignals;
