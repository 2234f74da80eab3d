//! Reposting selected items through authenticated browser sessions.
//!
//! - [`queue`] holds the items still to post; only confirmed posts leave it
//! - [`compose`] builds the quoted reply text, including the resume marker
//! - [`session`] is the login/compose/preview/confirm state machine
//! - [`failover`] retries sessions across the proxy pool

mod compose;
mod failover;
mod queue;
mod session;

pub use compose::{compose_reply, Reply, CATEGORY_TAG, MARKER_TIME_FORMAT};
pub use failover::{DeliveryError, DeliveryReport, FailoverController};
pub use queue::PendingQueue;
pub use session::{
    classify_title, selectors, LoginPage, PostingSession, SessionError, SessionState,
};
