// Streaming subscription client for sqlmon metric feeds.
//
// CLIENT DESIGN NOTES
// -------------------
// One `StreamSession` owns one physical connection to the metrics server and
// multiplexes every logical feed over it as a request-stream: route metadata
// addresses the feed, unbounded demand is signalled up front, and ordered
// JSON payload frames flow back until error, completion, or cancellation.
//
// Key decisions in this implementation:
//
// A) Dedicated dispatch task per subscription
//    - Inbound frames for each feed arrive on a bounded channel owned by the
//      transport adapter and are consumed by exactly one task that invokes
//      the caller's callbacks. Frame order within a feed is preserved; no
//      ordering exists across feeds.
//    - The callback triple lives with the dispatch task. The registry holds
//      only the cancellation state, so callbacks can call unsubscribe without
//      re-entering any lock.
//
// B) Failure isolation boundaries
//    - A malformed payload frame costs one `on_error` call; the feed and the
//      connection stay up.
//    - A terminal stream error removes only that feed.
//    - A connection-level error tears down all feeds and triggers the bounded
//      reconnect schedule; reconnects never replay subscriptions (server
//      routes are idempotent to re-issue, so replay belongs to the caller).
//
// C) Backpressure via bounded queues
//    - The client asks the server for unbounded demand, so the adapter's
//      bounded per-stream channel is the only flow-control seam protecting a
//      slow consumer.
//
// D) Epoch-guarded timers
//    - Disconnect bumps an epoch counter; watchdogs and reconnect timers from
//      an older connection generation observe the mismatch and stand down. A
//      reconnect firing after a deliberate disconnect is a defect, not noise.
#[macro_use]
mod macros;

mod config;
mod counters;
mod error;

pub mod client;

pub use client::monitor::{MetricSubscriber, SqlMonitorClient};
pub use client::registry::SubscriptionRegistry;
pub use client::routes::MetricRoute;
pub use client::session::{ConnectionState, StreamSession};
pub use client::subscription::{SubscriberCallbacks, SubscriptionId};
pub use config::ClientConfig;
pub use counters::{FrameCountersSnapshot, frame_counters_snapshot, reset_frame_counters};
pub use error::{ClientError, Result};
