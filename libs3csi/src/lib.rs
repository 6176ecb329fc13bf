//! # libs3csi: S3 bucket volumes over a simplified CSI
//!
//! `libs3csi` exposes object-storage buckets as mountable volumes.  Volume
//! lifecycle calls become bucket operations on an S3-compatible store and
//! local mounts: the bucket is staged once per node through an S3 FUSE bridge
//! and bind-mounted into each workload.  Requests travel over QUIC (via
//! [`quinn`]) as JSON envelopes instead of gRPC.
//!
//! The driver keeps no state of its own.  Every idempotency decision is
//! re-derived from the OS mount table or the object store at call time, so
//! every call is safe to retry.
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`types`] | Core data model: `Volume`, `VolumeId`, capabilities, requests. |
//! | [`error`] | [`CsiError`] enum covering all failure modes. |
//! | [`message`] | [`CsiMessage`] protocol envelope for QUIC transport. |
//! | [`identity`] | [`CsiIdentity`] trait: plugin discovery & health. |
//! | [`controller`] | [`CsiController`] trait: volume create/delete. |
//! | [`node`] | [`CsiNode`] trait: stage, publish, unpublish, unstage. |
//! | [`store`] | Bucket management against S3 ([`store::BucketStore`]). |
//! | [`mount`] | Mount strategies, mount table and subprocess seams. |
//! | [`backend`] | S3 implementation of the three services. |
//! | [`transport`] | QUIC client/server built on `quinn`. |
//! | [`config`] | Layered driver configuration. |

pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod identity;
pub mod message;
pub mod mount;
pub mod node;
pub mod store;
pub mod transport;
pub mod types;

// Re-export the most commonly used items at crate root for convenience.
pub use backend::S3Driver;
pub use config::DriverConfig;
pub use controller::CsiController;
pub use error::CsiError;
pub use identity::CsiIdentity;
pub use message::CsiMessage;
pub use node::CsiNode;
pub use types::*;
