//! FieldQuest: geofenced action verification and progressive clue unlocking
//! for location-based field missions.
//!
//! A [`session::MissionSession`] owns one player's mission attempt. It checks
//! each claimed visit locally (fix accuracy, geofence, code match), records
//! it in a durable queue, and confirms it with the remote authority when
//! connectivity allows. Confirmed visits feed a progress snapshot from which
//! clues are unlocked, once each and for good.

pub mod cancel;
pub mod config;
pub mod connectivity;
pub mod event;
pub mod geofence;
pub mod logging;
pub mod model;
pub mod position;
pub mod remote;
pub mod retry;
pub mod scan;
pub mod session;
pub mod storage;
pub mod unlock;
pub mod verifier;
