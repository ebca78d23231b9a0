//! Core library for the lyric sync engine.
//!
//! Given a normalized lyric [`Document`] and a playback time, the crate answers
//! which lines are active, how far each word has been sung, whether playback
//! sits in an instrumental interlude, and where the lyric view should scroll.
//! Each module owns one stage of that pipeline:
//!
//! - [`index`] flattens a document into time-ordered lines.
//! - [`cluster`] groups lines that must be shown as active together.
//! - [`interlude`] flags long gaps between divisions.
//! - [`resolver`] maps a time to a [`PlaybackState`].
//! - [`scroll`] turns playback states and user gestures into scroll targets.
//! - [`session`] wires the stages together per loaded track.

pub mod cluster;
pub mod config;
pub mod document;
pub mod error;
pub mod index;
pub mod interlude;
pub mod resolver;
pub mod scroll;
pub mod session;
pub mod timeline;

pub use cluster::{Cluster, ClusterAssignment, ClusterEngine, ClusterId};
pub use config::{
    PreActivationConfig, ProgressDirection, ScrollTuning, SyncConfig, INTERLUDE_GAP_THRESHOLD_SECONDS,
};
pub use document::{
    parse, Agent, AgentId, AgentKind, AgentSide, BackgroundPosition, Division, Document,
    DocumentBuilder, Line, Word, WordTimingMode,
};
pub use error::{LyricSyncError, Result};
pub use index::{IndexedLine, LineId, LineIndex};
pub use interlude::{Interlude, InterludeDetector};
pub use resolver::{PlaybackState, PlaybackStateResolver, WordId, WordProgress, WordTrack};
pub use scroll::{
    AnimationHandle, GestureKind, ScrollCoordinator, ScrollMode, ScrollOutput, ScrollState,
    ScrollTarget, Scrollable, TargetBox, VirtualScroller,
};
pub use session::{FrameSnapshot, LyricSession, LyricTimeline, TimelineCache};
pub use timeline::{PlaybackClock, TickSchedule};
