//! Scheduling priority for units of work.
//!
//! Priorities are plain integers wrapped in [`Priority`]. Unlike a "higher is
//! more important" scheme, the executor dequeues the *lowest* value first:
//! foreground work uses very negative values so that it overtakes background
//! loads that were enqueued earlier.
//!
//! # Example
//!
//! ```
//! use hdrview::executor::Priority;
//!
//! // Texture assembly for the image on screen beats everything else
//! assert!(Priority::FOREGROUND.runs_before(Priority::DEFAULT));
//!
//! // Earlier loads run before later ones...
//! assert!(Priority::for_load(3, false).runs_before(Priority::for_load(7, false)));
//!
//! // ...unless the later one is going to be displayed right away.
//! assert!(Priority::for_load(7, true).runs_before(Priority::for_load(3, false)));
//! ```

// =============================================================================
// Priority Constants
// =============================================================================

/// Priority value for work the user is actively waiting on.
pub const PRIORITY_FOREGROUND: i32 = i32::MIN;

/// Priority value for ordinary work.
pub const PRIORITY_DEFAULT: i32 = 0;

/// Priority value for work that may wait behind everything else.
pub const PRIORITY_BACKGROUND: i32 = i32::MAX;

/// Task scheduling priority (lower values run sooner).
///
/// # Priority Levels
///
/// - [`Priority::FOREGROUND`] (`i32::MIN`): texture assembly for what is on screen
/// - [`Priority::DEFAULT`] (0): ordinary work
/// - [`Priority::BACKGROUND`] (`i32::MAX`): housekeeping
///
/// Loads sit in between, see [`Priority::for_load`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Priority(pub i32);

impl Priority {
    /// Work the user is actively waiting on.
    pub const FOREGROUND: Priority = Priority(PRIORITY_FOREGROUND);

    /// Ordinary work. This is the default priority.
    pub const DEFAULT: Priority = Priority(PRIORITY_DEFAULT);

    /// Work that should only run when nothing else is queued.
    pub const BACKGROUND: Priority = Priority(PRIORITY_BACKGROUND);

    /// Creates a new priority with the given value.
    ///
    /// Lower values mean the unit is dequeued sooner.
    pub fn new(value: i32) -> Self {
        Self(value)
    }

    /// Returns the numeric priority value.
    pub fn value(&self) -> i32 {
        self.0
    }

    /// Derives the priority of a load from an image draw id.
    ///
    /// Background loads are served in request order (smaller ids first).
    /// A load that will become the active selection gets the negated id, which
    /// puts it ahead of every background load and makes the most recent
    /// selection win among selected loads.
    pub fn for_load(draw_id: i32, selected: bool) -> Self {
        if selected {
            Self(draw_id.saturating_neg())
        } else {
            Self(draw_id)
        }
    }

    /// Returns true if a unit with this priority is dequeued before `other`.
    pub fn runs_before(&self, other: Priority) -> bool {
        self.0 < other.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::FOREGROUND => write!(f, "FOREGROUND"),
            Self::DEFAULT => write!(f, "DEFAULT"),
            Self::BACKGROUND => write!(f, "BACKGROUND"),
            Self(v) => write!(f, "Priority({})", v),
        }
    }
}
