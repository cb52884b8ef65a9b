//! Operational-transform buffer for concurrent range-replace edits
//! against a version-numbered document (`spec.md` §4.4 "Edit
//! application"). Original to this crate: no teacher module performs
//! OT, so this is written from the spec's contract, in the same
//! `thiserror` boundary-error idiom the rest of the workspace uses.

use peerdev_protocol::error_codes;
use std::collections::VecDeque;

/// How many applied edits the buffer transforms an incoming edit
/// against before giving up with `TransformTooLong`. Bounds the cost
/// of `transform` to O(this) regardless of how stale a client's
/// `base_version` is.
const MAX_TRANSFORM_DISTANCE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OtError {
    #[error("base_version is ahead of the document")]
    VersionMismatch,
    #[error("range_start/range_end out of order")]
    InvalidRange,
    #[error("too many edits to transform against")]
    TransformTooLong,
    #[error("transform produced an invalid range")]
    OtError,
}

impl OtError {
    /// Bit-exact error string per `spec.md` §4.4.
    pub fn code(self) -> &'static str {
        match self {
            OtError::VersionMismatch => error_codes::VERSION_MISMATCH,
            OtError::InvalidRange => error_codes::INVALID_RANGE,
            OtError::TransformTooLong => error_codes::TRANSFORM_TOO_LONG,
            OtError::OtError => error_codes::OT_ERROR,
        }
    }
}

/// One edit as already applied to the document, recorded so later
/// edits submitted against an earlier `base_version` can be
/// transformed against it.
#[derive(Debug, Clone)]
struct AppliedEdit {
    version: i64,
    range_start: usize,
    range_end: usize,
    insert_len: usize,
}

/// Transforms incoming `(range_start, range_end)` pairs against every
/// edit applied since the edit's `base_version`, and records newly
/// applied edits for future transforms.
#[derive(Debug, Default)]
pub struct OtBuffer {
    history: VecDeque<AppliedEdit>,
}

impl OtBuffer {
    pub fn new() -> Self {
        Self {
            history: VecDeque::new(),
        }
    }

    /// Drop all recorded history; called when the document is reseeded
    /// (`spec.md` §4.4 "Init exchange" step 3).
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Transform `(range_start, range_end)`, submitted against
    /// `base_version`, into coordinates valid at `current_version`.
    pub fn transform(
        &self,
        base_version: i64,
        range_start: usize,
        range_end: usize,
        current_version: i64,
    ) -> Result<(usize, usize), OtError> {
        if range_end < range_start {
            return Err(OtError::InvalidRange);
        }
        if base_version > current_version {
            return Err(OtError::VersionMismatch);
        }
        let distance = (current_version - base_version) as usize;
        if distance > MAX_TRANSFORM_DISTANCE {
            return Err(OtError::TransformTooLong);
        }

        let mut start = range_start;
        let mut end = range_end;
        for applied in self.history.iter().filter(|a| a.version > base_version) {
            let delta = applied.insert_len as i64 - (applied.range_end - applied.range_start) as i64;
            if end <= applied.range_start {
                continue;
            }
            if start >= applied.range_end {
                start = (start as i64 + delta).max(0) as usize;
                end = (end as i64 + delta).max(0) as usize;
            } else {
                // Overlaps a since-applied edit: collapse to the
                // boundary right after its inserted text rather than
                // guess how to merge the two changes.
                let boundary = applied.range_start + applied.insert_len;
                start = boundary;
                end = boundary;
            }
        }
        if end < start {
            return Err(OtError::OtError);
        }
        Ok((start, end))
    }

    /// Record an edit that was just applied at `version`.
    pub fn record(&mut self, version: i64, range_start: usize, range_end: usize, insert_len: usize) {
        self.history.push_back(AppliedEdit {
            version,
            range_start,
            range_end,
            insert_len,
        });
        while self.history.len() > MAX_TRANSFORM_DISTANCE {
            self.history.pop_front();
        }
    }
}
