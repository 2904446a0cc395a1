use crate::catalog::{Archetype, RotationCatalog};
use crate::error::{PostlineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Number of publications kept in the rotation history.
pub const MAX_HISTORY: usize = 20;

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationRecord {
    pub archetype: String,
    pub published_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// RotationState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationState {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub current_index: usize,
    #[serde(default)]
    pub last_published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history: Vec<PublicationRecord>,
    /// Publications ever recorded; unlike `history` this is not capped.
    #[serde(default)]
    pub total_published: u64,
}

fn default_version() -> u32 {
    1
}

impl Default for RotationState {
    fn default() -> Self {
        Self {
            version: default_version(),
            current_index: 0,
            last_published_at: None,
            history: Vec::new(),
            total_published: 0,
        }
    }
}

impl RotationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the record read from storage against the catalog it will be
    /// used with.
    pub fn validate(&self, catalog: &RotationCatalog) -> Result<()> {
        if self.current_index >= catalog.len() {
            return Err(PostlineError::StateCorrupt(format!(
                "current_index {} outside rotation of length {}",
                self.current_index,
                catalog.len()
            )));
        }
        Ok(())
    }

    /// Archetype due next. Does not mutate.
    pub fn next_archetype(&self, catalog: &RotationCatalog) -> &'static Archetype {
        catalog.slot(self.current_index)
    }

    /// Number of publications the cadence rules count from.
    ///
    /// Equals `history.len()` until the history is full, then keeps counting
    /// so the cadence does not freeze at the cap. Counting past the cap is
    /// deliberate: a bare `history.len()` would pin every later publication
    /// to the same cadence position. Records written before the counter
    /// existed fall back to the history length.
    pub fn publication_count(&self) -> usize {
        (self.total_published as usize).max(self.history.len())
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Record a successful publication of `archetype` at `at`.
    ///
    /// Advances the slot unconditionally, whichever archetype was actually
    /// published, and keeps only the most recent [`MAX_HISTORY`] entries.
    pub fn mark_published(
        &mut self,
        catalog: &RotationCatalog,
        archetype: &str,
        at: DateTime<Utc>,
    ) {
        self.total_published = self.publication_count() as u64 + 1;
        self.current_index = (self.current_index + 1) % catalog.len();
        self.last_published_at = Some(at);
        self.history.push(PublicationRecord {
            archetype: archetype.to_string(),
            published_at: at,
        });
        if self.history.len() > MAX_HISTORY {
            self.history.drain(..self.history.len() - MAX_HISTORY);
        }
    }

    // -----------------------------------------------------------------------
    // Reporting
    // -----------------------------------------------------------------------

    /// Human-readable rotation status for operators.
    pub fn render_status(&self, catalog: &RotationCatalog) -> String {
        let next = self.next_archetype(catalog);
        let position = self.current_index % catalog.len() + 1;

        let mut out = String::from("Rotation status:\n\n");
        let _ = writeln!(out, "Next archetype: {} ({})", next.display_name, next.key);
        let _ = writeln!(out, "Position in cycle: {position} of {}", catalog.len());
        out.push_str("\nCycle:\n");
        for (i, key) in catalog.sequence().iter().enumerate() {
            let name = catalog.get(key).map(|a| a.display_name).unwrap_or(*key);
            let marker = if i + 1 == position { "  <- next" } else { "" };
            let _ = writeln!(out, "{}. {name}{marker}", i + 1);
        }
        let last = self
            .last_published_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        let _ = writeln!(out, "\nLast publication: {last}");
        let _ = writeln!(out, "Publications recorded: {}", self.history.len());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 3, 9, 30, 0).unwrap()
    }

    #[test]
    fn fresh_state_starts_at_first_slot() {
        let catalog = RotationCatalog::standard();
        let state = RotationState::new();
        assert_eq!(state.current_index, 0);
        assert!(state.last_published_at.is_none());
        assert!(state.history.is_empty());
        assert_eq!(state.next_archetype(&catalog).key, "useful");
    }

    #[test]
    fn next_archetype_does_not_mutate() {
        let catalog = RotationCatalog::standard();
        let state = RotationState::new();
        let before = state.clone();
        let _ = state.next_archetype(&catalog);
        assert_eq!(state, before);
    }

    #[test]
    fn index_tracks_publication_count_modulo_cycle() {
        let catalog = RotationCatalog::standard();
        let mut state = RotationState::new();
        for n in 1..=30usize {
            let key = state.next_archetype(&catalog).key;
            state.mark_published(&catalog, key, t0() + Duration::days(n as i64));
            assert_eq!(state.current_index, n % catalog.len());
            assert_eq!(state.history.len(), n.min(MAX_HISTORY));
            assert_eq!(state.publication_count(), n);
        }
    }

    #[test]
    fn publication_count_falls_back_to_history_length() {
        let state: RotationState = serde_yaml::from_str(
            "current_index: 1\nhistory:\n  - archetype: useful\n    published_at: 2026-03-03T09:30:00Z\n",
        )
        .unwrap();
        assert_eq!(state.total_published, 0);
        assert_eq!(state.publication_count(), 1);
    }

    #[test]
    fn history_keeps_most_recent_entries() {
        let catalog = RotationCatalog::standard();
        let mut state = RotationState::new();
        for n in 0..25i64 {
            state.mark_published(&catalog, "useful", t0() + Duration::hours(n));
        }
        assert_eq!(state.history.len(), MAX_HISTORY);
        // The count keeps going past the history cap.
        assert_eq!(state.publication_count(), 25);
        assert_eq!(state.history[0].published_at, t0() + Duration::hours(5));
        assert_eq!(
            state.history.last().unwrap().published_at,
            t0() + Duration::hours(24)
        );
    }

    #[test]
    fn mark_published_records_actual_archetype() {
        let catalog = RotationCatalog::standard();
        let mut state = RotationState::new();
        state.mark_published(&catalog, "checklist", t0());
        assert_eq!(state.current_index, 1);
        assert_eq!(state.last_published_at, Some(t0()));
        assert_eq!(state.history[0].archetype, "checklist");
    }

    #[test]
    fn validate_rejects_out_of_range_index() {
        let catalog = RotationCatalog::standard();
        let state = RotationState {
            current_index: 4,
            ..RotationState::default()
        };
        assert!(matches!(
            state.validate(&catalog),
            Err(PostlineError::StateCorrupt(_))
        ));
        assert!(RotationState::new().validate(&catalog).is_ok());
    }

    #[test]
    fn status_mentions_position_and_last_post() {
        let catalog = RotationCatalog::standard();
        let mut state = RotationState::new();
        assert!(state.render_status(&catalog).contains("Last publication: never"));

        state.mark_published(&catalog, "useful", t0());
        state.mark_published(&catalog, "useful", t0() + Duration::days(2));
        let status = state.render_status(&catalog);
        assert!(status.contains("Next archetype: Case study (case)"));
        assert!(status.contains("Position in cycle: 3 of 4"));
        assert!(status.contains("3. Case study  <- next"));
        assert!(status.contains("2026-03-05T09:30:00+00:00"));
    }

    #[test]
    fn yaml_roundtrip_tolerates_missing_fields() {
        let state: RotationState = serde_yaml::from_str("current_index: 2\n").unwrap();
        assert_eq!(state.version, 1);
        assert_eq!(state.current_index, 2);
        assert!(state.history.is_empty());
    }
}
