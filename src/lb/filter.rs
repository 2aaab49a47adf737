use super::server::Server;

/// Narrows the registry snapshot before selection.
///
/// An implementation must return a subsequence of its input: no
/// fabricated servers, no reordering beyond what the policy dictates.
pub trait SelectionFilter: Send + Sync {
    fn apply(&self, candidates: &[Server]) -> Vec<Server>;
}

/// Filter that keeps every candidate
pub struct PassThroughFilter;

impl SelectionFilter for PassThroughFilter {
    fn apply(&self, candidates: &[Server]) -> Vec<Server> {
        candidates.to_vec()
    }
}

/// Keeps candidates in the preferred zone, falling back to the full
/// input when the preference matches nothing.
///
/// The fallback is deliberate: an overly narrow preference must not
/// starve selection of all candidates.
pub struct ZonePreferenceFilter {
    preferred: Option<String>,
}

impl ZonePreferenceFilter {
    pub fn new(preferred: Option<String>) -> Self {
        Self { preferred }
    }
}

impl SelectionFilter for ZonePreferenceFilter {
    fn apply(&self, candidates: &[Server]) -> Vec<Server> {
        let Some(zone) = &self.preferred else {
            return candidates.to_vec();
        };

        let preferred: Vec<Server> = candidates
            .iter()
            .filter(|s| s.zone() == Some(zone.as_str()))
            .cloned()
            .collect();

        if preferred.is_empty() {
            candidates.to_vec()
        } else {
            preferred
        }
    }
}
