use serde::Serialize;
use tracing::{debug, info};

use crate::error::RedirectError;
use crate::identifier::{GameIdentifier, RegionPattern, RegionSlot};
use crate::store::RedirectStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// A redirect page matched; nothing was written.
    Hit,
    /// Nothing matched; the identifier's miss counter was bumped.
    Miss,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub title: String,
    pub outcome: Outcome,
}

/// Maps a game identifier to the wiki page title to redirect to.
#[derive(Debug, Clone, Copy, Default)]
pub struct Resolver {
    region_slot: RegionSlot,
}

impl Resolver {
    pub fn new(region_slot: RegionSlot) -> Self {
        Self { region_slot }
    }

    /// Look up redirect pages for every regional variant of `identifier`.
    ///
    /// On a miss the identifier itself is returned and its missing counter is
    /// incremented exactly once. Store failures are returned as-is, with no
    /// retry.
    pub fn resolve<S>(
        &self,
        store: &S,
        identifier: &GameIdentifier,
    ) -> Result<Resolution, RedirectError>
    where
        S: RedirectStore + ?Sized,
    {
        let pattern = RegionPattern::for_identifier(identifier, self.region_slot);
        let candidates = store.find_redirects_matching(&pattern)?;

        if let Some(title) = select_candidate(candidates, identifier) {
            debug!(gameid = %identifier, %pattern, %title, "redirect hit");
            return Ok(Resolution {
                title,
                outcome: Outcome::Hit,
            });
        }

        store.increment_or_insert_missing(identifier)?;
        info!(gameid = %identifier, %pattern, "recorded missing redirect");
        Ok(Resolution {
            title: identifier.as_str().to_string(),
            outcome: Outcome::Miss,
        })
    }
}

/// Pick a title from `candidates` in the order given: an exact match for
/// `identifier` wins immediately, otherwise the last candidate does.
pub fn select_candidate<I>(candidates: I, identifier: &GameIdentifier) -> Option<String>
where
    I: IntoIterator<Item = String>,
{
    let mut selected = None;
    for candidate in candidates {
        let exact = candidate == identifier.as_str();
        selected = Some(candidate);
        if exact {
            break;
        }
    }
    selected
}
