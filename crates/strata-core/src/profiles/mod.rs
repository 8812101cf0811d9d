//! Engine-generation profiles.
//!
//! A profile scores how strongly a file resembles the assets of one
//! engine generation. Profiles share the [`Probe`] used by discovery, so
//! a file is read once no matter how many profiles inspect it.

mod rage;

use crate::discovery::{Candidate, DetectionMethod, Detector, Probe};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use rage::{GtaIv, GtaV, MaxPayne3, MidnightClub3, RedDeadRedemption};

/// One engine generation's view of a file
pub trait EngineProfile: Send + Sync {
    /// Stable identifier, e.g. `gta_iv`
    fn name(&self) -> &str;

    /// Human-readable name
    fn display_name(&self) -> &str;

    /// Score the probe; a zero confidence means no resemblance
    fn analyze(&self, probe: &Probe<'_>) -> Result<ProfileMatch>;
}

/// Result of one profile analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileMatch {
    /// Profile that produced the match
    pub profile: String,
    /// Confidence on the shared 0..=1 scale
    pub confidence: f64,
    /// Which observations matched
    pub methods: Vec<String>,
    /// Format the profile suggests for the file
    pub suggested_format: String,
}

impl ProfileMatch {
    /// A non-match for `profile`
    pub fn none(profile: &str) -> Self {
        Self {
            profile: profile.to_string(),
            confidence: 0.0,
            methods: Vec::new(),
            suggested_format: "unknown".to_string(),
        }
    }

    /// Creates a positive match
    pub fn new(profile: &str, confidence: f64, method: String, format: &str) -> Self {
        Self {
            profile: profile.to_string(),
            confidence,
            methods: vec![method],
            suggested_format: format.to_string(),
        }
    }

    /// Returns true if the profile found any resemblance
    pub fn is_match(&self) -> bool {
        self.confidence > 0.0 && !self.methods.is_empty()
    }
}

/// Position of an engine generation in release order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimelineEntry {
    /// Profile identifier
    pub profile: &'static str,
    /// Release and engine revision
    pub description: &'static str,
}

/// Known engine generations, oldest first
pub const ENGINE_TIMELINE: &[TimelineEntry] = &[
    TimelineEntry {
        profile: "midnight_club_3",
        description: "Midnight Club 3 (2005) - RAGE 0.5",
    },
    TimelineEntry {
        profile: "gta_iv",
        description: "GTA IV (2008) - RAGE 1.0",
    },
    TimelineEntry {
        profile: "max_payne_3",
        description: "Max Payne 3 (2012) - RAGE 1.2",
    },
    TimelineEntry {
        profile: "red_dead_redemption",
        description: "Red Dead Redemption (2010) - RAGE 1.3",
    },
    TimelineEntry {
        profile: "gta_v",
        description: "GTA V (2013) - RAGE 1.8",
    },
];

/// 1-based rank of `profile` in [`ENGINE_TIMELINE`]; 0 if it is not listed
pub fn timeline_rank(profile: &str) -> usize {
    ENGINE_TIMELINE
        .iter()
        .position(|e| e.profile == profile)
        .map_or(0, |i| i + 1)
}

/// The five built-in profiles
pub fn default_profiles() -> Vec<Arc<dyn EngineProfile>> {
    vec![
        Arc::new(MidnightClub3),
        Arc::new(GtaIv),
        Arc::new(MaxPayne3),
        Arc::new(RedDeadRedemption),
        Arc::new(GtaV),
    ]
}

/// Exposes an [`EngineProfile`] to the discovery engine
pub struct ProfileDetector {
    profile: Arc<dyn EngineProfile>,
}

impl ProfileDetector {
    /// Wraps a profile
    pub fn new(profile: Arc<dyn EngineProfile>) -> Self {
        Self { profile }
    }
}

impl Detector for ProfileDetector {
    fn name(&self) -> &str {
        self.profile.name()
    }

    fn method(&self) -> DetectionMethod {
        DetectionMethod::Profile
    }

    fn detect(&self, probe: &Probe<'_>) -> Result<Vec<Candidate>> {
        let m = self.profile.analyze(probe)?;
        if !m.is_match() {
            return Ok(Vec::new());
        }

        let mut candidate = Candidate::new(m.suggested_format, m.confidence, DetectionMethod::Profile)
            .with_games([m.profile])
            .with_can_process(true);
        candidate.evidence = m
            .methods
            .into_iter()
            .map(|method| format!("{}: {}", self.profile.display_name(), method))
            .collect();
        Ok(vec![candidate])
    }
}
