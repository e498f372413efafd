// Impact - Toy scoring of a pattern for the remix readout
// Percentages derived from grid density and off-beat hat placement

use std::fmt;

use super::pattern::PatternStore;

/// Three percentages shown next to the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImpactScore {
    pub platform_friendliness: u32,
    pub community_remixability: u32,
    /// Lower is better
    pub copyright_risk: u32,
}

impl ImpactScore {
    /// Score a pattern
    ///
    /// `hat_track` is the row whose off-beat hits (odd steps) count towards
    /// platform friendliness; a missing row scores as no off-beat hits.
    pub fn from_pattern(pattern: &PatternStore, hat_track: usize) -> Self {
        let density = pattern.density();

        let evenness = match pattern.row(hat_track) {
            Ok(row) => {
                let hits = row.iter().skip(1).step_by(2).filter(|&&on| on).count();
                hits as f64 / (pattern.steps() as f64 / 2.0)
            }
            Err(_) => 0.0,
        };

        Self {
            platform_friendliness: percent(0.5 + evenness * 0.5),
            community_remixability: percent(0.4 + density * 0.6),
            copyright_risk: percent(1.0 - density * 0.7),
        }
    }
}

fn percent(ratio: f64) -> u32 {
    (ratio * 100.0).round().max(0.0) as u32
}

impl fmt::Display for ImpactScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Platform-friendliness: {}% | Community remixability: {}% | Copyright risk (lower is better): {}%",
            self.platform_friendliness, self.community_remixability, self.copyright_risk
        )
    }
}
