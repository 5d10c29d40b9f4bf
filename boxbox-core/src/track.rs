//! Static circuit knowledge for event context
//!
//! Corner and sector positions are lap-distance fractions (0.0 = start/finish
//! line). Keyed by the display names from `model::track_name`.

use serde::Serialize;

struct TrackInfo {
    name: &'static str,
    full_name: &'static str,
    sector1_end: f32,
    sector2_end: f32,
    corners: &'static [(f32, &'static str)],
    drs_zones: &'static [&'static str],
    overtaking_spots: &'static str,
}

const TRACKS: &[TrackInfo] = &[
    TrackInfo {
        name: "Melbourne",
        full_name: "Albert Park Circuit",
        sector1_end: 0.28,
        sector2_end: 0.58,
        corners: &[
            (0.03, "Turn 1"),
            (0.14, "Turn 6"),
            (0.23, "Turns 9-10"),
            (0.40, "Turn 11"),
            (0.86, "Turn 13"),
            (0.96, "Turn 14"),
        ],
        drs_zones: &["Start/finish straight", "Lakeside run to Turn 9", "Back straight to Turn 11"],
        overtaking_spots: "Turn 1, Turn 9 and Turn 11",
    },
    TrackInfo {
        name: "Sakhir (Bahrain)",
        full_name: "Bahrain International Circuit",
        sector1_end: 0.31,
        sector2_end: 0.60,
        corners: &[
            (0.03, "Turn 1 hairpin"),
            (0.14, "Turn 4"),
            (0.36, "Turns 9-10"),
            (0.52, "Turn 11"),
            (0.76, "Turn 14"),
        ],
        drs_zones: &["Main straight", "Run from Turn 3 to Turn 4", "Back straight to Turn 11"],
        overtaking_spots: "Turn 1, Turn 4 and Turn 11",
    },
    TrackInfo {
        name: "Monaco",
        full_name: "Circuit de Monaco",
        sector1_end: 0.33,
        sector2_end: 0.66,
        corners: &[
            (0.05, "Sainte Devote"),
            (0.20, "Casino Square"),
            (0.36, "Mirabeau"),
            (0.42, "Grand Hotel hairpin"),
            (0.55, "Nouvelle Chicane"),
            (0.75, "Swimming Pool"),
            (0.90, "Rascasse"),
        ],
        drs_zones: &["Start/finish straight"],
        overtaking_spots: "Nouvelle Chicane on a big run out of the tunnel",
    },
    TrackInfo {
        name: "Silverstone",
        full_name: "Silverstone Circuit",
        sector1_end: 0.30,
        sector2_end: 0.68,
        corners: &[
            (0.05, "Abbey"),
            (0.11, "Village"),
            (0.14, "The Loop"),
            (0.30, "Copse"),
            (0.36, "Maggotts-Becketts"),
            (0.58, "Stowe"),
            (0.70, "Club"),
        ],
        drs_zones: &["Wellington Straight", "Hangar Straight"],
        overtaking_spots: "The Loop, Stowe and Brooklands",
    },
    TrackInfo {
        name: "Spa",
        full_name: "Circuit de Spa-Francorchamps",
        sector1_end: 0.31,
        sector2_end: 0.72,
        corners: &[
            (0.03, "La Source"),
            (0.08, "Eau Rouge"),
            (0.28, "Les Combes"),
            (0.45, "Pouhon"),
            (0.77, "Blanchimont"),
            (0.93, "Bus Stop chicane"),
        ],
        drs_zones: &["Kemmel Straight", "Start/finish straight"],
        overtaking_spots: "Les Combes after the Kemmel Straight, Bus Stop chicane",
    },
    TrackInfo {
        name: "Monza",
        full_name: "Autodromo Nazionale Monza",
        sector1_end: 0.34,
        sector2_end: 0.69,
        corners: &[
            (0.10, "Rettifilo chicane"),
            (0.24, "Curva Grande"),
            (0.33, "Roggia chicane"),
            (0.45, "Lesmo 1"),
            (0.49, "Lesmo 2"),
            (0.70, "Ascari"),
            (0.92, "Parabolica"),
        ],
        drs_zones: &["Start/finish straight", "Back straight to Parabolica"],
        overtaking_spots: "Rettifilo and Roggia chicanes",
    },
];

/// Spatial facts for where a car is on the lap
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackContext {
    pub full_name: &'static str,
    pub sector: u8,
    pub next_corner: &'static str,
    pub drs_zones: Vec<&'static str>,
    pub overtaking_spots: &'static str,
}

/// `None` for circuits with no entry
pub fn track_context(track_name: &str, lap_fraction: f32) -> Option<TrackContext> {
    let info = TRACKS.iter().find(|t| t.name == track_name)?;
    let frac = lap_fraction.clamp(0.0, 1.0);

    let sector = if frac < info.sector1_end {
        1
    } else if frac < info.sector2_end {
        2
    } else {
        3
    };

    // Wraps to the first corner past the last one
    let next_corner = info
        .corners
        .iter()
        .find(|(at, _)| *at > frac)
        .or_else(|| info.corners.first())
        .map(|(_, name)| *name)
        .unwrap_or("");

    Some(TrackContext {
        full_name: info.full_name,
        sector,
        next_corner,
        drs_zones: info.drs_zones.to_vec(),
        overtaking_spots: info.overtaking_spots,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_track() {
        assert!(track_context("Hanoi", 0.5).is_none());
    }

    #[test]
    fn test_sector_and_next_corner() {
        let ctx = track_context("Silverstone", 0.32).unwrap();
        assert_eq!(ctx.sector, 2);
        assert_eq!(ctx.next_corner, "Maggotts-Becketts");
    }

    #[test]
    fn test_next_corner_wraps_after_last() {
        let ctx = track_context("Monza", 0.95).unwrap();
        assert_eq!(ctx.sector, 3);
        assert_eq!(ctx.next_corner, "Rettifilo chicane");
    }
}
