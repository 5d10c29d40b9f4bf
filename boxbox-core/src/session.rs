//! Session kinds and the two raw session-id numbering schemes

use serde::{Deserialize, Serialize};

/// Coarse session context used for trigger gating
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// No session packet seen yet (raw id 0)
    #[default]
    Unset,
    Practice,
    /// Q1-Q3, short and one-shot qualifying
    Qualifying,
    /// Sprint shootout rounds (qualifying rules, no qualifying-lap callouts)
    SprintShootout,
    SprintRace,
    Race,
    TimeTrial,
    /// Id present but not in either numbering table
    Unknown,
}

impl SessionKind {
    pub fn is_qualifying(self) -> bool {
        matches!(self, SessionKind::Qualifying | SessionKind::SprintShootout)
    }

    /// Sessions where pit strategy applies
    pub fn is_race_like(self) -> bool {
        matches!(self, SessionKind::Race | SessionKind::SprintRace)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            SessionKind::Unset => "unset",
            SessionKind::Practice => "practice",
            SessionKind::Qualifying => "qualifying",
            SessionKind::SprintShootout => "sprint shootout",
            SessionKind::SprintRace => "sprint race",
            SessionKind::Race => "race",
            SessionKind::TimeTrial => "time trial",
            SessionKind::Unknown => "unknown session",
        }
    }
}

/// Which community-documented numbering scheme a raw session id follows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionNumbering {
    /// Pick by packet format
    #[default]
    Auto,
    /// 10-12 shootout, 13 race, 14 sprint, 15 race, 16 time trial
    Current,
    /// 10 race, 11 sprint, 12 time trial
    Legacy,
}

impl SessionNumbering {
    /// Resolve `Auto` against the packet format of the datagram
    pub fn resolve(self, packet_format: u16) -> SessionNumbering {
        match self {
            SessionNumbering::Auto if packet_format <= 2023 => SessionNumbering::Legacy,
            SessionNumbering::Auto => SessionNumbering::Current,
            other => other,
        }
    }
}

fn current_table(raw: u8) -> Option<SessionKind> {
    match raw {
        1..=4 => Some(SessionKind::Practice),
        5..=9 => Some(SessionKind::Qualifying),
        10..=12 => Some(SessionKind::SprintShootout),
        13 | 15 => Some(SessionKind::Race),
        14 => Some(SessionKind::SprintRace),
        16 => Some(SessionKind::TimeTrial),
        _ => None,
    }
}

fn legacy_table(raw: u8) -> Option<SessionKind> {
    match raw {
        1..=4 => Some(SessionKind::Practice),
        5..=9 => Some(SessionKind::Qualifying),
        10 => Some(SessionKind::Race),
        11 => Some(SessionKind::SprintRace),
        12 => Some(SessionKind::TimeTrial),
        _ => None,
    }
}

/// Map a raw session id to a kind.
///
/// The selected table is tried first, then the other one, so ids only one
/// scheme knows about still resolve. Anything else is `Unknown`.
pub fn session_kind_from_raw(raw: u8, numbering: SessionNumbering) -> SessionKind {
    if raw == 0 {
        return SessionKind::Unset;
    }
    let (primary, secondary): (fn(u8) -> Option<SessionKind>, fn(u8) -> Option<SessionKind>) =
        match numbering {
            SessionNumbering::Legacy => (legacy_table, current_table),
            SessionNumbering::Current | SessionNumbering::Auto => (current_table, legacy_table),
        };
    primary(raw)
        .or_else(|| secondary(raw))
        .unwrap_or(SessionKind::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_unset() {
        assert_eq!(
            session_kind_from_raw(0, SessionNumbering::Current),
            SessionKind::Unset
        );
    }

    #[test]
    fn test_schemes_disagree_on_ten() {
        assert_eq!(
            session_kind_from_raw(10, SessionNumbering::Current),
            SessionKind::SprintShootout
        );
        assert_eq!(
            session_kind_from_raw(10, SessionNumbering::Legacy),
            SessionKind::Race
        );
    }

    #[test]
    fn test_fallback_to_other_table() {
        // 15 only exists in the current scheme
        assert_eq!(
            session_kind_from_raw(15, SessionNumbering::Legacy),
            SessionKind::Race
        );
        assert_eq!(
            session_kind_from_raw(42, SessionNumbering::Legacy),
            SessionKind::Unknown
        );
    }

    #[test]
    fn test_auto_resolution() {
        assert_eq!(
            SessionNumbering::Auto.resolve(2023),
            SessionNumbering::Legacy
        );
        assert_eq!(
            SessionNumbering::Auto.resolve(2025),
            SessionNumbering::Current
        );
        assert_eq!(
            SessionNumbering::Legacy.resolve(2025),
            SessionNumbering::Legacy
        );
    }
}
