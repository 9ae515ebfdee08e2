//! Strategy selector: which predicate combinator decides a match.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

/// Primary screening modes. The numeric codes are the ones the front-end menus use.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter, ValueEnum,
)]
pub enum ScanMode {
    /// Pass-through capture: every item with enough history matches
    FullScan,
    BreakoutOrConsolidation,
    BreakoutVolume,
    Consolidating,
    LowestVolume,
    RsiBand,
    Reversal,
    ChartPattern,
    CciBand,
    VolumeSurge,
    PriceRising,
    ShortTermBullish,
    PriceVolumeBreakout,
    IntradayRsiMacd,
    NarrowRange4,
    Low52WeekBreakout,
    Low10DayBreakout,
    High52WeekBreakout,
    AroonCrossover,
    MacdBelowZero,
    BullishTomorrow,
}

impl ScanMode {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        use strum::IntoEnumIterator;
        Self::iter().find(|m| m.code() == code)
    }
}

/// Sub-modes of [`ScanMode::Reversal`]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter, ValueEnum,
)]
pub enum ReversalKind {
    Bullish,
    Bearish,
    Momentum,
    MaSupport,
    VsaBullish,
    NarrowRange,
}

/// Pattern parameter of [`ScanMode::ChartPattern`]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter, ValueEnum,
)]
pub enum ChartPattern {
    BullishInsideBar,
    BearishInsideBar,
    Confluence,
    /// Newly listed item trading near its post-listing high
    IpoBase,
    Vcp,
    Trendline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StrategySelector {
    pub mode: ScanMode,
    pub reversal: Option<ReversalKind>,
    pub pattern: Option<ChartPattern>,
}

impl StrategySelector {
    pub fn new(mode: ScanMode) -> Self {
        Self {
            mode,
            reversal: None,
            pattern: None,
        }
    }

    pub fn reversal(kind: ReversalKind) -> Self {
        Self {
            mode: ScanMode::Reversal,
            reversal: Some(kind),
            pattern: None,
        }
    }

    pub fn chart(pattern: ChartPattern) -> Self {
        Self {
            mode: ScanMode::ChartPattern,
            reversal: None,
            pattern: Some(pattern),
        }
    }

    /// Strategies whose success is a falling price
    pub fn is_sell_signal(&self) -> bool {
        match self.mode {
            ScanMode::Reversal => self.reversal == Some(ReversalKind::Bearish),
            ScanMode::ChartPattern => self.pattern == Some(ChartPattern::BearishInsideBar),
            ScanMode::Low52WeekBreakout | ScanMode::Low10DayBreakout | ScanMode::MacdBelowZero => {
                true
            }
            _ => false,
        }
    }
}

impl std::fmt::Display for StrategySelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mode)?;
        if let Some(kind) = self.reversal {
            write!(f, "/{}", kind)?;
        }
        if let Some(pattern) = self.pattern {
            write!(f, "/{}", pattern)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_menu_order() {
        assert_eq!(ScanMode::FullScan.code(), 0);
        assert_eq!(ScanMode::Reversal.code(), 6);
        assert_eq!(ScanMode::BullishTomorrow.code(), 20);
        assert_eq!(ScanMode::from_code(9), Some(ScanMode::VolumeSurge));
        assert_eq!(ScanMode::from_code(21), None);
    }

    #[test]
    fn sell_signals() {
        assert!(StrategySelector::reversal(ReversalKind::Bearish).is_sell_signal());
        assert!(!StrategySelector::reversal(ReversalKind::Bullish).is_sell_signal());
        assert!(StrategySelector::chart(ChartPattern::BearishInsideBar).is_sell_signal());
        assert!(StrategySelector::new(ScanMode::Low10DayBreakout).is_sell_signal());
        assert!(!StrategySelector::new(ScanMode::High52WeekBreakout).is_sell_signal());
    }

    #[test]
    fn display_joins_mode_and_parameter() {
        assert_eq!(StrategySelector::chart(ChartPattern::Confluence).to_string(), "ChartPattern/Confluence");
        assert_eq!(StrategySelector::reversal(ReversalKind::MaSupport).to_string(), "Reversal/MaSupport");
        assert_eq!(StrategySelector::new(ScanMode::NarrowRange4).to_string(), "NarrowRange4");
    }
}
