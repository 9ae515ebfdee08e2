//! Table-driven strategy decisions.
//!
//! Each strategy selector maps to a [`Rule`] over the boolean [`Signal`]s the
//! predicate battery produces. Adding a mode means adding a row, nothing else.

use strum::EnumCount;
use strum_macros::{Display, EnumCount as EnumCountMacro, EnumIter};

use crate::domain::{ChartPattern, ReversalKind, ScanMode, StrategySelector};

/// Boolean outputs of the predicate battery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumCountMacro)]
pub enum Signal {
    ValidPrice,
    Consolidating,
    Breakout,
    VolumeSurge,
    LowestVolume,
    RsiInBand,
    CciInBand,
    MaBullish,
    MaBearish,
    BullishCandle,
    BearishCandle,
    BullishInsideBar,
    BearishInsideBar,
    Confluence,
    IpoBase,
    Vcp,
    Trendline,
    NarrowRange,
    Momentum,
    VsaBullish,
    MaSupport,
    PriceRising,
    ShortTermBullish,
    PriceVolumeBreakout,
    IntradayRsiMacd,
    Nr4,
    Low52WeekBreakout,
    Low10DayBreakout,
    High52WeekBreakout,
    AroonCrossover,
    MacdBelowZero,
    BullishTomorrow,
}

/// Fixed-size set of raised signals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalSet([bool; Signal::COUNT]);

impl Default for SignalSet {
    fn default() -> Self {
        Self([false; Signal::COUNT])
    }
}

impl SignalSet {
    pub fn set(&mut self, signal: Signal, value: bool) {
        self.0[signal as usize] = value;
    }

    pub fn raise(&mut self, signal: Signal) {
        self.set(signal, true);
    }

    pub fn is_set(&self, signal: Signal) -> bool {
        self.0[signal as usize]
    }
}

/// Boolean combinator over signals
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rule {
    /// Pass-through capture
    Always,
    Is(Signal),
    All(&'static [Rule]),
    Any(&'static [Rule]),
}

impl Rule {
    pub fn evaluate(&self, signals: &SignalSet) -> bool {
        match self {
            Rule::Always => true,
            Rule::Is(s) => signals.is_set(*s),
            Rule::All(rules) => rules.iter().all(|r| r.evaluate(signals)),
            Rule::Any(rules) => rules.iter().any(|r| r.evaluate(signals)),
        }
    }

    /// Every signal the rule can read
    pub fn signals(&self) -> Vec<Signal> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect(&self, out: &mut Vec<Signal>) {
        match self {
            Rule::Always => {}
            Rule::Is(s) => {
                if !out.contains(s) {
                    out.push(*s);
                }
            }
            Rule::All(rules) | Rule::Any(rules) => rules.iter().for_each(|r| r.collect(out)),
        }
    }
}

use Rule::{All, Always, Any, Is};
use Signal::*;

const PRICE: Rule = Is(ValidPrice);

/// Price band gating `rule`
macro_rules! priced {
    ($($rule:expr),+ $(,)?) => {
        All(&[PRICE, $($rule),+])
    };
}

type Key = (ScanMode, Option<ReversalKind>, Option<ChartPattern>);

#[rustfmt::skip]
static TABLE: &[(Key, Rule)] = &[
    ((ScanMode::FullScan, None, None), Always),
    ((ScanMode::BreakoutOrConsolidation, None, None), Any(&[
        priced!(Is(Breakout), Is(VolumeSurge)),
        priced!(Is(Consolidating)),
    ])),
    ((ScanMode::BreakoutVolume, None, None), priced!(Is(Breakout), Is(VolumeSurge))),
    ((ScanMode::Consolidating, None, None), priced!(Is(Consolidating))),
    ((ScanMode::LowestVolume, None, None), priced!(Is(LowestVolume))),
    ((ScanMode::RsiBand, None, None), priced!(Is(RsiInBand))),

    ((ScanMode::Reversal, Some(ReversalKind::Bullish), None), priced!(Any(&[Is(BullishCandle), Is(MaBullish)]))),
    ((ScanMode::Reversal, Some(ReversalKind::Bearish), None), priced!(Any(&[Is(BearishCandle), Is(MaBearish)]))),
    ((ScanMode::Reversal, Some(ReversalKind::Momentum), None), priced!(Is(Momentum))),
    ((ScanMode::Reversal, Some(ReversalKind::MaSupport), None), priced!(Is(MaSupport))),
    ((ScanMode::Reversal, Some(ReversalKind::VsaBullish), None), priced!(Is(VsaBullish), Is(BullishCandle))),
    ((ScanMode::Reversal, Some(ReversalKind::NarrowRange), None), priced!(Is(NarrowRange))),

    ((ScanMode::ChartPattern, None, Some(ChartPattern::BullishInsideBar)), priced!(Is(BullishInsideBar))),
    ((ScanMode::ChartPattern, None, Some(ChartPattern::BearishInsideBar)), priced!(Is(BearishInsideBar))),
    ((ScanMode::ChartPattern, None, Some(ChartPattern::Confluence)), priced!(Is(Confluence))),
    ((ScanMode::ChartPattern, None, Some(ChartPattern::IpoBase)), priced!(Is(IpoBase))),
    ((ScanMode::ChartPattern, None, Some(ChartPattern::Vcp)), priced!(Is(Vcp))),
    ((ScanMode::ChartPattern, None, Some(ChartPattern::Trendline)), priced!(Is(Trendline))),

    ((ScanMode::CciBand, None, None), priced!(Is(CciInBand))),
    ((ScanMode::VolumeSurge, None, None), Is(VolumeSurge)),
    ((ScanMode::PriceRising, None, None), Is(PriceRising)),
    ((ScanMode::ShortTermBullish, None, None), Is(ShortTermBullish)),
    ((ScanMode::PriceVolumeBreakout, None, None), Is(PriceVolumeBreakout)),
    ((ScanMode::IntradayRsiMacd, None, None), Is(IntradayRsiMacd)),
    ((ScanMode::NarrowRange4, None, None), Is(Nr4)),
    ((ScanMode::Low52WeekBreakout, None, None), Is(Low52WeekBreakout)),
    ((ScanMode::Low10DayBreakout, None, None), Is(Low10DayBreakout)),
    ((ScanMode::High52WeekBreakout, None, None), Is(High52WeekBreakout)),
    ((ScanMode::AroonCrossover, None, None), priced!(Is(AroonCrossover))),
    ((ScanMode::MacdBelowZero, None, None), Is(MacdBelowZero)),
    ((ScanMode::BullishTomorrow, None, None), Is(BullishTomorrow)),
];

/// Rows that replace [`TABLE`] entries when only newly listed items are scanned.
/// The listing base counts as a match next to the selected pattern.
#[rustfmt::skip]
static NEWLY_LISTED: &[(Key, Rule)] = &[
    ((ScanMode::ChartPattern, None, Some(ChartPattern::Confluence)), priced!(Any(&[Is(Confluence), Is(IpoBase)]))),
    ((ScanMode::ChartPattern, None, Some(ChartPattern::Vcp)), priced!(Any(&[Is(Vcp), Is(IpoBase)]))),
    ((ScanMode::ChartPattern, None, Some(ChartPattern::Trendline)), priced!(Any(&[Is(Trendline), Is(IpoBase)]))),
];

fn lookup(table: &'static [(Key, Rule)], key: Key) -> Option<&'static Rule> {
    table.iter().find(|(k, _)| *k == key).map(|(_, rule)| rule)
}

/// Rule for a selector, or `None` when the combination is not a known strategy.
pub fn rule_for(selector: &StrategySelector, newly_listed_only: bool) -> Option<&'static Rule> {
    let key = (selector.mode, selector.reversal, selector.pattern);
    newly_listed_only
        .then(|| lookup(NEWLY_LISTED, key))
        .flatten()
        .or_else(|| lookup(TABLE, key))
}
