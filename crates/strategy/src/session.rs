//! Daily guardrail state machine: IDLE → ARMED → IN_TRADE → LOCKED.
//!
//! The session is a plain value. [`SessionEngine::on_tick`] takes the current
//! session and returns the next one together with a single [`Intent`];
//! [`SessionEngine::on_report`] folds the execution outcome of that intent
//! back in. No tick may run while an intent is unresolved.

use crate::indicators::{compute_band, BandReading, GapReading, VwapAccumulator};
use crate::signal::{GapFadeSignals, Signal};
use chrono::{DateTime, NaiveDate, Utc};
use gapfade_core::{
    calculate_position_size, trading_date, Bar, EngineError, ExecutionReport, ExitReason, Intent,
    Position, SessionWindow, Side, SizingParams, StrategyConfig,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Idle,
    Armed,
    InTrade,
    Locked,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "IDLE",
            Self::Armed => "ARMED",
            Self::InTrade => "IN_TRADE",
            Self::Locked => "LOCKED",
        };
        f.write_str(s)
    }
}

/// State plus the data that only exists in that state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Idle,
    Armed,
    InTrade { position: Position },
    Locked,
}

impl Phase {
    #[must_use]
    pub const fn state(&self) -> SessionState {
        match self {
            Self::Idle => SessionState::Idle,
            Self::Armed => SessionState::Armed,
            Self::InTrade { .. } => SessionState::InTrade,
            Self::Locked => SessionState::Locked,
        }
    }

    #[must_use]
    pub const fn position(&self) -> Option<&Position> {
        match self {
            Self::InTrade { position } => Some(position),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounters {
    /// Completed round trips.
    pub trades_today: u32,
    pub session_date: NaiveDate,
}

/// Intent emitted but not yet resolved by an execution report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingIntent {
    Entry {
        side: Side,
        quantity: Decimal,
        reference_price: Decimal,
    },
    Exit {
        reason: ExitReason,
    },
    Flatten,
}

impl fmt::Display for PendingIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entry { side, quantity, .. } => write!(f, "entry {side} x{quantity}"),
            Self::Exit { reason } => write!(f, "exit ({reason})"),
            Self::Flatten => write!(f, "flatten"),
        }
    }
}

/// Everything the engine remembers between ticks. Serializable so a
/// collaborator can checkpoint it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub phase: Phase,
    pub counters: SessionCounters,
    pub gap: Option<GapReading>,
    vwap: VwapAccumulator,
    pending: Option<PendingIntent>,
    /// A flatten was reported as failed and must be re-issued.
    flatten_outstanding: bool,
}

impl Session {
    #[must_use]
    pub fn new(session_date: NaiveDate) -> Self {
        Self {
            phase: Phase::Idle,
            counters: SessionCounters {
                trades_today: 0,
                session_date,
            },
            gap: None,
            vwap: VwapAccumulator::new(),
            pending: None,
            flatten_outstanding: false,
        }
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.phase.state()
    }

    #[must_use]
    pub const fn position(&self) -> Option<&Position> {
        self.phase.position()
    }

    #[must_use]
    pub const fn trades_today(&self) -> u32 {
        self.counters.trades_today
    }

    #[must_use]
    pub const fn pending(&self) -> Option<&PendingIntent> {
        self.pending.as_ref()
    }

    #[must_use]
    pub fn vwap(&self) -> Option<Decimal> {
        self.vwap.value()
    }

    #[must_use]
    pub const fn flatten_outstanding(&self) -> bool {
        self.flatten_outstanding
    }
}

/// Inputs gathered by collaborators before a tick.
#[derive(Debug, Clone, Copy)]
pub struct TickInput<'a> {
    pub now: DateTime<Utc>,
    /// Today's regular session, `None` when the market has no session today.
    pub window: Option<SessionWindow>,
    pub price: Option<Decimal>,
    /// Today's bars, oldest first.
    pub bars: &'a [Bar],
    pub prior_close: Option<Decimal>,
    pub equity: Option<Decimal>,
}

/// One structured record per tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickRecord {
    pub timestamp: DateTime<Utc>,
    pub state_before: SessionState,
    pub state: SessionState,
    pub price: Option<Decimal>,
    pub gap_pct: Option<Decimal>,
    pub band_mean: Option<Decimal>,
    pub band_upper: Option<Decimal>,
    pub band_lower: Option<Decimal>,
    pub vwap: Option<Decimal>,
    pub signal: Signal,
    pub intent: Intent,
    pub trades_today: u32,
    /// Why nothing happened, when that is not obvious from the state.
    pub note: Option<String>,
}

impl TickRecord {
    /// Emits the record as one `tracing` event.
    pub fn log(&self) {
        tracing::info!(
            state_before = %self.state_before,
            state = %self.state,
            price = ?self.price,
            gap_pct = ?self.gap_pct,
            band_mean = ?self.band_mean,
            band_upper = ?self.band_upper,
            band_lower = ?self.band_lower,
            vwap = ?self.vwap,
            signal = %self.signal,
            intent = %self.intent,
            trades_today = self.trades_today,
            note = self.note.as_deref().unwrap_or(""),
            "tick"
        );
    }
}

/// Result of one tick.
#[derive(Debug, Clone)]
pub struct Step {
    pub session: Session,
    pub intent: Intent,
    pub record: TickRecord,
}

#[derive(Default)]
struct TickNotes {
    signal: Option<Signal>,
    note: Option<String>,
}

impl TickNotes {
    fn note(&mut self, msg: impl Into<String>) {
        self.note = Some(msg.into());
    }
}

pub struct SessionEngine {
    config: StrategyConfig,
    signals: GapFadeSignals,
    sizing: SizingParams,
}

impl SessionEngine {
    /// # Errors
    /// `Configuration` if `config` is invalid.
    pub fn new(config: StrategyConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            signals: GapFadeSignals::from_config(&config),
            sizing: config.sizing(),
            config,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Fresh IDLE session for the trading day containing `now`.
    #[must_use]
    pub fn start_session(&self, now: DateTime<Utc>) -> Session {
        Session::new(trading_date(now))
    }

    /// Computes the next session and the single intent for this tick.
    ///
    /// Indicator and sizing failures never escape: they yield `NoAction` with
    /// a note on the record.
    ///
    /// # Errors
    /// `IntentPending` if the previous intent has not been reported on.
    pub fn on_tick(&self, session: &Session, input: &TickInput<'_>) -> Result<Step, EngineError> {
        if let Some(pending) = &session.pending {
            return Err(EngineError::IntentPending(pending.to_string()));
        }

        let state_before = session.state();
        let mut next = session.clone();
        let mut notes = TickNotes::default();
        let band = compute_band(input.bars, self.config.band_lookback, self.config.band_mult);

        let intent = self.decide(&mut next, input, &band, &mut notes);

        let band_values = band.ready();
        let record = TickRecord {
            timestamp: input.now,
            state_before,
            state: next.state(),
            price: input.price,
            gap_pct: next.gap.map(|g| g.gap_pct),
            band_mean: band_values.map(|b| b.mean),
            band_upper: band_values.map(|b| b.upper),
            band_lower: band_values.map(|b| b.lower),
            vwap: next.vwap(),
            signal: notes.signal.unwrap_or(Signal::NoSignal),
            intent: intent.clone(),
            trades_today: next.trades_today(),
            note: notes.note,
        };

        Ok(Step {
            session: next,
            intent,
            record,
        })
    }

    fn decide(
        &self,
        s: &mut Session,
        input: &TickInput<'_>,
        band: &BandReading,
        notes: &mut TickNotes,
    ) -> Intent {
        let today = trading_date(input.now);
        if today != s.counters.session_date {
            let carried_position = s.position().is_some() || s.flatten_outstanding;
            tracing::info!(
                from = %s.counters.session_date,
                to = %today,
                trades = s.counters.trades_today,
                "New trading day, resetting session"
            );
            *s = Session::new(today);
            if carried_position {
                tracing::warn!("Position carried over from previous session, flattening");
                s.pending = Some(PendingIntent::Flatten);
                return Intent::FlattenAll;
            }
        }

        if s.flatten_outstanding {
            tracing::warn!(state = %s.state(), "Previous flatten not acknowledged, re-issuing");
            s.pending = Some(PendingIntent::Flatten);
            return Intent::FlattenAll;
        }

        s.vwap.update(input.bars);

        if matches!(s.phase, Phase::Locked) {
            notes.note("locked for the day");
            return Intent::NoAction;
        }

        if matches!(s.phase, Phase::Idle) {
            if !input.window.is_some_and(|w| w.is_open(input.now)) {
                notes.note("market closed");
                return Intent::NoAction;
            }
            match GapReading::compute(input.prior_close, input.bars) {
                Ok(gap) => {
                    tracing::info!(
                        prior_close = %gap.prior_close,
                        open = %gap.today_open,
                        gap_pct = %gap.gap_pct,
                        "Session gap computed"
                    );
                    s.gap = Some(gap);
                    transition(s, Phase::Armed);
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Cannot arm yet");
                    notes.note(e.to_string());
                    return Intent::NoAction;
                }
            }
        }

        let flatten_due = input.window.map_or(true, |w| {
            input.now >= w.flatten_time(self.config.flatten_buffer_minutes)
        });
        if flatten_due {
            return match s.phase {
                Phase::InTrade { .. } => {
                    tracing::warn!(
                        trades = s.counters.trades_today + 1,
                        "Flatten time reached with open position"
                    );
                    s.counters.trades_today += 1;
                    transition(s, Phase::Locked);
                    s.pending = Some(PendingIntent::Flatten);
                    Intent::FlattenAll
                }
                _ => {
                    transition(s, Phase::Locked);
                    notes.note("flatten time reached");
                    Intent::NoAction
                }
            };
        }

        if matches!(s.phase, Phase::Armed) {
            return self.evaluate_entry(s, input, band, notes);
        }

        let Phase::InTrade { position } = &s.phase else {
            return Intent::NoAction;
        };
        let Some(price) = input.price else {
            notes.note("no price");
            return Intent::NoAction;
        };
        let signal = self.signals.exit(price, position, band, s.vwap.value());
        notes.signal = Some(signal);
        match signal.exit_reason() {
            Some(reason) => {
                s.pending = Some(PendingIntent::Exit { reason });
                Intent::ExitPosition { reason }
            }
            None => Intent::NoAction,
        }
    }

    fn evaluate_entry(
        &self,
        s: &mut Session,
        input: &TickInput<'_>,
        band: &BandReading,
        notes: &mut TickNotes,
    ) -> Intent {
        if s.counters.trades_today >= self.config.max_trades_per_day {
            tracing::info!(
                trades = s.counters.trades_today,
                max = self.config.max_trades_per_day,
                "Daily trade limit reached"
            );
            transition(s, Phase::Locked);
            return Intent::NoAction;
        }

        let in_window = input
            .window
            .is_some_and(|w| w.within_entry_window(input.now, self.config.entry_window_minutes));
        if !in_window {
            tracing::info!("Entry window closed with no position");
            transition(s, Phase::Locked);
            return Intent::NoAction;
        }

        let Some(price) = input.price else {
            notes.note("no price");
            return Intent::NoAction;
        };
        let Some(gap) = s.gap else {
            notes.note("gap unavailable");
            return Intent::NoAction;
        };
        if let BandReading::NotReady {
            available,
            required,
        } = band
        {
            notes.note(format!("band not ready ({available}/{required} bars)"));
        }

        let signal = self.signals.entry(price, &gap, band);
        notes.signal = Some(signal);
        let Some(side) = signal.entry_side() else {
            return Intent::NoAction;
        };

        let quantity = input
            .equity
            .ok_or_else(|| EngineError::InvalidRisk("account equity unavailable".into()))
            .and_then(|equity| calculate_position_size(equity, price, &self.sizing));
        match quantity {
            Ok(qty) if qty.is_zero() => {
                tracing::warn!(price = %price, "Computed quantity is zero, skipping entry");
                notes.note("quantity rounds to zero");
                Intent::NoAction
            }
            Ok(qty) => {
                tracing::info!(side = %side, qty = %qty, price = %price, "Entering position");
                s.pending = Some(PendingIntent::Entry {
                    side,
                    quantity: qty,
                    reference_price: price,
                });
                match side {
                    Side::Long => Intent::EnterLong { quantity: qty },
                    Side::Short => Intent::EnterShort { quantity: qty },
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Entry blocked");
                notes.note(e.to_string());
                Intent::NoAction
            }
        }
    }

    /// Resolves the pending intent with the execution outcome.
    ///
    /// # Errors
    /// `NoPendingIntent` if no intent is awaiting a report.
    pub fn on_report(
        &self,
        session: &Session,
        report: &ExecutionReport,
        at: DateTime<Utc>,
    ) -> Result<Session, EngineError> {
        let Some(pending) = session.pending.clone() else {
            return Err(EngineError::NoPendingIntent);
        };
        let mut next = session.clone();
        next.pending = None;
        let acknowledged = report.is_acknowledged();

        match pending {
            PendingIntent::Entry {
                side,
                quantity,
                reference_price,
            } => {
                if acknowledged {
                    let entry_price = report.fill_price().unwrap_or(reference_price);
                    let position =
                        Position::open(side, entry_price, quantity, self.config.stop_pct, at);
                    tracing::info!(
                        side = %side,
                        qty = %quantity,
                        entry = %position.entry_price,
                        stop = %position.stop_price,
                        "Position opened"
                    );
                    transition(&mut next, Phase::InTrade { position });
                } else {
                    tracing::error!(report = ?report, "Entry order failed, staying armed");
                }
            }
            PendingIntent::Exit { reason } => {
                if acknowledged {
                    if let Some(position) = next.position() {
                        tracing::info!(
                            side = %position.side,
                            entry = %position.entry_price,
                            exit = ?report.fill_price(),
                            reason = %reason,
                            "Position closed"
                        );
                    }
                    next.counters.trades_today += 1;
                    let target = if next.counters.trades_today >= self.config.max_trades_per_day {
                        Phase::Locked
                    } else {
                        Phase::Armed
                    };
                    transition(&mut next, target);
                } else {
                    tracing::error!(
                        report = ?report,
                        reason = %reason,
                        "Exit order failed, will re-evaluate next tick"
                    );
                }
            }
            PendingIntent::Flatten => {
                next.flatten_outstanding = !acknowledged;
                if acknowledged {
                    tracing::info!("Flatten acknowledged");
                } else {
                    tracing::error!(report = ?report, "Flatten failed, will retry next tick");
                }
            }
        }

        Ok(next)
    }
}

fn transition(s: &mut Session, to: Phase) {
    let from = s.state();
    let to_state = to.state();
    s.phase = to;
    if from != to_state {
        tracing::info!(from = %from, to = %to_state, "State change");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn open_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 14, 30, 0).unwrap()
    }

    fn window() -> SessionWindow {
        SessionWindow::regular(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()).unwrap()
    }

    fn bars(closes: &[Decimal]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                timestamp: open_time() + Duration::minutes(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: dec!(1000),
                vwap: None,
            })
            .collect()
    }

    fn engine() -> SessionEngine {
        SessionEngine::new(StrategyConfig {
            band_lookback: 3,
            ..StrategyConfig::default()
        })
        .unwrap()
    }

    fn input<'a>(now: DateTime<Utc>, price: Decimal, bars: &'a [Bar]) -> TickInput<'a> {
        TickInput {
            now,
            window: Some(window()),
            price: Some(price),
            bars,
            prior_close: Some(dec!(100)),
            equity: Some(dec!(100000)),
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = StrategyConfig {
            stop_pct: dec!(0),
            ..StrategyConfig::default()
        };
        assert!(matches!(
            SessionEngine::new(cfg),
            Err(EngineError::Configuration(_))
        ));
    }

    #[test]
    fn idle_before_open() {
        let engine = engine();
        let session = engine.start_session(open_time());
        let step = engine
            .on_tick(&session, &input(open_time() - Duration::minutes(5), dec!(99), &[]))
            .unwrap();
        assert_eq!(step.session.state(), SessionState::Idle);
        assert_eq!(step.intent, Intent::NoAction);
        assert_eq!(step.record.note.as_deref(), Some("market closed"));
    }

    #[test]
    fn arms_once_gap_is_known() {
        let engine = engine();
        let session = engine.start_session(open_time());
        let history = bars(&[dec!(99)]);
        let step = engine
            .on_tick(&session, &input(open_time() + Duration::minutes(1), dec!(99), &history))
            .unwrap();
        assert_eq!(step.session.state(), SessionState::Armed);
        assert_eq!(step.record.gap_pct, Some(dec!(-0.01)));
        assert_eq!(step.intent, Intent::NoAction);
    }

    #[test]
    fn missing_prior_close_stays_idle() {
        let engine = engine();
        let session = engine.start_session(open_time());
        let history = bars(&[dec!(99)]);
        let mut tick = input(open_time() + Duration::minutes(1), dec!(99), &history);
        tick.prior_close = None;
        let step = engine.on_tick(&session, &tick).unwrap();
        assert_eq!(step.session.state(), SessionState::Idle);
        assert_eq!(step.intent, Intent::NoAction);
    }

    #[test]
    fn tick_refused_while_intent_pending() {
        let engine = engine();
        let mut session = engine.start_session(open_time());
        session.pending = Some(PendingIntent::Flatten);
        let err = engine
            .on_tick(&session, &input(open_time(), dec!(99), &[]))
            .unwrap_err();
        assert!(matches!(err, EngineError::IntentPending(_)));
    }

    #[test]
    fn report_without_pending_intent_is_an_error() {
        let engine = engine();
        let session = engine.start_session(open_time());
        let err = engine
            .on_report(&session, &ExecutionReport::DryRun, open_time())
            .unwrap_err();
        assert_eq!(err, EngineError::NoPendingIntent);
    }

    #[test]
    fn entry_window_expiry_locks() {
        let engine = engine();
        let session = engine.start_session(open_time());
        let history = bars(&[dec!(99), dec!(99), dec!(99)]);
        let step = engine
            .on_tick(&session, &input(open_time() + Duration::minutes(31), dec!(99), &history))
            .unwrap();
        assert_eq!(step.session.state(), SessionState::Locked);
        assert_eq!(step.intent, Intent::NoAction);
    }

    #[test]
    fn rejected_entry_stays_armed() {
        let engine = engine();
        let mut session = engine.start_session(open_time());
        session.phase = Phase::Armed;
        session.pending = Some(PendingIntent::Entry {
            side: Side::Long,
            quantity: dec!(10),
            reference_price: dec!(98.4),
        });
        let next = engine
            .on_report(
                &session,
                &ExecutionReport::Rejected {
                    reason: "insufficient buying power".into(),
                },
                open_time(),
            )
            .unwrap();
        assert_eq!(next.state(), SessionState::Armed);
        assert!(next.pending().is_none());
        assert_eq!(next.trades_today(), 0);
    }

    #[test]
    fn filled_entry_uses_broker_price() {
        let engine = engine();
        let mut session = engine.start_session(open_time());
        session.phase = Phase::Armed;
        session.pending = Some(PendingIntent::Entry {
            side: Side::Long,
            quantity: dec!(10),
            reference_price: dec!(98.4),
        });
        let report = ExecutionReport::Filled {
            order_id: "abc".into(),
            avg_price: Some(dec!(98.5)),
        };
        let next = engine.on_report(&session, &report, open_time()).unwrap();
        let position = next.position().unwrap();
        assert_eq!(position.entry_price, dec!(98.5));
        assert_eq!(position.stop_price, dec!(97.515));
    }

    #[test]
    fn failed_flatten_is_reissued() {
        let engine = engine();
        let mut session = engine.start_session(open_time());
        session.phase = Phase::Locked;
        session.pending = Some(PendingIntent::Flatten);
        let failed = ExecutionReport::Rejected {
            reason: "timeout".into(),
        };
        let next = engine.on_report(&session, &failed, open_time()).unwrap();
        assert!(next.flatten_outstanding());

        let step = engine
            .on_tick(&next, &input(open_time() + Duration::minutes(386), dec!(99), &[]))
            .unwrap();
        assert_eq!(step.intent, Intent::FlattenAll);
        assert_eq!(step.session.pending(), Some(&PendingIntent::Flatten));

        let done = engine
            .on_report(&step.session, &ExecutionReport::DryRun, open_time())
            .unwrap();
        assert!(!done.flatten_outstanding());
    }

    #[test]
    fn snapshot_serializes_state_and_counters() {
        let engine = engine();
        let mut session = engine.start_session(open_time());
        session.phase = Phase::InTrade {
            position: Position::open(Side::Short, dec!(101.6), dec!(5), dec!(0.01), open_time()),
        };
        session.counters.trades_today = 2;
        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains(r#""state":"IN_TRADE""#));
        let restored: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, session);
    }
}
