pub mod indicators;
pub mod session;
pub mod signal;

pub use indicators::{compute_band, Band, BandReading, GapReading, VwapAccumulator};
pub use session::{
    PendingIntent, Phase, Session, SessionCounters, SessionEngine, SessionState, Step, TickInput,
    TickRecord,
};
pub use signal::{GapFadeSignals, Signal};
