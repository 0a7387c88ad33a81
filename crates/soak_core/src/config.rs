//! Deployment profiles and harness configuration.
//!
//! One configuration structure with named profiles replaces the fleet of
//! near-duplicate bootstrap variants this harness grew out of.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::ops::{OpKind, OpProfile};
use crate::pg_store::PoolConfig;
use crate::retry::Backoff;

/// Named tuning profiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Profile {
    /// Millisecond ticks, thousands of jittered retries, long write budgets.
    Aggressive,
    /// Few attempts, plain linear backoff, fast-failing reads, rare deletes.
    Conservative,
}

impl Profile {
    pub fn config(self) -> HarnessConfig {
        match self {
            Profile::Aggressive => HarnessConfig::aggressive(),
            Profile::Conservative => HarnessConfig::conservative(),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Profile::Aggressive => "aggressive",
            Profile::Conservative => "conservative",
        })
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aggressive" => Ok(Profile::Aggressive),
            "conservative" => Ok(Profile::Conservative),
            other => Err(format!(
                "unknown profile {other:?} (expected `aggressive` or `conservative`)"
            )),
        }
    }
}

/// Full tuning surface for one harness process.
#[derive(Clone, Copy, Debug)]
pub struct HarnessConfig {
    /// Concurrent runners started per operation kind.
    pub runners_per_kind: usize,
    pub write: OpProfile,
    pub read: OpProfile,
    pub delete: OpProfile,
    pub pool: PoolConfig,
}

impl HarnessConfig {
    pub fn aggressive() -> Self {
        let backoff = Backoff::with_jitter(Duration::from_millis(10), 0.8);
        Self {
            runners_per_kind: 10,
            write: OpProfile {
                tick: Duration::from_millis(10),
                budget: Duration::from_secs(60),
                max_attempts: 2000,
                backoff,
            },
            read: OpProfile {
                tick: Duration::from_millis(10),
                budget: Duration::from_secs(20),
                max_attempts: 2000,
                backoff,
            },
            delete: OpProfile {
                tick: Duration::from_secs(30),
                budget: Duration::from_secs(30),
                max_attempts: 2000,
                backoff,
            },
            pool: PoolConfig::default(),
        }
    }

    pub fn conservative() -> Self {
        let backoff = Backoff::linear(Duration::from_millis(200));
        Self {
            runners_per_kind: 10,
            write: OpProfile {
                tick: Duration::from_millis(10),
                budget: Duration::from_secs(20),
                max_attempts: 20,
                backoff,
            },
            read: OpProfile {
                tick: Duration::from_secs(1),
                budget: Duration::from_secs(2),
                max_attempts: 20,
                backoff,
            },
            delete: OpProfile {
                tick: Duration::from_secs(600),
                budget: Duration::from_secs(30),
                max_attempts: 20,
                backoff,
            },
            pool: PoolConfig::default(),
        }
    }

    pub fn profile(&self, kind: OpKind) -> &OpProfile {
        match kind {
            OpKind::Write => &self.write,
            OpKind::Read => &self.read,
            OpKind::Delete => &self.delete,
        }
    }
}
