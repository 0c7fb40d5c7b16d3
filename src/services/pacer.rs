//! Time and randomness seams
//!
//! Every wait the bot performs goes through a [`Pacer`] and every random
//! choice through a [`Dice`], so decisions can be replayed in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::time::Duration;

/// Source of wall-clock time and timed suspension
#[async_trait]
pub trait Pacer: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

/// Real clock backed by tokio timers
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPacer;

#[async_trait]
impl Pacer for TokioPacer {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Source of the bot's random choices
pub trait Dice: Send {
    /// Uniform integer in `lo..=hi`
    fn between(&mut self, lo: u64, hi: u64) -> u64;

    fn flip(&mut self) -> bool;

    /// Uniform index into a non-empty collection of `len` items
    fn pick(&mut self, len: usize) -> usize;
}

impl<R: Rng + Send> Dice for R {
    fn between(&mut self, lo: u64, hi: u64) -> u64 {
        if hi <= lo {
            return lo;
        }
        self.gen_range(lo..=hi)
    }

    fn flip(&mut self) -> bool {
        self.gen_bool(0.5)
    }

    fn pick(&mut self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        self.gen_range(0..len)
    }
}

/// Duration until `target`, zero if it already passed
pub fn until(now: DateTime<Utc>, target: DateTime<Utc>) -> Duration {
    (target - now).to_std().unwrap_or(Duration::ZERO)
}
