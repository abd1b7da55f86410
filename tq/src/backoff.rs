//! Backoff policy
//!
//! Rate-limited failures walk a doubling table (1s .. 60s) with up to 10%
//! jitter on top, unless the server supplied a retry hint, which is used as-is
//! up to the cap. Generic failures always wait a fixed short delay.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::classify::Classification;

/// Backoff configuration and delay computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Rate-limit delays indexed by retry count, last entry repeats
    #[serde(rename = "table-ms")]
    pub table_ms: Vec<u64>,

    /// Upper bound of the jitter added to table delays, as a fraction
    #[serde(rename = "jitter-ratio")]
    pub jitter_ratio: f64,

    /// Cap applied to a server retry hint
    #[serde(rename = "max-hint-ms")]
    pub max_hint_ms: u64,

    /// Fixed delay after a non-rate-limited failure
    #[serde(rename = "generic-delay-ms")]
    pub generic_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            table_ms: vec![1_000, 2_000, 4_000, 8_000, 16_000, 32_000, 60_000],
            jitter_ratio: 0.10,
            max_hint_ms: 60_000,
            generic_delay_ms: 1_000,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the retry following attempt `retry_count` (0-based, not
    /// yet incremented)
    pub fn delay(&self, retry_count: u32, classification: Classification) -> Duration {
        self.delay_with_rng(retry_count, classification, &mut rand::rng())
    }

    /// Same as [`delay`](Self::delay) with a caller-supplied jitter source
    pub fn delay_with_rng<R: Rng>(
        &self,
        retry_count: u32,
        classification: Classification,
        rng: &mut R,
    ) -> Duration {
        match classification {
            Classification::Generic => Duration::from_millis(self.generic_delay_ms),
            Classification::RateLimited {
                retry_after: Some(hint),
            } => hint.min(Duration::from_millis(self.max_hint_ms)),
            Classification::RateLimited { retry_after: None } => {
                let base = self.table_delay_ms(retry_count);
                let jitter_max = base as f64 * self.jitter_ratio;
                let jitter_ms = if jitter_max > 0.0 {
                    rng.random_range(0.0..jitter_max)
                } else {
                    0.0
                };
                let jitter = Duration::try_from_secs_f64(jitter_ms / 1_000.0).unwrap_or(Duration::MAX);
                Duration::from_millis(base).saturating_add(jitter)
            }
        }
    }

    /// Table delay for a retry count, without jitter
    pub fn table_delay_ms(&self, retry_count: u32) -> u64 {
        let Some(last) = self.table_ms.len().checked_sub(1) else {
            return self.generic_delay_ms;
        };
        let index = (retry_count as usize).min(last);
        self.table_ms[index]
    }
}
