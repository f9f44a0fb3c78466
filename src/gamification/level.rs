//! Level curve (pure math, no DB).
//!
//! `level = floor(sqrt(xp / 100)) + 1`, so level L starts at `(L-1)^2 * 100`
//! XP and level L+1 starts at `L^2 * 100`.

use serde::Serialize;

/// Level for a total XP amount. Negative totals count as zero.
pub fn level_for_xp(total_xp: i64) -> i64 {
    // floor(sqrt(x / 100)) == floor(sqrt(floor(x / 100))) for x >= 0, so
    // integer division plus an integer square root is exact.
    isqrt(total_xp.max(0) / 100) + 1
}

/// Total XP at which `level + 1` is reached: `level^2 * 100`.
pub fn xp_for_level(level: i64) -> i64 {
    let level = level.max(0);
    level.saturating_mul(level).saturating_mul(100)
}

/// Fraction of the way from the current level to the next, in `[0, 1]`.
pub fn level_progress(total_xp: i64) -> f64 {
    let level = level_for_xp(total_xp);
    let floor = xp_for_level(level - 1);
    let ceiling = xp_for_level(level);
    let span = (ceiling - floor).max(1) as f64;
    ((total_xp - floor) as f64 / span).clamp(0.0, 1.0)
}

/// Level details for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelProgress {
    pub level: i64,
    pub total_xp: i64,
    /// XP at which the current level started.
    pub level_floor_xp: i64,
    /// XP at which the next level starts.
    pub next_level_xp: i64,
    pub xp_to_next_level: i64,
    pub progress: f64,
}

impl LevelProgress {
    pub fn for_xp(total_xp: i64) -> Self {
        let total_xp = total_xp.max(0);
        let level = level_for_xp(total_xp);
        let next_level_xp = xp_for_level(level);
        Self {
            level,
            total_xp,
            level_floor_xp: xp_for_level(level - 1),
            next_level_xp,
            xp_to_next_level: next_level_xp - total_xp,
            progress: level_progress(total_xp),
        }
    }
}

fn isqrt(n: i64) -> i64 {
    if n <= 0 {
        return 0;
    }
    let mut x = (n as f64).sqrt() as i64;
    while x * x > n {
        x -= 1;
    }
    while (x + 1) * (x + 1) <= n {
        x += 1;
    }
    x
}
