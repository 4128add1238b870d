//! Migration & Verification Toolkit (spec.md §4.7, C7).
//!
//! Offline, idempotent one-shot operations that move data between tiers
//! and check it stayed consistent along the way — grounded in
//! `original_source/scripts/migrate_*.py`, `verify_consistency.py`, and
//! `export_to_file.py`. Exposed as subcommands of the `toolkit` binary.

pub mod export;
pub mod migrate;
pub mod verify;

use std::time::Duration;

/// Attempted/succeeded/failed counters plus timing, printed as the
/// footer summary every migration step in the original scripts prints.
#[derive(Debug, Clone, Copy, Default)]
pub struct MigrationReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

impl MigrationReport {
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 { self.succeeded as f64 / secs } else { 0.0 }
    }

    pub fn success_rate(&self) -> f64 {
        if self.attempted > 0 { self.succeeded as f64 / self.attempted as f64 * 100.0 } else { 0.0 }
    }

    pub fn print_summary(&self, title: &str) {
        println!("{}", "=".repeat(60));
        println!("{title} complete");
        println!("{}", "=".repeat(60));
        println!("attempted: {}", self.attempted);
        println!("succeeded: {} ({:.1}%)", self.succeeded, self.success_rate());
        println!("failed: {}", self.failed);
        println!("elapsed: {:.2}s", self.elapsed.as_secs_f64());
        println!("throughput: {:.0} rows/s", self.throughput());
        println!("{}", "=".repeat(60));
    }
}

pub fn print_header(title: &str) {
    println!("\n{}", "=".repeat(60));
    println!("{title}");
    println!("{}\n", "=".repeat(60));
}
