//! System-wide counters: CPU tick accounting and paging traffic.
//!
//! All counters are multi-writer atomics. Reporters may observe a pair that
//! is one tick stale, never one that is inconsistent with itself.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Stats {
    total_cpu_ticks: AtomicU64,
    idle_cpu_ticks: AtomicU64,
    active_cpu_ticks: AtomicU64,
    pages_paged_in: AtomicU64,
    pages_paged_out: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// A worker pass over an empty slot.
    pub fn record_idle_tick(&self) {
        self.idle_cpu_ticks.fetch_add(1, Ordering::Relaxed);
        self.total_cpu_ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// A worker pass that drove a process.
    pub fn record_active_tick(&self) {
        self.active_cpu_ticks.fetch_add(1, Ordering::Relaxed);
        self.total_cpu_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_page_in(&self) {
        self.pages_paged_in.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_page_out(&self) {
        self.pages_paged_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_ticks(&self) -> u64 {
        self.total_cpu_ticks.load(Ordering::Relaxed)
    }

    pub fn idle_ticks(&self) -> u64 {
        self.idle_cpu_ticks.load(Ordering::Relaxed)
    }

    pub fn active_ticks(&self) -> u64 {
        self.active_cpu_ticks.load(Ordering::Relaxed)
    }

    pub fn pages_in(&self) -> u64 {
        self.pages_paged_in.load(Ordering::Relaxed)
    }

    pub fn pages_out(&self) -> u64 {
        self.pages_paged_out.load(Ordering::Relaxed)
    }

    /// Zero everything. Part of scheduler shutdown.
    pub fn reset(&self) {
        self.total_cpu_ticks.store(0, Ordering::Relaxed);
        self.idle_cpu_ticks.store(0, Ordering::Relaxed);
        self.active_cpu_ticks.store(0, Ordering::Relaxed);
        self.pages_paged_in.store(0, Ordering::Relaxed);
        self.pages_paged_out.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_and_active_both_feed_total() {
        let stats = Stats::new();
        stats.record_idle_tick();
        stats.record_active_tick();
        stats.record_active_tick();
        assert_eq!(stats.idle_ticks(), 1);
        assert_eq!(stats.active_ticks(), 2);
        assert_eq!(stats.total_ticks(), 3);
    }

    #[test]
    fn reset_zeroes_all_counters() {
        let stats = Stats::new();
        stats.record_active_tick();
        stats.record_page_in();
        stats.record_page_out();
        stats.reset();
        assert_eq!(stats.total_ticks(), 0);
        assert_eq!(stats.pages_in(), 0);
        assert_eq!(stats.pages_out(), 0);
    }
}
