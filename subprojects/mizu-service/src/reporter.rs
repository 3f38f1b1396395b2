//! Unimplemented-function reports.

use std::collections::VecDeque;

use mizu_servctl::ProcessId;

/// Reports kept before the oldest is dropped.
pub const DEFAULT_CAPACITY: usize = 256;

/// A guest called a command that has no handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnimplementedReport {
    pub service: String,
    pub command: u32,
    /// Function name, when the command id is known but stubbed.
    pub name: Option<&'static str>,
    pub pid: ProcessId,
}

/// Bounded ring of [`UnimplementedReport`]s.
#[derive(Debug)]
pub struct Reporter {
    capacity: usize,
    reports: VecDeque<UnimplementedReport>,
    total: u64,
}

impl Reporter {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            reports: VecDeque::with_capacity(capacity.max(1)),
            total: 0,
        }
    }

    /// Logs and stores a report, evicting the oldest one when full.
    pub fn record(&mut self, report: UnimplementedReport) {
        match report.name {
            Some(name) => log::warn!(
                target: "Service",
                "unimplemented function '{name}': service={} command={} pid={}",
                report.service,
                report.command,
                report.pid
            ),
            None => log::warn!(
                target: "Service",
                "unknown command: service={} command={} pid={}",
                report.service,
                report.command,
                report.pid
            ),
        }
        if self.reports.len() == self.capacity {
            self.reports.pop_front();
        }
        self.reports.push_back(report);
        self.total += 1;
    }

    /// Stored reports, oldest first.
    pub fn reports(&self) -> impl Iterator<Item = &UnimplementedReport> {
        self.reports.iter()
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Number of reports ever recorded, including evicted ones.
    pub fn total(&self) -> u64 {
        self.total
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(command: u32) -> UnimplementedReport {
        UnimplementedReport {
            service: "apm".to_owned(),
            command,
            name: None,
            pid: ProcessId::new(1),
        }
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let mut reporter = Reporter::new(2);
        reporter.record(report(1));
        reporter.record(report(2));
        reporter.record(report(3));

        let commands: Vec<u32> = reporter.reports().map(|r| r.command).collect();
        assert_eq!(commands, vec![2, 3]);
        assert_eq!(reporter.total(), 3);
    }

    #[test]
    fn test_zero_capacity_keeps_one() {
        let mut reporter = Reporter::new(0);
        reporter.record(report(9));
        assert_eq!(reporter.len(), 1);
    }
}
