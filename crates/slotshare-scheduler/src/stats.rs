//! Scheduler counters and their Prometheus text exposition.

use serde::{Deserialize, Serialize};

use slotshare_core::ResourceTotals;

/// Point-in-time counters of the agent-sharing scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub declared_agents: usize,
    /// Number of (target, agent) pairs in the blacklist.
    pub blacklist_size: usize,
    pub reclaiming_agents: usize,
    pub multiplexed_roles: usize,
    /// Compressed bytes of the last persisted blacklist.
    pub persisted_blacklist_bytes: usize,
    /// Declared resources across every slot seen by the last full sync.
    pub resource_totals: ResourceTotals,
}

/// Render `stats` with `app` as the only label.
pub fn render_prometheus(app: &str, stats: &SchedulerStats) -> String {
    let gauges: [(&str, &str, u64); 8] = [
        (
            "slotshare_declared_agents",
            "Number of declared agent roles.",
            stats.declared_agents as u64,
        ),
        (
            "slotshare_blacklist_size",
            "Number of blacklisted target/agent pairs.",
            stats.blacklist_size as u64,
        ),
        (
            "slotshare_reclaiming_agents",
            "Agent roles with a slot being reclaimed.",
            stats.reclaiming_agents as u64,
        ),
        (
            "slotshare_multiplexed_roles",
            "Target roles served by an agent.",
            stats.multiplexed_roles as u64,
        ),
        (
            "slotshare_persisted_blacklist_bytes",
            "Compressed size of the last persisted blacklist.",
            stats.persisted_blacklist_bytes as u64,
        ),
        (
            "slotshare_slot_cpu",
            "Declared CPU across all slots, in hundredths of a core.",
            stats.resource_totals.cpu,
        ),
        (
            "slotshare_slot_mem_mb",
            "Declared memory across all slots, in megabytes.",
            stats.resource_totals.mem,
        ),
        (
            "slotshare_slots",
            "Number of slots seen by the last full sync.",
            stats.resource_totals.slots,
        ),
    ];

    let mut out = String::new();
    for (name, help, value) in gauges {
        out.push_str(&format!("# HELP {name} {help}\n"));
        out.push_str(&format!("# TYPE {name} gauge\n"));
        out.push_str(&format!("{name}{{app=\"{app}\"}} {value}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_every_gauge() {
        let stats = SchedulerStats {
            declared_agents: 2,
            blacklist_size: 1,
            multiplexed_roles: 5,
            resource_totals: ResourceTotals {
                cpu: 400,
                mem: 2048,
                slots: 3,
            },
            ..SchedulerStats::default()
        };
        let output = render_prometheus("search", &stats);

        assert!(output.contains("# TYPE slotshare_declared_agents gauge"));
        assert!(output.contains("slotshare_declared_agents{app=\"search\"} 2"));
        assert!(output.contains("slotshare_blacklist_size{app=\"search\"} 1"));
        assert!(output.contains("slotshare_multiplexed_roles{app=\"search\"} 5"));
        assert!(output.contains("slotshare_slot_mem_mb{app=\"search\"} 2048"));
        assert!(output.contains("slotshare_slots{app=\"search\"} 3"));
    }

    #[test]
    fn render_format_is_prometheus_compatible() {
        let output = render_prometheus("search", &SchedulerStats::default());
        for line in output.lines() {
            if line.starts_with('#') {
                continue;
            }
            let (metric, value) = line.rsplit_once(' ').unwrap();
            assert!(metric.ends_with("{app=\"search\"}"), "bad labels: {line}");
            assert!(value.parse::<u64>().is_ok(), "bad value: {line}");
        }
    }
}
