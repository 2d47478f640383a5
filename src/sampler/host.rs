use sysinfo::{Disks, Networks, System};

use crate::metrics::{self, rate::RateTracker};
use crate::wire;

/// One reading of the host counters. Disk and network values are cumulative
/// totals since boot/interface creation; callers diff them into rates.
#[derive(Debug, Clone, Copy)]
pub struct HostSnapshot {
    /// Seconds since the Unix epoch.
    pub taken_at: f64,
    pub cpu_percent: f64,
    pub memory_used: u64,
    pub memory_total: u64,
    pub disk_read_bytes: u64,
    pub disk_write_bytes: u64,
    pub net_recv_bytes: u64,
    pub net_sent_bytes: u64,
}

pub struct HostSampler {
    sys: System,
    disks: Disks,
    networks: Networks,
}

impl Default for HostSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl HostSampler {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_usage();
        HostSampler {
            sys,
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
        }
    }

    /// Refresh every host counter and return one timestamped reading.
    pub fn snapshot(&mut self) -> HostSnapshot {
        self.sys.refresh_memory();
        self.sys.refresh_cpu_usage();
        self.disks.refresh(true);
        self.networks.refresh(true);

        let mut disk_read_bytes = 0;
        let mut disk_write_bytes = 0;
        for disk in self.disks.list() {
            let usage = disk.usage();
            disk_read_bytes += usage.total_read_bytes;
            disk_write_bytes += usage.total_written_bytes;
        }

        let mut net_recv_bytes = 0;
        let mut net_sent_bytes = 0;
        for (_name, data) in &self.networks {
            net_recv_bytes += data.total_received();
            net_sent_bytes += data.total_transmitted();
        }

        HostSnapshot {
            taken_at: metrics::epoch_secs(),
            cpu_percent: f64::from(self.sys.global_cpu_usage()),
            memory_used: self.sys.used_memory(),
            memory_total: self.sys.total_memory(),
            disk_read_bytes,
            disk_write_bytes,
            net_recv_bytes,
            net_sent_bytes,
        }
    }
}

/// Per-consumer state for the host endpoint: one rate tracker per
/// cumulative counter, seeded when the consumer connects.
#[derive(Debug, Default)]
pub struct CpuResourceStream {
    disk_read: RateTracker,
    disk_write: RateTracker,
    net_read: RateTracker,
    net_write: RateTracker,
}

impl CpuResourceStream {
    /// Seed the rate baselines from a fresh snapshot so the first tick
    /// diffs against connection time.
    pub fn primed(host: &mut HostSampler) -> Self {
        let mut stream = Self::default();
        stream.prime(&host.snapshot());
        stream
    }

    pub fn prime(&mut self, snap: &HostSnapshot) {
        self.disk_read.prime(snap.disk_read_bytes as f64, snap.taken_at);
        self.disk_write.prime(snap.disk_write_bytes as f64, snap.taken_at);
        self.net_read.prime(snap.net_recv_bytes as f64, snap.taken_at);
        self.net_write.prime(snap.net_sent_bytes as f64, snap.taken_at);
    }

    /// Fold a snapshot into the wire form. Rates with no baseline yet
    /// report zero so every tick carries the full key set.
    pub fn tick(&mut self, snap: &HostSnapshot) -> wire::CpuResource {
        let at = snap.taken_at;
        wire::CpuResource {
            time: metrics::epoch_millis(at),
            cpu_utilization: snap.cpu_percent,
            memory_usage: snap.memory_used,
            disk_read: self
                .disk_read
                .update(snap.disk_read_bytes as f64, at)
                .unwrap_or(0.0),
            disk_write: self
                .disk_write
                .update(snap.disk_write_bytes as f64, at)
                .unwrap_or(0.0),
            network_read: self
                .net_read
                .update(snap.net_recv_bytes as f64, at)
                .unwrap_or(0.0),
            network_write: self
                .net_write
                .update(snap.net_sent_bytes as f64, at)
                .unwrap_or(0.0),
        }
    }
}
