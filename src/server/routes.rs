use std::collections::BTreeMap;

/// One dashboard endpoint. Each serves a single sample on plain GET, its
/// recorded window under `/history`, and a tick stream on WebSocket
/// upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    CpuResource,
    GpuUtilization,
    GpuUsage,
    GpuResource,
    PciStats,
    NvlinkThroughput,
}

impl Endpoint {
    pub fn name(self) -> &'static str {
        match self {
            Endpoint::CpuResource => "cpu_resource",
            Endpoint::GpuUtilization => "gpu_utilization",
            Endpoint::GpuUsage => "gpu_usage",
            Endpoint::GpuResource => "gpu_resource",
            Endpoint::PciStats => "pci_stats",
            Endpoint::NvlinkThroughput => "nvlink_throughput",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Endpoint::CpuResource => "Machine Resources",
            Endpoint::GpuUtilization => "GPU Utilization",
            Endpoint::GpuUsage => "GPU Memory",
            Endpoint::GpuResource => "GPU Resources",
            Endpoint::PciStats => "PCIe Throughput",
            Endpoint::NvlinkThroughput => "NVLink Throughput",
        }
    }
}

/// What the device-detection step found at startup. Routes depending on a
/// capability that is absent never enter the route set.
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    pub gpus: usize,
    pub pcie_counters: bool,
    pub nvlink_counters: bool,
}

pub fn route_set(caps: &Capabilities) -> Vec<Endpoint> {
    let mut routes = vec![Endpoint::CpuResource];
    if caps.gpus > 0 {
        routes.push(Endpoint::GpuUtilization);
        routes.push(Endpoint::GpuUsage);
        routes.push(Endpoint::GpuResource);
        if caps.pcie_counters {
            routes.push(Endpoint::PciStats);
        }
        if caps.nvlink_counters {
            routes.push(Endpoint::NvlinkThroughput);
        }
    }
    routes
}

/// The `/index.json` body: route path mapped to a human-readable title.
pub fn route_index(routes: &[Endpoint]) -> BTreeMap<String, &'static str> {
    routes
        .iter()
        .map(|e| (format!("/{}", e.name()), e.title()))
        .collect()
}
