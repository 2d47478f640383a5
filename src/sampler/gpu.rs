use nvml_wrapper::bitmasks::nv_link::PacketTypes;
use nvml_wrapper::enum_wrappers::device::PcieUtilCounter;
use nvml_wrapper::enum_wrappers::nv_link::UtilizationCountUnit;
use nvml_wrapper::enums::device::SampleValue;
use nvml_wrapper::enums::nv_link::Counter;
use nvml_wrapper::structs::device::FieldId;
use nvml_wrapper::struct_wrappers::nv_link::UtilizationControl;
use nvml_wrapper::sys_exports::field_id::{
    NVML_FI_DEV_NVLINK_SPEED_MBPS_L0, NVML_FI_DEV_NVLINK_SPEED_MBPS_L1,
    NVML_FI_DEV_NVLINK_SPEED_MBPS_L2, NVML_FI_DEV_NVLINK_SPEED_MBPS_L3,
    NVML_FI_DEV_NVLINK_SPEED_MBPS_L4, NVML_FI_DEV_NVLINK_SPEED_MBPS_L5,
};
use nvml_wrapper::{Device, Nvml};
use tracing::debug;

use crate::error::{Result, TelemetryError};
use crate::metrics::rate::RateTracker;
use crate::wire;

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

/// Upper bound on NVLink links per device across NVML generations.
const NVLINK_MAX_LINKS: u32 = 18;

/// Links the driver reports as up on this device. Out-of-range ids
/// answer with an error and are filtered out with the down links.
fn active_links<'a>(device: &'a Device<'a>) -> impl Iterator<Item = u32> + 'a {
    (0..NVLINK_MAX_LINKS)
        .filter(|&link| device.link_wrapper_for(link).is_active().unwrap_or(false))
}

/// Max PCIe lane bandwidth per direction, bytes/s, indexed by link
/// generation (https://en.wikipedia.org/wiki/PCI_Express).
fn pcie_lane_bandwidth(generation: u32) -> Option<f64> {
    match generation {
        1 => Some(250e6),
        2 => Some(500e6),
        3 => Some(985e6),
        4 => Some(1969e6),
        5 => Some(3938e6),
        6 => Some(7877e6),
        _ => None,
    }
}

/// The fixed set of GPUs enumerated at process start, plus the link
/// capabilities probed once from device 0. Queries are read-only against
/// the shared NVML handle; nothing here is re-enumerated at runtime.
pub struct GpuRegistry {
    nvml: Nvml,
    device_count: u32,
    pcie_gen: Option<u32>,
    pcie_width: Option<u32>,
    nvlink_available: bool,
    max_nvlink_bandwidth: f64,
}

impl GpuRegistry {
    /// Initialize the driver and enumerate devices. Fails with
    /// `DeviceUnavailable` when the library is missing or no device is
    /// present; callers hide the GPU routes in that case.
    pub fn detect() -> Result<Self> {
        let nvml = Nvml::init()
            .map_err(|e| TelemetryError::DeviceUnavailable(format!("NVML init failed: {e}")))?;
        let device_count = nvml
            .device_count()
            .map_err(|e| TelemetryError::DeviceUnavailable(e.to_string()))?;
        if device_count == 0 {
            return Err(TelemetryError::DeviceUnavailable(
                "no NVIDIA devices enumerated".to_string(),
            ));
        }

        // Device 0 sets the upper bounds for the whole set, as the
        // dashboards only need a single chart ceiling.
        let probe = nvml
            .device_by_index(0)
            .map_err(|e| TelemetryError::DeviceUnavailable(e.to_string()))?;
        let pcie_gen = probe.max_pcie_link_gen().ok();
        let pcie_width = probe.max_pcie_link_width().ok();
        let nvlink_available = active_links(&probe).next().is_some();
        drop(probe);

        let mut registry = GpuRegistry {
            nvml,
            device_count,
            pcie_gen,
            pcie_width,
            nvlink_available,
            max_nvlink_bandwidth: 0.0,
        };
        if nvlink_available {
            registry.max_nvlink_bandwidth = registry.probe_nvlink_bandwidth();
            registry.configure_nvlink_counters();
        }
        debug!(
            devices = device_count,
            pcie_gen,
            nvlink = nvlink_available,
            "GPU registry initialized"
        );
        Ok(registry)
    }

    pub fn device_count(&self) -> usize {
        self.device_count as usize
    }

    pub fn has_pcie_counters(&self) -> bool {
        self.pcie_gen.is_some() && self.pcie_width.is_some()
    }

    pub fn has_nvlink_counters(&self) -> bool {
        self.nvlink_available
    }

    /// Per-device utilization, percent.
    pub fn utilization(&self) -> Result<Vec<f64>> {
        self.per_device("gpu_utilization", |device| {
            Ok(f64::from(device.utilization_rates()?.gpu))
        })
    }

    /// Per-device memory, (used, total) bytes.
    pub fn memory(&self) -> Result<(Vec<u64>, Vec<u64>)> {
        let pairs = self.per_device("gpu_memory", |device| {
            let info = device.memory_info()?;
            Ok((info.used, info.total))
        })?;
        Ok(pairs.into_iter().unzip())
    }

    /// Per-device PCIe throughput, (tx, rx) bytes/s. NVML reports KB/s;
    /// the canonical unit here is bytes.
    pub fn pcie_throughput(&self) -> Result<(Vec<f64>, Vec<f64>)> {
        let pairs = self.per_device("pcie_throughput", |device| {
            let tx = device.pcie_throughput(PcieUtilCounter::Send)?;
            let rx = device.pcie_throughput(PcieUtilCounter::Receive)?;
            Ok((f64::from(tx) * KIB, f64::from(rx) * KIB))
        })?;
        Ok(pairs.into_iter().unzip())
    }

    /// Theoretical per-direction PCIe ceiling: lane bandwidth × width.
    pub fn max_pcie_throughput(&self) -> f64 {
        match (self.pcie_gen, self.pcie_width) {
            (Some(generation), Some(width)) => pcie_lane_bandwidth(generation)
                .map(|lane| lane * f64::from(width))
                .unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// Cumulative NVLink (rx, tx) bytes per device, summed over every
    /// active link. A device's total must count all of its links; reading
    /// only link 0 undercounts multi-link parts.
    pub fn nvlink_counters(&self) -> Result<Vec<(u64, u64)>> {
        self.per_device("nvlink_throughput", |device| {
            let mut totals = Vec::new();
            for link in active_links(device) {
                let counter = device
                    .link_wrapper_for(link)
                    .utilization_counter(Counter::One)?;
                totals.push((counter.receive, counter.send));
            }
            Ok(fold_link_totals(totals))
        })
    }

    /// Configure counter set one to count bytes on every active link.
    /// Needs admin rights; without them the counters keep whatever
    /// control is already in place and the rates inherit those units.
    fn configure_nvlink_counters(&self) {
        for index in 0..self.device_count {
            let Ok(device) = self.nvml.device_by_index(index) else {
                continue;
            };
            let links: Vec<u32> = active_links(&device).collect();
            for link in links {
                let control = UtilizationControl {
                    units: UtilizationCountUnit::Bytes,
                    packet_filter: PacketTypes::all(),
                };
                let mut wrapper = device.link_wrapper_for(link);
                if let Err(err) = wrapper.set_utilization_control(Counter::One, control, false) {
                    debug!(device = index, link, %err, "NVLink counter control not applied");
                }
            }
        }
    }

    /// Per-direction NVLink ceiling, bytes/s, probed once at startup.
    pub fn max_nvlink_bandwidth(&self) -> f64 {
        self.max_nvlink_bandwidth
    }

    /// Link speeds are reported per link in MB/s; the headline number is
    /// bidirectional, so halve for a per-direction ceiling.
    fn probe_nvlink_bandwidth(&self) -> f64 {
        let link_fields = [
            NVML_FI_DEV_NVLINK_SPEED_MBPS_L0,
            NVML_FI_DEV_NVLINK_SPEED_MBPS_L1,
            NVML_FI_DEV_NVLINK_SPEED_MBPS_L2,
            NVML_FI_DEV_NVLINK_SPEED_MBPS_L3,
            NVML_FI_DEV_NVLINK_SPEED_MBPS_L4,
            NVML_FI_DEV_NVLINK_SPEED_MBPS_L5,
        ]
        .map(FieldId);

        let mut best = 0.0f64;
        for index in 0..self.device_count {
            let Ok(device) = self.nvml.device_by_index(index) else {
                continue;
            };
            let Ok(samples) = device.field_values_for(&link_fields) else {
                continue;
            };
            let total: u64 = samples
                .into_iter()
                .flatten()
                .filter_map(|s| s.value.ok())
                .map(sample_as_u64)
                .sum();
            best = best.max(total as f64 * MIB);
        }
        best / 2.0
    }

    fn per_device<T>(
        &self,
        metric: &'static str,
        mut query: impl FnMut(&nvml_wrapper::Device<'_>) -> std::result::Result<T, nvml_wrapper::error::NvmlError>,
    ) -> Result<Vec<T>> {
        let mut out = Vec::with_capacity(self.device_count as usize);
        for index in 0..self.device_count {
            let device = self
                .nvml
                .device_by_index(index)
                .map_err(|e| TelemetryError::sample_read(metric, e))?;
            out.push(query(&device).map_err(|e| TelemetryError::sample_read(metric, e))?);
        }
        Ok(out)
    }
}

/// Collapse per-link (rx, tx) counters into one device total.
fn fold_link_totals(links: impl IntoIterator<Item = (u64, u64)>) -> (u64, u64) {
    links
        .into_iter()
        .fold((0, 0), |(rx, tx), (r, t)| (rx + r, tx + t))
}

fn sample_as_u64(value: SampleValue) -> u64 {
    match value {
        SampleValue::U64(v) => v,
        SampleValue::U32(v) => u64::from(v),
        SampleValue::I64(v) => v.max(0) as u64,
        SampleValue::F64(v) => v.max(0.0) as u64,
    }
}

/// Per-consumer state for the NVLink endpoint: one tracker pair per device,
/// diffing the cumulative link counters into bytes/s.
#[derive(Debug, Default)]
pub struct NvlinkStream {
    rx: Vec<RateTracker>,
    tx: Vec<RateTracker>,
}

impl NvlinkStream {
    /// Seed baselines at connection time. A failed probe leaves the stream
    /// unprimed; the first tick then reports zero instead of a spurious
    /// rate off the process-lifetime counters.
    pub fn primed(gpu: &GpuRegistry, now: f64) -> Self {
        let mut stream = Self::default();
        if let Ok(counters) = gpu.nvlink_counters() {
            stream.prime(&counters, now);
        }
        stream
    }

    pub fn prime(&mut self, counters: &[(u64, u64)], now: f64) {
        self.rx = vec![RateTracker::new(); counters.len()];
        self.tx = vec![RateTracker::new(); counters.len()];
        for (i, (rx, tx)) in counters.iter().enumerate() {
            self.rx[i].prime(*rx as f64, now);
            self.tx[i].prime(*tx as f64, now);
        }
    }

    pub fn tick(&mut self, gpu: &GpuRegistry, now: f64) -> Result<wire::NvlinkThroughput> {
        let counters = gpu.nvlink_counters()?;
        Ok(self.fold(&counters, now, gpu.max_nvlink_bandwidth()))
    }

    pub fn fold(
        &mut self,
        counters: &[(u64, u64)],
        now: f64,
        max_rxtx_bw: f64,
    ) -> wire::NvlinkThroughput {
        if self.rx.len() != counters.len() {
            self.rx = vec![RateTracker::new(); counters.len()];
            self.tx = vec![RateTracker::new(); counters.len()];
        }
        let mut nvlink_rx = Vec::with_capacity(counters.len());
        let mut nvlink_tx = Vec::with_capacity(counters.len());
        for (i, (rx, tx)) in counters.iter().enumerate() {
            nvlink_rx.push(self.rx[i].update(*rx as f64, now).unwrap_or(0.0));
            nvlink_tx.push(self.tx[i].update(*tx as f64, now).unwrap_or(0.0));
        }
        wire::NvlinkThroughput {
            nvlink_rx,
            nvlink_tx,
            max_rxtx_bw,
        }
    }
}
