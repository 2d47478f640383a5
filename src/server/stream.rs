use serde_json::Value;

use super::AppState;
use super::routes::Endpoint;
use crate::error::{Result, TelemetryError};
use crate::metrics::{self, aggregate};
use crate::sampler::gpu::{GpuRegistry, NvlinkStream};
use crate::sampler::host::CpuResourceStream;
use crate::wire;

/// Per-consumer sampling state for one endpoint. Endpoints built on
/// cumulative counters carry their own rate trackers; the rest are
/// stateless point-in-time queries.
pub enum EndpointStream {
    CpuResource(CpuResourceStream),
    GpuUtilization,
    GpuUsage,
    GpuResource,
    PciStats,
    Nvlink(NvlinkStream),
}

impl EndpointStream {
    /// Build a stream for one consumer, seeding counter baselines at
    /// connection time.
    pub async fn new(endpoint: Endpoint, state: &AppState) -> Self {
        match endpoint {
            Endpoint::CpuResource => {
                let mut host = state.host.lock().await;
                EndpointStream::CpuResource(CpuResourceStream::primed(&mut host))
            }
            Endpoint::GpuUtilization => EndpointStream::GpuUtilization,
            Endpoint::GpuUsage => EndpointStream::GpuUsage,
            Endpoint::GpuResource => EndpointStream::GpuResource,
            Endpoint::PciStats => EndpointStream::PciStats,
            Endpoint::NvlinkThroughput => {
                let stream = match &state.gpu {
                    Some(gpu) => NvlinkStream::primed(gpu, metrics::epoch_secs()),
                    None => NvlinkStream::default(),
                };
                EndpointStream::Nvlink(stream)
            }
        }
    }

    /// Build a stream with no counter baseline, for single-shot reads.
    /// Two back-to-back snapshots would put microseconds under the rate
    /// divisor; reporting the first tick's rates as zero is honest instead
    /// of noisy.
    pub fn cold(endpoint: Endpoint) -> Self {
        match endpoint {
            Endpoint::CpuResource => EndpointStream::CpuResource(CpuResourceStream::default()),
            Endpoint::GpuUtilization => EndpointStream::GpuUtilization,
            Endpoint::GpuUsage => EndpointStream::GpuUsage,
            Endpoint::GpuResource => EndpointStream::GpuResource,
            Endpoint::PciStats => EndpointStream::PciStats,
            Endpoint::NvlinkThroughput => EndpointStream::Nvlink(NvlinkStream::default()),
        }
    }

    /// Produce one tick. A failure skips this tick only; the caller's next
    /// scheduled tick is the retry.
    pub async fn sample(&mut self, state: &AppState) -> Result<Value> {
        match self {
            EndpointStream::CpuResource(stream) => {
                let snap = {
                    let mut host = state.host.lock().await;
                    host.snapshot()
                };
                to_value(stream.tick(&snap))
            }
            EndpointStream::GpuUtilization => {
                let gpu = registry(state)?;
                to_value(wire::GpuUtilization {
                    gpu_utilization: gpu.utilization()?,
                })
            }
            EndpointStream::GpuUsage => {
                let gpu = registry(state)?;
                let (memory_usage, total_memory) = gpu.memory()?;
                to_value(wire::GpuUsage {
                    memory_usage,
                    total_memory,
                })
            }
            EndpointStream::GpuResource => {
                let gpu = registry(state)?;
                to_value(gpu_resource_tick(gpu)?)
            }
            EndpointStream::PciStats => {
                let gpu = registry(state)?;
                let (pci_tx, pci_rx) = gpu.pcie_throughput()?;
                to_value(wire::PciStats {
                    pci_tx,
                    pci_rx,
                    max_rxtx_tp: gpu.max_pcie_throughput(),
                })
            }
            EndpointStream::Nvlink(stream) => {
                let gpu = registry(state)?;
                to_value(stream.tick(gpu, metrics::epoch_secs())?)
            }
        }
    }
}

fn gpu_resource_tick(gpu: &GpuRegistry) -> Result<wire::GpuResource> {
    let util = gpu.utilization()?;
    let (used, total) = gpu.memory()?;
    // PCIe counters are optional; without them the totals stay at zero so
    // the key set is stable for the charts.
    let (tx, rx) = if gpu.has_pcie_counters() {
        gpu.pcie_throughput()?
    } else {
        (Vec::new(), Vec::new())
    };

    Ok(wire::GpuResource {
        time: metrics::epoch_millis(metrics::epoch_secs()),
        gpu_utilization_total: aggregate::mean(&util),
        gpu_memory_total: aggregate::memory_percent(&used, &total),
        rx_total: aggregate::total(&rx),
        tx_total: aggregate::total(&tx),
        gpu_memory_individual: used,
        gpu_utilization_individual: util,
    })
}

fn registry(state: &AppState) -> Result<&GpuRegistry> {
    state
        .gpu
        .as_ref()
        .ok_or_else(|| TelemetryError::DeviceUnavailable("no GPU registry".to_string()))
}

fn to_value(tick: impl serde::Serialize) -> Result<Value> {
    serde_json::to_value(tick).map_err(|e| TelemetryError::sample_read("serialize", e))
}
