//! Data types sent to clients over WebSocket and plain GET.
//! Keep this module minimal and stable; it defines the wire format.

use serde::{Deserialize, Serialize};

/// Sent once immediately after a successful WebSocket upgrade.
#[derive(Debug, Serialize)]
pub struct Hello {
    pub status: &'static str,
}

impl Hello {
    pub fn connected() -> Self {
        Hello {
            status: "connected",
        }
    }
}

/// Sent instead of `Hello` when the auth token check fails.
#[derive(Debug, Serialize)]
pub struct AuthError {
    pub error: &'static str,
}

impl AuthError {
    pub fn unauthorized() -> Self {
        AuthError {
            error: "Unauthorized access",
        }
    }
}

/// Client → server control message: retime or pause the tick loop.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlMessage {
    pub update_frequency: Option<u64>,
    pub is_paused: Option<bool>,
}

/// One tick of the host endpoint. Counters are per-second rates; a rate
/// with no baseline yet reports zero.
#[derive(Debug, Clone, Serialize)]
pub struct CpuResource {
    /// Milliseconds since the Unix epoch.
    pub time: f64,
    pub cpu_utilization: f64,
    pub memory_usage: u64,
    pub disk_read: f64,
    pub disk_write: f64,
    pub network_read: f64,
    pub network_write: f64,
}

/// Per-device GPU utilization, percent.
#[derive(Debug, Clone, Serialize)]
pub struct GpuUtilization {
    pub gpu_utilization: Vec<f64>,
}

/// Per-device GPU memory, bytes.
#[derive(Debug, Clone, Serialize)]
pub struct GpuUsage {
    pub memory_usage: Vec<u64>,
    pub total_memory: Vec<u64>,
}

/// Aggregate GPU timeline tick: totals plus the per-device breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct GpuResource {
    pub time: f64,
    /// Mean utilization across devices, percent.
    pub gpu_utilization_total: f64,
    /// Σused / Σtotal across devices, percent.
    pub gpu_memory_total: f64,
    /// PCIe bytes/s summed over devices.
    pub rx_total: f64,
    pub tx_total: f64,
    pub gpu_memory_individual: Vec<u64>,
    pub gpu_utilization_individual: Vec<f64>,
}

/// Per-device PCIe throughput, bytes/s, plus the theoretical ceiling used
/// to scale charts.
#[derive(Debug, Clone, Serialize)]
pub struct PciStats {
    pub pci_tx: Vec<f64>,
    pub pci_rx: Vec<f64>,
    pub max_rxtx_tp: f64,
}

/// Per-device NVLink throughput, bytes/s, plus the per-direction ceiling.
#[derive(Debug, Clone, Serialize)]
pub struct NvlinkThroughput {
    pub nvlink_rx: Vec<f64>,
    pub nvlink_tx: Vec<f64>,
    pub max_rxtx_bw: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_resource_wire_keys() {
        let tick = CpuResource {
            time: 1_700_000_000_000.0,
            cpu_utilization: 37.2,
            memory_usage: 8_589_934_592,
            disk_read: 500_000.0,
            disk_write: 0.0,
            network_read: 1024.0,
            network_write: 2048.0,
        };
        let value = serde_json::to_value(&tick).unwrap();
        for key in [
            "time",
            "cpu_utilization",
            "memory_usage",
            "disk_read",
            "disk_write",
            "network_read",
            "network_write",
        ] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
    }

    #[test]
    fn gpu_resource_wire_keys() {
        let tick = GpuResource {
            time: 0.0,
            gpu_utilization_total: 50.0,
            gpu_memory_total: 25.0,
            rx_total: 0.0,
            tx_total: 0.0,
            gpu_memory_individual: vec![1024, 2048],
            gpu_utilization_individual: vec![40.0, 60.0],
        };
        let value = serde_json::to_value(&tick).unwrap();
        for key in [
            "time",
            "gpu_utilization_total",
            "gpu_memory_total",
            "rx_total",
            "tx_total",
            "gpu_memory_individual",
            "gpu_utilization_individual",
        ] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
    }

    #[test]
    fn control_message_accepts_partial_fields() {
        let msg: ControlMessage = serde_json::from_str(r#"{"updateFrequency": 2000}"#).unwrap();
        assert_eq!(msg.update_frequency, Some(2000));
        assert_eq!(msg.is_paused, None);

        let msg: ControlMessage =
            serde_json::from_str(r#"{"updateFrequency": 500, "isPaused": true}"#).unwrap();
        assert_eq!(msg.update_frequency, Some(500));
        assert_eq!(msg.is_paused, Some(true));
    }

    #[test]
    fn hello_and_auth_error_shapes() {
        assert_eq!(
            serde_json::to_string(&Hello::connected()).unwrap(),
            r#"{"status":"connected"}"#
        );
        assert_eq!(
            serde_json::to_string(&AuthError::unauthorized()).unwrap(),
            r#"{"error":"Unauthorized access"}"#
        );
    }
}
