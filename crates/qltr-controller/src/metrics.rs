//! Flow statistics reduction

use qltr_common::{QltrError, QltrResult, StatsSample};
use serde::{Deserialize, Serialize};

/// Packets assumed lost when estimating the delivery ratio
pub const ASSUMED_LOST_PACKETS: u64 = 10;

/// Throughput and delivery figures for a set of flow entries
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowMetrics {
    /// Sum of packet counts
    pub total_packets: u64,
    /// Sum of byte counts
    pub total_bytes: u64,
    /// Sum of entry durations, seconds
    pub total_duration_secs: f64,
    /// Bytes per second
    pub throughput: f64,
    /// Packets per second
    pub efficiency: f64,
    /// `packets / (packets + ASSUMED_LOST_PACKETS)`
    pub packet_delivery_ratio: f64,
}

/// Reduces raw flow statistics into [`FlowMetrics`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Create calculator
    pub const fn new() -> Self {
        Self
    }

    /// Reduce samples, failing with `EmptyStats` or `ZeroDuration` when no
    /// figures can be produced
    pub fn reduce(&self, samples: &[StatsSample]) -> QltrResult<FlowMetrics> {
        if samples.is_empty() {
            return Err(QltrError::EmptyStats);
        }

        // counters span the full u64 range, totals saturate
        let total_packets = samples
            .iter()
            .map(|s| s.packet_count)
            .fold(0u64, u64::saturating_add);
        let total_bytes = samples
            .iter()
            .map(|s| s.byte_count)
            .fold(0u64, u64::saturating_add);
        let total_duration_secs: f64 = samples.iter().map(|s| s.duration_secs).sum();

        if total_duration_secs == 0.0 {
            return Err(QltrError::ZeroDuration);
        }

        let packets = total_packets as f64;
        Ok(FlowMetrics {
            total_packets,
            total_bytes,
            total_duration_secs,
            throughput: total_bytes as f64 / total_duration_secs,
            efficiency: packets / total_duration_secs,
            packet_delivery_ratio: packets / (packets + ASSUMED_LOST_PACKETS as f64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert!(matches!(
            MetricsCalculator::new().reduce(&[]),
            Err(QltrError::EmptyStats)
        ));
    }

    #[test]
    fn test_zero_duration() {
        let samples = [StatsSample::new(100, 1000, 0.0)];
        assert!(matches!(
            MetricsCalculator::new().reduce(&samples),
            Err(QltrError::ZeroDuration)
        ));
    }

    #[test]
    fn test_single_sample() {
        let samples = [StatsSample::new(100, 1000, 10.0)];
        let m = MetricsCalculator::new().reduce(&samples).unwrap();

        assert_eq!(m.throughput, 100.0);
        assert_eq!(m.efficiency, 10.0);
        assert_eq!(m.packet_delivery_ratio, 100.0 / 110.0);
        assert!((m.packet_delivery_ratio - 0.909).abs() < 0.001);
    }

    #[test]
    fn test_sums_across_samples() {
        let samples = [
            StatsSample::new(40, 4000, 2.0),
            StatsSample::new(60, 6000, 3.0),
            StatsSample::new(0, 0, 0.0),
        ];
        let m = MetricsCalculator::new().reduce(&samples).unwrap();

        assert_eq!(m.total_packets, 100);
        assert_eq!(m.total_bytes, 10_000);
        assert_eq!(m.total_duration_secs, 5.0);
        assert_eq!(m.throughput, 2000.0);
        assert_eq!(m.efficiency, 20.0);
    }

    #[test]
    fn test_totals_saturate_at_counter_max() {
        let samples = [
            StatsSample::new(u64::MAX, u64::MAX, 5.0),
            StatsSample::new(1, 1, 5.0),
        ];
        let m = MetricsCalculator::new().reduce(&samples).unwrap();

        assert_eq!(m.total_packets, u64::MAX);
        assert_eq!(m.total_bytes, u64::MAX);
        assert_eq!(m.throughput, u64::MAX as f64 / 10.0);
        assert!(m.efficiency.is_finite());
        assert!(m.packet_delivery_ratio > 0.0 && m.packet_delivery_ratio <= 1.0);
    }

    #[test]
    fn test_no_packets_gives_zero_ratio() {
        let m = MetricsCalculator::new()
            .reduce(&[StatsSample::new(0, 0, 4.0)])
            .unwrap();
        assert_eq!(m.packet_delivery_ratio, 0.0);
        assert!(m.packet_delivery_ratio < 1.0);
    }
}
