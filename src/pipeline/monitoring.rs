//! Timing, throughput, CPU, memory and on-disk size of one strategy run.

use crate::error::Result;
use crate::pipeline::storage::table_size_bytes;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use sysinfo::{Pid, System};
use tracing::info;

const MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub strategy: String,
    pub record_count: u64,
    pub execution_time_s: f64,
    /// Process CPU over the run, in percent of one core
    pub cpu_percent: Option<f64>,
    /// Peak resident set size of the process, where the platform reports it
    pub peak_memory_mb: Option<f64>,
    pub disk_size_mb: Option<f64>,
    pub throughput_rec_per_sec: f64,
}

/// Peak RSS from `/proc/self/status` (`VmHWM`, in kB)
#[cfg(target_os = "linux")]
pub fn peak_memory_mb() -> Option<f64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    status
        .lines()
        .find(|l| l.starts_with("VmHWM:"))
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<f64>().ok())
        .map(|kb| kb / 1024.0)
}

#[cfg(not(target_os = "linux"))]
pub fn peak_memory_mb() -> Option<f64> {
    None
}

/// Samples this process's CPU time across a measured section.
struct CpuSampler {
    system: System,
    pid: Option<Pid>,
}

impl CpuSampler {
    fn start() -> Self {
        let mut system = System::new();
        let pid = sysinfo::get_current_pid().ok();
        if let Some(pid) = pid {
            system.refresh_process(pid);
        }
        Self { system, pid }
    }

    fn finish(mut self) -> Option<f64> {
        let pid = self.pid?;
        if !self.system.refresh_process(pid) {
            return None;
        }
        self.system
            .process(pid)
            .map(|p| p.cpu_usage() as f64)
            .filter(|v| v.is_finite() && *v >= 0.0)
    }
}

/// Run `op` and measure it. The table size is taken after `op` returns.
pub fn monitor_performance<T, F>(
    strategy: &str,
    record_count: u64,
    table_path: Option<&Path>,
    op: F,
) -> Result<(T, PerformanceMetrics)>
where
    F: FnOnce() -> Result<T>,
{
    let cpu = CpuSampler::start();
    let start = Instant::now();
    let value = op()?;
    let elapsed = start.elapsed().as_secs_f64();
    let cpu_percent = cpu.finish();

    let disk_size_mb = match table_path {
        Some(path) if path.exists() => Some(table_size_bytes(path)? as f64 / MB),
        _ => None,
    };
    let throughput = if elapsed > 0.0 {
        record_count as f64 / elapsed
    } else {
        0.0
    };

    let metrics = PerformanceMetrics {
        strategy: strategy.to_string(),
        record_count,
        execution_time_s: elapsed,
        cpu_percent,
        peak_memory_mb: peak_memory_mb(),
        disk_size_mb,
        throughput_rec_per_sec: throughput,
    };

    info!(
        strategy,
        time_s = %format!("{:.3}", elapsed),
        throughput_rps = throughput as u64,
        cpu_pct = ?metrics.cpu_percent.map(|c| format!("{:.1}", c)),
        disk_mb = ?metrics.disk_size_mb.map(|d| format!("{:.2}", d)),
        "performance_metrics"
    );
    Ok((value, metrics))
}

/// `1234567` -> `1,234,567`
pub fn format_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

pub fn format_performance_table(all: &[PerformanceMetrics]) -> String {
    if all.is_empty() {
        return String::new();
    }
    let rule = "=".repeat(110);
    let mut out = String::new();
    out.push('\n');
    out.push_str(&rule);
    out.push_str("\nPERFORMANCE BENCHMARKING RESULTS\n");
    out.push_str(&rule);
    out.push_str(&format!(
        "\n\n{:<20} {:<12} {:<10} {:<8} {:<12} {:<12} {:<15}\n",
        "Strategy", "Records", "Time", "CPU", "Memory", "Disk Size", "Throughput"
    ));
    out.push_str(&"-".repeat(110));
    out.push('\n');

    for m in all {
        let cpu = m
            .cpu_percent
            .map(|v| format!("{:.1}%", v))
            .unwrap_or_else(|| "N/A".to_string());
        let memory = m
            .peak_memory_mb
            .map(|v| format!("{:.1}MB", v))
            .unwrap_or_else(|| "N/A".to_string());
        let disk = m
            .disk_size_mb
            .map(|v| format!("{:.2}MB", v))
            .unwrap_or_else(|| "N/A".to_string());
        let throughput =
            format!("{} rec/s", format_thousands(m.throughput_rec_per_sec.round() as u64));
        let time = format!("{:.3}s", m.execution_time_s);
        out.push_str(&format!(
            "{:<20} {:<12} {:<10} {:<8} {:<12} {:<12} {:<15}\n",
            m.strategy,
            format_thousands(m.record_count),
            time,
            cpu,
            memory,
            disk,
            throughput
        ));
    }
    out.push('\n');
    out.push_str(&rule);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thousands_separator() {
        assert_eq!(format_thousands(0), "0");
        assert_eq!(format_thousands(999), "999");
        assert_eq!(format_thousands(1000), "1,000");
        assert_eq!(format_thousands(1234567), "1,234,567");
    }

    #[test]
    fn test_monitor_reports_time_and_value() {
        let (value, metrics) = monitor_performance("demo", 10, None, || {
            std::thread::sleep(std::time::Duration::from_millis(5));
            Ok(7)
        })
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(metrics.record_count, 10);
        assert!(metrics.execution_time_s >= 0.005);
        assert!(metrics.throughput_rec_per_sec > 0.0);
        assert_eq!(metrics.disk_size_mb, None);
    }

    #[test]
    fn test_cpu_is_sampled_for_busy_work() {
        let (_, metrics) = monitor_performance("busy", 1, None, || {
            let start = Instant::now();
            let mut acc = 0u64;
            while start.elapsed().as_millis() < 300 {
                acc = acc.wrapping_mul(31).wrapping_add(7);
            }
            Ok(acc)
        })
        .unwrap();
        if cfg!(target_os = "linux") {
            let cpu = metrics.cpu_percent.expect("cpu sampled");
            assert!(cpu >= 0.0);
        }
    }

    #[test]
    fn test_table_has_cpu_column() {
        let table = format_performance_table(&[PerformanceMetrics {
            strategy: "eager_dedup".to_string(),
            record_count: 10,
            execution_time_s: 0.5,
            cpu_percent: Some(87.4),
            peak_memory_mb: Some(64.0),
            disk_size_mb: None,
            throughput_rec_per_sec: 20.0,
        }]);
        let header = table.lines().find(|l| l.starts_with("Strategy")).unwrap();
        assert!(header.contains("CPU"));
        assert!(table.contains("87.4%"));
        assert!(table.contains("64.0MB"));
    }

    #[test]
    fn test_table_shows_na_for_missing_values() {
        let table = format_performance_table(&[PerformanceMetrics {
            strategy: "bronze_append".to_string(),
            record_count: 12345,
            execution_time_s: 1.5,
            cpu_percent: None,
            peak_memory_mb: None,
            disk_size_mb: Some(2.0),
            throughput_rec_per_sec: 8230.0,
        }]);
        assert!(table.contains("bronze_append"));
        assert!(table.contains("12,345"));
        assert!(table.contains("N/A"));
        assert!(table.contains("2.00MB"));
        assert!(table.contains("8,230 rec/s"));
    }

    #[test]
    fn test_empty_table() {
        assert!(format_performance_table(&[]).is_empty());
    }
}
