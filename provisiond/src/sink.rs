//! Billing/consensus report sink (spec §1 item 5, §6: "the billing
//! sink" is pluggable; the engine depends only on `emit(report)`).
//! This default sink logs each report as a structured `info!` event;
//! a real deployment swaps it for one that forwards to the billing
//! layer.

use async_trait::async_trait;
use provisiond_engine::{ConsumptionReport, ReportSink};
use tracing::info;

pub struct LoggingReportSink;

#[async_trait]
impl ReportSink for LoggingReportSink {
    async fn emit(&self, report: ConsumptionReport) {
        info!(
            target: "provisiond",
            twin = report.twin,
            id = report.id,
            version = report.version,
            cpu = report.consumption.cpu,
            memory = report.consumption.memory,
            ssd = report.consumption.ssd,
            hdd = report.consumption.hdd,
            timestamp = %report.timestamp,
            "consumption report"
        );
    }
}
