//! Prometheus text exposition format.
//!
//! Renders workload statuses into the Prometheus text exposition format
//! for scraping by a Prometheus server or compatible agent.

use std::fmt::Write;

use crate::telemetry::WorkloadStatus;

struct Family {
    name: &'static str,
    help: &'static str,
    kind: &'static str,
}

const fn gauge(name: &'static str, help: &'static str) -> Family {
    Family {
        name,
        help,
        kind: "gauge",
    }
}

const fn counter(name: &'static str, help: &'static str) -> Family {
    Family {
        name,
        help,
        kind: "counter",
    }
}

fn header(out: &mut String, family: &Family) {
    let _ = writeln!(out, "# HELP {} {}", family.name, family.help);
    let _ = writeln!(out, "# TYPE {} {}", family.name, family.kind);
}

fn escape(label: &str) -> String {
    label
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Render workload statuses into Prometheus text format.
///
/// Produces GAUGE and COUNTER metrics with `workload` labels.
pub fn render_prometheus(statuses: &[WorkloadStatus]) -> String {
    let mut out = String::new();

    let simple: [(Family, fn(&WorkloadStatus) -> String); 6] = [
        (
            gauge("tidescale_cpu_utilization", "Last CPU utilization reading (0.0-1.0)."),
            |s| format!("{:.4}", s.cpu),
        ),
        (
            gauge(
                "tidescale_memory_utilization",
                "Last memory utilization reading (0.0-1.0).",
            ),
            |s| format!("{:.4}", s.memory),
        ),
        (
            gauge(
                "tidescale_last_decision",
                "Direction of the last decision (-1 down, 0 hold, 1 up).",
            ),
            |s| s.last_action.map_or(0, |a| a.direction()).to_string(),
        ),
        (
            counter("tidescale_cycles_total", "Completed control loop cycles."),
            |s| s.cycles.to_string(),
        ),
        (
            counter(
                "tidescale_lookup_failures_total",
                "Cycles skipped because the replica count could not be read.",
            ),
            |s| s.lookup_failures.to_string(),
        ),
        (
            counter(
                "tidescale_scale_failures_total",
                "Replica writes that failed or were rejected.",
            ),
            |s| s.scale_failures.to_string(),
        ),
    ];

    for (family, value) in &simple {
        header(&mut out, family);
        for s in statuses {
            let _ = writeln!(
                out,
                "{}{{workload=\"{}\"}} {}",
                family.name,
                escape(&s.workload),
                value(s)
            );
        }
    }

    // Replica gauge is omitted until the first successful read.
    let replicas = gauge("tidescale_current_replicas", "Last observed desired replica count.");
    header(&mut out, &replicas);
    for s in statuses {
        if let Some(n) = s.current_replicas {
            let _ = writeln!(
                out,
                "{}{{workload=\"{}\"}} {n}",
                replicas.name,
                escape(&s.workload)
            );
        }
    }

    let decisions = counter("tidescale_decisions_total", "Policy decisions by action.");
    header(&mut out, &decisions);
    for s in statuses {
        for (action, n) in [
            ("scale_up", s.scale_ups),
            ("scale_down", s.scale_downs),
            ("hold", s.holds),
        ] {
            let _ = writeln!(
                out,
                "{}{{workload=\"{}\",action=\"{action}\"}} {n}",
                decisions.name,
                escape(&s.workload)
            );
        }
    }

    let degraded = counter(
        "tidescale_degraded_reads_total",
        "Metric reads replaced by the idle sentinel.",
    );
    header(&mut out, &degraded);
    for s in statuses {
        for (metric, n) in [("cpu", s.degraded_cpu_reads), ("memory", s.degraded_memory_reads)] {
            let _ = writeln!(
                out,
                "{}{{workload=\"{}\",metric=\"{metric}\"}} {n}",
                degraded.name,
                escape(&s.workload)
            );
        }
    }

    out
}
