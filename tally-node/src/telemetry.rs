//! Logs do nó: trilha de auditoria em arquivo e console filtrado por `RUST_LOG`.

use std::panic::PanicHookInfo;

use tracing::Metadata;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::filter_fn, prelude::*, EnvFilter};

use tally_common::utils::NodeId;

const AUDIT_TARGET: &str = "consensus";
const DEFAULT_CONSOLE_FILTER: &str = "info,tally_node=debug";

/// Eventos que vão para `logs/audit-<node>.log`.
pub fn is_audit_event(metadata: &Metadata<'_>) -> bool {
    metadata.target() == AUDIT_TARGET || metadata.target().starts_with("tally_")
}

/// Eventos `EVENT:` ficam fora do console.
pub fn is_console_event(metadata: &Metadata<'_>) -> bool {
    metadata.target() != AUDIT_TARGET
}

fn crash_report(info: &PanicHookInfo<'_>) -> String {
    let payload = info.payload();
    let msg = payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("Box<Any>");
    let location = info
        .location()
        .map(|l| format!("at {}:{}:{}", l.file(), l.line(), l.column()))
        .unwrap_or_else(|| "unknown location".to_string());
    format!("CRASH: {msg} {location}\n")
}

/// Panics também deixam rastro em `panic.log`.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let report = crash_report(info);
        eprintln!("{report}");
        let _ = std::fs::write("panic.log", report);
    }));
}

/// Instala o subscriber global. O guard precisa viver até o fim do processo
/// para que o writer não-bloqueante descarregue o arquivo de auditoria.
pub fn init(node_id: &NodeId) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::never(".", format!("logs/audit-{node_id}.log"));
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let audit_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_filter(filter_fn(is_audit_event));

    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_CONSOLE_FILTER.into());
    let console_layer = tracing_subscriber::fmt::layer()
        .with_filter(console_filter)
        .with_filter(filter_fn(is_console_event));

    tracing_subscriber::registry().with(audit_layer).with(console_layer).init();
    guard
}
